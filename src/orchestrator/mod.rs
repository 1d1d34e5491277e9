pub mod jobs;
pub mod on_demand;
pub mod scheduler;

pub use jobs::{register_jobs, Pipeline};
pub use on_demand::{OnDemand, RefreshOutcome};
pub use scheduler::JobScheduler;
