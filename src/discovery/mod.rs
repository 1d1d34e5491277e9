pub mod classifier;
pub mod engine;
pub mod extract;

pub use classifier::Classifier;
pub use engine::DiscoveryEngine;
