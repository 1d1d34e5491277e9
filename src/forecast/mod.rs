pub mod model;
pub mod projection;

pub use model::{Forecast, ForecastEngine};
pub use projection::{ranking_forecast, RankingForecast};
