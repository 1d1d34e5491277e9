pub mod growth;
pub mod lifecycle;
pub mod ranking;
pub mod trend_scorer;

pub use ranking::RankedTrend;
pub use trend_scorer::TrendScorer;
