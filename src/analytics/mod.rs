//! Read-only views over stored metrics: co-movement between keywords,
//! month-of-year patterns and the per-keyword detail page.

pub mod correlation;
pub mod details;
pub mod seasonality;

pub use correlation::keyword_correlations;
pub use details::{keyword_details, keyword_regions, RegionScope};
pub use seasonality::seasonal_pattern;
