pub mod analytics;
pub mod error;
pub mod portfolio;
pub mod risk;
pub mod simulation;
pub mod stats;
pub mod types;
pub mod valuation;

pub use error::AnalyticsError;
pub use types::*;

/// Standard result type for all analytics operations
pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
