use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Mismatched series lengths in {context}: {left} vs {right}")]
    MismatchedSeriesLength {
        context: String,
        left: usize,
        right: usize,
    },

    #[error("Terminal value diverges: WACC ({wacc}) must exceed terminal growth ({terminal_growth})")]
    DivergentTerminalValue {
        wacc: Decimal,
        terminal_growth: Decimal,
    },

    #[error("Infeasible constraints: {0}")]
    InfeasibleConstraints(String),

    #[error("Computation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AnalyticsError {
    /// Stable machine-readable tag for each variant, used by the facade
    /// and the bindings layer to classify failures.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyticsError::InvalidInput { .. } => "invalid_input",
            AnalyticsError::EmptyInput(_) => "empty_input",
            AnalyticsError::MismatchedSeriesLength { .. } => "mismatched_series_length",
            AnalyticsError::DivergentTerminalValue { .. } => "divergent_terminal_value",
            AnalyticsError::InfeasibleConstraints(_) => "infeasible_constraints",
            AnalyticsError::Cancelled => "cancelled",
            AnalyticsError::SerializationError(_) => "serialization_error",
        }
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(e: serde_json::Error) -> Self {
        AnalyticsError::SerializationError(e.to_string())
    }
}
