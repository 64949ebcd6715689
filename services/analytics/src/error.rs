//! Error types for the forecasting pipeline

use thiserror::Error;

/// Problems with the raw tables handed to the pipeline.
/// Any of these aborts the run; no partial results are produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("no source tables supplied")]
    Empty,

    #[error("source '{source_id}' is not tabular: {reason}")]
    Malformed { source_id: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error(transparent)]
    Input(#[from] InputError),

    /// No column passed the completeness threshold. Callers should present
    /// this as a warning, not a failure.
    #[error("no metric column is complete enough to forecast (threshold {threshold})")]
    NoQualifyingMetrics { threshold: f64 },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl ForecastError {
    /// True for outcomes that mean "nothing to forecast" rather than bad input.
    pub fn is_warning(&self) -> bool {
        matches!(self, ForecastError::NoQualifyingMetrics { .. })
    }
}

pub type Result<T, E = ForecastError> = std::result::Result<T, E>;
