// Error handling framework for the scheduling core

use thiserror::Error;

/// Feature extraction errors
#[derive(Error, Debug)]
pub enum FeatureError {
    #[error(
        "Insufficient history for category '{category}': found {found}, required {required}"
    )]
    InsufficientData {
        category: String,
        found: usize,
        required: usize,
    },
}

/// Scoring model errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("No trained model available")]
    Untrained,

    #[error("Model serialization failed: {0}")]
    Serialization(String),

    #[error("Model state I/O failed: {0}")]
    Io(String),
}

/// Metrics store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store serialization failed: {0}")]
    Serialization(String),

    #[error("Store I/O failed: {0}")]
    Io(String),
}

impl StoreError {
    /// Transient failures worth retrying; `NotFound` is not one of them
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}

/// Rescheduling sweep errors.
///
/// Per-post failures are isolated inside the sweep summary; only losing the
/// store while listing posts aborts an entire sweep. Cancellation is not an
/// error: it is reported through the sweep summary.
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Metrics store unavailable, sweep aborted: {0}")]
    StoreUnavailable(String),
}

/// Sweep cadence errors
#[derive(Error, Debug)]
pub enum CadenceError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("No next run available for {cadence_type} cadence")]
    NoNextRun { cadence_type: String },
}

/// Errors surfaced by the service facade
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No candidate slots in the requested window")]
    NoCandidates,

    #[error("Another scheduling decision is in flight for post {0}")]
    DecisionInFlight(crate::models::PostId),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        ModelError::Io(err.to_string())
    }
}
