use thiserror::Error;

/// Error types for the orbitfit-rs library.
///
/// Only configuration and bookkeeping problems are errors. Evaluating a prior or
/// likelihood outside its support is not an error: it yields `f64::NEG_INFINITY`.
#[derive(Error, Debug)]
pub enum OrbitFitError {
    /// Invalid construction arguments (body count, walkers, temperatures, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Error indicating a mismatch in array dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Parameter label not known to the parameter indexer.
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    /// Invalid prior definition.
    #[error("Invalid prior: {0}")]
    InvalidPrior(String),

    /// Invalid observational data.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A bounded sampling loop ran out of attempts.
    #[error("Sampling exhausted: {0}")]
    SamplingExhausted(String),

    /// Failure while building a worker pool.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<crate::priors::PriorError> for OrbitFitError {
    fn from(err: crate::priors::PriorError) -> Self {
        OrbitFitError::InvalidPrior(format!("{}", err))
    }
}

impl From<rayon::ThreadPoolBuildError> for OrbitFitError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        OrbitFitError::ThreadPool(format!("{}", err))
    }
}

/// Result type alias for orbitfit-rs operations.
pub type Result<T> = std::result::Result<T, OrbitFitError>;
