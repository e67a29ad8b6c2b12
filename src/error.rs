use thiserror::Error;

/// Main error type for the adaptive trading agent
#[derive(Error, Debug)]
pub enum AdaptError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    // Learning errors
    #[error("Insufficient data: requested {requested}, available {available}")]
    InsufficientData { requested: usize, available: usize },

    #[error("Model has not been trained yet")]
    UntrainedModel,

    #[error("Invalid state vector: {0}")]
    InvalidStateVector(String),

    // Trading errors
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Risk check rejected order: {0}")]
    RiskRejected(String),

    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AdaptError {
    /// Errors the learning loop recovers from locally without touching state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AdaptError::InsufficientData { .. }
                | AdaptError::UntrainedModel
                | AdaptError::InvalidStateVector(_)
                | AdaptError::RiskRejected(_)
        )
    }
}

/// Result type alias for AdaptError
pub type Result<T> = std::result::Result<T, AdaptError>;
