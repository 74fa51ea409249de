use thiserror::Error;

pub type LeadflowResult<T> = Result<T, LeadflowError>;

#[derive(Error, Debug)]
pub enum LeadflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LeadflowError {
    /// Caller-side input problems; never retried.
    pub fn is_validation(&self) -> bool {
        matches!(self, LeadflowError::Validation(_))
    }
}
