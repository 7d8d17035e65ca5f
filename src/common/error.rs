use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("Transient provider failure: {reason}")]
    TransientProvider { reason: String },

    #[error("Optimization deadline exceeded after {elapsed_ms}ms")]
    OptimizationTimeout { elapsed_ms: u64 },

    #[error("Persistence unavailable: {reason}")]
    PersistenceUnavailable { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Transient failures may be retried with backoff; everything else is
    /// surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::TransientProvider { .. })
    }
}

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Route not found: {id}")]
    RouteNotFound { id: String },

    #[error("Route {id} is {status} and can no longer be modified")]
    RouteClosed { id: String, status: String },

    #[error("Stop not found: {id}")]
    StopNotFound { id: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
pub type ApplicationResult<T> = Result<T, ApplicationError>;
