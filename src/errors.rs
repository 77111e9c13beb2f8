//! Error types for the connection pool

use crate::backend::BackendError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    /// The pool has been destroyed. Not retriable.
    #[error("Pool is closed - it has been destroyed")]
    PoolClosed,

    /// The backend could not hand out or create a connection.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    /// A spawned pool-core acquisition vanished before reporting back.
    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Metrics export failed: {0}")]
    MetricsExport(String),
}

impl PoolError {
    /// Whether the caller may reasonably retry the operation later
    pub fn is_retriable(&self) -> bool {
        matches!(self, PoolError::BackendUnavailable(_) | PoolError::Cancelled)
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_is_distinct_from_unavailable() {
        let closed = PoolError::PoolClosed;
        let unavailable = PoolError::from(BackendError::new("connection refused"));

        assert!(!closed.is_retriable());
        assert!(unavailable.is_retriable());
        assert_eq!(
            unavailable.to_string(),
            "Backend unavailable: connection refused"
        );
    }
}
