use thiserror::Error;

/// Store failures, split by retryability.
///
/// Transient errors (throttling, timeouts, momentary service trouble) are
/// retried with backoff at the batch level. Fatal errors (missing table,
/// malformed request, permission denial) indicate a configuration problem
/// and abort the run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient store error: {message}")]
    Transient { message: String },

    #[error("fatal store error: {message}")]
    Fatal { message: String },
}

impl StoreError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Whether the batch-level retry loop should retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::transient("throttled").is_transient());
        assert!(!StoreError::fatal("no such table").is_transient());
    }

    #[test]
    fn test_display_includes_message() {
        let err = StoreError::transient("rate exceeded");
        assert_eq!(err.to_string(), "transient store error: rate exceeded");
    }
}
