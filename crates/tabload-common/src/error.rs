//! Error types for tabload
//!
//! The pipeline uses a closed taxonomy: every failure an ingestion run can
//! surface is one of the variants below. Adapters map provider errors into
//! the taxonomy at the boundary; the core never sees raw provider types.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for an ingestion run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("config validation failed: {0}")]
    ConfigValidation(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("data load failed: {message}")]
    DataLoad { message: String, timed_out: bool },

    #[error("file processing failed: {0}")]
    FileProcessing(String),

    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("invalid CSV data: {0}")]
    InvalidCsv(String),

    #[error("table conflict: {0}")]
    TableConflict(String),

    #[error("secret resolution failed: {0}")]
    Secret(String),

    #[error("memory limit exceeded: {0}")]
    MemoryLimit(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl PipelineError {
    /// A load failure confirmed by the warehouse (terminal remote state).
    pub fn load_failed(message: impl Into<String>) -> Self {
        PipelineError::DataLoad {
            message: message.into(),
            timed_out: false,
        }
    }

    /// A load abandoned locally after the polling deadline. The remote job
    /// state is indeterminate; cancellation was requested but not confirmed.
    pub fn load_timed_out(message: impl Into<String>) -> Self {
        PipelineError::DataLoad {
            message: message.into(),
            timed_out: true,
        }
    }

    /// Classify this error for retry decisions and notification wording.
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::ConfigValidation(_) => ErrorClass::Config,
            PipelineError::TableConflict(_) => ErrorClass::Config,
            PipelineError::Permission(_) => ErrorClass::Permission,
            PipelineError::FileNotFound(_) => ErrorClass::NotFound,
            PipelineError::Quota(_) => ErrorClass::Quota,
            PipelineError::Network(_) => ErrorClass::Network,
            PipelineError::InvalidCsv(_) => ErrorClass::SchemaMismatch,
            PipelineError::DataLoad { timed_out: true, .. } => ErrorClass::Timeout,
            PipelineError::DataLoad { timed_out: false, .. } => ErrorClass::Unexpected,
            PipelineError::FileProcessing(_) => ErrorClass::Unexpected,
            PipelineError::Secret(_) => ErrorClass::Unexpected,
            PipelineError::MemoryLimit(_) => ErrorClass::Unexpected,
            PipelineError::Unexpected(_) => ErrorClass::Unexpected,
        }
    }

    /// Whether an outer retry policy may re-attempt the failed operation.
    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }

    /// Human-readable error kind used in notification subjects and bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ConfigValidation(_) => "Config Validation",
            PipelineError::Permission(_) => "Permission",
            PipelineError::FileNotFound(_) => "File Not Found",
            PipelineError::DataLoad { .. } => "Data Load",
            PipelineError::FileProcessing(_) => "File Processing",
            PipelineError::Quota(_) => "Quota Exceeded",
            PipelineError::InvalidCsv(_) => "Invalid CSV Format",
            PipelineError::TableConflict(_) => "Table Conflict",
            PipelineError::Secret(_) => "Secret",
            PipelineError::MemoryLimit(_) => "Memory Limit",
            PipelineError::Network(_) => "Network",
            PipelineError::Unexpected(_) => "Unexpected",
        }
    }
}

/// Coarse failure category derived from a [`PipelineError`].
///
/// Only `Network` and `Quota` are transient: everything else is
/// deterministic and re-running it would waste the invocation's timeout
/// budget and delay the failure notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Config,
    Permission,
    NotFound,
    Quota,
    Network,
    SchemaMismatch,
    Timeout,
    Unexpected,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::Network | ErrorClass::Quota)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorClass::Config => "config",
            ErrorClass::Permission => "permission",
            ErrorClass::NotFound => "not-found",
            ErrorClass::Quota => "quota",
            ErrorClass::Network => "network",
            ErrorClass::SchemaMismatch => "schema-mismatch",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Unexpected => "unexpected",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classes_are_retryable() {
        assert!(PipelineError::Network("connection reset".into()).is_retryable());
        assert!(PipelineError::Quota("rate limit".into()).is_retryable());
    }

    #[test]
    fn test_deterministic_classes_never_retry() {
        assert!(!PipelineError::ConfigValidation("missing dataset".into()).is_retryable());
        assert!(!PipelineError::Permission("forbidden".into()).is_retryable());
        assert!(!PipelineError::FileNotFound("gone".into()).is_retryable());
        assert!(!PipelineError::load_failed("bad rows").is_retryable());
        assert!(!PipelineError::InvalidCsv("jagged".into()).is_retryable());
        assert!(!PipelineError::TableConflict("exists".into()).is_retryable());
        assert!(!PipelineError::load_timed_out("deadline").is_retryable());
    }

    #[test]
    fn test_timeout_class_is_distinct_from_confirmed_failure() {
        assert_eq!(
            PipelineError::load_timed_out("deadline").class(),
            ErrorClass::Timeout
        );
        assert_eq!(
            PipelineError::load_failed("remote failure").class(),
            ErrorClass::Unexpected
        );
    }
}
