//! Pipeline error type.
//!
//! Only faults live here. Referential mismatches and coverage gaps are
//! absorbed by the merger and show up as counters in the run diagnostics.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort a pipeline run.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// The oracle call itself failed (transport, API error, timeout)
    #[error("Oracle call {operation} failed for {scope}: {message}")]
    Oracle {
        operation: &'static str,
        scope: String,
        message: String,
    },

    /// The oracle answered, but not in the expected shape
    #[error("Oracle returned an invalid {operation} response: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },

    /// Unusable input (empty corpus, zero batch size)
    #[error("Invalid input: {0}")]
    Input(String),

    /// A worker task panicked or was aborted
    #[error("Worker task failed: {0}")]
    TaskFailed(String),

    /// Broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Build an oracle failure.
    pub fn oracle(
        operation: &'static str,
        scope: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Oracle {
            operation,
            scope: scope.into(),
            message: message.to_string(),
        }
    }

    /// Build an invalid-response failure.
    pub fn invalid_response(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation,
            reason: reason.into(),
        }
    }

    /// Attach the scope of the work item that produced the error.
    pub fn in_scope(self, scope: impl Into<String>) -> Self {
        match self {
            Self::Oracle {
                operation, message, ..
            } => Self::Oracle {
                operation,
                scope: scope.into(),
                message,
            },
            Self::InvalidResponse { operation, reason } => Self::InvalidResponse {
                operation,
                reason: format!("{}: {reason}", scope.into()),
            },
            other => other,
        }
    }

    /// True for failures attributable to the oracle (call failed or output malformed).
    pub const fn is_oracle_failure(&self) -> bool {
        matches!(self, Self::Oracle { .. } | Self::InvalidResponse { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_failure_classification() {
        assert!(PipelineError::oracle("classify", "batch 1-10", "timeout").is_oracle_failure());
        assert!(PipelineError::invalid_response("score", "not JSON").is_oracle_failure());
        assert!(!PipelineError::Input("no opinions".into()).is_oracle_failure());
        assert!(!PipelineError::TaskFailed("panicked".into()).is_oracle_failure());
    }

    #[test]
    fn test_oracle_error_message_carries_context() {
        let err = PipelineError::oracle("discover_axes", "topic T2", "[openai:gpt-5-mini] 500");
        assert_eq!(
            err.to_string(),
            "Oracle call discover_axes failed for topic T2: [openai:gpt-5-mini] 500"
        );
    }

    #[test]
    fn test_in_scope_rewrites_scope() {
        let err = PipelineError::oracle("score", "12 opinions", "timeout").in_scope("T1_A2 batch 21-40");
        assert!(err.to_string().contains("for T1_A2 batch 21-40"));

        let err = PipelineError::invalid_response("classify", "missing field").in_scope("batch 1-10");
        assert!(err.to_string().ends_with("batch 1-10: missing field"));

        let err = PipelineError::Input("empty".into()).in_scope("ignored");
        assert_eq!(err.to_string(), "Invalid input: empty");
    }
}
