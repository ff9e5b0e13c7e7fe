//! Error taxonomy for indexing, retrieval, and answer generation.
//!
//! Each variant corresponds to a distinct handling policy. Build-time
//! errors abort the whole build, query-time errors are mapped to a user
//! message with [`RagError::user_message`], and a "not present" answer is
//! never an error at all.

use thiserror::Error;

/// User-facing message when no index exists for the session.
pub const MSG_PROCESS_FIRST: &str = "Please process a document before asking questions.";

/// User-facing message when the generation capability is unavailable.
pub const MSG_TRY_AGAIN: &str = "Could not generate an answer right now — try again.";

/// Errors produced by the retrieval engine.
#[derive(Debug, Error)]
pub enum RagError {
    /// Bad chunk size/overlap or other configuration. Never clamped silently.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A call-site argument is out of range (e.g. `k == 0`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The embedding capability failed or returned an unusable vector.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Vector lengths disagree.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// The index was built with a different embedding model.
    #[error("model mismatch: index built with '{expected}', embedder is '{found}'")]
    ModelMismatch { expected: String, found: String },

    /// No index exists for this session or at this path.
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// A persisted index could not be decoded.
    #[error("index corrupt: {0}")]
    IndexCorrupt(String),

    /// Transient failure of the generation capability (rate limit, timeout, 5xx).
    #[error("generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// The generation capability refused the request (bad credentials, 4xx).
    #[error("generation rejected: {0}")]
    GenerationRejected(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RagError::GenerationUnavailable(_) | RagError::EmbeddingUnavailable(_)
        )
    }

    /// Whether the caller can recover by (re)processing a document set.
    pub fn needs_rebuild(&self) -> bool {
        matches!(
            self,
            RagError::IndexNotFound(_)
                | RagError::IndexCorrupt(_)
                | RagError::ModelMismatch { .. }
        )
    }

    /// Map the error to the message shown to an end user.
    pub fn user_message(&self) -> String {
        match self {
            RagError::IndexNotFound(_) => MSG_PROCESS_FIRST.to_string(),
            RagError::IndexCorrupt(_) | RagError::ModelMismatch { .. } => format!(
                "The saved index cannot be used ({self}). {MSG_PROCESS_FIRST}"
            ),
            RagError::GenerationUnavailable(_) => MSG_TRY_AGAIN.to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_not_found_maps_to_process_first() {
        let err = RagError::IndexNotFound("session".into());
        assert_eq!(err.user_message(), MSG_PROCESS_FIRST);
        assert!(err.needs_rebuild());
    }

    #[test]
    fn test_generation_unavailable_maps_to_try_again() {
        let err = RagError::GenerationUnavailable("429".into());
        assert_eq!(err.user_message(), MSG_TRY_AGAIN);
        assert!(err.is_transient());
    }

    #[test]
    fn test_rejected_is_not_transient() {
        let err = RagError::GenerationRejected("401".into());
        assert!(!err.is_transient());
        assert!(!err.needs_rebuild());
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = RagError::DimensionMismatch {
            expected: 384,
            found: 3,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 384, found 3");
    }
}
