//! # Router Errors
//!
//! Failure taxonomy for the routing pipeline. Every variant raised by a
//! capability is caught by the orchestrator and turned into a degraded
//! state transition; none of them escape `Orchestrator::answer`.

use crate::state::SourceTag;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    /// Classifier service failed; the run degrades to `[General]`
    #[error("classification failed: {0}")]
    Classification(String),

    /// One source's retrieval failed; the run degrades to an empty result for it
    #[error("retrieval from {tag} failed: {reason}")]
    Retrieval { tag: SourceTag, reason: String },

    /// Generation failed; terminal for the run
    #[error("generation failed: {0}")]
    Generation(String),

    /// A mutation was attempted on a state that does not allow it
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RouterError {
    pub fn retrieval(tag: SourceTag, reason: impl ToString) -> Self {
        RouterError::Retrieval {
            tag,
            reason: reason.to_string(),
        }
    }
}

pub type RouterResult<T> = Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_error_names_source() {
        let err = RouterError::retrieval(SourceTag::Hadith, "connection refused");
        assert_eq!(
            err.to_string(),
            "retrieval from hadith failed: connection refused"
        );
    }
}
