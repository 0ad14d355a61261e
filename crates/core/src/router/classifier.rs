//! # Classifier Contract
//!
//! Maps a raw query to an ordered list of source tags plus a rationale.
//! [`resolve_sources`] applies the fallback policy: a failed or empty
//! classification becomes `[General]` and the run continues.

use crate::error::{RouterError, RouterResult};
use crate::state::{parse_labels, SourceTag};
use async_trait::async_trait;

/// Result of a successful classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Tags in the classifier's priority order
    pub tags: Vec<SourceTag>,
    pub rationale: Option<String>,
    /// Raw labels that did not map to any tag
    pub unrecognized: Vec<String>,
}

impl Classification {
    pub fn new(tags: Vec<SourceTag>, rationale: Option<String>) -> Self {
        Self {
            tags,
            rationale,
            unrecognized: Vec::new(),
        }
    }

    /// Build from free-text labels, keeping their order
    pub fn from_labels<S: AsRef<str>>(labels: &[S], rationale: Option<String>) -> Self {
        let (tags, unrecognized) = parse_labels(labels);
        Self {
            tags,
            rationale,
            unrecognized,
        }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, query: &str) -> RouterResult<Classification>;
}

/// Sources to assign after the fallback policy has been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSources {
    pub tags: Vec<SourceTag>,
    pub rationale: Option<String>,
    /// Set when the classifier itself failed
    pub failure: Option<String>,
}

/// Apply the fallback policy to a classifier outcome.
///
/// Order is kept verbatim; duplicates are not removed.
pub fn resolve_sources(outcome: RouterResult<Classification>) -> ResolvedSources {
    match outcome {
        Ok(classification) => {
            for label in &classification.unrecognized {
                tracing::warn!(label = %label, "Discarding unrecognized source label");
            }

            if classification.tags.is_empty() {
                tracing::info!("No usable source labels, using general fallback");
                ResolvedSources {
                    tags: vec![SourceTag::General],
                    rationale: classification.rationale,
                    failure: None,
                }
            } else {
                ResolvedSources {
                    tags: classification.tags,
                    rationale: classification.rationale,
                    failure: None,
                }
            }
        }
        Err(e) => {
            let message = match e {
                RouterError::Classification(_) => e.to_string(),
                other => RouterError::Classification(other.to_string()).to_string(),
            };
            tracing::error!(error = %message, "Classification failed, using general fallback");
            ResolvedSources {
                tags: vec![SourceTag::General],
                rationale: None,
                failure: Some(message),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_labels_keeps_order_and_collects_unknowns() {
        let c = Classification::from_labels(&["TAFSEER", "fiqh", "Quran"], None);
        assert_eq!(c.tags, vec![SourceTag::Tafseer, SourceTag::Quran]);
        assert_eq!(c.unrecognized, vec!["fiqh".to_string()]);
    }

    #[test]
    fn test_resolve_keeps_duplicates_and_order() {
        let resolved = resolve_sources(Ok(Classification::new(
            vec![SourceTag::Hadith, SourceTag::Quran, SourceTag::Hadith],
            Some("narrations first".to_string()),
        )));
        assert_eq!(
            resolved.tags,
            vec![SourceTag::Hadith, SourceTag::Quran, SourceTag::Hadith]
        );
        assert_eq!(resolved.rationale.as_deref(), Some("narrations first"));
        assert!(resolved.failure.is_none());
    }

    #[test]
    fn test_resolve_empty_becomes_general() {
        let resolved = resolve_sources(Ok(Classification::from_labels(&["astrology"], None)));
        assert_eq!(resolved.tags, vec![SourceTag::General]);
        assert!(resolved.failure.is_none());
    }

    #[test]
    fn test_resolve_failure_becomes_general() {
        let resolved = resolve_sources(Err(RouterError::Classification("timeout".into())));
        assert_eq!(resolved.tags, vec![SourceTag::General]);
        assert_eq!(
            resolved.failure.as_deref(),
            Some("classification failed: timeout")
        );
    }

    #[test]
    fn test_resolve_wraps_foreign_errors() {
        let resolved = resolve_sources(Err(RouterError::Config("missing key".into())));
        assert_eq!(
            resolved.failure.as_deref(),
            Some("classification failed: configuration error: missing key")
        );
    }
}
