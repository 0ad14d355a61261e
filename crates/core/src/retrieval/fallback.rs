//! Cross-source fallback over a [`RetrieverSet`].

use super::{FallbackOutcome, FallbackRetriever, RetrieverSet};
use crate::state::SourceTag;
use async_trait::async_trait;

/// Queries every concrete source in fixed order, keeping whatever succeeds.
pub struct CrossSourceFallback {
    retrievers: RetrieverSet,
}

impl CrossSourceFallback {
    pub fn new(retrievers: RetrieverSet) -> Self {
        Self { retrievers }
    }
}

#[async_trait]
impl FallbackRetriever for CrossSourceFallback {
    async fn fallback(&self, query: &str, top_k: usize) -> FallbackOutcome {
        let mut outcome = FallbackOutcome::default();

        for tag in SourceTag::CONCRETE {
            match self.retrievers.retrieve(query, tag, top_k).await {
                Ok(docs) => {
                    tracing::debug!(tag = %tag, count = docs.len(), "Fallback sub-search complete");
                    outcome.results.push((tag, docs));
                }
                Err(e) => {
                    tracing::warn!(tag = %tag, error = %e, "Fallback sub-search failed");
                    outcome.errors.push(e.to_string());
                }
            }
        }

        outcome
    }
}
