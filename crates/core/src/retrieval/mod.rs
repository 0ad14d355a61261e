//! # Retrieval
//!
//! Per-source retrievers and the cross-source fallback.
//!
//! ## Architecture
//!
//! ```text
//! RetrieverSet (tag -> Arc<dyn SourceRetriever>)
//!        ├── SqliteCorpus     (keyword search over corpus_documents)
//!        └── QdrantRetriever  (vector search, one collection per tag)
//!
//! CrossSourceFallback (FallbackRetriever)
//!        └── queries Quran, Hadith, Tafseer through the same set
//! ```

pub mod fallback;
pub mod qdrant;
pub mod sqlite_corpus;

pub use fallback::CrossSourceFallback;
pub use qdrant::{EmbeddingClient, QdrantRetriever};
pub use sqlite_corpus::{CorpusEntry, SqliteCorpus};

use crate::error::{RouterError, RouterResult};
use crate::state::{Document, SourceTag};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Fetches documents for one source.
///
/// Implementations see only the query, their tag, and the result budget.
/// An empty result is a valid answer, not a failure.
#[async_trait]
pub trait SourceRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, tag: SourceTag, top_k: usize)
        -> RouterResult<Vec<Document>>;
}

/// Partial results of a cross-source search
#[derive(Debug, Clone, Default)]
pub struct FallbackOutcome {
    /// Successful sub-searches, in query order
    pub results: Vec<(SourceTag, Vec<Document>)>,
    /// Messages for sub-searches that failed
    pub errors: Vec<String>,
}

impl FallbackOutcome {
    pub fn document_count(&self) -> usize {
        self.results.iter().map(|(_, docs)| docs.len()).sum()
    }
}

/// Broad search across every concrete source at once
#[async_trait]
pub trait FallbackRetriever: Send + Sync {
    async fn fallback(&self, query: &str, top_k: usize) -> FallbackOutcome;
}

/// Binding table from tag to retriever
#[derive(Clone, Default)]
pub struct RetrieverSet {
    bindings: HashMap<SourceTag, Arc<dyn SourceRetriever>>,
}

impl RetrieverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind one retriever to a tag, replacing any previous binding
    pub fn bind(mut self, tag: SourceTag, retriever: Arc<dyn SourceRetriever>) -> Self {
        self.bindings.insert(tag, retriever);
        self
    }

    /// Bind the same retriever to every concrete tag
    pub fn uniform(retriever: Arc<dyn SourceRetriever>) -> Self {
        SourceTag::CONCRETE
            .iter()
            .fold(Self::new(), |set, tag| set.bind(*tag, Arc::clone(&retriever)))
    }

    pub fn get(&self, tag: SourceTag) -> Option<Arc<dyn SourceRetriever>> {
        self.bindings.get(&tag).cloned()
    }

    pub fn is_bound(&self, tag: SourceTag) -> bool {
        self.bindings.contains_key(&tag)
    }

    /// Dispatch to the retriever bound to `tag`
    pub async fn retrieve(
        &self,
        query: &str,
        tag: SourceTag,
        top_k: usize,
    ) -> RouterResult<Vec<Document>> {
        let retriever = self
            .get(tag)
            .ok_or_else(|| RouterError::retrieval(tag, "no retriever bound"))?;
        retriever.retrieve(query, tag, top_k).await
    }
}

impl std::fmt::Debug for RetrieverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<&str> = self.bindings.keys().map(|t| t.label()).collect();
        tags.sort_unstable();
        f.debug_struct("RetrieverSet").field("bound", &tags).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl SourceRetriever for Echo {
        async fn retrieve(
            &self,
            query: &str,
            tag: SourceTag,
            top_k: usize,
        ) -> RouterResult<Vec<Document>> {
            Ok((0..top_k)
                .map(|i| Document::new(format!("{} {} {}", tag, query, i)))
                .collect())
        }
    }

    #[test]
    fn test_uniform_binds_concrete_tags_only() {
        let set = RetrieverSet::uniform(Arc::new(Echo));
        for tag in SourceTag::CONCRETE {
            assert!(set.is_bound(tag));
        }
        assert!(!set.is_bound(SourceTag::General));
    }

    #[tokio::test]
    async fn test_dispatch_and_unbound_tag() {
        let set = RetrieverSet::new().bind(SourceTag::Hadith, Arc::new(Echo));

        let docs = set.retrieve("fasting", SourceTag::Hadith, 2).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "hadith fasting 0");

        let err = set.retrieve("fasting", SourceTag::Quran, 2).await.unwrap_err();
        assert!(matches!(err, RouterError::Retrieval { tag: SourceTag::Quran, .. }));
    }

    #[test]
    fn test_outcome_document_count() {
        let outcome = FallbackOutcome {
            results: vec![
                (SourceTag::Quran, vec![Document::new("a"), Document::new("b")]),
                (SourceTag::Tafseer, vec![Document::new("c")]),
            ],
            errors: vec![],
        };
        assert_eq!(outcome.document_count(), 3);
    }
}
