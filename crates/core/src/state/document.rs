//! Retrieved document record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document returned by a retriever.
///
/// Content is quoted source material and must reach synthesis untouched.
/// Metadata is source specific (surah, ayah, book, narrator, grade, ...).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Relevance score reported by the backing index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
            score: None,
        }
    }

    /// Add a metadata field
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }
}
