//! # Noor Configuration
//!
//! Model identity, credentials, and index endpoints for one deployment.
//! Loaded from `.noor/config.json` when present, then overridden by
//! environment variables. Injected into constructors; there is no global.

use crate::models::{LlmProvider, ModelConfig};
use crate::state::SourceTag;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default config file location
pub const CONFIG_PATH: &str = ".noor/config.json";

/// Where per-source documents come from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalBackend {
    /// Keyword search over the local `corpus_documents` table
    #[default]
    Sqlite,
    /// Vector search against one Qdrant collection per source
    Qdrant,
}

impl RetrievalBackend {
    pub fn parse(id: &str) -> Option<Self> {
        match id.trim().to_lowercase().as_str() {
            "sqlite" => Some(RetrievalBackend::Sqlite),
            "qdrant" => Some(RetrievalBackend::Qdrant),
            _ => None,
        }
    }
}

/// Index settings for one source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceIndexConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub collection: String,
}

impl SourceIndexConfig {
    /// Defaults to `<label>_collection` with no endpoint
    pub fn for_tag(tag: SourceTag) -> Self {
        Self {
            url: None,
            api_key: None,
            collection: format!("{}_collection", tag.label()),
        }
    }
}

/// OpenAI-compatible embeddings endpoint used by the vector backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub base_url: String,
    /// Environment variable holding the bearer token
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NoorConfig {
    pub classifier: ModelConfig,
    pub generator: ModelConfig,
    /// Documents requested from each source
    pub retrieval_top_k: usize,
    /// Documents per source placed into the synthesis context
    pub context_top_n: usize,
    /// Overrides the built-in preamble when a caller gives none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction_preamble: Option<String>,
    /// Metadata keys never shown to the generator
    pub excluded_metadata: Vec<String>,
    pub backend: RetrievalBackend,
    pub sources: HashMap<SourceTag, SourceIndexConfig>,
    pub embedding: EmbeddingConfig,
    /// HTTP timeout for index and embedding calls
    pub request_timeout_secs: u64,
}

impl Default for NoorConfig {
    fn default() -> Self {
        Self {
            classifier: ModelConfig::default(),
            generator: ModelConfig::default(),
            retrieval_top_k: 5,
            context_top_n: 3,
            instruction_preamble: None,
            excluded_metadata: default_excluded_metadata(),
            backend: RetrievalBackend::default(),
            sources: SourceTag::CONCRETE
                .iter()
                .map(|tag| (*tag, SourceIndexConfig::for_tag(*tag)))
                .collect(),
            embedding: EmbeddingConfig::default(),
            request_timeout_secs: 30,
        }
    }
}

pub fn default_excluded_metadata() -> Vec<String> {
    ["id", "point_id", "chunk_id", "vector_id", "_id"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl NoorConfig {
    /// Load `.noor/config.json` (if any) and apply process environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(CONFIG_PATH)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Read a config file; a missing file yields the defaults
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Apply deployment environment variables.
    ///
    /// `lookup` is injected so tests do not touch the process environment.
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get("LLM_PROVIDER") {
            match LlmProvider::parse(&provider) {
                Some(provider) => {
                    self.classifier = ModelConfig::for_provider(provider.clone());
                    self.generator = ModelConfig::for_provider(provider);
                }
                None => tracing::warn!(provider = %provider, "Ignoring unknown LLM_PROVIDER"),
            }
        }
        if let Some(model) = get("LLM_MODEL") {
            self.classifier.model = model.clone();
            self.generator.model = model;
        }
        if let Some(base_url) = get("LLM_BASE_URL") {
            self.classifier.base_url = Some(base_url.clone());
            self.generator.base_url = Some(base_url);
        }
        if let Some(backend) = get("NOOR_BACKEND") {
            match RetrievalBackend::parse(&backend) {
                Some(backend) => self.backend = backend,
                None => tracing::warn!(backend = %backend, "Ignoring unknown NOOR_BACKEND"),
            }
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }

        for tag in SourceTag::CONCRETE {
            let prefix = tag.label().to_uppercase();
            let entry = self
                .sources
                .entry(tag)
                .or_insert_with(|| SourceIndexConfig::for_tag(tag));
            if let Some(url) = get(&format!("{}_QDRANT_URL", prefix)) {
                entry.url = Some(url);
            }
            if let Some(key) = get(&format!("{}_QDRANT_API_KEY", prefix)) {
                entry.api_key = Some(key);
            }
        }
    }

    /// Settings for one source, falling back to the defaults
    pub fn source(&self, tag: SourceTag) -> SourceIndexConfig {
        self.sources
            .get(&tag)
            .cloned()
            .unwrap_or_else(|| SourceIndexConfig::for_tag(tag))
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval_top_k == 0 {
            anyhow::bail!("retrieval_top_k must be at least 1");
        }
        if self.context_top_n == 0 {
            anyhow::bail!("context_top_n must be at least 1");
        }
        if self.backend == RetrievalBackend::Qdrant {
            let missing: Vec<&str> = SourceTag::CONCRETE
                .iter()
                .filter(|tag| self.source(**tag).url.is_none())
                .map(|tag| tag.label())
                .collect();
            if !missing.is_empty() {
                anyhow::bail!(
                    "qdrant backend needs a URL for every source, missing: {}",
                    missing.join(", ")
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = NoorConfig::default();
        assert_eq!(config.classifier.model, "gpt-4.1-nano");
        assert_eq!(config.context_top_n, 3);
        assert_eq!(config.backend, RetrievalBackend::Sqlite);
        assert_eq!(config.source(SourceTag::Hadith).collection, "hadith_collection");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = NoorConfig::default();
        config.apply_env(env(&[
            ("LLM_MODEL", "gpt-4o-mini"),
            ("NOOR_BACKEND", "qdrant"),
            ("QURAN_QDRANT_URL", "http://quran:6333"),
            ("QURAN_QDRANT_API_KEY", "secret"),
            ("HADITH_QDRANT_URL", "http://hadith:6333"),
            ("TAFSEER_QDRANT_URL", "http://tafseer:6333"),
            ("EMBEDDING_MODEL", ""),
        ]));

        assert_eq!(config.classifier.model, "gpt-4o-mini");
        assert_eq!(config.generator.model, "gpt-4o-mini");
        assert_eq!(config.backend, RetrievalBackend::Qdrant);
        let quran = config.source(SourceTag::Quran);
        assert_eq!(quran.url.as_deref(), Some("http://quran:6333"));
        assert_eq!(quran.api_key.as_deref(), Some("secret"));
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_override_resets_model() {
        let mut config = NoorConfig::default();
        config.apply_env(env(&[("LLM_PROVIDER", "anthropic")]));
        assert_eq!(config.generator.provider, LlmProvider::Anthropic);
        assert_eq!(config.generator.model, "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_qdrant_requires_urls() {
        let mut config = NoorConfig::default();
        config.backend = RetrievalBackend::Qdrant;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("quran"));
    }

    #[test]
    fn test_file_round_trip_and_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".noor").join("config.json");

        assert_eq!(NoorConfig::load_from(&path).unwrap(), NoorConfig::default());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"retrieval_top_k": 8, "sources": {"quran": {"collection": "mushaf"}}}"#)
            .unwrap();
        let config = NoorConfig::load_from(&path).unwrap();
        assert_eq!(config.retrieval_top_k, 8);
        assert_eq!(config.context_top_n, 3);
        assert_eq!(config.source(SourceTag::Quran).collection, "mushaf");
        assert_eq!(config.source(SourceTag::Tafseer).collection, "tafseer_collection");

        config.save_to(&path).unwrap();
        assert_eq!(NoorConfig::load_from(&path).unwrap(), config);
    }
}
