//! # Qdrant Retriever
//!
//! Vector search over one Qdrant collection per source, through the REST
//! API. Query vectors come from an OpenAI-compatible embeddings endpoint.

use super::SourceRetriever;
use crate::config::{EmbeddingConfig, NoorConfig, SourceIndexConfig};
use crate::error::{RouterError, RouterResult};
use crate::state::{Document, SourceTag};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;

/// Payload keys tried, in order, for the document text
const CONTENT_KEYS: [&str; 3] = ["page_content", "content", "text"];

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint
pub struct EmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl EmbeddingClient {
    pub fn new(client: reqwest::Client, config: &EmbeddingConfig) -> Self {
        Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
        }
    }

    pub async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut request = self.client.post(&self.endpoint).json(&EmbedRequest {
            model: &self.model,
            input: vec![text],
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("embeddings API returned {}: {}", status, body);
        }

        let parsed: EmbedResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow::anyhow!("embeddings API returned no vectors"))
    }
}

/// Per-source vector retriever
pub struct QdrantRetriever {
    client: reqwest::Client,
    embedder: EmbeddingClient,
    indexes: HashMap<SourceTag, SourceIndexConfig>,
}

impl QdrantRetriever {
    pub fn new(
        client: reqwest::Client,
        embedder: EmbeddingClient,
        indexes: HashMap<SourceTag, SourceIndexConfig>,
    ) -> Self {
        Self {
            client,
            embedder,
            indexes,
        }
    }

    /// Build with one shared HTTP client honouring the configured timeout
    pub fn from_config(config: &NoorConfig) -> RouterResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("noor/0.1")
            .build()?;

        let indexes = SourceTag::CONCRETE
            .iter()
            .map(|tag| (*tag, config.source(*tag)))
            .collect();

        Ok(Self::new(
            client.clone(),
            EmbeddingClient::new(client, &config.embedding),
            indexes,
        ))
    }

    async fn search(
        &self,
        index: &SourceIndexConfig,
        vector: Vec<f32>,
        top_k: usize,
    ) -> anyhow::Result<Vec<Document>> {
        let base = index
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no URL configured"))?;
        let url = format!(
            "{}/collections/{}/points/search",
            base.trim_end_matches('/'),
            urlencoding::encode(&index.collection)
        );

        let mut request = self.client.post(&url).json(&json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
        }));
        if let Some(key) = &index.api_key {
            request = request.header("api-key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("qdrant returned {}: {}", status, body);
        }

        let body: Value = response.json().await?;
        let points = body
            .get("result")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(points.iter().filter_map(parse_point).collect())
    }
}

#[async_trait]
impl SourceRetriever for QdrantRetriever {
    async fn retrieve(
        &self,
        query: &str,
        tag: SourceTag,
        top_k: usize,
    ) -> RouterResult<Vec<Document>> {
        let index = self
            .indexes
            .get(&tag)
            .ok_or_else(|| RouterError::retrieval(tag, "no collection configured"))?;

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RouterError::retrieval(tag, format!("embedding failed: {}", e)))?;

        let docs = self
            .search(index, vector, top_k)
            .await
            .map_err(|e| RouterError::retrieval(tag, e))?;

        tracing::debug!(tag = %tag, collection = %index.collection, count = docs.len(), "Qdrant search complete");
        Ok(docs)
    }
}

/// Turn one scored point into a document.
///
/// The first non-empty content key becomes the text. Remaining payload
/// fields become metadata, with a nested `metadata` object flattened in.
/// Points without any text are skipped.
pub fn parse_point(point: &Value) -> Option<Document> {
    let payload = point.get("payload")?.as_object()?;

    let (content_key, content) = CONTENT_KEYS.iter().find_map(|key| {
        payload
            .get(*key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(|s| (*key, s.to_string()))
    })?;

    let mut metadata = Map::new();
    for (key, value) in payload {
        if key == content_key {
            continue;
        }
        match (key.as_str(), value) {
            ("metadata", Value::Object(nested)) => {
                for (k, v) in nested {
                    metadata.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
            _ => {
                metadata.insert(key.clone(), value.clone());
            }
        }
    }
    if let Some(id) = point.get("id") {
        metadata.insert("point_id".to_string(), id.clone());
    }

    let mut doc = Document {
        content,
        metadata,
        score: None,
    };
    if let Some(score) = point.get("score").and_then(|s| s.as_f64()) {
        doc = doc.with_score(score as f32);
    }
    Some(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point_flattens_metadata() {
        let point = json!({
            "id": 42,
            "score": 0.87,
            "payload": {
                "page_content": "Indeed, Allah is with the patient.",
                "metadata": {"surah_name": "Al-Baqarah", "ayah": 153},
                "translator": "Sahih International"
            }
        });

        let doc = parse_point(&point).unwrap();
        assert_eq!(doc.content, "Indeed, Allah is with the patient.");
        assert_eq!(doc.metadata["surah_name"], "Al-Baqarah");
        assert_eq!(doc.metadata["ayah"], 153);
        assert_eq!(doc.metadata["translator"], "Sahih International");
        assert_eq!(doc.metadata["point_id"], 42);
        assert!(!doc.metadata.contains_key("page_content"));
        assert!((doc.score.unwrap() - 0.87).abs() < 1e-6);
    }

    #[test]
    fn test_parse_point_content_key_fallback() {
        let point = json!({"id": "a1", "payload": {"content": "", "text": "narration text"}});
        let doc = parse_point(&point).unwrap();
        assert_eq!(doc.content, "narration text");
        assert_eq!(doc.metadata["content"], "");
    }

    #[test]
    fn test_parse_point_without_text_is_skipped() {
        assert!(parse_point(&json!({"id": 1, "payload": {"book": "Bukhari"}})).is_none());
        assert!(parse_point(&json!({"id": 1})).is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_tag_fails_as_retrieval_error() {
        let config = NoorConfig::default();
        let retriever = QdrantRetriever::new(
            reqwest::Client::new(),
            EmbeddingClient::new(reqwest::Client::new(), &config.embedding),
            HashMap::new(),
        );

        let err = retriever
            .retrieve("mercy", SourceTag::Quran, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Retrieval { tag: SourceTag::Quran, .. }));
    }
}
