//! Local corpus routes
//!
//! Only meaningful for the SQLite backend; with Qdrant configured the
//! documents land in the local database but are never retrieved.

use super::{bad_request, internal_error, ApiResult, AppState};
use axum::{extract::State, response::Json, routing::post, Router};
use noor_core::retrieval::{CorpusEntry, SqliteCorpus};
use noor_core::state::{parse_label, Document, ParsedLabel, SourceTag};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

pub fn corpus_routes() -> Router<AppState> {
    Router::new()
        .route("/documents", post(ingest_documents))
        .route("/search", post(search_corpus))
}

/// Parse a source label that must name a concrete source
pub fn concrete_source(label: &str) -> Result<SourceTag, String> {
    match parse_label(label) {
        ParsedLabel::Known(tag) if !tag.is_fallback() => Ok(tag),
        ParsedLabel::Known(_) => Err("general is not a corpus source".to_string()),
        ParsedLabel::Unrecognized(raw) => Err(format!("unknown source '{}'", raw)),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestDocument {
    pub content: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
}

impl From<IngestDocument> for Document {
    fn from(doc: IngestDocument) -> Self {
        let mut document = Document::new(doc.content);
        document.metadata = doc.metadata;
        document
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestRequest {
    /// quran, hadith or tafseer
    pub source: String,
    pub documents: Vec<IngestDocument>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub source: String,
    pub ingested: usize,
    pub total: i64,
}

#[utoipa::path(
    post,
    path = "/api/v1/corpus/documents",
    request_body = IngestRequest,
    responses(
        (status = 200, description = "Documents stored", body = IngestResponse),
        (status = 400, description = "Bad source or empty content", body = super::ApiError)
    ),
    tag = "corpus"
)]
pub async fn ingest_documents(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> ApiResult<IngestResponse> {
    let source = concrete_source(&req.source).map_err(bad_request)?;

    if req.documents.iter().any(|d| d.content.trim().is_empty()) {
        return Err(bad_request("document content must not be empty"));
    }

    let documents: Vec<Document> = req.documents.into_iter().map(Document::from).collect();
    let corpus = SqliteCorpus::new(&state.db);
    let ingested = corpus
        .add_many(source, &documents)
        .map_err(internal_error)?;
    let total = corpus.count(Some(source)).map_err(internal_error)?;

    tracing::info!(source = %source, ingested, total, "Corpus documents ingested");

    Ok(Json(IngestResponse {
        source: source.label().to_string(),
        ingested,
        total,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    pub source: String,
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchHit {
    pub id: i64,
    pub content: String,
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
    pub score: Option<f32>,
}

impl From<CorpusEntry> for SearchHit {
    fn from(entry: CorpusEntry) -> Self {
        Self {
            id: entry.id,
            content: entry.document.content,
            metadata: entry.document.metadata,
            score: entry.document.score,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub source: String,
    pub results: Vec<SearchHit>,
}

#[utoipa::path(
    post,
    path = "/api/v1/corpus/search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Matching documents, best first", body = SearchResponse),
        (status = 400, description = "Bad source", body = super::ApiError)
    ),
    tag = "corpus"
)]
pub async fn search_corpus(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<SearchResponse> {
    let source = concrete_source(&req.source).map_err(bad_request)?;
    let limit = req.limit.unwrap_or(5).min(100);

    let results = SqliteCorpus::new(&state.db)
        .search(source, &req.query, limit)
        .map_err(internal_error)?;

    Ok(Json(SearchResponse {
        source: source.label().to_string(),
        results: results.into_iter().map(SearchHit::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::app_state;
    use axum::http::StatusCode;

    #[test]
    fn test_concrete_source() {
        assert_eq!(concrete_source("Tafsir"), Ok(SourceTag::Tafseer));
        assert!(concrete_source("general").is_err());
        assert!(concrete_source("fiqh").unwrap_err().contains("fiqh"));
    }

    #[tokio::test]
    async fn test_ingest_then_search() {
        let state = app_state(vec![]);
        let mut metadata = Map::new();
        metadata.insert("surah".into(), Value::from(2));

        let Json(ingested) = ingest_documents(
            State(state.clone()),
            Json(IngestRequest {
                source: "quran".into(),
                documents: vec![
                    IngestDocument {
                        content: "Seek help through patience and prayer.".into(),
                        metadata,
                    },
                    IngestDocument {
                        content: "And establish prayer and give zakah.".into(),
                        metadata: Map::new(),
                    },
                ],
            }),
        )
        .await
        .unwrap();
        assert_eq!(ingested.ingested, 2);
        assert_eq!(ingested.total, 2);

        let Json(found) = search_corpus(
            State(state),
            Json(SearchRequest {
                source: "QURAN".into(),
                query: "patience prayer".into(),
                limit: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(found.source, "quran");
        assert_eq!(found.results.len(), 2);
        assert!(found.results[0].content.contains("patience"));
        assert_eq!(found.results[0].metadata.get("surah"), Some(&Value::from(2)));
    }

    #[tokio::test]
    async fn test_ingest_rejects_general_and_blank_content() {
        let state = app_state(vec![]);

        let err = ingest_documents(
            State(state.clone()),
            Json(IngestRequest {
                source: "general".into(),
                documents: vec![],
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let err = ingest_documents(
            State(state),
            Json(IngestRequest {
                source: "hadith".into(),
                documents: vec![IngestDocument {
                    content: " ".into(),
                    metadata: Map::new(),
                }],
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}
