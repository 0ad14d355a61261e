//! # HTTP API
//!
//! Axum routes over a shared [`Orchestrator`] and [`NoorDb`].

pub mod corpus;
pub mod query;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
    routing::get,
    Router,
};
use futures::stream::{self, Stream};
use noor_core::router::{Orchestrator, PipelineEvent};
use noor_core::state::NoorDb;
use serde::Serialize;
use std::{convert::Infallible, sync::Arc};
use tokio::sync::broadcast;
use utoipa::{OpenApi, ToSchema};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub db: Arc<NoorDb>,
    pub event_tx: broadcast::Sender<PipelineEvent>,
}

/// Error body for rejected requests
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    pub error: String,
}

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

pub fn internal_error(err: impl std::fmt::Display) -> (StatusCode, Json<ApiError>) {
    tracing::error!(error = %err, "Request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError {
            error: err.to_string(),
        }),
    )
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Noor API",
        version = "0.1.0",
        description = "Multi-source Islamic question answering over Quran, Hadith and Tafseer"
    ),
    paths(
        query::legacy_query,
        query::query,
        query::history,
        corpus::ingest_documents,
        corpus::search_corpus
    ),
    components(
        schemas(
            ApiError,
            query::LegacyQueryRequest,
            query::LegacyQueryResponse,
            query::QueryRequest,
            query::QueryResponse,
            query::HistoryItem,
            corpus::IngestRequest,
            corpus::IngestDocument,
            corpus::IngestResponse,
            corpus::SearchRequest,
            corpus::SearchResponse,
            corpus::SearchHit
        )
    ),
    tags(
        (name = "query", description = "Question answering"),
        (name = "corpus", description = "Local corpus management")
    )
)]
pub struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(version))
        .merge(query::query_routes())
        .nest("/api/v1/corpus", corpus::corpus_routes())
        .route("/api/v1/events", get(events))
        .route("/api/v1/openapi.json", get(serve_openapi))
        .with_state(state)
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "Version": env!("CARGO_PKG_VERSION") }))
}

/// SSE endpoint for pipeline events with heartbeat
async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            let timeout =
                tokio::time::timeout(std::time::Duration::from_secs(15), rx.recv()).await;

            return match timeout {
                Ok(Ok(event)) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    Some((Ok(Event::default().data(json)), rx))
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "SSE subscriber lagged");
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => None,
                // Timeout - send heartbeat comment
                Err(_) => Some((Ok(Event::default().comment("heartbeat")), rx)),
            };
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn serve_openapi() -> impl IntoResponse {
    match ApiDoc::openapi().to_json() {
        Ok(spec) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            spec,
        )
            .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::AppState;
    use async_trait::async_trait;
    use noor_core::error::RouterResult;
    use noor_core::retrieval::{CrossSourceFallback, RetrieverSet, SqliteCorpus};
    use noor_core::router::{Classification, Classifier, GenerationRequest, Generator, Orchestrator};
    use noor_core::state::{NoorDb, SourceTag};
    use std::sync::Arc;
    use tokio::sync::broadcast;

    /// Always routes to the given sources
    pub struct FixedClassifier(pub Vec<SourceTag>);

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, _query: &str) -> RouterResult<Classification> {
            Ok(Classification::new(self.0.clone(), Some("fixed".into())))
        }
    }

    /// Echoes the context it was given
    pub struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, request: &GenerationRequest) -> RouterResult<String> {
            Ok(format!("Answer to '{}':{}", request.query, request.context))
        }
    }

    /// App state over an in-memory corpus
    pub fn app_state(sources: Vec<SourceTag>) -> AppState {
        let db = Arc::new(NoorDb::open_in_memory().unwrap());
        let retrievers = RetrieverSet::uniform(Arc::new(SqliteCorpus::new(&db)));
        let (event_tx, _) = broadcast::channel(16);

        let orchestrator = Orchestrator::new(
            Arc::new(FixedClassifier(sources)),
            retrievers.clone(),
            Arc::new(CrossSourceFallback::new(retrievers)),
            Arc::new(EchoGenerator),
        )
        .with_event_channel(event_tx.clone());

        AppState {
            orchestrator: Arc::new(orchestrator),
            db,
            event_tx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_version_shape() {
        let Json(body) = version().await;
        assert_eq!(body["Version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_openapi_lists_routes() {
        let spec = ApiDoc::openapi().to_json().unwrap();
        assert!(spec.contains("/api/v1/query"));
        assert!(spec.contains("/api/v1/corpus/search"));
    }

    #[test]
    fn test_router_builds() {
        let _router = build_router(test_support::app_state(vec![]));
    }
}
