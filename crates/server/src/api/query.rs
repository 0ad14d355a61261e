//! Query routes

use super::{bad_request, internal_error, ApiResult, AppState};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use noor_core::state::{AnswerLog, AnswerRecord, OrchestrationState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

pub fn query_routes() -> Router<AppState> {
    Router::new()
        .route("/query", post(legacy_query))
        .route("/api/v1/query", post(query))
        .route("/api/v1/history", get(history))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LegacyQueryRequest {
    pub query: String,
}

/// `{"status": "success", "response": ...}` or `{"status": "error", "message": ...}`
#[derive(Debug, Serialize, ToSchema)]
pub struct LegacyQueryResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LegacyQueryResponse {
    fn success(response: String) -> Self {
        Self {
            status: "success".into(),
            response: Some(response),
            message: None,
        }
    }

    fn error(reason: impl std::fmt::Display) -> Self {
        Self {
            status: "error".into(),
            response: None,
            message: Some(format!("Error processing query: {}", reason)),
        }
    }
}

/// History is best effort; a failed write never discards the answer
fn record_answer(state: &AppState, run: &OrchestrationState) {
    if let Err(e) = AnswerLog::new(&state.db).record(run) {
        tracing::warn!(error = %e, "Failed to record answer");
    }
}

#[utoipa::path(
    post,
    path = "/query",
    request_body = LegacyQueryRequest,
    responses(
        (status = 200, description = "Answer or error envelope", body = LegacyQueryResponse)
    ),
    tag = "query"
)]
pub async fn legacy_query(
    State(state): State<AppState>,
    Json(req): Json<LegacyQueryRequest>,
) -> Json<LegacyQueryResponse> {
    if req.query.trim().is_empty() {
        return Json(LegacyQueryResponse::error("query must not be empty"));
    }

    let report = state.orchestrator.run(&req.query, None).await;
    record_answer(&state, &report.state);

    Json(LegacyQueryResponse::success(report.response().to_string()))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryRequest {
    pub query: String,
    /// Overrides the configured instruction preamble
    #[serde(default)]
    pub instruction_preamble: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueryResponse {
    pub run_id: String,
    pub response: String,
    pub required_sources: Vec<String>,
    pub document_counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Answer with routing details", body = QueryResponse),
        (status = 400, description = "Empty query", body = super::ApiError)
    ),
    tag = "query"
)]
pub async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<QueryResponse> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let report = state
        .orchestrator
        .run(&req.query, req.instruction_preamble.as_deref())
        .await;

    record_answer(&state, &report.state);

    Ok(Json(QueryResponse {
        run_id: report.run_id.clone(),
        response: report.response().to_string(),
        required_sources: report
            .state
            .required_sources()
            .iter()
            .map(|tag| tag.label().to_string())
            .collect(),
        document_counts: report.state.document_counts(),
        error: report.state.error_message().map(str::to_string),
    }))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryParams {
    /// Maximum number of runs, newest first
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryItem {
    pub id: String,
    pub query: String,
    pub required_sources: Vec<String>,
    pub rationale: Option<String>,
    pub document_counts: BTreeMap<String, usize>,
    pub error_message: Option<String>,
    pub response: String,
    pub created_at: String,
}

impl From<AnswerRecord> for HistoryItem {
    fn from(record: AnswerRecord) -> Self {
        Self {
            id: record.id,
            query: record.query,
            required_sources: record
                .required_sources
                .iter()
                .map(|tag| tag.label().to_string())
                .collect(),
            rationale: record.rationale,
            document_counts: record.document_counts,
            error_message: record.error_message,
            response: record.response,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/history",
    params(HistoryParams),
    responses(
        (status = 200, description = "Recent runs", body = Vec<HistoryItem>)
    ),
    tag = "query"
)]
pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Vec<HistoryItem>> {
    let limit = params.limit.unwrap_or(20).clamp(1, 200);
    let records = AnswerLog::new(&state.db)
        .recent(limit)
        .map_err(internal_error)?;

    Ok(Json(records.into_iter().map(HistoryItem::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::app_state;
    use noor_core::retrieval::SqliteCorpus;
    use noor_core::state::{Document, SourceTag};

    #[tokio::test]
    async fn test_legacy_query_success_envelope() {
        let state = app_state(vec![SourceTag::Quran]);
        SqliteCorpus::new(&state.db)
            .add(SourceTag::Quran, &Document::new("Indeed, Allah is with the patient."))
            .unwrap();

        let Json(body) = legacy_query(
            State(state),
            Json(LegacyQueryRequest {
                query: "patient".into(),
            }),
        )
        .await;

        assert_eq!(body.status, "success");
        assert!(body.response.unwrap().contains("Allah is with the patient"));
        assert!(body.message.is_none());
    }

    #[tokio::test]
    async fn test_legacy_query_rejects_empty() {
        let state = app_state(vec![SourceTag::Quran]);
        let Json(body) = legacy_query(
            State(state),
            Json(LegacyQueryRequest { query: "  ".into() }),
        )
        .await;

        assert_eq!(body.status, "error");
        assert_eq!(
            body.message.as_deref(),
            Some("Error processing query: query must not be empty")
        );
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("response").is_none());
    }

    #[tokio::test]
    async fn test_query_reports_routing_and_logs_run() {
        let state = app_state(vec![SourceTag::Hadith, SourceTag::Quran]);
        SqliteCorpus::new(&state.db)
            .add(SourceTag::Hadith, &Document::new("Actions are judged by intentions."))
            .unwrap();

        let Json(body) = query(
            State(state.clone()),
            Json(QueryRequest {
                query: "intentions".into(),
                instruction_preamble: Some("Be brief.".into()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(body.required_sources, vec!["hadith", "quran"]);
        assert_eq!(body.document_counts.get("hadith"), Some(&1));
        assert_eq!(body.document_counts.get("quran"), Some(&0));
        assert!(body.error.is_none());

        let Json(items) = history(State(state), Query(HistoryParams { limit: None }))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].query, "intentions");
        assert_eq!(items[0].required_sources, vec!["hadith", "quran"]);
    }

    #[tokio::test]
    async fn test_query_answers_when_history_write_fails() {
        let state = app_state(vec![SourceTag::Quran]);
        SqliteCorpus::new(&state.db)
            .add(SourceTag::Quran, &Document::new("Indeed, with hardship comes ease."))
            .unwrap();
        state
            .db
            .connection()
            .lock()
            .unwrap()
            .execute("DROP TABLE answer_log", [])
            .unwrap();

        let Json(body) = query(
            State(state),
            Json(QueryRequest {
                query: "hardship".into(),
                instruction_preamble: None,
            }),
        )
        .await
        .unwrap();

        assert!(body.response.contains("with hardship comes ease"));
        assert_eq!(body.document_counts.get("quran"), Some(&1));
    }

    #[tokio::test]
    async fn test_query_rejects_empty() {
        let state = app_state(vec![]);
        let err = query(
            State(state),
            Json(QueryRequest {
                query: String::new(),
                instruction_preamble: None,
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.0, axum::http::StatusCode::BAD_REQUEST);
    }
}
