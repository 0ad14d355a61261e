//! # Answer Log
//!
//! Host-level history of completed runs. The routing core never reads it;
//! the server records each finished state here for inspection.

use super::db::NoorDb;
use super::orchestration::OrchestrationState;
use super::source::SourceTag;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// One completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub id: String,
    pub query: String,
    pub required_sources: Vec<SourceTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub document_counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

impl AnswerRecord {
    /// Snapshot a finished state
    pub fn from_state(state: &OrchestrationState) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            query: state.query().to_string(),
            required_sources: state.required_sources().to_vec(),
            rationale: state.classification_rationale().map(str::to_string),
            document_counts: state.document_counts(),
            error_message: state.error_message().map(str::to_string),
            response: state.final_response().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// SQLite-backed answer history
pub struct AnswerLog {
    conn: Arc<Mutex<Connection>>,
}

impl AnswerLog {
    /// Create from shared NoorDb connection
    pub fn new(db: &NoorDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Record a finished run
    pub fn record(&self, state: &OrchestrationState) -> Result<AnswerRecord> {
        let record = AnswerRecord::from_state(state);
        self.save(&record)?;
        Ok(record)
    }

    pub fn save(&self, record: &AnswerRecord) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO answer_log
            (id, query, required_sources_json, rationale, document_counts_json,
             error_message, response, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.id,
                record.query,
                serde_json::to_string(&record.required_sources)?,
                record.rationale,
                serde_json::to_string(&record.document_counts)?,
                record.error_message,
                record.response,
                record.created_at.to_rfc3339(),
            ],
        )
        .context("Failed to save answer record")?;

        Ok(())
    }

    /// Most recent runs first
    pub fn recent(&self, limit: usize) -> Result<Vec<AnswerRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, query, required_sources_json, rationale, document_counts_json,
                   error_message, response, created_at
            FROM answer_log
            ORDER BY created_at DESC
            LIMIT ?1
            "#,
        )?;

        let records = stmt
            .query_map(params![limit as i64], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list answer records")?;

        Ok(records)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM answer_log", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnswerRecord> {
        let sources_json: String = row.get(2)?;
        let counts_json: String = row.get(4)?;
        let created_at: String = row.get(7)?;

        Ok(AnswerRecord {
            id: row.get(0)?,
            query: row.get(1)?,
            required_sources: serde_json::from_str(&sources_json).unwrap_or_default(),
            rationale: row.get(3)?,
            document_counts: serde_json::from_str(&counts_json).unwrap_or_default(),
            error_message: row.get(5)?,
            response: row.get(6)?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Document;

    #[test]
    fn test_record_and_list() {
        let db = NoorDb::open_in_memory().unwrap();
        let log = AnswerLog::new(&db);

        let mut state = OrchestrationState::new("What is sabr?", None);
        state
            .assign_sources(vec![SourceTag::Quran], Some("patience verses".to_string()))
            .unwrap();
        state
            .commit_retrieval(SourceTag::Quran, vec![Document::new("2:153")])
            .unwrap();
        state.finalize("Sabr is patience.").unwrap();

        let saved = log.record(&state).unwrap();
        assert_eq!(saved.document_counts.get("quran"), Some(&1));

        let records = log.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].query, "What is sabr?");
        assert_eq!(records[0].required_sources, vec![SourceTag::Quran]);
        assert_eq!(records[0].rationale.as_deref(), Some("patience verses"));
        assert_eq!(records[0].response, "Sabr is patience.");
        assert_eq!(log.count().unwrap(), 1);
    }
}
