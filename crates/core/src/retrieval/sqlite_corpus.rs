//! # SQLite Corpus
//!
//! Local per-source document store on the shared `NoorDb` connection.
//! Search is keyword based: the query is cut into terms, candidates are
//! prefiltered with `LIKE` against a case-folded copy of the content, and
//! each candidate scores one point per distinct term it contains.

use super::SourceRetriever;
use crate::error::{RouterError, RouterResult};
use crate::state::{Document, NoorDb, SourceTag};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

const MIN_TERM_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "the", "and", "are", "was", "were", "what", "when", "where", "which", "who", "whom", "why",
    "how", "does", "did", "has", "have", "had", "for", "from", "with", "about", "into", "this",
    "that", "these", "those", "there", "their", "them", "they", "you", "your", "can", "could",
    "should", "would", "will", "shall", "may", "might", "must", "not", "but", "all", "any",
    "some", "its", "our", "his", "her", "say", "says", "tell", "explain", "according", "islam",
    "islamic",
];

/// A stored corpus row
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub id: i64,
    pub source: SourceTag,
    pub document: Document,
    pub created_at: String,
}

/// Unicode case folding shared by stored content and query terms
pub fn fold_text(text: &str) -> String {
    text.to_lowercase()
}

/// Split a query into distinct case-folded search terms
pub fn search_terms(query: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    query
        .split(|c: char| !c.is_alphanumeric())
        .map(fold_text)
        .filter(|w| w.chars().count() >= MIN_TERM_LEN && !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// SQLite-backed corpus using the shared NoorDb connection
#[derive(Clone)]
pub struct SqliteCorpus {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCorpus {
    /// Create from shared NoorDb connection
    pub fn new(db: &NoorDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Add one document under a concrete source
    pub fn add(&self, source: SourceTag, document: &Document) -> Result<i64> {
        if source.is_fallback() {
            anyhow::bail!("documents must belong to a concrete source, not general");
        }
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "INSERT INTO corpus_documents (source, content, content_folded, metadata_json) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                source.label(),
                document.content,
                fold_text(&document.content),
                serde_json::to_string(&document.metadata)?
            ],
        )
        .context("Failed to insert corpus document")?;

        Ok(conn.last_insert_rowid())
    }

    /// Add a batch in one transaction
    pub fn add_many(&self, source: SourceTag, documents: &[Document]) -> Result<usize> {
        if source.is_fallback() {
            anyhow::bail!("documents must belong to a concrete source, not general");
        }
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO corpus_documents (source, content, content_folded, metadata_json) \
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for document in documents {
                stmt.execute(params![
                    source.label(),
                    document.content,
                    fold_text(&document.content),
                    serde_json::to_string(&document.metadata)?
                ])?;
            }
        }
        tx.commit().context("Failed to commit corpus batch")?;

        tracing::info!(source = %source, count = documents.len(), "Ingested corpus documents");
        Ok(documents.len())
    }

    /// Rank a source's documents against the query terms.
    ///
    /// Higher score first, insertion order on ties. Documents matching no
    /// term are not returned.
    pub fn search(&self, source: SourceTag, query: &str, limit: usize) -> Result<Vec<CorpusEntry>> {
        let terms = search_terms(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let like_clauses: Vec<String> = (0..terms.len())
            .map(|i| format!("content_folded LIKE ?{}", i + 2))
            .collect();
        let sql = format!(
            "SELECT id, source, content, metadata_json, created_at FROM corpus_documents \
             WHERE source = ?1 AND ({}) ORDER BY id ASC",
            like_clauses.join(" OR ")
        );

        let mut bindings = vec![source.label().to_string()];
        bindings.extend(terms.iter().map(|t| format!("%{}%", t)));

        let mut stmt = conn.prepare(&sql)?;
        let candidates = stmt
            .query_map(params_from_iter(bindings.iter()), Self::row_to_entry)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to search corpus")?;

        let mut scored: Vec<(usize, CorpusEntry)> = candidates
            .into_iter()
            .map(|mut entry| {
                let haystack = fold_text(&entry.document.content);
                let score = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                entry.document.score = Some(score as f32);
                (score, entry)
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        // Stable sort keeps id order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, entry)| entry)
            .collect())
    }

    /// Count documents, optionally for one source
    pub fn count(&self, source: Option<SourceTag>) -> Result<i64> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count: i64 = match source {
            Some(tag) => conn.query_row(
                "SELECT COUNT(*) FROM corpus_documents WHERE source = ?1",
                params![tag.label()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM corpus_documents", [], |row| row.get(0))?,
        };
        Ok(count)
    }

    /// Delete a document by ID
    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let affected = conn.execute("DELETE FROM corpus_documents WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CorpusEntry> {
        let source: String = row.get(1)?;
        let metadata_json: String = row.get(3)?;
        let metadata: Map<String, Value> = serde_json::from_str(&metadata_json).unwrap_or_default();

        Ok(CorpusEntry {
            id: row.get(0)?,
            source: SourceTag::from_label(&source).unwrap_or(SourceTag::General),
            document: Document {
                content: row.get(2)?,
                metadata,
                score: None,
            },
            created_at: row.get(4)?,
        })
    }
}

#[async_trait]
impl SourceRetriever for SqliteCorpus {
    async fn retrieve(
        &self,
        query: &str,
        tag: SourceTag,
        top_k: usize,
    ) -> RouterResult<Vec<Document>> {
        let corpus = self.clone();
        let query = query.to_string();

        let entries = tokio::task::spawn_blocking(move || corpus.search(tag, &query, top_k))
            .await
            .map_err(|e| RouterError::retrieval(tag, e))?
            .map_err(|e| RouterError::retrieval(tag, e))?;
        Ok(entries.into_iter().map(|e| e.document).collect())
    }
}
