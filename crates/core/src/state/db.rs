//! # Noor Database
//!
//! Single SQLite database for the local corpus and the answer history,
//! stored at `.noor/noor.db`.

use anyhow::{Context, Result};
use crate::retrieval::sqlite_corpus::fold_text;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 2;

/// Default database location
pub const DEFAULT_DB_PATH: &str = ".noor/noor.db";

/// Shared database handle
pub struct NoorDb {
    conn: Arc<Mutex<Connection>>,
}

impl NoorDb {
    /// Open or create the database at `.noor/noor.db`
    pub fn open() -> Result<Self> {
        Self::open_at(DEFAULT_DB_PATH)
    }

    /// Open database at a specific path (useful for testing)
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(path.as_ref()).context("Failed to open noor database")?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Get a shared connection for use by other modules
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [1],
            )?;
        }

        if current_version < 2 {
            Self::migrate_v2(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [2],
            )?;
        }

        Ok(())
    }

    /// Migration to version 1 - corpus + answer history
    fn migrate_v1(conn: &Connection) -> Result<()> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS corpus_documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS answer_log (
                id TEXT PRIMARY KEY,
                query TEXT NOT NULL,
                required_sources_json TEXT NOT NULL DEFAULT '[]',
                rationale TEXT,
                document_counts_json TEXT NOT NULL DEFAULT '{}',
                error_message TEXT,
                response TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_corpus_source ON corpus_documents(source)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_answer_log_created ON answer_log(created_at)",
            [],
        )?;

        Ok(())
    }

    /// Migration to version 2 - case-folded corpus content for keyword search
    ///
    /// SQLite's `lower()` only folds ASCII, so the folded copy is computed in
    /// Rust and stored next to the original.
    fn migrate_v2(conn: &Connection) -> Result<()> {
        conn.execute(
            "ALTER TABLE corpus_documents ADD COLUMN content_folded TEXT NOT NULL DEFAULT ''",
            [],
        )?;

        let rows: Vec<(i64, String)> = {
            let mut stmt = conn.prepare("SELECT id, content FROM corpus_documents")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        for (id, content) in &rows {
            conn.execute(
                "UPDATE corpus_documents SET content_folded = ?1 WHERE id = ?2",
                params![fold_text(content), id],
            )?;
        }

        tracing::info!(
            backfilled = rows.len(),
            "NoorDb initialized with schema version {}",
            SCHEMA_VERSION
        );

        Ok(())
    }
}
