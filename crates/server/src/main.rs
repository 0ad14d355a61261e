//! # Noor Server
//!
//! HTTP front end and CLI for the Noor routing engine.

mod api;

use anyhow::{bail, Context};
use api::corpus::{concrete_source, IngestDocument};
use api::AppState;
use clap::{Parser, Subcommand};
use noor_core::config::NoorConfig;
use noor_core::retrieval::SqliteCorpus;
use noor_core::router::{Orchestrator, PipelineEvent};
use noor_core::state::{Document, NoorDb};
use std::{
    io::{BufRead, BufReader},
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{net::TcpListener, sync::broadcast};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone)]
#[command(author, version, about = "Noor - Quran, Hadith and Tafseer question answering")]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the HTTP server (default)
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },
    /// Answer one question and print the response
    Ask {
        query: String,
        /// Overrides the configured instruction preamble
        #[arg(long)]
        preamble: Option<String>,
    },
    /// Load JSONL documents (`{"content": ..., "metadata": {...}}`) into the local corpus
    Ingest {
        /// quran, hadith or tafseer
        #[arg(short, long)]
        source: String,
        #[arg(short, long)]
        file: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,noor_core=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Read one document per non-empty line
fn read_jsonl(path: &Path) -> anyhow::Result<Vec<Document>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut documents = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: IngestDocument = serde_json::from_str(&line)
            .with_context(|| format!("Invalid document on line {}", index + 1))?;
        if doc.content.trim().is_empty() {
            bail!("Empty content on line {}", index + 1);
        }
        documents.push(Document::from(doc));
    }
    Ok(documents)
}

fn ingest(db: &NoorDb, source: &str, file: &Path) -> anyhow::Result<()> {
    let source = concrete_source(source).map_err(anyhow::Error::msg)?;
    let documents = read_jsonl(file)?;

    let corpus = SqliteCorpus::new(db);
    let ingested = corpus.add_many(source, &documents)?;
    let total = corpus.count(Some(source))?;

    println!(
        "Ingested {} {} documents ({} total)",
        ingested,
        source.display_name(),
        total
    );
    Ok(())
}

async fn run_server(
    config: &NoorConfig,
    db: Arc<NoorDb>,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let (event_tx, _) = broadcast::channel::<PipelineEvent>(100);

    let orchestrator = Orchestrator::from_config(config, Some(db.as_ref()))
        .context("Failed to build orchestrator")?
        .with_event_channel(event_tx.clone());

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        db,
        event_tx,
    };
    let app = api::build_router(state);

    tracing::info!(%addr, backend = ?config.backend, "Noor server listening");
    println!("Noor server running at http://{}", addr);
    println!("   Query:   POST /query, POST /api/v1/query");
    println!("   History: GET /api/v1/history");
    println!("   Corpus:  POST /api/v1/corpus/documents, /search");
    println!("   Events:  GET /api/v1/events (SSE)");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the process environment may already be set
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = NoorConfig::load().context("Failed to load configuration")?;
    let db = Arc::new(NoorDb::open().context("Failed to open database")?);

    match args.command {
        Some(CliCommand::Ask { query, preamble }) => {
            let orchestrator = Orchestrator::from_config(&config, Some(db.as_ref()))
                .context("Failed to build orchestrator")?;
            let answer = orchestrator.answer(&query, preamble.as_deref()).await;
            println!("{}", answer);
            Ok(())
        }
        Some(CliCommand::Ingest { source, file }) => ingest(&db, &source, &file),
        Some(CliCommand::Serve { host, port }) => {
            run_server(&config, db, SocketAddr::new(host, port)).await
        }
        None => run_server(&config, db, SocketAddr::from(([127, 0, 0, 1], 8000))).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_jsonl_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"content": "Bukhari 1", "metadata": {{"book": "Revelation"}}}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"content": "Bukhari 2"}}"#).unwrap();

        let docs = read_jsonl(file.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].metadata["book"], "Revelation");
        assert!(docs[1].metadata.is_empty());
    }

    #[test]
    fn test_read_jsonl_reports_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"content": "ok"}}"#).unwrap();
        writeln!(file, "not json").unwrap();

        let err = read_jsonl(file.path()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_ingest_into_corpus() {
        let db = NoorDb::open_in_memory().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"content": "Tafsir of Al-Fatiha"}}"#).unwrap();

        ingest(&db, "tafsir", file.path()).unwrap();
        assert_eq!(SqliteCorpus::new(&db).count(Some(noor_core::state::SourceTag::Tafseer)).unwrap(), 1);

        assert!(ingest(&db, "general", file.path()).is_err());
    }
}
