//! # Noor Core
//!
//! Multi-source query routing and retrieval orchestration for Islamic
//! question answering.
//!
//! ## Architecture
//!
//! - `router/` - Orchestrator state machine, routing policy, synthesis
//! - `retrieval/` - Per-source retrievers (SQLite, Qdrant) and the fallback
//! - `skills/` - LLM-backed classifier and generator
//! - `state/` - Orchestration state, source tags, SQLite storage
//! - `config` / `models` - Deployment and LLM provider configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use noor_core::config::NoorConfig;
//! use noor_core::router::Orchestrator;
//! use noor_core::state::NoorDb;
//!
//! let config = NoorConfig::load()?;
//! let db = NoorDb::open()?;
//! let orchestrator = Orchestrator::from_config(&config, Some(&db))?;
//! let answer = orchestrator.answer("What does the Quran say about patience?", None).await;
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod retrieval;
pub mod router;
pub mod skills;
pub mod state;

pub use error::{RouterError, RouterResult};
