//! # Orchestrator
//!
//! Drives one query through Classifier -> per-source Retrievers (in
//! classifier order) or the cross-source fallback -> Synthesizer.
//!
//! Every capability failure is absorbed here and turned into a degraded
//! state transition. `answer` always returns a non-empty string.

use super::classifier::{resolve_sources, Classifier};
use super::events::{PipelineEvent, PipelineEventKind};
use super::pipeline::{continue_after_retrieval, route, Continuation, Pipeline, PipelineStage, RouteDecision};
use super::synthesizer::{Generator, Synthesis, SynthesisPolicy, Synthesizer};
use crate::config::{NoorConfig, RetrievalBackend};
use crate::retrieval::{
    CrossSourceFallback, FallbackRetriever, QdrantRetriever, RetrieverSet, SqliteCorpus,
};
use crate::skills::{ClassifierSkill, SynthesisSkill};
use crate::state::{NoorDb, OrchestrationState, SourceTag};
use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Final state and visited stages of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub state: OrchestrationState,
    pub trace: Vec<PipelineStage>,
}

impl RunReport {
    pub fn response(&self) -> &str {
        self.state.final_response()
    }
}

pub struct Orchestrator {
    classifier: Arc<dyn Classifier>,
    retrievers: RetrieverSet,
    fallback: Arc<dyn FallbackRetriever>,
    synthesizer: Synthesizer,
    retrieval_top_k: usize,
    default_preamble: Option<String>,
    event_tx: Option<broadcast::Sender<PipelineEvent>>,
}

impl Orchestrator {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        retrievers: RetrieverSet,
        fallback: Arc<dyn FallbackRetriever>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            classifier,
            retrievers,
            fallback,
            synthesizer: Synthesizer::new(generator),
            retrieval_top_k: 5,
            default_preamble: None,
            event_tx: None,
        }
    }

    /// Build the LLM-backed pipeline described by `config`.
    ///
    /// The SQLite backend reads from `db`; the Qdrant backend ignores it.
    pub fn from_config(config: &NoorConfig, db: Option<&NoorDb>) -> Result<Self> {
        config.validate()?;

        let retrievers = match config.backend {
            RetrievalBackend::Sqlite => {
                let db = db.context("sqlite backend requires a database")?;
                RetrieverSet::uniform(Arc::new(SqliteCorpus::new(db)))
            }
            RetrievalBackend::Qdrant => RetrieverSet::uniform(Arc::new(
                QdrantRetriever::from_config(config).context("Failed to build Qdrant client")?,
            )),
        };
        let fallback = Arc::new(CrossSourceFallback::new(retrievers.clone()));

        let policy = SynthesisPolicy {
            top_n: config.context_top_n,
            excluded_metadata: config.excluded_metadata.clone(),
            ..SynthesisPolicy::default()
        };

        let mut orchestrator = Self::new(
            Arc::new(ClassifierSkill::new(config.classifier.clone())),
            retrievers,
            fallback,
            Arc::new(SynthesisSkill::new(config.generator.clone())),
        )
        .with_retrieval_top_k(config.retrieval_top_k)
        .with_synthesis_policy(policy);
        orchestrator.default_preamble = config.instruction_preamble.clone();

        tracing::info!(
            backend = ?config.backend,
            classifier_model = %config.classifier.model,
            generator_model = %config.generator.model,
            "Orchestrator configured"
        );
        Ok(orchestrator)
    }

    pub fn with_retrieval_top_k(mut self, top_k: usize) -> Self {
        self.retrieval_top_k = top_k.max(1);
        self
    }

    pub fn with_synthesis_policy(mut self, policy: SynthesisPolicy) -> Self {
        self.synthesizer = self.synthesizer.with_policy(policy);
        self
    }

    /// Preamble used when a caller passes none
    pub fn with_default_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.default_preamble = Some(preamble.into());
        self
    }

    /// Set event channel for streaming events
    pub fn with_event_channel(mut self, tx: broadcast::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Answer one query. Never fails and never returns an empty string.
    pub async fn answer(&self, query: &str, instruction_preamble: Option<&str>) -> String {
        self.run(query, instruction_preamble).await.state.into_response()
    }

    /// Run the full pipeline, returning the final state and stage trace
    #[tracing::instrument(skip(self, instruction_preamble), fields(query_preview = %query.chars().take(50).collect::<String>()))]
    pub async fn run(&self, query: &str, instruction_preamble: Option<&str>) -> RunReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let preamble = instruction_preamble.or(self.default_preamble.as_deref());
        let mut state = OrchestrationState::new(query, preamble);
        let mut pipeline = Pipeline::new();

        self.emit(
            PipelineEvent::new(&run_id, PipelineEventKind::RunStarted, PipelineStage::Classifying)
                .with_data(json!({ "query": query })),
        );

        self.classify(&run_id, &mut state, &mut pipeline).await;

        loop {
            pipeline.enter(PipelineStage::Routing);
            match route(&state) {
                RouteDecision::Fallback => {
                    if pipeline.try_enter_retrieval(PipelineStage::FallbackRetrieving) {
                        self.run_fallback(&run_id, &mut state).await;
                    }
                    break;
                }
                RouteDecision::Retrieve(tag) => {
                    if !pipeline.try_enter_retrieval(PipelineStage::Retrieving(tag)) {
                        tracing::warn!(steps = pipeline.steps, "Step bound reached, forcing generation");
                        break;
                    }
                    self.retrieve_source(&run_id, &mut state, tag).await;
                    if continue_after_retrieval(&state) == Continuation::Generate {
                        break;
                    }
                }
                RouteDecision::Generate => break,
            }
        }

        pipeline.enter(PipelineStage::Generating);
        self.generate(&run_id, &mut state).await;
        pipeline.enter(PipelineStage::Done);

        self.emit(
            PipelineEvent::new(&run_id, PipelineEventKind::RunCompleted, PipelineStage::Done)
                .with_data(json!({
                    "steps": pipeline.steps,
                    "document_counts": state.document_counts(),
                })),
        );

        RunReport {
            run_id,
            state,
            trace: pipeline.trace,
        }
    }

    async fn classify(&self, run_id: &str, state: &mut OrchestrationState, pipeline: &mut Pipeline) {
        let resolved = resolve_sources(self.classifier.classify(state.query()).await);

        match &resolved.failure {
            Some(failure) => {
                self.emit(
                    PipelineEvent::new(
                        run_id,
                        PipelineEventKind::ClassificationFailed,
                        PipelineStage::Classifying,
                    )
                    .with_data(json!({ "error": failure })),
                );
                Self::note_error(state, failure.clone());
            }
            None => {
                let labels: Vec<&str> = resolved.tags.iter().map(SourceTag::label).collect();
                tracing::info!(
                    sources = ?labels,
                    rationale = resolved.rationale.as_deref().unwrap_or(""),
                    "Classified query"
                );
                self.emit(
                    PipelineEvent::new(run_id, PipelineEventKind::Classified, PipelineStage::Classifying)
                        .with_data(json!({
                            "required_sources": resolved.tags,
                            "rationale": resolved.rationale,
                        })),
                );
            }
        }

        pipeline.bound_to(resolved.tags.len());
        if let Err(e) = state.assign_sources(resolved.tags, resolved.rationale) {
            tracing::error!(error = %e, "Could not assign sources");
        }
    }

    async fn retrieve_source(&self, run_id: &str, state: &mut OrchestrationState, tag: SourceTag) {
        let stage = PipelineStage::Retrieving(tag);

        if state.documents_for(tag).is_some() {
            tracing::debug!(tag = %tag, "Source already retrieved in this run, skipping");
            if let Err(e) = state.skip_repeated(tag) {
                tracing::error!(error = %e, "Could not skip repeated source");
            }
            return;
        }

        let documents = match self
            .retrievers
            .retrieve(state.query(), tag, self.retrieval_top_k)
            .await
        {
            Ok(docs) => {
                tracing::info!(tag = %tag, count = docs.len(), "Retrieved documents");
                self.emit(
                    PipelineEvent::new(run_id, PipelineEventKind::RetrievalCompleted, stage)
                        .with_data(json!({ "source": tag, "count": docs.len() })),
                );
                docs
            }
            Err(e) => {
                tracing::warn!(tag = %tag, error = %e, "Retrieval failed, continuing with no documents");
                self.emit(
                    PipelineEvent::new(run_id, PipelineEventKind::RetrievalFailed, stage)
                        .with_data(json!({ "source": tag, "error": e.to_string() })),
                );
                Self::note_error(state, e.to_string());
                Vec::new()
            }
        };

        if let Err(e) = state.commit_retrieval(tag, documents) {
            tracing::error!(error = %e, "Could not commit retrieval");
        }
    }

    async fn run_fallback(&self, run_id: &str, state: &mut OrchestrationState) {
        let outcome = self
            .fallback
            .fallback(state.query(), self.retrieval_top_k)
            .await;

        tracing::info!(
            sources = outcome.results.len(),
            documents = outcome.document_count(),
            failures = outcome.errors.len(),
            "Fallback retrieval complete"
        );
        self.emit(
            PipelineEvent::new(run_id, PipelineEventKind::FallbackCompleted, PipelineStage::FallbackRetrieving)
                .with_data(json!({
                    "documents": outcome.document_count(),
                    "errors": outcome.errors,
                })),
        );

        for error in &outcome.errors {
            Self::note_error(state, error.clone());
        }
        if let Err(e) = state.commit_fallback(outcome.results) {
            tracing::error!(error = %e, "Could not commit fallback results");
        }
    }

    async fn generate(&self, run_id: &str, state: &mut OrchestrationState) {
        let synthesis = self.synthesizer.synthesize(state).await;

        let kind = match &synthesis {
            Synthesis::Generated(_) => PipelineEventKind::GenerationCompleted,
            Synthesis::GenerationFailed(_) => PipelineEventKind::GenerationFailed,
            Synthesis::TotalFailure(_) => PipelineEventKind::GenerationSkipped,
        };
        self.emit(PipelineEvent::new(run_id, kind, PipelineStage::Generating));

        if let Err(e) = state.finalize(synthesis.into_response()) {
            tracing::error!(error = %e, "Could not write final response");
        }
    }

    fn note_error(state: &mut OrchestrationState, message: String) {
        if let Err(e) = state.record_error(message) {
            tracing::error!(error = %e, "Could not record error");
        }
    }

    /// Emit an event
    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            // no subscribers is fine
            let _ = tx.send(event);
        }
    }
}
