//! # Pipeline Stages
//!
//! Stages of one routed query and the pure routing policy.
//!
//! ```text
//! Classifying -> Routing -> Retrieving(tag) -> Routing ... -> Generating -> Done
//!                       \-> FallbackRetrieving ------------> Generating -> Done
//! ```
//!
//! `Routing` is a decision, not a step: it is recorded in the trace but
//! does not count against the step bound of `len(required_sources) + 3`.

use crate::state::{OrchestrationState, SourceTag};
use serde::{Deserialize, Serialize};

/// Stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "stage", content = "source")]
pub enum PipelineStage {
    Classifying,
    Routing,
    Retrieving(SourceTag),
    FallbackRetrieving,
    Generating,
    Done,
}

impl PipelineStage {
    /// Whether entering this stage counts as a step
    pub fn is_step(&self) -> bool {
        !matches!(self, PipelineStage::Routing)
    }
}

/// What the router does next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Retrieve(SourceTag),
    Fallback,
    Generate,
}

/// Where control goes after a retrieval step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    Route,
    Generate,
}

/// Decide the next stage from the state alone.
///
/// `General` anywhere in the required sources overrides the specific
/// tags and sends the run to the cross-source fallback.
pub fn route(state: &OrchestrationState) -> RouteDecision {
    if state.requires_fallback() {
        return RouteDecision::Fallback;
    }
    match state
        .required_sources()
        .get(state.current_source_index())
    {
        Some(tag) => RouteDecision::Retrieve(*tag),
        None => RouteDecision::Generate,
    }
}

pub fn continue_after_retrieval(state: &OrchestrationState) -> Continuation {
    if state.current_source_index() < state.required_sources().len() {
        Continuation::Route
    } else {
        Continuation::Generate
    }
}

/// The pipeline state machine for one run
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Current stage
    pub stage: PipelineStage,
    /// Every stage entered, in order
    pub trace: Vec<PipelineStage>,
    /// Steps taken so far
    pub steps: usize,
    /// Step bound, fixed once sources are assigned
    pub max_steps: usize,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            stage: PipelineStage::Classifying,
            trace: vec![PipelineStage::Classifying],
            steps: 1,
            // Classifying + Generating + Done until sources are known
            max_steps: 3,
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the step bound from the number of required sources
    pub fn bound_to(&mut self, source_count: usize) {
        self.max_steps = source_count.max(1) + 3;
    }

    /// Enter a stage unconditionally
    pub fn enter(&mut self, stage: PipelineStage) {
        if stage.is_step() {
            self.steps += 1;
        }
        self.stage = stage;
        self.trace.push(stage);
    }

    /// Enter a retrieval stage if the bound still leaves room to finish.
    ///
    /// Returns false without changing anything when it does not.
    pub fn try_enter_retrieval(&mut self, stage: PipelineStage) -> bool {
        // the stage itself, then Generating and Done
        if self.steps + 3 > self.max_steps {
            return false;
        }
        self.enter(stage);
        true
    }

    /// Check if pipeline is complete
    pub fn is_complete(&self) -> bool {
        self.stage == PipelineStage::Done
    }

    /// Number of retrieval stages entered
    pub fn retrieval_steps(&self) -> usize {
        self.trace
            .iter()
            .filter(|s| {
                matches!(
                    s,
                    PipelineStage::Retrieving(_) | PipelineStage::FallbackRetrieving
                )
            })
            .count()
    }
}
