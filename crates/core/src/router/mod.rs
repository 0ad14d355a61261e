//! # Router
//!
//! The query-routing state machine.
//!
//! ```text
//! query -> Classifier -> [tags] -> Retriever(tag) ... -> Synthesizer -> answer
//!                            \-> General -> CrossSourceFallback -/
//! ```

pub mod classifier;
pub mod events;
pub mod orchestrator;
pub mod pipeline;
pub mod synthesizer;

pub use classifier::{resolve_sources, Classification, Classifier, ResolvedSources};
pub use events::{PipelineEvent, PipelineEventKind};
pub use orchestrator::{Orchestrator, RunReport};
pub use pipeline::{continue_after_retrieval, route, Continuation, Pipeline, PipelineStage, RouteDecision};
pub use synthesizer::{
    GenerationRequest, Generator, Synthesis, SynthesisPolicy, Synthesizer, EMPTY_ANSWER,
    SOURCE_PRIORITY,
};
