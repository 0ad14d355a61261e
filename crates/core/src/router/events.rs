//! # Pipeline Events
//!
//! Observability events emitted while a query moves through the router.
//! Events are informational only and never influence routing.

use super::pipeline::PipelineStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of pipeline event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventKind {
    RunStarted,
    /// Sources assigned from a successful classification
    Classified,
    /// Classifier failed; the run continues with the general fallback
    ClassificationFailed,
    RetrievalCompleted,
    /// One source failed; the run continues with an empty result for it
    RetrievalFailed,
    FallbackCompleted,
    GenerationCompleted,
    GenerationFailed,
    /// Nothing was retrieved and an error was recorded; generation never ran
    GenerationSkipped,
    RunCompleted,
}

/// An event in the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Run this event belongs to
    pub run_id: String,
    pub kind: PipelineEventKind,
    pub stage: PipelineStage,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl PipelineEvent {
    pub fn new(run_id: &str, kind: PipelineEventKind, stage: PipelineStage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            run_id: run_id.to_string(),
            kind,
            stage,
            data: None,
        }
    }

    /// Add data to the event
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SourceTag;

    #[test]
    fn test_event_creation() {
        let event = PipelineEvent::new(
            "run-1",
            PipelineEventKind::RetrievalCompleted,
            PipelineStage::Retrieving(SourceTag::Hadith),
        )
        .with_data(serde_json::json!({"count": 2}));

        assert_eq!(event.run_id, "run-1");
        assert_eq!(event.data.unwrap()["count"], 2);

        let json = serde_json::to_value(PipelineEvent::new(
            "run-1",
            PipelineEventKind::RunCompleted,
            PipelineStage::Done,
        ))
        .unwrap();
        assert_eq!(json["kind"], "run_completed");
    }
}
