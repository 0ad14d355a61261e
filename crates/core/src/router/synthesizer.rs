//! # Synthesizer
//!
//! Turns the accumulated documents into one answer. Context is assembled
//! here under a fixed source priority; prose comes from a [`Generator`].

use crate::error::RouterResult;
use crate::skills::prompts;
use crate::state::{Document, OrchestrationState, SourceTag};
use async_trait::async_trait;
use serde_json::Value;

/// Order of source blocks in the context
pub const SOURCE_PRIORITY: [SourceTag; 4] = [
    SourceTag::Quran,
    SourceTag::Hadith,
    SourceTag::Tafseer,
    SourceTag::General,
];

/// Returned when generation succeeds but produces no text
pub const EMPTY_ANSWER: &str =
    "I'm sorry, but I was unable to produce an answer to your question.";

/// Everything the generator needs for one answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub query: String,
    pub instruction_preamble: String,
    pub context: String,
    pub instructions: String,
}

impl GenerationRequest {
    /// Render as a single prompt body
    pub fn to_prompt(&self) -> String {
        format!(
            "{}\n\nQuestion: {}\n\nContext from multiple Islamic sources:\n{}\n\n{}",
            self.instruction_preamble, self.query, self.context, self.instructions
        )
    }
}

/// Produces answer prose from a prepared request
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> RouterResult<String>;
}

/// How much context the generator sees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisPolicy {
    /// Documents per source placed in the context
    pub top_n: usize,
    /// Metadata keys never shown to the generator
    pub excluded_metadata: Vec<String>,
    pub instructions: String,
}

impl Default for SynthesisPolicy {
    fn default() -> Self {
        Self {
            top_n: 3,
            excluded_metadata: crate::config::default_excluded_metadata(),
            instructions: prompts::SYNTHESIS_INSTRUCTIONS.trim().to_string(),
        }
    }
}

impl SynthesisPolicy {
    fn is_excluded(&self, key: &str, value: &Value) -> bool {
        self.excluded_metadata.iter().any(|k| k == key)
            || (key.ends_with("_id") && value.is_number())
    }

    fn render_metadata(&self, document: &Document) -> Option<String> {
        let fields: Vec<String> = document
            .metadata
            .iter()
            .filter(|(key, value)| !self.is_excluded(key, value) && !value.is_null())
            .map(|(key, value)| match value {
                Value::String(s) => format!("{}: {}", key, s),
                other => format!("{}: {}", key, other),
            })
            .collect();

        if fields.is_empty() {
            None
        } else {
            Some(format!("[{}]", fields.join(" | ")))
        }
    }

    /// Build the structured context.
    ///
    /// One block per source that holds documents, in priority order, each
    /// numbered from 1 and capped at `top_n`. Sources without documents
    /// produce nothing.
    pub fn build_context(&self, state: &OrchestrationState) -> String {
        let mut blocks = Vec::new();

        for tag in SOURCE_PRIORITY {
            let docs = match state.documents_for(tag) {
                Some(docs) if !docs.is_empty() => docs,
                _ => continue,
            };

            let mut block = format!("\n--- {} SOURCES ---\n", tag.label().to_uppercase());
            for (i, doc) in docs.iter().take(self.top_n).enumerate() {
                block.push_str(&format!("{}. {}\n", i + 1, doc.content));
                if let Some(meta) = self.render_metadata(doc) {
                    block.push_str(&format!("   {}\n", meta));
                }
            }
            blocks.push(block);
        }

        blocks.join("\n")
    }
}

/// Outcome of the synthesis step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Synthesis {
    Generated(String),
    /// Nothing was retrieved and an error was recorded; generation skipped
    TotalFailure(String),
    GenerationFailed(String),
}

impl Synthesis {
    pub fn into_response(self) -> String {
        match self {
            Synthesis::Generated(text) => text,
            Synthesis::TotalFailure(error) => {
                format!("I apologize, but I encountered an error: {}", error)
            }
            Synthesis::GenerationFailed(error) => format!(
                "I apologize, but I encountered an error while generating the response: {}",
                error
            ),
        }
    }
}

pub struct Synthesizer {
    generator: std::sync::Arc<dyn Generator>,
    policy: SynthesisPolicy,
}

impl Synthesizer {
    pub fn new(generator: std::sync::Arc<dyn Generator>) -> Self {
        Self {
            generator,
            policy: SynthesisPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SynthesisPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &SynthesisPolicy {
        &self.policy
    }

    pub async fn synthesize(&self, state: &OrchestrationState) -> Synthesis {
        if let Some(error) = state.error_message() {
            if !state.has_documents() {
                return Synthesis::TotalFailure(error.to_string());
            }
        }

        let request = GenerationRequest {
            query: state.query().to_string(),
            instruction_preamble: state.instruction_preamble().to_string(),
            context: self.policy.build_context(state),
            instructions: self.policy.instructions.clone(),
        };

        match self.generator.generate(&request).await {
            Ok(text) if text.trim().is_empty() => {
                tracing::warn!("Generator returned an empty answer");
                Synthesis::Generated(EMPTY_ANSWER.to_string())
            }
            Ok(text) => Synthesis::Generated(text),
            Err(e) => {
                tracing::error!(error = %e, "Generation failed");
                Synthesis::GenerationFailed(e.to_string())
            }
        }
    }
}
