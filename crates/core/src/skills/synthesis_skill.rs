//! # Synthesis Skill
//!
//! Writes the final answer from retrieved context. This is the router's
//! LLM-backed [`Generator`].

use crate::error::{RouterError, RouterResult};
use crate::models::ModelConfig;
use crate::router::synthesizer::{GenerationRequest, Generator};
use crate::run_llm_function;
use crate::skills::prompts;
use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Output from the synthesis skill
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct SynthesisOutput {
    /// Final answer prose
    pub answer: String,
}

/// Synthesis skill for grounded, cited answers
pub struct SynthesisSkill {
    config: ModelConfig,
}

impl SynthesisSkill {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn with_model(model: &str) -> Self {
        Self::new(ModelConfig::new(model))
    }

    /// SDK-style call for direct router integration.
    pub async fn run(
        request: &GenerationRequest,
        config: &ModelConfig,
    ) -> anyhow::Result<SynthesisOutput> {
        let prompt = request.to_prompt();
        run_llm_function!(config, SynthesisOutput, prompts::SYNTHESIS, prompt)
    }
}

#[async_trait]
impl Generator for SynthesisSkill {
    async fn generate(&self, request: &GenerationRequest) -> RouterResult<String> {
        let output = Self::run(request, &self.config)
            .await
            .map_err(|e| RouterError::Generation(e.to_string()))?;
        Ok(output.answer)
    }
}
