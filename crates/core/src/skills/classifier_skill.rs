//! # Classifier Skill
//!
//! Decides which Islamic sources a question needs, in priority order.
//! This is the router's LLM-backed [`Classifier`].

use crate::error::{RouterError, RouterResult};
use crate::models::ModelConfig;
use crate::router::classifier::{Classification, Classifier};
use crate::run_llm_function;
use crate::skills::prompts;
use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Output from the classifier skill
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct ClassificationOutput {
    /// Ordered source labels: QURAN, HADITH, TAFSEER or GENERAL
    pub required_sources: Vec<String>,
    /// Why these sources, in this order
    pub reasoning: String,
}

impl ClassificationOutput {
    pub fn into_classification(self) -> Classification {
        let rationale = Some(self.reasoning).filter(|r| !r.trim().is_empty());
        Classification::from_labels(&self.required_sources, rationale)
    }
}

/// Classifier skill for multi-source routing
pub struct ClassifierSkill {
    config: ModelConfig,
}

impl ClassifierSkill {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn with_model(model: &str) -> Self {
        Self::new(ModelConfig::new(model))
    }

    /// SDK-style call for direct router integration.
    pub async fn run(query: &str, config: &ModelConfig) -> anyhow::Result<ClassificationOutput> {
        let prompt = format!("User Question: {}", query);
        run_llm_function!(config, ClassificationOutput, prompts::CLASSIFIER, prompt)
    }
}

#[async_trait]
impl Classifier for ClassifierSkill {
    async fn classify(&self, query: &str) -> RouterResult<Classification> {
        let output = Self::run(query, &self.config)
            .await
            .map_err(|e| RouterError::Classification(e.to_string()))?;
        Ok(output.into_classification())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SourceTag;

    #[test]
    fn test_output_into_classification() {
        let output = ClassificationOutput {
            required_sources: vec!["HADITH".into(), "QURAN".into(), "sira".into()],
            reasoning: "Prophetic practice first".into(),
        };

        let classification = output.into_classification();
        assert_eq!(classification.tags, vec![SourceTag::Hadith, SourceTag::Quran]);
        assert_eq!(classification.unrecognized, vec!["sira".to_string()]);
        assert_eq!(
            classification.rationale.as_deref(),
            Some("Prophetic practice first")
        );
    }

    #[test]
    fn test_blank_reasoning_is_dropped() {
        let output = ClassificationOutput {
            required_sources: vec!["TAFSEER".into()],
            reasoning: "  ".into(),
        };
        assert!(output.into_classification().rationale.is_none());
    }

    #[test]
    fn test_skills_back_router_capabilities() {
        use crate::router::Generator;
        use crate::skills::SynthesisSkill;
        use std::sync::Arc;

        let _classifier: Arc<dyn Classifier> = Arc::new(ClassifierSkill::with_model("gpt-4.1-nano"));
        let _generator: Arc<dyn Generator> = Arc::new(SynthesisSkill::with_model("gpt-4.1-nano"));
        assert!(prompts::CLASSIFIER.contains("QURAN"));
    }

    #[test]
    fn test_output_schema_shape() {
        let parsed: ClassificationOutput = serde_json::from_str(
            r#"{"required_sources": ["QURAN", "TAFSEER"], "reasoning": "verse meaning"}"#,
        )
        .unwrap();
        assert_eq!(parsed.required_sources.len(), 2);
    }
}
