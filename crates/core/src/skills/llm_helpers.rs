//! # LLM Helpers
//!
//! Structured-output LLM calls for any configured provider. The provider
//! match lives here once so the skills only name their output type and
//! system prompt.

/// Run an `LlmFunction` producing `$output_type` with the provider chosen
/// by a [`ModelConfig`](crate::models::ModelConfig).
///
/// Must be used inside a function returning `anyhow::Result`.
#[macro_export]
macro_rules! run_llm_function {
    ($config:expr, $output_type:ty, $system_prompt:expr, $input:expr) => {{
        use radkit::agent::LlmFunction;
        use radkit::models::providers::{
            AnthropicLlm, DeepSeekLlm, GeminiLlm, GrokLlm, OpenAILlm, OpenRouterLlm,
        };
        use $crate::models::LlmProvider;

        let config = $config;
        let result: anyhow::Result<$output_type> = match config.provider {
            LlmProvider::Anthropic => {
                let llm = AnthropicLlm::from_env(&config.model)?;
                let func =
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt);
                func.run($input).await.map_err(Into::into)
            }
            LlmProvider::OpenAI => {
                let mut llm = OpenAILlm::from_env(&config.model)?;
                if let Some(base_url) = config.effective_base_url() {
                    llm = llm.with_base_url(base_url);
                }
                let func =
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt);
                func.run($input).await.map_err(Into::into)
            }
            LlmProvider::Gemini => {
                let llm = GeminiLlm::from_env(&config.model)?;
                let func =
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt);
                func.run($input).await.map_err(Into::into)
            }
            LlmProvider::OpenRouter => {
                let llm = OpenRouterLlm::from_env(&config.model)?;
                let func =
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt);
                func.run($input).await.map_err(Into::into)
            }
            LlmProvider::Grok => {
                let llm = GrokLlm::from_env(&config.model)?;
                let func =
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt);
                func.run($input).await.map_err(Into::into)
            }
            LlmProvider::DeepSeek => {
                let llm = DeepSeekLlm::from_env(&config.model)?;
                let func =
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt);
                func.run($input).await.map_err(Into::into)
            }
        };
        result
    }};
}

pub use run_llm_function;
