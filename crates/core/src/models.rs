//! # Noor Models
//!
//! LLM provider selection shared by the classifier and synthesis skills.
//! Credentials are read by radkit's `from_env()` constructors from the
//! provider's API key variable (see [`LlmProvider::api_key_env`]).

use serde::{Deserialize, Serialize};

/// Supported LLM providers
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Anthropic,
    #[default]
    #[serde(rename = "openai")]
    OpenAI,
    Gemini,
    OpenRouter,
    Grok,
    DeepSeek,
}

impl LlmProvider {
    /// Get all available providers
    pub fn all() -> Vec<LlmProvider> {
        vec![
            LlmProvider::Anthropic,
            LlmProvider::OpenAI,
            LlmProvider::Gemini,
            LlmProvider::OpenRouter,
            LlmProvider::Grok,
            LlmProvider::DeepSeek,
        ]
    }

    /// Parse a provider id such as `"openai"` or `"anthropic"`
    pub fn parse(id: &str) -> Option<LlmProvider> {
        match id.trim().to_lowercase().as_str() {
            "anthropic" => Some(LlmProvider::Anthropic),
            "openai" => Some(LlmProvider::OpenAI),
            "gemini" => Some(LlmProvider::Gemini),
            "openrouter" => Some(LlmProvider::OpenRouter),
            "grok" => Some(LlmProvider::Grok),
            "deepseek" => Some(LlmProvider::DeepSeek),
            _ => None,
        }
    }

    /// Display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::OpenAI => "OpenAI",
            LlmProvider::Gemini => "Gemini",
            LlmProvider::OpenRouter => "OpenRouter",
            LlmProvider::Grok => "Grok",
            LlmProvider::DeepSeek => "DeepSeek",
        }
    }

    /// Model used when none is configured
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "claude-sonnet-4-20250514",
            LlmProvider::OpenAI => "gpt-4.1-nano",
            LlmProvider::Gemini => "gemini-2.0-flash-exp",
            LlmProvider::OpenRouter => "anthropic/claude-3.5-sonnet",
            LlmProvider::Grok => "grok-2",
            LlmProvider::DeepSeek => "deepseek-chat",
        }
    }

    /// Environment variable holding the provider's API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::OpenAI => "OPENAI_API_KEY",
            LlmProvider::Gemini => "GEMINI_API_KEY",
            LlmProvider::OpenRouter => "OPENROUTER_API_KEY",
            LlmProvider::Grok => "XAI_API_KEY",
            LlmProvider::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }

    /// Whether this provider supports custom base URL
    pub fn supports_base_url(&self) -> bool {
        matches!(self, LlmProvider::OpenAI)
    }
}

/// Configuration for LLM model selection
///
/// ## Example
/// ```rust,ignore
/// use noor_core::models::{ModelConfig, LlmProvider};
///
/// let config = ModelConfig::with_provider(LlmProvider::Anthropic, "claude-sonnet-4-20250514");
/// let output = ClassifierSkill::run("What is zakat?", &config).await?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelConfig {
    /// LLM provider to use
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name (e.g., "gpt-4.1-nano", "claude-sonnet-4-20250514")
    pub model: String,
    /// Optional base URL override for OpenAI-compatible APIs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::for_provider(LlmProvider::default())
    }
}

impl ModelConfig {
    /// Create a new model config with the default provider (OpenAI)
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::default(),
            model: model.into(),
            base_url: None,
        }
    }

    /// Create config for a specific provider
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
        }
    }

    /// Provider with its default model
    pub fn for_provider(provider: LlmProvider) -> Self {
        let model = provider.default_model();
        Self::with_provider(provider, model)
    }

    /// Set base URL (for OpenAI-compatible endpoints)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Base URL, if the provider honours one
    pub fn effective_base_url(&self) -> Option<&str> {
        if self.provider.supports_base_url() {
            self.base_url.as_deref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ModelConfig::default();
        assert_eq!(config.provider, LlmProvider::OpenAI);
        assert_eq!(config.model, "gpt-4.1-nano");
    }

    #[test]
    fn test_provider_display_names() {
        assert_eq!(LlmProvider::Anthropic.display_name(), "Anthropic");
        assert_eq!(LlmProvider::OpenAI.display_name(), "OpenAI");
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(LlmProvider::parse("OpenAI"), Some(LlmProvider::OpenAI));
        assert_eq!(LlmProvider::parse("grok"), Some(LlmProvider::Grok));
        assert_eq!(LlmProvider::parse("mistral"), None);
        for provider in LlmProvider::all() {
            assert!(provider.api_key_env().ends_with("_API_KEY"));
        }
    }

    #[test]
    fn test_base_url_only_for_openai() {
        let config = ModelConfig::with_provider(LlmProvider::Anthropic, "claude")
            .with_base_url("http://localhost:1234");
        assert_eq!(config.effective_base_url(), None);

        let config = ModelConfig::new("gpt-4o").with_base_url("http://localhost:1234");
        assert_eq!(config.effective_base_url(), Some("http://localhost:1234"));
    }

    #[test]
    fn test_model_config_serialization() {
        let config = ModelConfig::with_provider(LlmProvider::OpenAI, "gpt-4o");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("openai"));
        assert!(json.contains("gpt-4o"));
    }
}
