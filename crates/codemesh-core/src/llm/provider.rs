use super::{ClaudeClient, Llm, LlmError, OpenAiClient};
use crate::config::{
    DEFAULT_ANTHROPIC_MODEL, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_OPENAI_MODEL,
    DEFAULT_OPENAI_URL, LlmConfig,
};

/// LLM Provider configuration.
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI-compatible endpoint (default, most universal)
    OpenAi {
        base_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
    },
    /// Anthropic Claude
    Anthropic {
        api_key: Option<String>,
        model: Option<String>,
    },
    /// Local Ollama instance
    Ollama {
        base_url: Option<String>,
        model: String,
    },
}

impl Default for Provider {
    fn default() -> Self {
        Provider::OpenAi {
            base_url: None,
            api_key: None,
            model: None,
        }
    }
}

impl Provider {
    /// Creates a provider from LlmConfig.
    pub fn from_config(config: &LlmConfig) -> Self {
        match config.provider.as_str() {
            "anthropic" | "claude" => Provider::Anthropic {
                api_key: config.api_key_or_env(),
                model: config.model.clone(),
            },
            "ollama" => Provider::Ollama {
                base_url: config.base_url.clone(),
                model: config
                    .model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            },
            _ => Provider::OpenAi {
                base_url: config.base_url.clone(),
                api_key: config.api_key_or_env(),
                model: config.model.clone(),
            },
        }
    }

    /// Creates an LLM client from the provider configuration.
    pub fn build(self) -> Result<Box<dyn Llm>, LlmError> {
        match self {
            Provider::OpenAi {
                base_url,
                api_key,
                model,
            } => {
                let base = base_url
                    .or_else(|| std::env::var("CODEMESH_LLM_BASE_URL").ok())
                    .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
                    .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());

                let key = api_key
                    .or_else(|| std::env::var("CODEMESH_LLM_API_KEY").ok())
                    .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                    .unwrap_or_default();

                let mdl = model
                    .or_else(|| std::env::var("CODEMESH_LLM_MODEL").ok())
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());

                Ok(Box::new(OpenAiClient::new(base, key, mdl)))
            }

            Provider::Anthropic { api_key, model } => {
                let key = api_key
                    .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                    .ok_or(LlmError::MissingApiKey)?;

                let mdl = model
                    .or_else(|| std::env::var("ANTHROPIC_MODEL").ok())
                    .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string());

                Ok(Box::new(ClaudeClient::new(key).with_model(mdl)))
            }

            Provider::Ollama { base_url, model } => {
                let base = base_url
                    .or_else(|| std::env::var("OLLAMA_HOST").ok())
                    .map(|h| format!("{}/v1", h.trim_end_matches('/')))
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

                Ok(Box::new(OpenAiClient::new(base, "", model)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_provider() {
        let provider = Provider::default();
        assert!(matches!(provider, Provider::OpenAi { .. }));
    }

    #[test]
    fn test_ollama_provider_build() {
        let provider = Provider::Ollama {
            base_url: None,
            model: DEFAULT_OLLAMA_MODEL.to_string(),
        };
        // Should succeed without API key
        let result = provider.build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_openai_provider_build() {
        let provider = Provider::OpenAi {
            base_url: Some("http://localhost:8080/v1".to_string()),
            api_key: Some("test".to_string()),
            model: Some("local-model".to_string()),
        };
        let result = provider.build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_from_config() {
        let config = LlmConfig {
            provider: "ollama".to_string(),
            model: Some("codellama".to_string()),
            base_url: None,
            api_key: None,
            max_tokens: 4096,
            api_version: None,
        };

        let provider = Provider::from_config(&config);
        assert!(matches!(provider, Provider::Ollama { model, .. } if model == "codellama"));
    }
}
