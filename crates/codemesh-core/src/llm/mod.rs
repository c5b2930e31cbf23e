mod claude;
mod error;
mod openai;
mod provider;

pub use claude::ClaudeClient;
pub use error::LlmError;
pub use openai::OpenAiClient;
pub use provider::Provider;

use async_trait::async_trait;

/// Trait for Large Language Model providers.
///
/// The escalation tiers only ever need single-shot completions with a
/// system message; this abstraction allows swapping providers without
/// touching the router.
///
/// # Supported Providers
///
/// - **OpenAI-compatible** (default): Works with OpenAI, Azure, Ollama, vLLM, etc.
/// - **Anthropic**: Claude models via Anthropic API
/// - **Ollama**: Local models via the OpenAI-compatible endpoint
#[async_trait]
pub trait Llm: Send + Sync {
    /// Complete a prompt and return the response.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Complete a prompt with a system message.
    async fn complete_with_system(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}

/// Blanket implementation for boxed trait objects.
#[async_trait]
impl Llm for Box<dyn Llm> {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        (**self).complete(prompt).await
    }

    async fn complete_with_system(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        (**self).complete_with_system(system, prompt).await
    }
}
