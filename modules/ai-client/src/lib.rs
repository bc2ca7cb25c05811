mod anthropic;
mod client;
mod error;
mod ollama;
mod openai;

pub use anthropic::AnthropicProvider;
pub use client::{
    generate_json, ChainHealth, HealthState, LlmClient, LlmGenerate, Provider, ProviderHealth,
};
pub use error::{LlmError, ProviderError};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
