//! The provider chain.
//!
//! Ollama is always the primary. Cloud providers join the chain only when
//! their keys are configured. The chain advances past the primary only on
//! `ProviderError::Unreachable` (connection refused or timeout); an HTTP
//! error status or bad output from a reachable Ollama surfaces as an
//! error. Once the chain is in fallback territory, any failure moves to
//! the next provider.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::anthropic::AnthropicProvider;
use crate::error::{LlmError, ProviderError};
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;
    fn model(&self) -> &str;
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, ProviderError>;
    async fn health(&self) -> ProviderHealth;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Available,
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub provider: &'static str,
    pub model: String,
    pub state: HealthState,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChainHealth {
    pub providers: Vec<ProviderHealth>,
    /// First available provider in chain order, if any.
    pub active_provider: Option<&'static str>,
    /// "healthy" when the primary answers, "degraded" when only a fallback
    /// does, "unhealthy" when nothing does.
    pub status: &'static str,
}

/// The seam the pipeline talks through. Object-safe so stages and tests can
/// hold `Arc<dyn LlmGenerate>`.
#[async_trait]
pub trait LlmGenerate: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str, temperature: f32) -> Result<String>;
}

pub struct LlmClient {
    providers: Vec<Box<dyn Provider>>,
}

impl LlmClient {
    /// Chain with Ollama as the primary provider.
    pub fn new(ollama_base_url: &str, ollama_model: &str) -> Self {
        Self {
            providers: vec![Box::new(OllamaProvider::new(ollama_base_url, ollama_model))],
        }
    }

    /// Add the Anthropic fallback. No-op when the key is empty.
    pub fn with_anthropic(mut self, api_key: &str, model: &str) -> Self {
        if !api_key.is_empty() {
            self.providers
                .push(Box::new(AnthropicProvider::new(api_key, model)));
        }
        self
    }

    /// Add the OpenAI fallback. No-op when the key is empty.
    pub fn with_openai(mut self, api_key: &str, model: &str) -> Self {
        if !api_key.is_empty() {
            self.providers
                .push(Box::new(OpenAiProvider::new(api_key, model)));
        }
        self
    }

    /// Build a chain from explicit providers. The first is the primary.
    pub fn from_providers(providers: Vec<Box<dyn Provider>>) -> Self {
        assert!(!providers.is_empty(), "provider chain cannot be empty");
        Self { providers }
    }

    pub async fn generate(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let mut tried = Vec::with_capacity(self.providers.len());

        let primary = &self.providers[0];
        tried.push(primary.name());
        match primary.generate(system, prompt, temperature).await {
            Ok(text) => {
                info!(provider = primary.name(), model = %primary.model(), "llm generate");
                return Ok(text);
            }
            Err(ProviderError::Unreachable(e)) => {
                warn!(provider = primary.name(), error = %e, "primary LLM unreachable");
            }
            Err(source) => {
                return Err(LlmError::Provider {
                    provider: primary.name(),
                    source,
                });
            }
        }

        for provider in &self.providers[1..] {
            tried.push(provider.name());
            match provider.generate(system, prompt, temperature).await {
                Ok(text) => {
                    info!(provider = provider.name(), model = %provider.model(), "llm generate (fallback)");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "fallback LLM failed");
                }
            }
        }

        Err(LlmError::AllProvidersUnavailable {
            tried: tried.join(", "),
        })
    }

    /// Probe every provider in the chain.
    pub async fn check_health(&self) -> ChainHealth {
        let mut reports = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            reports.push(provider.health().await);
        }

        let active = reports
            .iter()
            .find(|r| r.state == HealthState::Available)
            .map(|r| r.provider);

        let status = match active {
            Some(name) if name == self.providers[0].name() => "healthy",
            Some(_) => "degraded",
            None => "unhealthy",
        };

        ChainHealth {
            providers: reports,
            active_provider: active,
            status,
        }
    }
}

#[async_trait]
impl LlmGenerate for LlmClient {
    async fn generate(&self, system: &str, prompt: &str, temperature: f32) -> Result<String> {
        Ok(LlmClient::generate(self, system, prompt, temperature).await?)
    }
}

/// Generate and parse a JSON response, stripping code fences first.
/// A parse failure is bad output from a reachable provider — it never
/// re-enters the fallback chain.
pub async fn generate_json(
    llm: &dyn LlmGenerate,
    system: &str,
    prompt: &str,
    temperature: f32,
) -> Result<serde_json::Value> {
    let raw = llm.generate(system, prompt, temperature).await?;
    let text = strip_json_fences(&raw);
    serde_json::from_str(text).map_err(|e| {
        warn!(error = %e, head = log_head(text, 200), "llm json parse failed");
        LlmError::InvalidJson(e.to_string()).into()
    })
}

/// Strip a leading ```json or bare ``` fence and a trailing ``` fence.
/// Models wrap JSON in fences however firmly the prompt forbids it.
fn strip_json_fences(response: &str) -> &str {
    let mut text = response.trim();
    for opener in ["```json", "```"] {
        if let Some(rest) = text.strip_prefix(opener) {
            text = rest;
            break;
        }
    }
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// At most `max_bytes` of a response for log context, cut at a char
/// boundary so multibyte output cannot panic the logger.
fn log_head(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let end = (0..=max_bytes)
        .rev()
        .find(|i| s.is_char_boundary(*i))
        .unwrap_or(0);
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct StubProvider {
        name: &'static str,
        responses: Mutex<Vec<Result<String, ProviderError>>>,
        calls: Arc<AtomicUsize>,
    }

    impl StubProvider {
        fn new(name: &'static str, responses: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                name,
                responses: Mutex::new(responses),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn always(name: &'static str, text: &str) -> Self {
            Self::new(name, vec![Ok(text.to_string())])
        }

        fn call_counter(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn model(&self) -> &str {
            "stub-model"
        }

        async fn generate(
            &self,
            _system: &str,
            _prompt: &str,
            _temperature: f32,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                match &responses[0] {
                    Ok(text) => Ok(text.clone()),
                    Err(ProviderError::Unreachable(e)) => Err(ProviderError::Unreachable(e.clone())),
                    Err(ProviderError::Api { status, body }) => Err(ProviderError::Api {
                        status: *status,
                        body: body.clone(),
                    }),
                    Err(ProviderError::BadOutput(e)) => Err(ProviderError::BadOutput(e.clone())),
                }
            }
        }

        async fn health(&self) -> ProviderHealth {
            ProviderHealth {
                provider: self.name,
                model: "stub-model".to_string(),
                state: HealthState::Available,
                detail: None,
            }
        }
    }

    fn chain(providers: Vec<StubProvider>) -> (LlmClient, Vec<&'static str>) {
        let names: Vec<&'static str> = providers.iter().map(|p| p.name).collect();
        let boxed: Vec<Box<dyn Provider>> = providers
            .into_iter()
            .map(|p| Box::new(p) as Box<dyn Provider>)
            .collect();
        (LlmClient::from_providers(boxed), names)
    }

    #[tokio::test]
    async fn primary_success_skips_fallbacks() {
        let ollama = StubProvider::always("ollama", "local response");
        let anthropic = StubProvider::always("anthropic", "should not be called");
        let (client, _) = chain(vec![ollama, anthropic]);

        let result = client.generate("", "hello", 0.3).await.unwrap();
        assert_eq!(result, "local response");
    }

    #[tokio::test]
    async fn unreachable_primary_falls_back_to_anthropic() {
        let ollama = StubProvider::new(
            "ollama",
            vec![Err(ProviderError::Unreachable(
                "connection refused".to_string(),
            ))],
        );
        let anthropic = StubProvider::always("anthropic", "anthropic response");

        let ollama_calls = ollama.call_counter();
        let anthropic_calls = anthropic.call_counter();
        let (client, _) = chain(vec![ollama, anthropic]);

        let result = client.generate("", "hello", 0.3).await.unwrap();
        assert_eq!(result, "anthropic response");
        assert_eq!(ollama_calls.load(Ordering::SeqCst), 1);
        assert_eq!(anthropic_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn http_error_from_primary_does_not_fall_back() {
        let ollama = StubProvider::new(
            "ollama",
            vec![Err(ProviderError::Api {
                status: 500,
                body: "model exploded".to_string(),
            })],
        );
        let anthropic = StubProvider::always("anthropic", "should not be called");
        let (client, _) = chain(vec![ollama, anthropic]);

        let err = client.generate("", "hello", 0.3).await.unwrap_err();
        assert!(matches!(err, LlmError::Provider { provider: "ollama", .. }));
    }

    #[tokio::test]
    async fn failed_fallback_moves_to_next_provider() {
        let ollama = StubProvider::new(
            "ollama",
            vec![Err(ProviderError::Unreachable("timeout".to_string()))],
        );
        let anthropic = StubProvider::new(
            "anthropic",
            vec![Err(ProviderError::Api {
                status: 429,
                body: "rate limited".to_string(),
            })],
        );
        let openai = StubProvider::always("openai", "openai response");
        let (client, _) = chain(vec![ollama, anthropic, openai]);

        let result = client.generate("", "hello", 0.3).await.unwrap();
        assert_eq!(result, "openai response");
    }

    #[tokio::test]
    async fn all_unavailable_reports_tried_providers() {
        let ollama = StubProvider::new(
            "ollama",
            vec![Err(ProviderError::Unreachable("down".to_string()))],
        );
        let anthropic = StubProvider::new(
            "anthropic",
            vec![Err(ProviderError::Unreachable("down".to_string()))],
        );
        let (client, _) = chain(vec![ollama, anthropic]);

        let err = client.generate("", "hello", 0.3).await.unwrap_err();
        match err {
            LlmError::AllProvidersUnavailable { tried } => {
                assert_eq!(tried, "ollama, anthropic");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn generate_json_strips_fences() {
        let ollama = StubProvider::always("ollama", "```json\n{\"ok\": true}\n```");
        let (client, _) = chain(vec![ollama]);

        let value = generate_json(&client, "", "give me json", 0.1)
            .await
            .unwrap();
        assert_eq!(value["ok"], serde_json::json!(true));
    }

    #[test]
    fn fence_stripping_handles_both_flavors() {
        assert_eq!(strip_json_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_json_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_json_fences("{}"), "{}");
        assert_eq!(strip_json_fences("```json\n[1, 2]\n```"), "[1, 2]");
    }

    #[test]
    fn log_head_respects_char_boundaries() {
        let text = "Hello 世界";
        let head = log_head(text, 8);
        assert!(head.len() <= 8);
        assert!(text.starts_with(head));
        assert_eq!(log_head("short", 200), "short");
    }

    #[tokio::test]
    async fn generate_json_rejects_garbage() {
        let ollama = StubProvider::always("ollama", "I am not JSON at all");
        let (client, _) = chain(vec![ollama]);

        assert!(generate_json(&client, "", "give me json", 0.1)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn health_reports_first_available_provider() {
        let ollama = StubProvider::always("ollama", "ok");
        let anthropic = StubProvider::always("anthropic", "ok");
        let (client, _) = chain(vec![ollama, anthropic]);

        let health = client.check_health().await;
        assert_eq!(health.providers.len(), 2);
        assert_eq!(health.active_provider, Some("ollama"));
        assert_eq!(health.status, "healthy");
    }

    #[tokio::test]
    async fn empty_key_does_not_add_fallback() {
        let client = LlmClient::new("http://localhost:11434", "qwen2.5-coder:7b")
            .with_anthropic("", "claude-haiku-4-5-20251001")
            .with_openai("", "gpt-4o-mini");
        assert_eq!(client.providers.len(), 1);
    }
}
