use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::client::{HealthState, Provider, ProviderHealth};
use crate::error::ProviderError;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TOKENS: u32 = 4096;

/// OpenAI Chat Completions API — second cloud fallback.
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            http: reqwest::Client::builder()
                .timeout(GENERATE_TIMEOUT)
                .build()
                .expect("Failed to build OpenAI HTTP client"),
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        debug!(model = %self.model, "OpenAI generate request");

        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "temperature": temperature,
                "max_tokens": MAX_TOKENS,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let data: serde_json::Value = response.json().await?;
        data.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::BadOutput("missing chat completion content".to_string()))
    }

    async fn health(&self) -> ProviderHealth {
        let result = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => ProviderHealth {
                provider: self.name(),
                model: self.model.clone(),
                state: HealthState::Available,
                detail: None,
            },
            Ok(resp) => ProviderHealth {
                provider: self.name(),
                model: self.model.clone(),
                state: HealthState::Unavailable,
                detail: Some(format!("HTTP {}", resp.status())),
            },
            Err(e) => ProviderHealth {
                provider: self.name(),
                model: self.model.clone(),
                state: HealthState::Unavailable,
                detail: Some(e.to_string()),
            },
        }
    }
}
