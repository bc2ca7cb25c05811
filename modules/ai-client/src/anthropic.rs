use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::json;
use tracing::debug;

use crate::client::{HealthState, Provider, ProviderHealth};
use crate::error::ProviderError;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TOKENS: u32 = 4096;

/// Anthropic Messages API — first cloud fallback.
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            http: reqwest::Client::builder()
                .timeout(GENERATE_TIMEOUT)
                .build()
                .expect("Failed to build Anthropic HTTP client"),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| ProviderError::BadOutput(format!("invalid API key header: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
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
        debug!(model = %self.model, "Anthropic generate request");

        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": temperature,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let data: serde_json::Value = response.json().await?;
        data.pointer("/content/0/text")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::BadOutput("missing content text block".to_string()))
    }

    async fn health(&self) -> ProviderHealth {
        // A GET against the messages endpoint returns 405 when reachable and
        // the key is not immediately rejected. Good enough for a health probe.
        let result = self
            .http
            .get(format!("{}/messages", self.base_url))
            .headers(self.headers().unwrap_or_default())
            .send()
            .await;

        match result {
            Ok(_) => ProviderHealth {
                provider: self.name(),
                model: self.model.clone(),
                state: HealthState::Available,
                detail: None,
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
