use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::client::{HealthState, Provider, ProviderHealth};
use crate::error::ProviderError;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);
const NUM_PREDICT: u32 = 4096;

/// Local Ollama instance — the primary provider.
pub struct OllamaProvider {
    base_url: String,
    model: String,
    http: reqwest::Client,
    health_http: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            http: reqwest::Client::builder()
                .timeout(GENERATE_TIMEOUT)
                .build()
                .expect("Failed to build Ollama HTTP client"),
            health_http: reqwest::Client::builder()
                .timeout(HEALTH_TIMEOUT)
                .build()
                .expect("Failed to build Ollama health client"),
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
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
        debug!(model = %self.model, "Ollama generate request");

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "system": system,
                "stream": false,
                "options": {
                    "temperature": temperature,
                    "num_predict": NUM_PREDICT,
                },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let data: serde_json::Value = response.json().await?;
        data.get("response")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::BadOutput("missing `response` field".to_string()))
    }

    async fn health(&self) -> ProviderHealth {
        let result = self
            .health_http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                let models: Vec<String> = resp
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| {
                        v.get("models").and_then(|m| m.as_array()).map(|arr| {
                            arr.iter()
                                .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
                                .map(|s| s.to_string())
                                .collect()
                        })
                    })
                    .unwrap_or_default();
                let model_available = models.iter().any(|name| name.contains(&self.model));

                ProviderHealth {
                    provider: self.name(),
                    model: self.model.clone(),
                    state: HealthState::Available,
                    detail: (!model_available).then(|| "model not pulled".to_string()),
                }
            }
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
