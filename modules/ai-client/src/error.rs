use thiserror::Error;

/// A single provider's failure mode. The distinction matters: only
/// `Unreachable` moves the chain to the next provider when it occurs on
/// the primary.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    BadOutput(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ProviderError::Unreachable(err.to_string())
        } else {
            ProviderError::BadOutput(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("{provider} request failed: {source}")]
    Provider {
        provider: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("all LLM providers unavailable (tried: {tried})")]
    AllProvidersUnavailable { tried: String },

    #[error("LLM returned invalid JSON: {0}")]
    InvalidJson(String),
}
