use std::env;

/// Outbound User-Agent for all source-facing HTTP requests.
pub const USER_AGENT: &str = "NisekoGazetBot/1.0 (+https://niseko-gazet.vercel.app)";

/// User-Agent for the Reddit public JSON API, which rejects generic bot UAs.
pub const REDDIT_USER_AGENT: &str = "haystack-bot:niseko-gazet:v0.6.0 (news aggregation)";

/// Author id stamped on every field note the pipeline creates.
pub const BOT_AUTHOR_ID: &str = "b0000000-0000-0000-0000-000000000001";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // LLM (Ollama primary)
    pub ollama_base_url: String,
    pub ollama_model: String,

    // Cloud LLM fallback
    pub anthropic_api_key: String,
    pub anthropic_model: String,
    pub openai_api_key: String,
    pub openai_model: String,

    // Relational store (PostgREST surface)
    pub store_url: String,
    pub store_service_key: String,

    // Downstream editorial app (bot identity)
    pub editorial_api_url: String,
    pub bot_email: String,
    pub bot_password: String,

    // Vendor APIs
    pub newsapi_key: String,
    pub openweather_api_key: String,
    pub tavily_api_key: String,
    pub brave_search_api_key: String,
    pub currents_api_key: String,
    pub gnews_api_key: String,

    // Content aggregation (search APIs + social media)
    pub content_aggregation_enabled: bool,
    pub content_quality_threshold: f64,

    // Scheduling (minutes; deep scrape is a fixed 6h cadence)
    pub main_poll_interval_minutes: u64,
    pub weather_poll_interval_minutes: u64,
    pub tip_poll_interval_minutes: u64,
    pub social_poll_interval_minutes: u64,

    // Quality thresholds
    pub min_relevance_score: f64,
    pub min_confidence_score: i64,
    pub duplicate_similarity_threshold: f64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Every field has a default; missing cloud keys disable those providers.
    pub fn from_env() -> Self {
        Self {
            ollama_base_url: env_or("OLLAMA_BASE_URL", "http://localhost:11434"),
            ollama_model: env_or("OLLAMA_MODEL", "qwen2.5-coder:7b"),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            anthropic_model: env_or("ANTHROPIC_MODEL", "claude-haiku-4-5-20251001"),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: env_or("OPENAI_MODEL", "gpt-4o-mini"),
            store_url: env::var("SUPABASE_URL").unwrap_or_default(),
            store_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY").unwrap_or_default(),
            editorial_api_url: env_or("NEXTJS_API_URL", "http://localhost:3000"),
            bot_email: env_or("HAYSTACK_BOT_EMAIL", "haystack-bot@niseko-gazet.local"),
            bot_password: env::var("HAYSTACK_BOT_PASSWORD").unwrap_or_default(),
            newsapi_key: env::var("NEWSAPI_KEY").unwrap_or_default(),
            openweather_api_key: env::var("OPENWEATHER_API_KEY").unwrap_or_default(),
            tavily_api_key: env::var("TAVILY_API_KEY").unwrap_or_default(),
            brave_search_api_key: env::var("BRAVE_SEARCH_API_KEY").unwrap_or_default(),
            currents_api_key: env::var("CURRENTS_API_KEY").unwrap_or_default(),
            gnews_api_key: env::var("GNEWS_API_KEY").unwrap_or_default(),
            content_aggregation_enabled: env_or("CONTENT_AGGREGATION_ENABLED", "false")
                .to_lowercase()
                == "true",
            content_quality_threshold: parse_or("CONTENT_QUALITY_THRESHOLD", 0.6),
            main_poll_interval_minutes: parse_or("MAIN_POLL_INTERVAL_MINUTES", 15),
            weather_poll_interval_minutes: parse_or("WEATHER_POLL_INTERVAL_MINUTES", 60),
            tip_poll_interval_minutes: parse_or("TIP_POLL_INTERVAL_MINUTES", 5),
            social_poll_interval_minutes: parse_or("SOCIAL_POLL_INTERVAL_MINUTES", 30),
            min_relevance_score: parse_or("MIN_RELEVANCE_SCORE", 0.3),
            min_confidence_score: parse_or("MIN_CONFIDENCE_SCORE", 30),
            duplicate_similarity_threshold: parse_or("DUPLICATE_SIMILARITY_THRESHOLD", 0.85),
        }
    }

    /// Log the presence of each sensitive value without revealing it.
    pub fn log_redacted(&self) {
        let vars = [
            ("SUPABASE_URL", &self.store_url),
            ("SUPABASE_SERVICE_ROLE_KEY", &self.store_service_key),
            ("ANTHROPIC_API_KEY", &self.anthropic_api_key),
            ("OPENAI_API_KEY", &self.openai_api_key),
            ("NEWSAPI_KEY", &self.newsapi_key),
            ("OPENWEATHER_API_KEY", &self.openweather_api_key),
            ("TAVILY_API_KEY", &self.tavily_api_key),
            ("BRAVE_SEARCH_API_KEY", &self.brave_search_api_key),
            ("CURRENTS_API_KEY", &self.currents_api_key),
            ("GNEWS_API_KEY", &self.gnews_api_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
