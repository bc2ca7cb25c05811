//! Structured-API collector: weather, news aggregators, web search, and
//! config-driven generic JSON endpoints. Dispatch is on `api_type` in the
//! source config. A missing vendor key yields an empty result with a
//! warning, not a per-cycle error.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use haystack_common::config::USER_AGENT;
use haystack_common::text::detect_language;
use haystack_common::types::{Language, RawArticle, SourceFeed, SourceKind};
use haystack_common::Config;

use super::{build_article, CollectError, Collector};

const API_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_QUERY: &str = "Niseko OR Kutchan OR Hokkaido";
const NISEKO_LAT: f64 = 42.8614;
const NISEKO_LON: f64 = 140.6882;

pub struct ApiCollector {
    http: reqwest::Client,
    config: Arc<Config>,
}

impl ApiCollector {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(API_TIMEOUT)
                .build()
                .expect("Failed to build API HTTP client"),
            config,
        }
    }

    async fn fetch_source(&self, source: &SourceFeed) -> Result<Vec<RawArticle>> {
        let api_type = source.config_str("api_type").unwrap_or("generic");
        match api_type {
            "openweather" => self.fetch_weather(source).await,
            "newsapi" => self.fetch_newsapi(source).await,
            "tavily" => self.fetch_tavily(source).await,
            "brave" => self.fetch_brave(source).await,
            "currents" => self.fetch_currents(source).await,
            "gnews" => self.fetch_gnews(source).await,
            _ => self.fetch_generic(source).await,
        }
    }

    async fn fetch_weather(&self, source: &SourceFeed) -> Result<Vec<RawArticle>> {
        if self.config.openweather_api_key.is_empty() {
            warn!("weather API key not configured");
            return Ok(Vec::new());
        }

        let lat = source
            .config
            .get("lat")
            .and_then(|v| v.as_f64())
            .unwrap_or(NISEKO_LAT);
        let lon = source
            .config
            .get("lon")
            .and_then(|v| v.as_f64())
            .unwrap_or(NISEKO_LON);

        let data: Value = self
            .http
            .get("https://api.openweathermap.org/data/2.5/weather")
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("appid", self.config.openweather_api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("weather response was not JSON")?;

        Ok(parse_weather(&data, source).into_iter().collect())
    }

    async fn fetch_newsapi(&self, source: &SourceFeed) -> Result<Vec<RawArticle>> {
        if self.config.newsapi_key.is_empty() {
            warn!("NewsAPI key not configured");
            return Ok(Vec::new());
        }

        let query = source.config_str("query").unwrap_or("Niseko OR Hokkaido");
        let page_size = source.config_u64("max_entries", 10);

        let data: Value = self
            .http
            .get("https://newsapi.org/v2/everything")
            .query(&[
                ("q", query.to_string()),
                ("apiKey", self.config.newsapi_key.clone()),
                ("pageSize", page_size.to_string()),
                ("sortBy", "publishedAt".to_string()),
                ("language", "en".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(parse_newsapi(&data, source))
    }

    async fn fetch_tavily(&self, source: &SourceFeed) -> Result<Vec<RawArticle>> {
        if !self.config.content_aggregation_enabled {
            return Ok(Vec::new());
        }
        if self.config.tavily_api_key.is_empty() {
            warn!("Tavily API key not configured");
            return Ok(Vec::new());
        }

        let query = source
            .config_str("query")
            .unwrap_or("Niseko OR Kutchan OR Hokkaido ski");
        let max_results = source.config_u64("max_entries", 10);

        let data: Value = self
            .http
            .post("https://api.tavily.com/search")
            .json(&json!({
                "api_key": self.config.tavily_api_key,
                "query": query,
                "max_results": max_results,
                "search_depth": "basic",
                "include_answer": false,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(parse_tavily(&data, source))
    }

    async fn fetch_brave(&self, source: &SourceFeed) -> Result<Vec<RawArticle>> {
        if !self.config.content_aggregation_enabled {
            return Ok(Vec::new());
        }
        if self.config.brave_search_api_key.is_empty() {
            warn!("Brave Search API key not configured");
            return Ok(Vec::new());
        }

        let query = source
            .config_str("query")
            .unwrap_or("Niseko OR Kutchan OR Hokkaido ski");
        let count = source.config_u64("max_entries", 10);

        let data: Value = self
            .http
            .get("https://api.search.brave.com/res/v1/web/search")
            .header("X-Subscription-Token", &self.config.brave_search_api_key)
            .header("Accept", "application/json")
            .query(&[("q", query.to_string()), ("count", count.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(parse_brave(&data, source))
    }

    async fn fetch_currents(&self, source: &SourceFeed) -> Result<Vec<RawArticle>> {
        if !self.config.content_aggregation_enabled {
            return Ok(Vec::new());
        }
        if self.config.currents_api_key.is_empty() {
            warn!("Currents API key not configured");
            return Ok(Vec::new());
        }

        let query = source.config_str("query").unwrap_or(DEFAULT_QUERY);

        let data: Value = self
            .http
            .get("https://api.currentsapi.services/v1/search")
            .query(&[
                ("apiKey", self.config.currents_api_key.clone()),
                ("keywords", query.to_string()),
                ("language", "en".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(parse_currents(&data, source))
    }

    async fn fetch_gnews(&self, source: &SourceFeed) -> Result<Vec<RawArticle>> {
        if !self.config.content_aggregation_enabled {
            return Ok(Vec::new());
        }
        if self.config.gnews_api_key.is_empty() {
            warn!("GNews API key not configured");
            return Ok(Vec::new());
        }

        let query = source.config_str("query").unwrap_or(DEFAULT_QUERY);
        let max_entries = source.config_u64("max_entries", 10);

        let data: Value = self
            .http
            .get("https://gnews.io/api/v4/search")
            .query(&[
                ("token", self.config.gnews_api_key.clone()),
                ("q", query.to_string()),
                ("max", max_entries.to_string()),
                ("lang", "en".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(parse_gnews(&data, source))
    }

    async fn fetch_generic(&self, source: &SourceFeed) -> Result<Vec<RawArticle>> {
        let mut request = self.http.get(&source.url);
        if let Some(headers) = source.config.get("headers").and_then(|v| v.as_object()) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }
        if let Some(params) = source.config.get("params").and_then(|v| v.as_object()) {
            let pairs: Vec<(String, String)> = params
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect();
            request = request.query(&pairs);
        }

        let data: Value = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("generic API response was not JSON")?;

        Ok(parse_generic(&data, source))
    }
}

#[async_trait]
impl Collector for ApiCollector {
    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    async fn collect(&self, sources: &[SourceFeed]) -> (Vec<RawArticle>, Vec<CollectError>) {
        let mut articles = Vec::new();
        let mut errors = Vec::new();

        for source in sources {
            match self.fetch_source(source).await {
                Ok(fetched) => {
                    info!(source = %source.name, count = fetched.len(), "api collected");
                    articles.extend(fetched);
                }
                Err(e) => {
                    error!(source = %source.name, error = %e, "api fetch failed");
                    errors.push(CollectError::new(source, SourceKind::Api, e.to_string()));
                }
            }
        }

        (articles, errors)
    }
}

fn fmt_num(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 => format!("{}", v as i64),
        Some(v) => format!("{v:.1}"),
        None => "?".to_string(),
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a structured weather reading as a human-readable article.
pub(crate) fn parse_weather(data: &Value, source: &SourceFeed) -> Option<RawArticle> {
    let weather = data.pointer("/weather/0").cloned().unwrap_or(json!({}));
    let description = weather
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    let temp = data.pointer("/main/temp").and_then(|v| v.as_f64());
    let feels_like = data.pointer("/main/feels_like").and_then(|v| v.as_f64());
    let humidity = data.pointer("/main/humidity").and_then(|v| v.as_f64());
    let wind = data.pointer("/wind/speed").and_then(|v| v.as_f64());
    let snow_1h = data.pointer("/snow/1h").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let snow_3h = data.pointer("/snow/3h").and_then(|v| v.as_f64()).unwrap_or(0.0);

    let title = format!("Niseko Weather: {}, {}°C", title_case(description), fmt_num(temp));

    let mut body_parts = vec![
        format!("Current conditions in Niseko: {description}."),
        format!(
            "Temperature: {}°C (feels like {}°C).",
            fmt_num(temp),
            fmt_num(feels_like)
        ),
        format!("Humidity: {}%.", fmt_num(humidity)),
        format!("Wind: {} m/s.", fmt_num(wind)),
    ];
    if snow_1h > 0.0 || snow_3h > 0.0 {
        body_parts.push(format!("Snowfall: {snow_1h}mm (1h), {snow_3h}mm (3h)."));
    }
    let body = body_parts.join(" ");

    let city_id = data.get("id").map(|v| v.to_string()).unwrap_or_default();
    let mut metadata = Map::new();
    metadata.insert("api_type".to_string(), json!("openweather"));
    metadata.insert("raw_response".to_string(), data.clone());
    metadata.insert("snow_1h".to_string(), json!(snow_1h));
    metadata.insert("snow_3h".to_string(), json!(snow_3h));

    Some(build_article(
        source,
        title,
        body,
        format!("https://openweathermap.org/city/{city_id}"),
        Some(Utc::now()),
        None,
        Language::En,
        metadata,
    ))
}

/// Shared shape for the news/search vendors: items under some key, with
/// title/body/url/date fields that vary by vendor.
fn parse_items(
    data: &Value,
    source: &SourceFeed,
    items_pointer: &str,
    api_type: &str,
    body_keys: &[&str],
    url_key: &str,
    date_key: &str,
    author_from: fn(&Value) -> Option<String>,
) -> Vec<RawArticle> {
    let items = data
        .pointer(items_pointer)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut articles = Vec::new();
    for item in items {
        let title = item
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if title.is_empty() || title == "[Removed]" {
            continue;
        }

        let body = body_keys
            .iter()
            .filter_map(|key| item.get(*key).and_then(|v| v.as_str()))
            .find(|text| !text.is_empty())
            .map(|s| s.to_string())
            .unwrap_or_else(|| title.clone());

        let url = item
            .get(url_key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let published_at = item
            .get(date_key)
            .and_then(|v| v.as_str())
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let language = detect_language(&body);
        let mut metadata = Map::new();
        metadata.insert("api_type".to_string(), json!(api_type));

        articles.push(build_article(
            source,
            title,
            body,
            url,
            published_at,
            author_from(&item),
            language,
            metadata,
        ));
    }

    articles
}

pub(crate) fn parse_newsapi(data: &Value, source: &SourceFeed) -> Vec<RawArticle> {
    parse_items(
        data,
        source,
        "/articles",
        "newsapi",
        &["description", "content"],
        "url",
        "publishedAt",
        |item| item.get("author").and_then(|v| v.as_str()).map(String::from),
    )
}

pub(crate) fn parse_tavily(data: &Value, source: &SourceFeed) -> Vec<RawArticle> {
    parse_items(
        data,
        source,
        "/results",
        "tavily",
        &["content"],
        "url",
        "published_date",
        |_| None,
    )
}

pub(crate) fn parse_brave(data: &Value, source: &SourceFeed) -> Vec<RawArticle> {
    parse_items(
        data,
        source,
        "/web/results",
        "brave",
        &["description"],
        "url",
        "page_age",
        |_| None,
    )
}

pub(crate) fn parse_currents(data: &Value, source: &SourceFeed) -> Vec<RawArticle> {
    parse_items(
        data,
        source,
        "/news",
        "currents",
        &["description"],
        "url",
        "published",
        |item| item.get("author").and_then(|v| v.as_str()).map(String::from),
    )
}

pub(crate) fn parse_gnews(data: &Value, source: &SourceFeed) -> Vec<RawArticle> {
    parse_items(
        data,
        source,
        "/articles",
        "gnews",
        &["description", "content"],
        "url",
        "publishedAt",
        |item| {
            item.pointer("/source/name")
                .and_then(|v| v.as_str())
                .map(String::from)
        },
    )
}

/// Config-driven extraction: a dotted `items_path` locates the item array,
/// and `title_key`/`body_key`/`url_key`/`date_key` name the fields.
pub(crate) fn parse_generic(data: &Value, source: &SourceFeed) -> Vec<RawArticle> {
    let items_path = source.config_str("items_path").unwrap_or("");
    let mut items = data;
    for key in items_path.split('.').filter(|k| !k.is_empty()) {
        items = match items.get(key) {
            Some(next) => next,
            None => return Vec::new(),
        };
    }

    let items: Vec<Value> = match items {
        Value::Array(arr) => arr.clone(),
        other => vec![other.clone()],
    };

    let title_key = source.config_str("title_key").unwrap_or("title");
    let body_key = source.config_str("body_key").unwrap_or("description");
    let url_key = source.config_str("url_key").unwrap_or("url");
    let date_key = source.config_str("date_key").unwrap_or("published_at");
    let max_entries = source.config_u64("max_entries", 10) as usize;

    let mut articles = Vec::new();
    for item in items.into_iter().take(max_entries) {
        if !item.is_object() {
            continue;
        }
        let title = item
            .get(title_key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if title.is_empty() {
            continue;
        }

        let body = item
            .get(body_key)
            .and_then(|v| v.as_str())
            .filter(|text| !text.is_empty())
            .map(String::from)
            .unwrap_or_else(|| title.clone());

        let url = item
            .get(url_key)
            .and_then(|v| v.as_str())
            .unwrap_or(&source.url)
            .to_string();

        let published_at = item
            .get(date_key)
            .and_then(|v| v.as_str())
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let language = detect_language(&body);
        let mut metadata = Map::new();
        metadata.insert("api_type".to_string(), json!("generic"));
        metadata.insert("raw_item".to_string(), item.clone());

        articles.push(build_article(
            source,
            title,
            body,
            url,
            published_at,
            None,
            language,
            metadata,
        ));
    }

    articles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn weather_article_from_structured_reading() {
        let data = json!({
            "weather": [{ "description": "heavy snow" }],
            "main": { "temp": -5.0, "feels_like": -11.0, "humidity": 92.0 },
            "wind": { "speed": 6.2 },
            "snow": { "1h": 10.0, "3h": 25.0 },
            "id": 2128295,
        });
        let source = fixtures::source(SourceKind::Api);
        let article = parse_weather(&data, &source).unwrap();

        assert!(article.title.contains("Heavy Snow"));
        assert!(article.title.contains("-5°C"));
        assert!(article.body.contains("Snowfall"));
        assert!(article.body.contains("10mm (1h)"));
        assert_eq!(article.language, Language::En);
    }

    #[test]
    fn weather_without_snow_omits_snowfall_line() {
        let data = json!({
            "weather": [{ "description": "clear sky" }],
            "main": { "temp": 3.0, "feels_like": 1.0, "humidity": 40.0 },
            "wind": { "speed": 2.0 },
        });
        let source = fixtures::source(SourceKind::Api);
        let article = parse_weather(&data, &source).unwrap();
        assert!(!article.body.contains("Snowfall"));
    }

    #[test]
    fn newsapi_items_parsed_and_removed_skipped() {
        let data = json!({
            "articles": [
                { "title": "Niseko opens early", "description": "Resorts open a week early.", "url": "https://n.example/a", "publishedAt": "2025-02-03T06:00:00Z", "author": "Wire" },
                { "title": "[Removed]", "description": "gone", "url": "https://n.example/b" },
            ]
        });
        let source = fixtures::source(SourceKind::Api);
        let articles = parse_newsapi(&data, &source);

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Niseko opens early");
        assert_eq!(articles[0].author.as_deref(), Some("Wire"));
        assert!(articles[0].published_at.is_some());
    }

    #[test]
    fn brave_results_live_under_web() {
        let data = json!({
            "web": { "results": [
                { "title": "Ski news", "description": "Lifts spinning.", "url": "https://b.example/a" },
            ]}
        });
        let source = fixtures::source(SourceKind::Api);
        let articles = parse_brave(&data, &source);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].body, "Lifts spinning.");
    }

    #[test]
    fn generic_follows_dotted_items_path() {
        let data = json!({
            "data": { "articles": [
                { "headline": "Bus schedule changes", "summary": "New winter schedule.", "link": "https://g.example/bus" },
            ]}
        });
        let mut source = fixtures::source(SourceKind::Api);
        source.config = json!({
            "items_path": "data.articles",
            "title_key": "headline",
            "body_key": "summary",
            "url_key": "link",
        });
        let articles = parse_generic(&data, &source);

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Bus schedule changes");
        assert_eq!(articles[0].body, "New winter schedule.");
        assert_eq!(articles[0].source_url, "https://g.example/bus");
    }

    #[test]
    fn generic_with_bad_path_yields_nothing() {
        let data = json!({ "something": [] });
        let mut source = fixtures::source(SourceKind::Api);
        source.config = json!({ "items_path": "data.articles" });
        assert!(parse_generic(&data, &source).is_empty());
    }

    #[test]
    fn fmt_num_drops_trailing_zero() {
        assert_eq!(fmt_num(Some(-5.0)), "-5");
        assert_eq!(fmt_num(Some(6.25)), "6.2");
        assert_eq!(fmt_num(None), "?");
    }
}
