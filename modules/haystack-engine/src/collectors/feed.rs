//! RSS/Atom feed collector.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map};
use tracing::{error, info};

use haystack_common::config::USER_AGENT;
use haystack_common::text::{detect_language, html_to_text};
use haystack_common::types::{RawArticle, SourceFeed, SourceKind};

use super::{build_article, CollectError, Collector};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_ENTRIES: u64 = 20;

pub struct FeedCollector {
    http: reqwest::Client,
}

impl FeedCollector {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .expect("Failed to build feed HTTP client"),
        }
    }

    async fn fetch_feed(&self, source: &SourceFeed) -> Result<Vec<RawArticle>> {
        let timeout = source.config_u64("timeout", DEFAULT_TIMEOUT_SECS);
        let response = self
            .http
            .get(&source.url)
            .timeout(Duration::from_secs(timeout))
            .send()
            .await
            .context("feed fetch failed")?
            .error_for_status()
            .context("feed fetch returned error status")?;

        let bytes = response.bytes().await.context("failed to read feed body")?;
        parse_feed(&bytes, source)
    }
}

impl Default for FeedCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for FeedCollector {
    fn kind(&self) -> SourceKind {
        SourceKind::Feed
    }

    async fn collect(&self, sources: &[SourceFeed]) -> (Vec<RawArticle>, Vec<CollectError>) {
        let mut articles = Vec::new();
        let mut errors = Vec::new();

        for source in sources {
            match self.fetch_feed(source).await {
                Ok(fetched) => {
                    info!(source = %source.name, count = fetched.len(), "feed collected");
                    articles.extend(fetched);
                }
                Err(e) => {
                    error!(source = %source.name, error = %e, "feed fetch failed");
                    errors.push(CollectError::new(source, SourceKind::Feed, e.to_string()));
                }
            }
        }

        (articles, errors)
    }
}

/// Parse feed bytes into raw articles. Separate from the fetch so fixtures
/// exercise it without a network.
pub(crate) fn parse_feed(bytes: &[u8], source: &SourceFeed) -> Result<Vec<RawArticle>> {
    let feed = feed_rs::parser::parse(bytes).context("Failed to parse RSS/Atom feed")?;

    let max_entries = source.config_u64("max_entries", DEFAULT_MAX_ENTRIES) as usize;
    let feed_title = feed.title.as_ref().map(|t| t.content.clone());

    let mut articles = Vec::new();
    for entry in feed.entries.into_iter().take(max_entries) {
        let title = match entry.title.as_ref() {
            Some(t) if !t.content.trim().is_empty() => t.content.trim().to_string(),
            _ => continue,
        };

        // Body: prefer full content, fall back to summary, then the title.
        let raw_body = entry
            .content
            .as_ref()
            .and_then(|c| c.body.clone())
            .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
            .unwrap_or_else(|| title.clone());
        let body = html_to_text(&raw_body);

        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&chrono::Utc));

        let link = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_else(|| source.url.clone());

        let author = entry.authors.first().map(|p| p.name.clone());
        let language = detect_language(&body);

        let mut metadata = Map::new();
        metadata.insert("feed_title".to_string(), json!(feed_title));
        metadata.insert("entry_id".to_string(), json!(entry.id));
        metadata.insert(
            "tags".to_string(),
            json!(entry
                .categories
                .iter()
                .map(|c| c.term.clone())
                .collect::<Vec<_>>()),
        );

        articles.push(build_article(
            source,
            title,
            body,
            link,
            published_at,
            author,
            language,
            metadata,
        ));
    }

    Ok(articles)
}
