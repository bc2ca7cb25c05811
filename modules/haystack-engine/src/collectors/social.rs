//! Social collector: Reddit and Bluesky, public endpoints only.
//!
//! Gated by the content-aggregation feature flag. Whatever the source row
//! says, every social article is stamped `yellow_press` — social posts
//! always route through human moderation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use haystack_common::config::REDDIT_USER_AGENT;
use haystack_common::text::detect_language;
use haystack_common::types::{RawArticle, SourceFeed, SourceKind};
use haystack_common::Config;

use super::{build_article, CollectError, Collector};

const SOCIAL_TIMEOUT: Duration = Duration::from_secs(30);
const BSKY_API: &str = "https://public.api.bsky.app/xrpc";
const DEFAULT_MAX_ENTRIES: u64 = 15;
const DEFAULT_MAX_ACTORS: u64 = 5;

pub struct SocialCollector {
    http: reqwest::Client,
    config: Arc<Config>,
}

impl SocialCollector {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(SOCIAL_TIMEOUT)
                .build()
                .expect("Failed to build social HTTP client"),
            config,
        }
    }

    async fn collect_reddit(&self, source: &SourceFeed) -> Result<Vec<RawArticle>> {
        let subreddit = source.config_str("subreddit").unwrap_or("niseko");
        let max_entries = source.config_u64("max_entries", DEFAULT_MAX_ENTRIES);

        let data: Value = self
            .http
            .get(format!("https://www.reddit.com/r/{subreddit}/new.json"))
            .query(&[("limit", max_entries.to_string())])
            .header("User-Agent", REDDIT_USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("reddit listing was not JSON")?;

        Ok(parse_reddit_listing(&data, source, subreddit))
    }

    async fn collect_bluesky(&self, source: &SourceFeed) -> Result<Vec<RawArticle>> {
        let query = source.config_str("query").unwrap_or("niseko");
        let max_entries = source.config_u64("max_entries", DEFAULT_MAX_ENTRIES);
        let max_actors = source.config_u64("max_actors", DEFAULT_MAX_ACTORS);

        // Pre-configured actor handles skip the search step entirely.
        let mut actors: Vec<String> = source
            .config
            .get("actors")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        if actors.is_empty() {
            let data: Value = self
                .http
                .get(format!("{BSKY_API}/app.bsky.actor.searchActors"))
                .query(&[("q", query.to_string()), ("limit", max_actors.to_string())])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            actors = data
                .get("actors")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|a| a.get("handle").and_then(|h| h.as_str()))
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
        }

        if actors.is_empty() {
            info!(query, "no bluesky actors found");
            return Ok(Vec::new());
        }

        let per_actor = (max_entries as usize / actors.len()).max(1);
        let mut articles = Vec::new();

        for handle in &actors {
            let feed: Value = match self
                .http
                .get(format!("{BSKY_API}/app.bsky.feed.getAuthorFeed"))
                .query(&[
                    ("actor", handle.to_string()),
                    ("limit", per_actor.to_string()),
                    ("filter", "posts_no_replies".to_string()),
                ])
                .send()
                .await
                .and_then(|r| r.error_for_status())
            {
                Ok(response) => response.json().await.unwrap_or(json!({})),
                Err(e) => {
                    // One broken actor must not sink the rest.
                    warn!(handle, error = %e, "bluesky actor feed failed");
                    continue;
                }
            };

            articles.extend(parse_bluesky_feed(&feed, source, handle));
        }

        Ok(articles)
    }
}

#[async_trait]
impl Collector for SocialCollector {
    fn kind(&self) -> SourceKind {
        SourceKind::Social
    }

    async fn collect(&self, sources: &[SourceFeed]) -> (Vec<RawArticle>, Vec<CollectError>) {
        if !self.config.content_aggregation_enabled {
            info!("social collection disabled by feature flag");
            return (Vec::new(), Vec::new());
        }

        let mut articles = Vec::new();
        let mut errors = Vec::new();

        for source in sources {
            let platform = source.config_str("platform").unwrap_or("reddit");
            let result = match platform {
                "reddit" => self.collect_reddit(source).await,
                "bluesky" => self.collect_bluesky(source).await,
                other => {
                    warn!(platform = other, "unknown social platform");
                    Ok(Vec::new())
                }
            };

            match result {
                Ok(fetched) => {
                    info!(source = %source.name, count = fetched.len(), "social collected");
                    articles.extend(fetched);
                }
                Err(e) => {
                    error!(source = %source.name, error = %e, "social fetch failed");
                    errors.push(CollectError::new(source, SourceKind::Social, e.to_string()));
                }
            }
        }

        (articles, errors)
    }
}

fn yellow_press_metadata(platform: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("platform".to_string(), json!(platform));
    metadata.insert("reliability_tier".to_string(), json!("yellow_press"));
    metadata
}

pub(crate) fn parse_reddit_listing(
    data: &Value,
    source: &SourceFeed,
    subreddit: &str,
) -> Vec<RawArticle> {
    let children = data
        .pointer("/data/children")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut articles = Vec::new();
    for child in children {
        let post = child.get("data").cloned().unwrap_or(json!({}));
        let title = post
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if title.is_empty() {
            continue;
        }

        let body = post
            .get("selftext")
            .and_then(|v| v.as_str())
            .filter(|text| !text.is_empty())
            .map(String::from)
            .unwrap_or_else(|| title.clone());

        let published_at = post
            .get("created_utc")
            .and_then(|v| v.as_f64())
            .and_then(|ts| DateTime::from_timestamp(ts as i64, 0));

        let permalink = post
            .get("permalink")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let language = detect_language(&body);
        let mut metadata = yellow_press_metadata("reddit");
        metadata.insert("subreddit".to_string(), json!(subreddit));
        metadata.insert(
            "score".to_string(),
            post.get("score").cloned().unwrap_or(json!(0)),
        );
        metadata.insert(
            "num_comments".to_string(),
            post.get("num_comments").cloned().unwrap_or(json!(0)),
        );

        articles.push(build_article(
            source,
            title,
            body,
            format!("https://www.reddit.com{permalink}"),
            published_at,
            post.get("author").and_then(|v| v.as_str()).map(String::from),
            language,
            metadata,
        ));
    }

    articles
}

pub(crate) fn parse_bluesky_feed(
    data: &Value,
    source: &SourceFeed,
    actor_handle: &str,
) -> Vec<RawArticle> {
    let feed = data
        .get("feed")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut articles = Vec::new();
    for item in feed {
        let post = item.get("post").cloned().unwrap_or(json!({}));
        let record = post.get("record").cloned().unwrap_or(json!({}));

        let text = record
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if text.is_empty() {
            continue;
        }

        let title: String = text.lines().next().unwrap_or_default().chars().take(100).collect();

        let author_handle = post
            .pointer("/author/handle")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let author = post
            .pointer("/author/displayName")
            .and_then(|v| v.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(author_handle)
            .to_string();

        let published_at = record
            .get("createdAt")
            .and_then(|v| v.as_str())
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let uri = post.get("uri").and_then(|v| v.as_str()).unwrap_or_default();
        let language = detect_language(&text);

        let mut metadata = yellow_press_metadata("bluesky");
        metadata.insert("actor_handle".to_string(), json!(actor_handle));
        metadata.insert(
            "like_count".to_string(),
            post.get("likeCount").cloned().unwrap_or(json!(0)),
        );
        metadata.insert(
            "repost_count".to_string(),
            post.get("repostCount").cloned().unwrap_or(json!(0)),
        );

        articles.push(build_article(
            source,
            title,
            text,
            bsky_post_url(author_handle, uri),
            published_at,
            Some(author),
            language,
            metadata,
        ));
    }

    articles
}

/// Convert an AT Protocol URI (`at://did:plc:xxx/app.bsky.feed.post/rkey`)
/// to a Bluesky web URL.
pub(crate) fn bsky_post_url(handle: &str, uri: &str) -> String {
    let rkey = uri.rsplit('/').next().unwrap_or_default();
    if handle.is_empty() || rkey.is_empty() {
        return uri.to_string();
    }
    format!("https://bsky.app/profile/{handle}/post/{rkey}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use haystack_common::types::ReliabilityTier;

    #[test]
    fn reddit_posts_are_force_tagged_yellow_press() {
        let data = json!({
            "data": { "children": [
                { "data": {
                    "title": "Powder day at Hirafu",
                    "selftext": "Untracked lines everywhere this morning.",
                    "permalink": "/r/niseko/comments/abc/powder_day",
                    "author": "skier42",
                    "score": 12,
                    "num_comments": 3,
                    "created_utc": 1738562400.0,
                }},
            ]}
        });
        // Even an official-tier source row cannot override the force tag.
        let mut source = fixtures::source(SourceKind::Social);
        source.reliability_tier = ReliabilityTier::Official;

        let articles = parse_reddit_listing(&data, &source, "niseko");
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].reliability_tier(), ReliabilityTier::YellowPress);
        assert_eq!(
            articles[0].source_url,
            "https://www.reddit.com/r/niseko/comments/abc/powder_day"
        );
        assert_eq!(articles[0].author.as_deref(), Some("skier42"));
        assert!(articles[0].published_at.is_some());
    }

    #[test]
    fn reddit_link_posts_use_title_as_body() {
        let data = json!({
            "data": { "children": [
                { "data": { "title": "Lift queue photo", "selftext": "", "permalink": "/r/niseko/x" }},
            ]}
        });
        let source = fixtures::source(SourceKind::Social);
        let articles = parse_reddit_listing(&data, &source, "niseko");
        assert_eq!(articles[0].body, "Lift queue photo");
    }

    #[test]
    fn bluesky_feed_parsed_with_web_urls() {
        let data = json!({
            "feed": [
                { "post": {
                    "uri": "at://did:plc:xyz/app.bsky.feed.post/3kabc",
                    "author": { "handle": "news.bsky.social", "displayName": "Niseko News" },
                    "likeCount": 5,
                    "repostCount": 1,
                    "record": {
                        "text": "Heavy snow expected tonight across the resort.\nStay safe out there.",
                        "createdAt": "2025-02-03T06:00:00Z"
                    }
                }}
            ]
        });
        let source = fixtures::source(SourceKind::Social);
        let articles = parse_bluesky_feed(&data, &source, "news.bsky.social");

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Heavy snow expected tonight across the resort.");
        assert_eq!(
            articles[0].source_url,
            "https://bsky.app/profile/news.bsky.social/post/3kabc"
        );
        assert_eq!(articles[0].author.as_deref(), Some("Niseko News"));
        assert_eq!(articles[0].reliability_tier(), ReliabilityTier::YellowPress);
    }

    #[test]
    fn bsky_post_url_falls_back_to_uri() {
        assert_eq!(
            bsky_post_url("", "at://did:plc:xyz/app.bsky.feed.post/3kabc"),
            "at://did:plc:xyz/app.bsky.feed.post/3kabc"
        );
        assert_eq!(
            bsky_post_url("user.bsky.social", "at://did:plc:xyz/app.bsky.feed.post/3kabc"),
            "https://bsky.app/profile/user.bsky.social/post/3kabc"
        );
    }

    #[tokio::test]
    async fn disabled_flag_collects_nothing() {
        let mut config = crate::testing::fixtures::test_config();
        config.content_aggregation_enabled = false;
        let collector = SocialCollector::new(Arc::new(config));

        let (articles, errors) = collector
            .collect(&[fixtures::source(SourceKind::Social)])
            .await;
        assert!(articles.is_empty());
        assert!(errors.is_empty());
    }
}
