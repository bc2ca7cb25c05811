//! robots.txt compliance with a per-authority TTL cache.
//!
//! Fetch policy: parse a 200 response, treat any other status as
//! permissive, and fail open (allow, uncached) on network errors so a
//! flaky robots endpoint never blocks collection.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use robotxt::Robots;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use haystack_common::config::USER_AGENT;

const CACHE_TTL: Duration = Duration::from_secs(3600);
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// The crawl-permission seam the scraper depends on.
#[async_trait]
pub trait CrawlPolicy: Send + Sync {
    async fn is_allowed(&self, url: &str) -> bool;
    async fn crawl_delay(&self, url: &str) -> Option<Duration>;
}

/// Fetch seam so tests can serve canned robots.txt bodies and count fetches.
#[async_trait]
pub trait RobotsFetch: Send + Sync {
    /// `Ok(Some(body))` on 200, `Ok(None)` on any other status, `Err` on
    /// network failure.
    async fn fetch(&self, origin: &str) -> Result<Option<String>>;
}

pub struct HttpRobotsFetch {
    http: reqwest::Client,
}

impl HttpRobotsFetch {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()
                .expect("Failed to build robots HTTP client"),
        }
    }
}

impl Default for HttpRobotsFetch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RobotsFetch for HttpRobotsFetch {
    async fn fetch(&self, origin: &str) -> Result<Option<String>> {
        let response = self.http.get(format!("{origin}/robots.txt")).send().await?;
        if response.status().is_success() {
            Ok(Some(response.text().await.unwrap_or_default()))
        } else {
            Ok(None)
        }
    }
}

struct CacheEntry {
    robots: Robots,
    expires: Instant,
}

/// Cached robots.txt policy for the configured bot user agent.
pub struct RobotsPolicy {
    agent: String,
    fetcher: Box<dyn RobotsFetch>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl RobotsPolicy {
    pub fn new() -> Self {
        Self::with_fetcher(Box::new(HttpRobotsFetch::new()))
    }

    pub fn with_fetcher(fetcher: Box<dyn RobotsFetch>) -> Self {
        Self {
            agent: USER_AGENT.to_string(),
            fetcher,
            cache: Mutex::new(HashMap::new()),
            ttl: CACHE_TTL,
        }
    }

    /// `scheme://authority` of a URL; `None` when the URL doesn't parse.
    fn origin_of(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        let origin = match parsed.port() {
            Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
            None => format!("{}://{host}", parsed.scheme()),
        };
        Some(origin)
    }

    /// Cached or freshly fetched robots rules for the URL's origin.
    /// `None` means a network failure — callers fail open.
    async fn robots_for(&self, url: &str) -> Option<Robots> {
        let origin = Self::origin_of(url)?;

        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&origin) {
                if entry.expires > Instant::now() {
                    return Some(entry.robots.clone());
                }
            }
        }

        let robots = match self.fetcher.fetch(&origin).await {
            Ok(Some(body)) => Robots::from_bytes(body.as_bytes(), &self.agent),
            Ok(None) => Robots::from_always(true, &self.agent),
            Err(e) => {
                warn!(origin, error = %e, "robots fetch failed, failing open");
                return None;
            }
        };

        debug!(origin, "robots.txt cached");
        let mut cache = self.cache.lock().await;
        cache.insert(
            origin,
            CacheEntry {
                robots: robots.clone(),
                expires: Instant::now() + self.ttl,
            },
        );
        Some(robots)
    }
}

impl Default for RobotsPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CrawlPolicy for RobotsPolicy {
    async fn is_allowed(&self, url: &str) -> bool {
        let parsed = match url::Url::parse(url) {
            Ok(u) => u,
            Err(_) => return false,
        };
        match self.robots_for(url).await {
            Some(robots) => robots.is_absolute_allowed(&parsed),
            None => true,
        }
    }

    async fn crawl_delay(&self, url: &str) -> Option<Duration> {
        self.robots_for(url).await?.crawl_delay()
    }
}
