//! Web scraper for sites without feeds.
//!
//! Honors robots.txt (including Crawl-delay as a per-authority rate
//! override) and the per-authority token bucket. Article extraction is
//! driven by per-source CSS selectors with a whole-page fallback.
//!
//! All DOM work happens in synchronous helpers: `scraper::Html` is not
//! `Send` and must never be held across an await.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{Html, Node, Selector};
use serde_json::{json, Map};
use tracing::{debug, error, info, warn};

use haystack_common::config::USER_AGENT;
use haystack_common::text::{detect_language, html_to_text};
use haystack_common::types::{RawArticle, SourceFeed, SourceKind};

use crate::infra::authority_of;
use crate::infra::rate_limit::RateLimiter;
use crate::infra::robots::CrawlPolicy;

use super::{build_article, CollectError, Collector};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_ARTICLES: u64 = 15;
const MIN_PAGE_BODY_CHARS: usize = 50;

const DEFAULT_ARTICLE_SELECTOR: &str = "article";
const DEFAULT_TITLE_SELECTOR: &str = "h1, h2, h3";
const DEFAULT_BODY_SELECTOR: &str = "p";
const DEFAULT_LINK_SELECTOR: &str = "a[href]";
const DEFAULT_AUTHOR_SELECTOR: &str = ".author, [rel='author'], .byline";

pub struct ScrapeCollector {
    http: reqwest::Client,
    robots: Arc<dyn CrawlPolicy>,
    limiter: Arc<RateLimiter>,
}

/// An article pulled out of the DOM, before robots rechecks.
#[derive(Debug, Clone)]
pub(crate) struct ArticleCandidate {
    pub title: String,
    pub body: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub scrape_method: &'static str,
}

impl ScrapeCollector {
    pub fn new(robots: Arc<dyn CrawlPolicy>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .expect("Failed to build scraper HTTP client"),
            robots,
            limiter,
        }
    }

    async fn scrape_source(&self, source: &SourceFeed) -> Result<Vec<RawArticle>> {
        if !self.robots.is_allowed(&source.url).await {
            warn!(url = %source.url, "robots.txt disallows scraping");
            return Ok(Vec::new());
        }

        self.limiter.acquire(&source.url).await;

        let timeout = source.config_u64("timeout", DEFAULT_TIMEOUT_SECS);
        let response = self
            .http
            .get(&source.url)
            .timeout(Duration::from_secs(timeout))
            .send()
            .await
            .context("page fetch failed")?
            .error_for_status()
            .context("page fetch returned error status")?;
        let html = response.text().await.context("failed to read page body")?;

        let candidates = extract_candidates(&html, source);

        let mut articles = Vec::new();
        for candidate in candidates {
            // Article links may leave the fetched page; recheck robots.
            if candidate.url != source.url && !self.robots.is_allowed(&candidate.url).await {
                debug!(url = %candidate.url, "article link disallowed by robots");
                continue;
            }

            let language = detect_language(&candidate.body);
            let mut metadata = Map::new();
            metadata.insert("scrape_method".to_string(), json!(candidate.scrape_method));
            metadata.insert("page_url".to_string(), json!(source.url));

            articles.push(build_article(
                source,
                candidate.title,
                candidate.body,
                candidate.url,
                candidate.published_at,
                candidate.author,
                language,
                metadata,
            ));
        }

        Ok(articles)
    }
}

#[async_trait]
impl Collector for ScrapeCollector {
    fn kind(&self) -> SourceKind {
        SourceKind::Scrape
    }

    async fn collect(&self, sources: &[SourceFeed]) -> (Vec<RawArticle>, Vec<CollectError>) {
        let mut articles = Vec::new();
        let mut errors = Vec::new();

        for source in sources {
            // A robots Crawl-delay overrides our default pacing for the domain.
            if let Some(delay) = self.robots.crawl_delay(&source.url).await {
                let secs = delay.as_secs_f64();
                if secs > 0.0 {
                    self.limiter
                        .set_authority_rate(&authority_of(&source.url), 1.0 / secs, Some(1))
                        .await;
                }
            }

            match self.scrape_source(source).await {
                Ok(fetched) => {
                    info!(source = %source.name, count = fetched.len(), "scraper collected");
                    articles.extend(fetched);
                }
                Err(e) => {
                    error!(source = %source.name, error = %e, "scraper failed");
                    errors.push(CollectError::new(source, SourceKind::Scrape, e.to_string()));
                }
            }
        }

        (articles, errors)
    }
}

fn selector_or(source: &SourceFeed, key: &str, default: &'static str) -> Selector {
    let raw = source.config_str(key).unwrap_or(default);
    Selector::parse(raw)
        .or_else(|_| Selector::parse(default))
        .expect("default selector must parse")
}

/// Extract article candidates from a page. Containers matching the
/// configured article selector each yield one candidate; when none match,
/// the whole page collapses into a single candidate.
pub(crate) fn extract_candidates(html: &str, source: &SourceFeed) -> Vec<ArticleCandidate> {
    let document = Html::parse_document(html);

    let article_selector = selector_or(source, "article_selector", DEFAULT_ARTICLE_SELECTOR);
    let max_articles = source.config_u64("max_entries", DEFAULT_MAX_ARTICLES) as usize;

    let containers: Vec<_> = document.select(&article_selector).take(max_articles).collect();
    if containers.is_empty() {
        return extract_whole_page(&document, &source.url).into_iter().collect();
    }

    let title_selector = selector_or(source, "title_selector", DEFAULT_TITLE_SELECTOR);
    let body_selector = selector_or(source, "body_selector", DEFAULT_BODY_SELECTOR);
    let link_selector = selector_or(source, "link_selector", DEFAULT_LINK_SELECTOR);
    let author_selector = selector_or(source, "author_selector", DEFAULT_AUTHOR_SELECTOR);
    let time_selector = Selector::parse("time[datetime]").expect("time selector must parse");

    let mut candidates = Vec::new();
    for container in containers {
        let title = match container.select(&title_selector).next() {
            Some(el) => el.text().collect::<String>().trim().to_string(),
            None => continue,
        };
        if title.is_empty() {
            continue;
        }

        let mut body = container
            .select(&body_selector)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if body.is_empty() {
            body = html_to_text(&container.html());
        }
        if body.is_empty() {
            body = title.clone();
        }

        let url = container
            .select(&link_selector)
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| resolve_link(&source.url, href))
            .unwrap_or_else(|| source.url.clone());

        let published_at = container
            .select(&time_selector)
            .next()
            .and_then(|el| el.value().attr("datetime"))
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let author = container
            .select(&author_selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty());

        candidates.push(ArticleCandidate {
            title,
            body,
            url,
            published_at,
            author,
            scrape_method: "selectors",
        });
    }

    candidates
}

/// Resolve an article href against the page URL. Absolute links pass
/// through; relative links join the base.
pub(crate) fn resolve_link(base: &str, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    url::Url::parse(base)
        .ok()?
        .join(href)
        .ok()
        .map(|u| u.to_string())
}

const PAGE_SKIP_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript",
];
const PAGE_SKIP_CLASSES: &[&str] = &["sidebar", "menu"];

/// Fall back to treating the page as one article: strip chrome, find a
/// main content area, and require a minimum of real text.
fn extract_whole_page(document: &Html, url: &str) -> Option<ArticleCandidate> {
    let title_sel = Selector::parse("h1").expect("h1 selector must parse");
    let fallback_title_sel = Selector::parse("title").expect("title selector must parse");
    let main_sel =
        Selector::parse("main, article, .content, #content, .post").expect("main selector");

    let title = document
        .select(&title_sel)
        .next()
        .or_else(|| document.select(&fallback_title_sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    let body = match document.select(&main_sel).next() {
        Some(main) => {
            let mut out = String::new();
            for child in main.children() {
                page_text(child, &mut out);
            }
            out
        }
        None => {
            let mut out = String::new();
            for child in document.tree.root().children() {
                page_text(child, &mut out);
            }
            out
        }
    };
    let body = haystack_common::text::clean_whitespace(&body);

    if body.len() < MIN_PAGE_BODY_CHARS {
        return None;
    }

    Some(ArticleCandidate {
        title,
        body,
        url: url.to_string(),
        published_at: None,
        author: None,
        scrape_method: "whole_page",
    })
}

/// Collect page text while skipping navigation chrome.
fn page_text(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(&text),
        Node::Element(element) => {
            if PAGE_SKIP_TAGS.contains(&element.name()) {
                return;
            }
            if let Some(class) = element.attr("class") {
                if PAGE_SKIP_CLASSES.iter().any(|skip| class.contains(skip)) {
                    return;
                }
            }
            for child in node.children() {
                page_text(child, out);
            }
            out.push(' ');
        }
        _ => {
            for child in node.children() {
                page_text(child, out);
            }
        }
    }
}
