//! Source collectors.
//!
//! One collector per source kind, all behind a single capability:
//! `collect(sources) -> (articles, errors)`. A failing source is recorded
//! and never aborts its siblings; a failing collector never aborts the
//! cycle. Dispatch is a registry keyed by source kind.

pub mod api;
pub mod feed;
pub mod scrape;
pub mod social;
pub mod tip;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use haystack_common::types::{Language, RawArticle, SourceFeed, SourceKind};

/// A per-source collection failure, carried as a value through the cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CollectError {
    pub source_id: String,
    pub source_name: String,
    pub collector_kind: SourceKind,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl CollectError {
    pub fn new(source: &SourceFeed, kind: SourceKind, error: impl Into<String>) -> Self {
        Self {
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            collector_kind: kind,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Collector: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Collect articles from the given sources. Per-source failures land
    /// in the error list; the call itself never fails.
    async fn collect(&self, sources: &[SourceFeed]) -> (Vec<RawArticle>, Vec<CollectError>);
}

/// Normalized article constructor shared by the collectors.
///
/// The source's reliability tier is propagated into the metadata for the
/// quality gate — unless the collector already stamped one (the social
/// collector force-tags `yellow_press` regardless of source config).
pub(crate) fn build_article(
    source: &SourceFeed,
    title: String,
    body: String,
    source_url: String,
    published_at: Option<DateTime<Utc>>,
    author: Option<String>,
    language: Language,
    mut metadata: Map<String, Value>,
) -> RawArticle {
    if !metadata.contains_key("reliability_tier") {
        metadata.insert(
            "reliability_tier".to_string(),
            Value::String(source.reliability_tier.to_string()),
        );
    }

    let body = if body.trim().is_empty() {
        title.clone()
    } else {
        body
    };

    RawArticle {
        source_id: source.id.clone(),
        source_kind: source.source_kind,
        source_url,
        source_name: source.name.clone(),
        title,
        body,
        published_at,
        author,
        language,
        raw_metadata: Value::Object(metadata),
        fetched_at: Utc::now(),
    }
}

/// Collector dispatch table, keyed by source kind.
#[derive(Default, Clone)]
pub struct CollectorRegistry {
    collectors: HashMap<SourceKind, Arc<dyn Collector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collectors.insert(collector.kind(), collector);
        self
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn Collector>> {
        self.collectors.get(&kind).cloned()
    }
}
