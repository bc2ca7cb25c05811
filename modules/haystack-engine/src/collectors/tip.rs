//! Tip ingester: turns approved reader tips from the moderation queue into
//! pipeline articles.
//!
//! Ignores its source argument entirely — tips live in the moderation
//! queue, not in source_feeds. Idempotent via the `ingested` metadata
//! flag: a tip yields an article exactly once.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info};

use haystack_common::text::detect_language;
use haystack_common::types::{ModerationItem, RawArticle, SourceFeed, SourceKind};
use haystack_store::Store;

use super::{CollectError, Collector};

const TIP_BATCH_LIMIT: u32 = 20;

pub struct TipCollector {
    store: Arc<dyn Store>,
}

impl TipCollector {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn ingest_tips(&self, articles: &mut Vec<RawArticle>) -> Result<()> {
        let tips = self.store.approved_tips(TIP_BATCH_LIMIT).await?;

        for tip in tips {
            let metadata = match tip.metadata.as_object() {
                Some(map) => map.clone(),
                None => serde_json::Map::new(),
            };
            if metadata
                .get("ingested")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
            {
                continue;
            }
            if tip.content.trim().is_empty() {
                continue;
            }

            articles.push(tip_article(&tip));

            let mut updated = metadata;
            updated.insert("ingested".to_string(), json!(true));
            self.store
                .update_moderation_metadata(&tip.id, Value::Object(updated))
                .await?;
        }

        info!(count = articles.len(), "tips ingested");
        Ok(())
    }
}

#[async_trait]
impl Collector for TipCollector {
    fn kind(&self) -> SourceKind {
        SourceKind::Tip
    }

    async fn collect(&self, _sources: &[SourceFeed]) -> (Vec<RawArticle>, Vec<CollectError>) {
        // Articles ingested before a mid-batch failure are kept; their
        // moderation rows are already flagged, so dropping them would
        // lose the tips for good.
        let mut articles = Vec::new();
        match self.ingest_tips(&mut articles).await {
            Ok(()) => (articles, Vec::new()),
            Err(e) => {
                error!(error = %e, "tip ingestion failed");
                let error = CollectError {
                    source_id: "moderation_queue".to_string(),
                    source_name: "User Tips".to_string(),
                    collector_kind: SourceKind::Tip,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                };
                (articles, vec![error])
            }
        }
    }
}

/// Synthesize a RawArticle from an approved tip. The synthetic
/// `tip://<id>` URL keeps crawl-history rows unique per tip.
fn tip_article(tip: &ModerationItem) -> RawArticle {
    let content = tip.content.trim();
    let title: String = content.chars().take(100).collect::<String>().trim().to_string();
    let language = detect_language(content);

    RawArticle {
        source_id: tip.id.clone(),
        source_kind: SourceKind::Tip,
        source_url: format!("tip://{}", tip.id),
        source_name: "User Tip".to_string(),
        title,
        body: content.to_string(),
        published_at: tip.created_at,
        author: tip.submitter_email.clone(),
        language,
        raw_metadata: json!({
            "tip_id": tip.id,
            "submitter_email": tip.submitter_email,
            "original_metadata": tip.metadata,
        }),
        fetched_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockStore};
    use haystack_common::types::Language;

    fn store_with_tips(contents: &[&str]) -> Arc<MockStore> {
        let store = Arc::new(MockStore::new());
        for (i, content) in contents.iter().enumerate() {
            store.push_moderation_item(fixtures::approved_tip(&format!("tip-{i}"), content));
        }
        store
    }

    #[tokio::test]
    async fn tips_become_articles_with_synthetic_urls() {
        let store = store_with_tips(&["The bridge on Route 66 is icing over near the school."]);
        let collector = TipCollector::new(store.clone());

        let (articles, errors) = collector.collect(&[]).await;
        assert!(errors.is_empty());
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source_url, "tip://tip-0");
        assert_eq!(articles[0].source_kind, SourceKind::Tip);
        assert!(articles[0].title.starts_with("The bridge on Route 66"));
    }

    #[tokio::test]
    async fn second_run_yields_nothing() {
        let store = store_with_tips(&["Tip one", "Tip two"]);
        let collector = TipCollector::new(store.clone());

        let (first, _) = collector.collect(&[]).await;
        assert_eq!(first.len(), 2);

        // Every ingested tip now carries the flag
        for tip in store.moderation_items() {
            assert_eq!(tip.metadata["ingested"], json!(true));
        }

        let (second, errors) = collector.collect(&[]).await;
        assert!(second.is_empty());
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn empty_tips_are_skipped() {
        let store = store_with_tips(&["   "]);
        let collector = TipCollector::new(store);
        let (articles, _) = collector.collect(&[]).await;
        assert!(articles.is_empty());
    }

    #[tokio::test]
    async fn japanese_tip_detected() {
        let store = store_with_tips(&["ニセコの道路が凍結しています。注意してください。"]);
        let collector = TipCollector::new(store);
        let (articles, _) = collector.collect(&[]).await;
        assert_eq!(articles[0].language, Language::Ja);
    }

    #[tokio::test]
    async fn store_failure_is_reported_as_collect_error() {
        let store = Arc::new(MockStore::new());
        store.fail_next("approved_tips");
        let collector = TipCollector::new(store);

        let (articles, errors) = collector.collect(&[]).await;
        assert!(articles.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source_id, "moderation_queue");
    }
}
