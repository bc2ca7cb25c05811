//! Archiver: the terminal stage. Everything the cycle rejected — and any
//! flagged article the moderation sender failed to record — lands in
//! crawl history so future dedup sees it.

use anyhow::Result;
use serde_json::json;
use tracing::{error, info};

use haystack_common::text::truncate;
use haystack_common::types::{CrawlStatus, NewCrawlRecord};

use super::state::{PipelineDeps, PipelineState};

const BODY_SNAPSHOT_CAP: usize = 500;

pub(crate) async fn run(deps: &PipelineDeps, state: &mut PipelineState) -> Result<()> {
    let mut archived = 0usize;

    for article in &state.rejected {
        let raw = &article.raw;
        let mut record = NewCrawlRecord::new(
            raw.source_id.clone(),
            raw.source_url.clone(),
            article.content_fingerprint.clone(),
            state.run_id.clone(),
            json!({
                "title": raw.title,
                "body": truncate(&raw.body, BODY_SNAPSHOT_CAP),
            }),
            CrawlStatus::Rejected,
        );
        record.relevance_score = Some(article.relevance_score);
        record.was_duplicate = article.is_duplicate;
        record.classification_data = Some(json!({
            "topics": article.topics,
            "reasoning": article.reasoning,
        }));

        match deps.store.record_crawl(record).await {
            Ok(_) => archived += 1,
            Err(e) => {
                error!(title = %truncate(&raw.title, 60), error = %e, "archive failed");
            }
        }
    }

    // Flagged articles the moderation sender already recorded (with their
    // moderation link) are skipped — one crawl row per article per run.
    let mut flagged_archived = 0usize;
    for article in &state.flagged {
        let classified = &article.classified;
        if state
            .moderation_recorded
            .contains(&classified.content_fingerprint)
        {
            continue;
        }
        let raw = &classified.raw;

        let mut record = NewCrawlRecord::new(
            raw.source_id.clone(),
            raw.source_url.clone(),
            classified.content_fingerprint.clone(),
            state.run_id.clone(),
            json!({
                "title": raw.title,
                "body": truncate(&raw.body, BODY_SNAPSHOT_CAP),
            }),
            CrawlStatus::Flagged,
        );
        record.relevance_score = Some(classified.relevance_score);
        record.was_relevant = true;
        record.classification_data = Some(json!({
            "topics": classified.topics,
            "risk_flags": article.risk_flags.iter().map(|f| f.kind.clone()).collect::<Vec<_>>(),
        }));

        match deps.store.record_crawl(record).await {
            Ok(_) => flagged_archived += 1,
            Err(e) => {
                error!(title = %truncate(&raw.title, 60), error = %e, "flagged archive failed");
            }
        }
    }

    info!(
        rejected_archived = archived,
        flagged_archived, "archive done"
    );
    state.stats.archived_count = archived;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, TestDeps};
    use haystack_common::types::{CycleKind, RunKind};

    #[tokio::test]
    async fn rejected_articles_are_recorded_with_truncated_bodies() {
        let deps = TestDeps::new().build();
        let mut state =
            PipelineState::new("run-1".to_string(), RunKind::Manual, CycleKind::Main);
        let mut article = fixtures::classified_article("Long story", 0.1);
        article.raw.body = "word ".repeat(500);
        state.rejected = vec![article];

        run(&deps, &mut state).await.unwrap();

        let rows = deps.crawl_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, CrawlStatus::Rejected);
        let body = rows[0].raw_data["body"].as_str().unwrap();
        assert!(body.chars().count() <= BODY_SNAPSHOT_CAP);
        assert_eq!(state.stats.archived_count, 1);
    }

    #[tokio::test]
    async fn duplicate_flag_is_preserved() {
        let deps = TestDeps::new().build();
        let mut state =
            PipelineState::new("run-1".to_string(), RunKind::Manual, CycleKind::Main);
        let raw = fixtures::raw_article("Dup", "Same body");
        state.rejected = vec![haystack_common::types::ClassifiedArticle::duplicate(
            raw,
            "abc".to_string(),
            Some("canonical-1".to_string()),
            "Duplicate content detected via SimHash".to_string(),
        )];

        run(&deps, &mut state).await.unwrap();
        assert!(deps.crawl_rows()[0].was_duplicate);
    }

    #[tokio::test]
    async fn flagged_already_recorded_by_moderation_is_skipped() {
        let deps = TestDeps::new().build();
        let mut state =
            PipelineState::new("run-1".to_string(), RunKind::Manual, CycleKind::Main);
        let article = fixtures::enriched_article(20);
        state
            .moderation_recorded
            .insert(article.classified.content_fingerprint.clone());
        state.flagged = vec![article];

        run(&deps, &mut state).await.unwrap();
        assert!(deps.crawl_rows().is_empty());
    }

    #[tokio::test]
    async fn flagged_missed_by_moderation_is_archived() {
        let deps = TestDeps::new().build();
        let mut state =
            PipelineState::new("run-1".to_string(), RunKind::Manual, CycleKind::Main);
        state.flagged = vec![fixtures::enriched_article(20)];

        run(&deps, &mut state).await.unwrap();

        let rows = deps.crawl_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, CrawlStatus::Flagged);
        assert!(rows[0].moderation_item_id.is_none());
    }

    #[tokio::test]
    async fn archive_runs_with_empty_buckets() {
        let deps = TestDeps::new().build();
        let mut state =
            PipelineState::new("run-1".to_string(), RunKind::Manual, CycleKind::Main);
        run(&deps, &mut state).await.unwrap();
        assert!(deps.crawl_rows().is_empty());
    }
}
