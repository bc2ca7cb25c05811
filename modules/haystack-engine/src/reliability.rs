//! Source reliability scoring: how often a source's relevant articles
//! actually become field notes.

use tracing::{error, info};

use haystack_store::Store;

const SCORE_WINDOW: u32 = 100;

/// Recompute and persist the reliability score for one source feed:
/// published / relevant × 100 over the last 100 relevant crawl records,
/// rounded to one decimal. Failures are logged, never propagated — scoring
/// is bookkeeping, not pipeline flow.
pub async fn update_source_reliability(store: &dyn Store, source_feed_id: &str) {
    let relevant = match store
        .recent_relevant_for_source(source_feed_id, SCORE_WINDOW)
        .await
    {
        Ok(records) => records,
        Err(e) => {
            error!(source_feed_id, error = %e, "reliability update failed");
            return;
        }
    };

    if relevant.is_empty() {
        return;
    }

    let total = relevant.len();
    let published = relevant.iter().filter(|r| r.field_note_id.is_some()).count();
    let score = ((published as f64 / total as f64) * 1000.0).round() / 10.0;

    if let Err(e) = store.set_reliability_score(source_feed_id, score).await {
        error!(source_feed_id, error = %e, "reliability score write failed");
        return;
    }

    info!(source_feed_id, score, published, relevant = total, "reliability updated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockStore};

    #[tokio::test]
    async fn score_is_published_over_relevant() {
        let store = MockStore::new();
        for i in 0..4 {
            store.push_crawl_record(fixtures::crawl_record(
                "src-1",
                &format!("fp-{i}"),
                i < 3, // 3 of 4 published
            ));
        }

        update_source_reliability(&store, "src-1").await;
        assert_eq!(store.reliability_score("src-1"), Some(75.0));
    }

    #[tokio::test]
    async fn no_history_writes_nothing() {
        let store = MockStore::new();
        update_source_reliability(&store, "src-1").await;
        assert_eq!(store.reliability_score("src-1"), None);
    }

    #[tokio::test]
    async fn score_rounds_to_one_decimal() {
        let store = MockStore::new();
        for i in 0..3 {
            store.push_crawl_record(fixtures::crawl_record(
                "src-1",
                &format!("fp-{i}"),
                i < 1, // 1 of 3 → 33.3%
            ));
        }

        update_source_reliability(&store, "src-1").await;
        assert_eq!(store.reliability_score("src-1"), Some(33.3));
    }
}
