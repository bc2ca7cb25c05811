//! Adaptive relevance thresholds learned from editorial acceptance rates.
//!
//! Topics whose articles keep becoming field notes get a lower bar; topics
//! editors keep discarding get a higher one. Adjustments are bounded to
//! base ± 0.15 and the result clamped to [0.15, 0.80].
//!
//! Single writer (the schedule stage refresh), many readers (the
//! classifier) — an atomically swapped map, no locks on the read path.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{error, info};

use haystack_common::types::CrawlRecord;
use haystack_store::Store;

const MAX_ADJUSTMENT: f64 = 0.15;
const MIN_THRESHOLD: f64 = 0.15;
const MAX_THRESHOLD: f64 = 0.80;
const SAMPLE_WINDOW: u32 = 1000;
const MIN_SAMPLES: usize = 10;

pub struct AdaptiveThresholds {
    base: f64,
    cache: ArcSwap<HashMap<String, f64>>,
}

impl AdaptiveThresholds {
    pub fn new(base: f64) -> Self {
        Self {
            base,
            cache: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Recompute per-topic thresholds from recent relevant crawl history.
    /// A store failure keeps the previous cache.
    pub async fn refresh(&self, store: &dyn Store) {
        let records = match store.recent_relevant(SAMPLE_WINDOW).await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "adaptive threshold refresh failed");
                return;
            }
        };

        let thresholds = compute_thresholds(self.base, &records);
        info!(topics = thresholds.len(), "adaptive thresholds refreshed");
        self.cache.store(Arc::new(thresholds));
    }

    /// Effective threshold for an article's topics: the minimum (most
    /// permissive) cached value, or the base when nothing is cached.
    pub fn effective_threshold(&self, topics: &[String]) -> f64 {
        let cache = self.cache.load();
        topics
            .iter()
            .filter_map(|topic| cache.get(topic).copied())
            .fold(None, |lowest: Option<f64>, t| {
                Some(lowest.map_or(t, |l| l.min(t)))
            })
            .unwrap_or(self.base)
    }

    #[cfg(test)]
    pub(crate) fn set_for_tests(&self, thresholds: HashMap<String, f64>) {
        self.cache.store(Arc::new(thresholds));
    }
}

/// Per-topic acceptance stats → thresholds. Pure so the algebra is testable.
fn compute_thresholds(base: f64, records: &[CrawlRecord]) -> HashMap<String, f64> {
    let mut stats: HashMap<String, (usize, usize)> = HashMap::new();

    for record in records {
        let topics = record
            .classification_data
            .as_ref()
            .and_then(|c| c.get("topics"))
            .and_then(|t| t.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let published = record.field_note_id.is_some();

        for topic in topics {
            let entry = stats.entry(topic).or_insert((0, 0));
            entry.0 += 1;
            if published {
                entry.1 += 1;
            }
        }
    }

    let mut thresholds = HashMap::new();
    for (topic, (total, published)) in stats {
        if total < MIN_SAMPLES {
            continue;
        }

        let acceptance = published as f64 / total as f64;
        let adjustment = if acceptance > 0.6 {
            -MAX_ADJUSTMENT * ((acceptance - 0.6) / 0.4).min(1.0)
        } else if acceptance < 0.2 {
            MAX_ADJUSTMENT * ((0.2 - acceptance) / 0.2).min(1.0)
        } else {
            0.0
        };

        let threshold = (base + adjustment).clamp(MIN_THRESHOLD, MAX_THRESHOLD);
        thresholds.insert(topic, (threshold * 1000.0).round() / 1000.0);
    }

    thresholds
}
