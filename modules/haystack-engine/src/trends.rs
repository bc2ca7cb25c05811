//! Topic and geographic trend detection over recent crawl history.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::Serialize;

use haystack_common::types::CrawlRecord;
use haystack_store::Store;

const TREND_WINDOW_LIMIT: u32 = 500;
const GEO_TREND_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct TopicTrend {
    pub topic: String,
    pub count: usize,
    pub source_count: usize,
    /// "hot", "rising", or "steady"
    pub trend: &'static str,
}

/// Rank topics by frequency over the last `hours` of relevant crawl
/// history. Topics below `min_count` occurrences are dropped.
pub async fn topic_trends(store: &dyn Store, hours: i64, min_count: usize) -> Result<Vec<TopicTrend>> {
    let since = Utc::now() - Duration::hours(hours);
    let records = store
        .recent_relevant_since(since, TREND_WINDOW_LIMIT)
        .await?;
    Ok(rank_trends(&records, min_count))
}

/// A geographic hotspot: how often a geo tag was mentioned in the window.
#[derive(Debug, Clone, Serialize)]
pub struct GeoTrend {
    pub geo_tag: String,
    pub count: usize,
}

/// Rank geo tags by mention frequency over the last `hours` of relevant
/// crawl history. Returns the top 20 hotspots.
pub async fn geo_trends(store: &dyn Store, hours: i64) -> Result<Vec<GeoTrend>> {
    let since = Utc::now() - Duration::hours(hours);
    let records = store
        .recent_relevant_since(since, TREND_WINDOW_LIMIT)
        .await?;
    Ok(rank_geo_tags(&records))
}

fn rank_geo_tags(records: &[CrawlRecord]) -> Vec<GeoTrend> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for record in records {
        let tags = record
            .classification_data
            .as_ref()
            .and_then(|c| c.get("geo_tags"))
            .and_then(|t| t.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>())
            .unwrap_or_default();

        for tag in tags {
            *counts.entry(tag.to_string()).or_default() += 1;
        }
    }

    let mut hotspots: Vec<GeoTrend> = counts
        .into_iter()
        .map(|(geo_tag, count)| GeoTrend { geo_tag, count })
        .collect();

    hotspots.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.geo_tag.cmp(&b.geo_tag)));
    hotspots.truncate(GEO_TREND_LIMIT);
    hotspots
}

fn rank_trends(records: &[CrawlRecord], min_count: usize) -> Vec<TopicTrend> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut sources: HashMap<String, HashSet<String>> = HashMap::new();

    for record in records {
        let topics = record
            .classification_data
            .as_ref()
            .and_then(|c| c.get("topics"))
            .and_then(|t| t.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>())
            .unwrap_or_default();

        for topic in topics {
            *counts.entry(topic.to_string()).or_default() += 1;
            sources
                .entry(topic.to_string())
                .or_default()
                .insert(record.source_feed_id.clone());
        }
    }

    let mut trends: Vec<TopicTrend> = counts
        .into_iter()
        .filter(|(_, count)| *count >= min_count)
        .map(|(topic, count)| {
            let source_count = sources.get(&topic).map(|s| s.len()).unwrap_or(0);
            let trend = if source_count >= 3 && count >= 5 {
                "hot"
            } else if source_count >= 2 || count >= 4 {
                "rising"
            } else {
                "steady"
            };
            TopicTrend {
                topic,
                count,
                source_count,
                trend,
            }
        })
        .collect();

    trends.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.topic.cmp(&b.topic)));
    trends
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    fn record(source: &str, topics: &[&str]) -> CrawlRecord {
        let mut r = fixtures::crawl_record(source, "fp", false);
        r.classification_data = Some(serde_json::json!({ "topics": topics }));
        r
    }

    fn geo_record(source: &str, tags: &[&str]) -> CrawlRecord {
        let mut r = fixtures::crawl_record(source, "fp", false);
        r.classification_data = Some(serde_json::json!({ "geo_tags": tags }));
        r
    }

    #[test]
    fn below_min_count_is_dropped() {
        let records = vec![record("a", &["tourism"])];
        assert!(rank_trends(&records, 2).is_empty());
    }

    #[test]
    fn hot_needs_volume_and_source_diversity() {
        let mut records = Vec::new();
        for source in ["a", "b", "c"] {
            for _ in 0..2 {
                records.push(record(source, &["safety"]));
            }
        }
        let trends = rank_trends(&records, 2);
        assert_eq!(trends[0].topic, "safety");
        assert_eq!(trends[0].count, 6);
        assert_eq!(trends[0].source_count, 3);
        assert_eq!(trends[0].trend, "hot");
    }

    #[test]
    fn single_source_low_volume_is_steady() {
        let records = vec![record("a", &["culture"]), record("a", &["culture"])];
        let trends = rank_trends(&records, 2);
        assert_eq!(trends[0].trend, "steady");
    }

    #[tokio::test]
    async fn trends_read_the_recent_window() {
        let store = crate::testing::MockStore::new();
        for _ in 0..3 {
            store.push_crawl_record(record("src-a", &["snow_conditions"]));
        }

        let trends = topic_trends(&store, 24, 2).await.unwrap();
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].topic, "snow_conditions");
        assert_eq!(trends[0].count, 3);
    }

    #[test]
    fn sorted_by_count_descending() {
        let mut records = Vec::new();
        for _ in 0..5 {
            records.push(record("a", &["tourism"]));
        }
        for _ in 0..2 {
            records.push(record("a", &["events"]));
        }
        let trends = rank_trends(&records, 2);
        assert_eq!(trends[0].topic, "tourism");
        assert_eq!(trends[1].topic, "events");
    }

    #[test]
    fn geo_tags_ranked_by_mentions() {
        let mut records = Vec::new();
        for _ in 0..3 {
            records.push(geo_record("a", &["kutchan", "hirafu"]));
        }
        records.push(geo_record("b", &["hirafu"]));

        let hotspots = rank_geo_tags(&records);
        assert_eq!(hotspots[0].geo_tag, "hirafu");
        assert_eq!(hotspots[0].count, 4);
        assert_eq!(hotspots[1].geo_tag, "kutchan");
        assert_eq!(hotspots[1].count, 3);
    }

    #[test]
    fn geo_ranking_caps_at_twenty_hotspots() {
        let tags: Vec<String> = (0..25).map(|i| format!("area-{i:02}")).collect();
        let records: Vec<CrawlRecord> = tags
            .iter()
            .map(|tag| geo_record("a", &[tag.as_str()]))
            .collect();

        assert_eq!(rank_geo_tags(&records).len(), GEO_TREND_LIMIT);
    }

    #[test]
    fn records_without_geo_tags_are_ignored() {
        let records = vec![record("a", &["tourism"]), geo_record("a", &["niseko"])];
        let hotspots = rank_geo_tags(&records);
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].geo_tag, "niseko");
    }

    #[tokio::test]
    async fn geo_trends_read_the_recent_window() {
        let store = crate::testing::MockStore::new();
        for _ in 0..2 {
            store.push_crawl_record(geo_record("src-a", &["annupuri"]));
        }

        let hotspots = geo_trends(&store, 24).await.unwrap();
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].geo_tag, "annupuri");
        assert_eq!(hotspots[0].count, 2);
    }
}
