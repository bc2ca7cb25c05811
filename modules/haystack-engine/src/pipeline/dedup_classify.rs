//! Dedup + classify stage.
//!
//! Phase A: SimHash fingerprint, exact-match lookup against crawl history.
//! Phase B: cross-language LLM probe for survivors.
//! Phase C: batched relevance classification, routed against the adaptive
//! threshold for each article's topics.
//!
//! No article is lost here: anything that cannot be classified is rejected
//! with a diagnostic reasoning string and archived downstream.

use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::{error, info, warn};

use ai_client::generate_json;
use haystack_common::fingerprint::simhash;
use haystack_common::text::truncate;
use haystack_common::types::{ClassifiedArticle, Priority, RawArticle};

use crate::prompts;

use super::cross_lang;
use super::state::{PipelineDeps, PipelineState};

const BATCH_SIZE: usize = 5;

/// Wrapper keys an LLM sometimes hides a batch array behind.
const BATCH_WRAPPER_KEYS: &[&str] = &["articles", "results", "classifications"];

/// One article's classification as returned by the LLM.
#[derive(Debug, Clone)]
pub(crate) struct Classification {
    pub relevance_score: f64,
    pub topics: Vec<String>,
    pub geo_tags: Vec<String>,
    pub priority: Priority,
    pub reasoning: String,
}

impl Classification {
    /// Lenient decode — a missing field degrades, it does not reject.
    pub(crate) fn from_value(value: &Value) -> Self {
        let strings = |key: &str| -> Vec<String> {
            value
                .get(key)
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default()
        };

        Self {
            relevance_score: value
                .get("relevance_score")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
            topics: strings("topics"),
            geo_tags: strings("geo_tags"),
            priority: value
                .get("priority")
                .and_then(|v| v.as_str())
                .map(Priority::from_label)
                .unwrap_or_default(),
            reasoning: value
                .get("reasoning")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn into_article(self, raw: RawArticle, fingerprint: String) -> ClassifiedArticle {
        ClassifiedArticle {
            raw,
            relevance_score: self.relevance_score,
            topics: self.topics,
            geo_tags: self.geo_tags,
            priority: self.priority,
            is_duplicate: false,
            duplicate_of: None,
            content_fingerprint: fingerprint,
            reasoning: self.reasoning,
        }
    }
}

pub(crate) async fn run(deps: &PipelineDeps, state: &mut PipelineState) -> Result<()> {
    if state.raw_articles.is_empty() {
        return Ok(());
    }

    let mut classified = Vec::new();
    let mut rejected = Vec::new();
    let mut to_classify: Vec<(RawArticle, String)> = Vec::new();

    // --- Phase A + B: dedup before any classification spend ---
    for article in state.raw_articles.clone() {
        let fingerprint = simhash(&format!("{} {}", article.title, article.body));

        match deps.store.find_by_fingerprint(&fingerprint).await {
            Ok(Some(existing)) => {
                info!(title = %truncate(&article.title, 60), "duplicate");
                let canonical = existing.field_note_id.clone().or(Some(existing.id));
                rejected.push(ClassifiedArticle::duplicate(
                    article,
                    fingerprint,
                    canonical,
                    "Duplicate content detected via SimHash".to_string(),
                ));
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                error!(title = %truncate(&article.title, 60), error = %e, "dedup lookup failed");
                rejected.push(ClassifiedArticle::rejected(
                    article,
                    fingerprint,
                    format!("Dedup error: {e}"),
                ));
                continue;
            }
        }

        match cross_lang::check(deps, &article).await {
            Ok(Some(found)) => {
                info!(title = %truncate(&article.title, 60), "cross-language duplicate");
                rejected.push(ClassifiedArticle::duplicate(
                    article,
                    fingerprint,
                    found.duplicate_of,
                    format!("Cross-language duplicate: {}", found.reasoning),
                ));
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                error!(title = %truncate(&article.title, 60), error = %e, "cross-language dedup failed");
                rejected.push(ClassifiedArticle::rejected(
                    article,
                    fingerprint,
                    format!("Dedup error: {e}"),
                ));
                continue;
            }
        }

        to_classify.push((article, fingerprint));
    }

    // --- Phase C: batched classification ---
    let mut classified_sources: BTreeSet<String> = BTreeSet::new();

    for batch in to_classify.chunks(BATCH_SIZE) {
        match classify_batch(deps, batch).await {
            Ok(results) => {
                for ((article, fingerprint), result) in batch.iter().cloned().zip(results) {
                    classified_sources.insert(article.source_id.clone());

                    let threshold = deps.thresholds.effective_threshold(&result.topics);
                    let score = result.relevance_score;
                    let item = result.into_article(article, fingerprint);

                    info!(
                        title = %truncate(&item.raw.title, 60),
                        score,
                        threshold,
                        relevant = score >= threshold,
                        "classified"
                    );

                    if score >= threshold {
                        classified.push(item);
                    } else {
                        rejected.push(item);
                    }
                }
            }
            Err(e) => {
                error!(batch_size = batch.len(), error = %e, "batch classification failed");
                for (article, fingerprint) in batch.iter().cloned() {
                    rejected.push(ClassifiedArticle::rejected(
                        article,
                        fingerprint,
                        format!("Batch classification error: {e}"),
                    ));
                }
            }
        }
    }

    // One timestamp write per source, however many articles it emitted.
    for source_id in classified_sources {
        if let Err(e) = deps.store.mark_source_fetched(&source_id, None).await {
            warn!(source_id, error = %e, "failed to mark source fetched");
        }
    }

    info!(
        classified = classified.len(),
        rejected = rejected.len(),
        "dedup+classify done"
    );

    state.stats.classified_count = classified.len();
    state.stats.rejected_count = rejected.len();
    state.classified = classified;
    state.rejected = rejected;
    Ok(())
}

/// Classify up to `BATCH_SIZE` articles in one LLM call, falling back to
/// per-article calls when the batch answer cannot be aligned.
async fn classify_batch(
    deps: &PipelineDeps,
    batch: &[(RawArticle, String)],
) -> Result<Vec<Classification>> {
    if batch.len() == 1 {
        let value = classify_single(deps, &batch[0].0).await?;
        return Ok(vec![Classification::from_value(&value)]);
    }

    let articles: Vec<&RawArticle> = batch.iter().map(|(article, _)| article).collect();
    let prompt = prompts::classify_batch_prompt(&articles);
    let response = generate_json(deps.llm.as_ref(), prompts::CLASSIFY_SYSTEM, &prompt, 0.1).await?;

    if let Some(values) = align_batch_response(&response, batch.len()) {
        return Ok(values.iter().map(Classification::from_value).collect());
    }

    warn!(
        expected = batch.len(),
        "batch response misaligned, falling back to per-article calls"
    );
    let mut results = Vec::with_capacity(batch.len());
    for (article, _) in batch {
        let value = classify_single(deps, article).await?;
        results.push(Classification::from_value(&value));
    }
    Ok(results)
}

async fn classify_single(deps: &PipelineDeps, article: &RawArticle) -> Result<Value> {
    let prompt = prompts::classify_prompt(article);
    generate_json(deps.llm.as_ref(), prompts::CLASSIFY_SYSTEM, &prompt, 0.1)
        .await
        .map_err(|e| anyhow!("classification failed: {e}"))
}

/// Align a batch response with the batch: a bare array of the right
/// length, or one hidden under a known wrapper key.
pub(crate) fn align_batch_response(response: &Value, expected: usize) -> Option<Vec<Value>> {
    if let Some(arr) = response.as_array() {
        if arr.len() == expected {
            return Some(arr.clone());
        }
    }

    if let Some(obj) = response.as_object() {
        for key in BATCH_WRAPPER_KEYS {
            if let Some(arr) = obj.get(*key).and_then(|v| v.as_array()) {
                if arr.len() == expected {
                    return Some(arr.clone());
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::PipelineState;
    use crate::testing::{fixtures, TestDeps};
    use haystack_common::types::{CycleKind, RunKind};
    use serde_json::json;

    fn state_with_articles(articles: Vec<RawArticle>) -> PipelineState {
        let mut state =
            PipelineState::new("run-1".to_string(), RunKind::Manual, CycleKind::Main);
        state.raw_articles = articles;
        state
    }

    #[tokio::test]
    async fn source_is_marked_fetched_once_per_cycle() {
        // Two articles from the same source must produce ONE timestamp
        // write, not two.
        let mut first = fixtures::raw_article("First story", "Body one");
        first.source_id = "src-9".to_string();
        let mut second = fixtures::raw_article("Second story", "Body two");
        second.source_id = "src-9".to_string();

        let deps = TestDeps::new()
            .with_llm_responses(vec![
                r#"[{"relevance_score": 0.8, "topics": [], "geo_tags": [], "priority": "normal", "reasoning": "a"},
                    {"relevance_score": 0.7, "topics": [], "geo_tags": [], "priority": "normal", "reasoning": "b"}]"#,
            ])
            .build();
        let mut state = state_with_articles(vec![first, second]);

        run(&deps, &mut state).await.unwrap();

        assert_eq!(state.classified.len(), 2);
        let fetched = deps.store_handle().fetched_sources();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].0, "src-9");
    }

    #[tokio::test]
    async fn misaligned_batch_falls_back_to_per_article_calls() {
        let deps = TestDeps::new()
            .with_llm_responses(vec![
                // Batch answer with no usable array
                r#"{"note": "I could not format that as requested"}"#,
                r#"{"relevance_score": 0.9, "topics": ["tourism"], "geo_tags": [], "priority": "normal", "reasoning": "one"}"#,
                r#"{"relevance_score": 0.1, "topics": [], "geo_tags": [], "priority": "low", "reasoning": "two"}"#,
            ])
            .build();
        let mut state = state_with_articles(vec![
            fixtures::raw_article("Relevant story", "About Niseko"),
            fixtures::raw_article("Irrelevant story", "About elsewhere"),
        ]);

        run(&deps, &mut state).await.unwrap();

        assert_eq!(deps.llm_calls(), 3);
        assert_eq!(state.classified.len(), 1);
        assert_eq!(state.rejected.len(), 1);
        assert_eq!(state.classified[0].reasoning, "one");
    }

    #[tokio::test]
    async fn classification_failure_rejects_with_diagnostic() {
        // Queue runs dry immediately: the whole batch is rejected with a
        // diagnostic reasoning string, nothing is lost.
        let deps = TestDeps::new().build();
        let mut state = state_with_articles(vec![fixtures::raw_article("Story", "Body")]);

        run(&deps, &mut state).await.unwrap();

        assert!(state.classified.is_empty());
        assert_eq!(state.rejected.len(), 1);
        assert!(state.rejected[0]
            .reasoning
            .starts_with("Batch classification error"));
        // Failed sources are not stamped as fetched.
        assert!(deps.store_handle().fetched_sources().is_empty());
    }

    #[test]
    fn align_accepts_bare_array() {
        let response = json!([{ "relevance_score": 0.5 }, { "relevance_score": 0.2 }]);
        assert_eq!(align_batch_response(&response, 2).unwrap().len(), 2);
    }

    #[test]
    fn align_unwraps_known_keys() {
        for key in ["articles", "results", "classifications"] {
            let response = json!({ key: [{ "relevance_score": 0.5 }] });
            assert_eq!(align_batch_response(&response, 1).unwrap().len(), 1);
        }
    }

    #[test]
    fn align_rejects_wrong_length() {
        let response = json!([{ "relevance_score": 0.5 }]);
        assert!(align_batch_response(&response, 2).is_none());
        let wrapped = json!({ "articles": [{}, {}, {}] });
        assert!(align_batch_response(&wrapped, 2).is_none());
    }

    #[test]
    fn classification_decodes_leniently() {
        let c = Classification::from_value(&json!({
            "relevance_score": 0.8,
            "topics": ["tourism", 42],
            "priority": "breaking",
        }));
        assert_eq!(c.relevance_score, 0.8);
        assert_eq!(c.topics, vec!["tourism".to_string()]);
        assert!(c.geo_tags.is_empty());
        assert_eq!(c.priority, Priority::Breaking);
        assert!(c.reasoning.is_empty());

        let empty = Classification::from_value(&json!({}));
        assert_eq!(empty.relevance_score, 0.0);
        assert_eq!(empty.priority, Priority::Normal);
    }
}
