//! Enrich stage: 5W1H extraction, quotes, evidence, risk flags.
//!
//! Japanese articles are translated first. An article that cannot be
//! enriched is never dropped: it gets a minimal record with confidence 10
//! and an error note in its source log, and the quality gate disposes of
//! it.

use anyhow::Result;
use serde_json::Value;
use tracing::{error, info};

use ai_client::generate_json;
use haystack_common::text::truncate;
use haystack_common::types::{
    ClassifiedArticle, EnrichedArticle, EvidenceRef, FactCheckNote, Language, Quote, RiskFlag,
    SourceLogEntry,
};

use crate::prompts;
use crate::translate::translate_article;

use super::state::{PipelineDeps, PipelineState};

const DEFAULT_CONFIDENCE: i64 = 50;
const FAILURE_CONFIDENCE: i64 = 10;

pub(crate) async fn run(deps: &PipelineDeps, state: &mut PipelineState) -> Result<()> {
    if state.classified.is_empty() {
        return Ok(());
    }

    let mut enriched = Vec::new();
    let mut translated_count = 0usize;

    for article in state.classified.clone() {
        let raw = &article.raw;

        let (title, body) = if raw.language == Language::Ja {
            let translation = translate_article(deps.llm.as_ref(), &raw.title, &raw.body).await;
            translated_count += 1;
            info!(
                original_title = %truncate(&raw.title, 40),
                english_title = %truncate(&translation.title_en, 60),
                "translated"
            );
            (translation.title_en, translation.body_en)
        } else {
            (raw.title.clone(), raw.body.clone())
        };

        let published = raw
            .published_at
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "Unknown".to_string());
        let prompt = prompts::enrich_prompt(
            &title,
            &raw.source_name,
            &raw.language.to_string(),
            &published,
            &body,
        );

        match generate_json(deps.llm.as_ref(), prompts::ENRICH_SYSTEM, &prompt, 0.1).await {
            Ok(result) => {
                let item = enriched_from(article, &result);
                info!(
                    title = %truncate(&item.classified.raw.title, 60),
                    confidence = item.confidence_score,
                    risk_flags = item.risk_flags.len(),
                    "enriched"
                );
                enriched.push(item);
            }
            Err(e) => {
                error!(title = %truncate(&raw.title, 60), error = %e, "enrichment failed");
                enriched.push(minimal_enriched(article, &e.to_string()));
            }
        }
    }

    state.stats.enriched_count = enriched.len();
    state.stats.translated_count = translated_count;
    state.enriched = enriched;
    Ok(())
}

fn opt_string(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn typed_list<T: serde::de::DeserializeOwned>(value: &Value, key: &str) -> Vec<T> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Map an enrichment response onto the article. Missing fields degrade:
/// `what` falls back to the title, confidence to 50, lists to empty.
pub(crate) fn enriched_from(article: ClassifiedArticle, result: &Value) -> EnrichedArticle {
    let raw = &article.raw;
    let source_log = vec![SourceLogEntry {
        source_name: raw.source_name.clone(),
        source_url: raw.source_url.clone(),
        source_kind: raw.source_kind,
        fetched_at: raw.fetched_at,
        enrichment_error: None,
    }];

    let what = opt_string(result, "what").unwrap_or_else(|| raw.title.clone());
    let quotes: Vec<Quote> = typed_list::<Quote>(result, "quotes")
        .into_iter()
        .filter(|q| !q.text.is_empty())
        .collect();

    EnrichedArticle {
        who: opt_string(result, "who"),
        what,
        when_occurred: opt_string(result, "when_occurred"),
        where_location: opt_string(result, "where_location"),
        why: opt_string(result, "why"),
        how: opt_string(result, "how"),
        quotes,
        evidence_refs: typed_list::<EvidenceRef>(result, "evidence_refs"),
        risk_flags: typed_list::<RiskFlag>(result, "risk_flags"),
        fact_check_notes: typed_list::<FactCheckNote>(result, "fact_check_notes"),
        confidence_score: result
            .get("confidence_score")
            .and_then(|v| v.as_i64())
            .unwrap_or(DEFAULT_CONFIDENCE),
        source_log,
        classified: article,
    }
}

/// The failure shape: confidence 10, error recorded in the source log.
pub(crate) fn minimal_enriched(article: ClassifiedArticle, error: &str) -> EnrichedArticle {
    let raw = &article.raw;
    let source_log = vec![SourceLogEntry {
        source_name: raw.source_name.clone(),
        source_url: raw.source_url.clone(),
        source_kind: raw.source_kind,
        fetched_at: raw.fetched_at,
        enrichment_error: Some(error.to_string()),
    }];

    EnrichedArticle {
        who: None,
        what: raw.title.clone(),
        when_occurred: raw.published_at.map(|dt| dt.to_rfc3339()),
        where_location: None,
        why: None,
        how: None,
        quotes: Vec::new(),
        evidence_refs: Vec::new(),
        risk_flags: Vec::new(),
        fact_check_notes: Vec::new(),
        confidence_score: FAILURE_CONFIDENCE,
        source_log,
        classified: article,
    }
}
