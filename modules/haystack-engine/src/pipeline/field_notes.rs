//! Field-note creator: approved articles become editorial field notes.

use anyhow::Result;
use serde_json::json;
use tracing::{error, info};

use haystack_common::text::truncate;
use haystack_common::types::{
    CrawlStatus, EnrichedArticle, EvidenceRef, NewCrawlRecord, NewFieldNote, Quote,
};

use crate::reliability::update_source_reliability;

use super::state::{CreatedFieldNote, PipelineDeps, PipelineState};

const RAW_TEXT_CAP: usize = 5000;

pub(crate) async fn run(deps: &PipelineDeps, state: &mut PipelineState) -> Result<()> {
    if state.approved.is_empty() {
        return Ok(());
    }

    let mut created = Vec::new();

    for article in state.approved.clone() {
        let raw = &article.classified.raw;

        match create_one(deps, &article, state).await {
            Ok(handle) => {
                info!(
                    field_note_id = %handle.field_note_id,
                    title = %truncate(&raw.title, 60),
                    "field note created"
                );
                created.push(handle);

                // Reliability recompute is bookkeeping; run it off-path.
                let store = deps.store.clone();
                let source_id = raw.source_id.clone();
                tokio::spawn(async move {
                    update_source_reliability(store.as_ref(), &source_id).await;
                });
            }
            Err(e) => {
                error!(title = %truncate(&raw.title, 60), error = %e, "field note creation failed");
                // Best-effort compensating row so the article is not lost
                // from crawl history.
                let mut record = NewCrawlRecord::new(
                    raw.source_id.clone(),
                    raw.source_url.clone(),
                    article.classified.content_fingerprint.clone(),
                    state.run_id.clone(),
                    json!({ "title": raw.title }),
                    CrawlStatus::Error,
                );
                record.relevance_score = Some(article.classified.relevance_score);
                record.was_relevant = true;
                record.error_message = Some(e.to_string());
                if let Err(e) = deps.store.record_crawl(record).await {
                    error!(error = %e, "compensating crawl row failed");
                }
            }
        }
    }

    state.stats.field_notes_created = created.len();
    state.created_field_notes = created;
    Ok(())
}

async fn create_one(
    deps: &PipelineDeps,
    article: &EnrichedArticle,
    state: &PipelineState,
) -> Result<CreatedFieldNote> {
    let raw = &article.classified.raw;
    let classified = &article.classified;

    let note = field_note_payload(article);
    let field_note = deps.store.create_field_note(note).await?;

    let mut record = NewCrawlRecord::new(
        raw.source_id.clone(),
        raw.source_url.clone(),
        classified.content_fingerprint.clone(),
        state.run_id.clone(),
        json!({
            "title": raw.title,
            "body": truncate(&raw.body, 1000),
            "source_name": raw.source_name,
        }),
        CrawlStatus::Processed,
    );
    record.relevance_score = Some(classified.relevance_score);
    record.was_relevant = true;
    record.classification_data = Some(json!({
        "topics": classified.topics,
        "geo_tags": classified.geo_tags,
        "priority": classified.priority,
    }));
    record.field_note_id = Some(field_note.id.clone());
    deps.store.record_crawl(record).await?;

    Ok(CreatedFieldNote {
        field_note_id: field_note.id,
        headline: truncate(&article.what, 100),
        source: raw.source_name.clone(),
        source_url: raw.source_url.clone(),
    })
}

/// Map an enriched article onto the field-note insert shape. The original
/// source URL is always the last evidence reference.
pub(crate) fn field_note_payload(article: &EnrichedArticle) -> NewFieldNote {
    let raw = &article.classified.raw;

    let safety_legal_flags: Vec<String> = article
        .risk_flags
        .iter()
        .map(|flag| flag.kind.clone())
        .collect();

    let quotes: Vec<Quote> = article
        .quotes
        .iter()
        .filter(|q| !q.text.is_empty())
        .cloned()
        .collect();

    let mut evidence_refs: Vec<EvidenceRef> = article
        .evidence_refs
        .iter()
        .filter(|r| !r.url.is_empty())
        .cloned()
        .collect();
    evidence_refs.push(EvidenceRef {
        kind: "link".to_string(),
        url: raw.source_url.clone(),
        description: format!("Original source: {}", raw.source_name),
    });

    NewFieldNote {
        what: article.what.clone(),
        who: article.who.clone(),
        when_occurred: article.when_occurred.clone(),
        where_location: article.where_location.clone(),
        why: article.why.clone(),
        how: article.how.clone(),
        quotes,
        evidence_refs,
        confidence_score: article.confidence_score,
        safety_legal_flags,
        raw_text: Some(truncate(&raw.body, RAW_TEXT_CAP)),
    }
}
