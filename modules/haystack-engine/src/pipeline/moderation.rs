//! Moderation sender: flagged articles become review-queue items.

use anyhow::Result;
use serde_json::json;
use tracing::{error, info};

use haystack_common::text::truncate;
use haystack_common::types::{
    CrawlStatus, EnrichedArticle, NewCrawlRecord, MODERATION_TYPE_FLAGGED,
};

use super::state::{PipelineDeps, PipelineState};

pub(crate) async fn run(deps: &PipelineDeps, state: &mut PipelineState) -> Result<()> {
    if state.flagged.is_empty() {
        return Ok(());
    }

    let mut sent = 0usize;

    for article in state.flagged.clone() {
        let raw = &article.classified.raw;
        match send_one(deps, &article, &state.run_id).await {
            Ok(()) => {
                sent += 1;
                state
                    .moderation_recorded
                    .insert(article.classified.content_fingerprint.clone());
            }
            Err(e) => {
                // The archiver picks up anything we failed to record.
                error!(title = %truncate(&raw.title, 60), error = %e, "moderation send failed");
            }
        }
    }

    info!(sent, total = state.flagged.len(), "moderation sender done");
    state.stats.moderation_sent_count = sent;
    Ok(())
}

async fn send_one(deps: &PipelineDeps, article: &EnrichedArticle, run_id: &str) -> Result<()> {
    let raw = &article.classified.raw;
    let classified = &article.classified;

    let content = moderation_summary(article);

    let metadata = json!({
        "pipeline_run_id": run_id,
        "source_id": raw.source_id,
        "source_url": raw.source_url,
        "confidence_score": article.confidence_score,
        "risk_flags": article.risk_flags.iter().map(|f| f.kind.clone()).collect::<Vec<_>>(),
        "topics": classified.topics,
        "geo_tags": classified.geo_tags,
        "enriched_data": {
            "what": article.what,
            "who": article.who,
            "when_occurred": article.when_occurred,
            "where_location": article.where_location,
            "why": article.why,
            "how": article.how,
        },
    });

    let item = deps
        .store
        .create_moderation_item(MODERATION_TYPE_FLAGGED, &content, metadata)
        .await?;

    let mut record = NewCrawlRecord::new(
        raw.source_id.clone(),
        raw.source_url.clone(),
        classified.content_fingerprint.clone(),
        run_id.to_string(),
        raw.raw_metadata.clone(),
        CrawlStatus::Flagged,
    );
    record.relevance_score = Some(classified.relevance_score);
    record.was_relevant = true;
    record.classification_data = Some(json!({
        "topics": classified.topics,
        "priority": classified.priority,
    }));
    record.moderation_item_id = Some(item.id.clone());
    deps.store.record_crawl(record).await?;

    info!(
        title = %truncate(&raw.title, 60),
        moderation_id = %item.id,
        "sent to moderation"
    );
    Ok(())
}

/// Human-readable summary shown to the moderator.
pub(crate) fn moderation_summary(article: &EnrichedArticle) -> String {
    let raw = &article.classified.raw;

    let risk_summary = if article.risk_flags.is_empty() {
        "low confidence".to_string()
    } else {
        article
            .risk_flags
            .iter()
            .map(|f| f.kind.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "**{title}**\n\n\
         Source: {source} — {url}\n\
         Confidence: {confidence}/100\n\
         Risk flags: {risk_summary}\n\n\
         **What:** {what}\n\
         **Who:** {who}\n\
         **Where:** {location}\n",
        title = raw.title,
        source = raw.source_name,
        url = raw.source_url,
        confidence = article.confidence_score,
        what = article.what,
        who = article.who.as_deref().unwrap_or("N/A"),
        location = article.where_location.as_deref().unwrap_or("N/A"),
    )
}
