//! Breaking-news detector: side-effect alerts for priority=breaking
//! articles. State flows through unchanged except for stats.

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use haystack_common::text::truncate;
use haystack_common::types::{ClassifiedArticle, Priority, MODERATION_TYPE_BREAKING_ALERT};

use super::state::{PipelineDeps, PipelineState};

pub(crate) async fn run(deps: &PipelineDeps, state: &mut PipelineState) -> Result<()> {
    let breaking: Vec<&ClassifiedArticle> = state
        .classified
        .iter()
        .filter(|article| article.priority == Priority::Breaking)
        .collect();

    if breaking.is_empty() {
        return Ok(());
    }

    warn!(
        count = breaking.len(),
        titles = ?breaking
            .iter()
            .map(|a| truncate(&a.raw.title, 80))
            .collect::<Vec<_>>(),
        "breaking news detected"
    );

    for article in &breaking {
        // An alert is advisory; a failed insert must not stall the cycle.
        if let Err(e) = send_alert(deps, article).await {
            error!(title = %truncate(&article.raw.title, 60), error = %e, "breaking alert failed");
        }
    }

    state.stats.breaking_count = breaking.len();
    Ok(())
}

async fn send_alert(deps: &PipelineDeps, article: &ClassifiedArticle) -> Result<()> {
    let raw = &article.raw;
    let content = format!(
        "🔴 BREAKING NEWS ALERT\n\n\
         Title: {title}\n\
         Source: {source}\n\
         URL: {url}\n\
         Topics: {topics}\n\
         Relevance: {relevance:.0}%\n\n\
         Classification: {reasoning}",
        title = raw.title,
        source = raw.source_name,
        url = raw.source_url,
        topics = article.topics.join(", "),
        relevance = article.relevance_score * 100.0,
        reasoning = article.reasoning,
    );

    let metadata = json!({
        "alert_type": "breaking_news",
        "title": raw.title,
        "source_name": raw.source_name,
        "source_url": raw.source_url,
        "topics": article.topics,
        "relevance_score": article.relevance_score,
        "detected_at": Utc::now(),
    });

    deps.store
        .create_moderation_item(MODERATION_TYPE_BREAKING_ALERT, &content, metadata)
        .await?;

    info!(title = %truncate(&raw.title, 60), "breaking alert sent");
    Ok(())
}
