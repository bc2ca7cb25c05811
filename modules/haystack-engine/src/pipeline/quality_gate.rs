//! Quality gate: deterministic three-way routing.
//!
//! Reject when the extraction is hollow (`what` empty or confidence < 10).
//! Flag when a high-risk flag is present, confidence is under the
//! effective minimum, or the source tier forces moderation. Approve the
//! rest. Rejects are pushed back into the rejected bucket so the archiver
//! still records them; every article the cycle touched must land in
//! crawl history.

use anyhow::Result;
use tracing::info;

use haystack_common::text::truncate;

use super::state::{PipelineDeps, PipelineState};

const REJECT_CONFIDENCE_FLOOR: i64 = 10;

pub(crate) async fn run(deps: &PipelineDeps, state: &mut PipelineState) -> Result<()> {
    if state.enriched.is_empty() {
        return Ok(());
    }

    let mut approved = Vec::new();
    let mut flagged = Vec::new();
    let mut quality_rejected = 0usize;

    for article in state.enriched.clone() {
        let raw = &article.classified.raw;
        let tier = raw.reliability_tier();
        let policy = tier.policy();

        let min_confidence = policy
            .min_confidence_override
            .unwrap_or(deps.config.min_confidence_score);
        let confidence = article.confidence_score;
        let has_high_risk = article.has_high_risk_flag();

        if article.what.is_empty() || confidence < REJECT_CONFIDENCE_FLOOR {
            quality_rejected += 1;
            let reason = if article.what.is_empty() {
                "missing_data"
            } else {
                "very_low_confidence"
            };
            info!(
                title = %truncate(&raw.title, 60),
                confidence,
                reason,
                "quality gate rejected"
            );
            let mut classified = article.classified.clone();
            classified.reasoning =
                format!("Quality gate reject ({reason}): {}", classified.reasoning);
            state.rejected.push(classified);
            continue;
        }

        if has_high_risk || confidence < min_confidence || policy.force_moderation {
            let reason = if has_high_risk {
                "high_risk"
            } else if policy.force_moderation {
                "yellow_press"
            } else {
                "low_confidence"
            };
            info!(
                title = %truncate(&raw.title, 60),
                confidence,
                has_high_risk,
                tier = %tier,
                reason,
                "quality gate flagged"
            );
            flagged.push(article);
            continue;
        }

        info!(
            title = %truncate(&raw.title, 60),
            confidence,
            tier = %tier,
            "quality gate approved"
        );
        approved.push(article);
    }

    info!(
        approved = approved.len(),
        flagged = flagged.len(),
        rejected = quality_rejected,
        "quality gate done"
    );

    state.stats.approved_count = approved.len();
    state.stats.flagged_count = flagged.len();
    state.stats.quality_rejected_count = quality_rejected;
    state.approved = approved;
    state.flagged = flagged;
    Ok(())
}
