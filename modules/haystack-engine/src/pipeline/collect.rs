//! Collect stage: dispatch sources to their collectors and merge results.

use std::collections::HashMap;

use anyhow::Result;
use futures::future::join_all;
use tracing::{info, warn};

use haystack_common::types::{SourceFeed, SourceKind};

use crate::collectors::CollectError;

use super::state::{PipelineDeps, PipelineState};

pub(crate) async fn run(deps: &PipelineDeps, state: &mut PipelineState) -> Result<()> {
    let sources = std::mem::take(&mut state.sources);
    if sources.is_empty() {
        warn!("no sources to collect");
        return Ok(());
    }

    let mut by_kind: HashMap<SourceKind, Vec<SourceFeed>> = HashMap::new();
    for source in sources {
        by_kind.entry(source.source_kind).or_default().push(source);
    }

    // One task per collector; within a collector, sources run
    // sequentially. Merge order between collectors is unspecified.
    let mut tasks = Vec::new();
    let mut unhandled: Vec<CollectError> = Vec::new();

    for (kind, kind_sources) in by_kind {
        match deps.collectors.get(kind) {
            Some(collector) => {
                tasks.push(async move { collector.collect(&kind_sources).await });
            }
            None => {
                warn!(kind = %kind, "no collector registered");
                unhandled.extend(kind_sources.iter().map(|source| {
                    CollectError::new(source, kind, format!("no collector for source kind {kind}"))
                }));
            }
        }
    }

    for (articles, errors) in join_all(tasks).await {
        state.raw_articles.extend(articles);
        state.collection_errors.extend(errors);
    }
    state.collection_errors.extend(unhandled);

    state.stats.raw_count = state.raw_articles.len();
    info!(
        articles = state.raw_articles.len(),
        errors = state.collection_errors.len(),
        "collection done"
    );
    Ok(())
}
