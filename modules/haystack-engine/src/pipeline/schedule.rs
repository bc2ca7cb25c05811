//! Schedule stage: resolve which sources this cycle polls and kick off
//! the adaptive-threshold refresh.

use anyhow::Result;
use tracing::info;

use haystack_common::types::{CycleKind, SourceFeed};

use super::state::{PipelineDeps, PipelineState};

pub(crate) async fn run(deps: &PipelineDeps, state: &mut PipelineState) -> Result<()> {
    // Refresh adaptive relevance thresholds in the background; the
    // classifier reads whatever generation is current when it runs.
    {
        let thresholds = deps.thresholds.clone();
        let store = deps.store.clone();
        tokio::spawn(async move {
            thresholds.refresh(store.as_ref()).await;
        });
    }

    let mut sources = Vec::new();
    for kind in state.cycle_kind.source_kinds() {
        sources.extend(deps.store.active_sources(*kind).await?);
    }

    // The tip collector reads the moderation queue, not source_feeds —
    // it must run even when no tip source rows exist.
    if sources.is_empty() && state.cycle_kind == CycleKind::Tips {
        sources.push(SourceFeed::virtual_tip_source());
    }

    state.sources_polled = sources.iter().map(|s| s.name.clone()).collect();
    state.stats.sources_polled = sources.len();

    info!(
        cycle = %state.cycle_kind,
        count = sources.len(),
        sources = ?state.sources_polled,
        "sources loaded"
    );

    state.sources = sources;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, TestDeps};
    use haystack_common::types::{RunKind, SourceKind};

    fn state_for(cycle: CycleKind) -> PipelineState {
        PipelineState::new("run-1".to_string(), RunKind::Manual, cycle)
    }

    #[tokio::test]
    async fn main_cycle_loads_feed_and_scrape_sources() {
        let deps = TestDeps::new()
            .with_source(fixtures::source(SourceKind::Feed))
            .with_source(fixtures::source(SourceKind::Scrape))
            .with_source(fixtures::source(SourceKind::Api))
            .build();
        let mut state = state_for(CycleKind::Main);

        run(&deps, &mut state).await.unwrap();
        assert_eq!(state.sources.len(), 2);
        assert_eq!(state.stats.sources_polled, 2);
    }

    #[tokio::test]
    async fn tips_cycle_synthesizes_virtual_source() {
        let deps = TestDeps::new().build();
        let mut state = state_for(CycleKind::Tips);

        run(&deps, &mut state).await.unwrap();
        assert_eq!(state.sources.len(), 1);
        assert_eq!(state.sources[0].id, "moderation_queue");
        assert_eq!(state.sources_polled, vec!["User Tips".to_string()]);
    }

    #[tokio::test]
    async fn weather_cycle_only_api_sources() {
        let deps = TestDeps::new()
            .with_source(fixtures::source(SourceKind::Feed))
            .with_source(fixtures::source(SourceKind::Api))
            .build();
        let mut state = state_for(CycleKind::Weather);

        run(&deps, &mut state).await.unwrap();
        assert_eq!(state.sources.len(), 1);
        assert_eq!(state.sources[0].source_kind, SourceKind::Api);
    }
}
