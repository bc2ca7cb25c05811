//! The pipeline orchestrator.
//!
//! A cycle is a fixed stage table with conditional edges, driven by a pure
//! router — no graph of objects pointing at each other. The driver walks
//! stages until the router returns `None`, recording the run start to
//! finish in a pipeline-run row.

pub mod archive;
pub mod breaking;
pub mod collect;
pub mod cross_lang;
pub mod dedup_classify;
pub mod enrich;
pub mod field_notes;
pub mod moderation;
pub mod quality_gate;
pub mod schedule;
pub mod state;

#[cfg(test)]
mod chain_tests;

use anyhow::Result;
use serde_json::json;
use tracing::{error, info};

use haystack_common::types::{CycleKind, RunKind, RunStatus};

use state::{PipelineDeps, PipelineState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Schedule,
    Collect,
    Classify,
    BreakingCheck,
    Enrich,
    QualityGate,
    CreateFieldNotes,
    SendToModeration,
    Archive,
}

/// Conditional edges of the stage graph.
///
/// After classification, an empty survivor set short-circuits straight to
/// the archive. After the quality gate, approval wins, then moderation,
/// then archive; field-note creation chains into moderation when flagged
/// articles also exist. Archive is terminal.
pub fn next_stage(current: Stage, state: &PipelineState) -> Option<Stage> {
    match current {
        Stage::Schedule => Some(Stage::Collect),
        Stage::Collect => Some(Stage::Classify),
        Stage::Classify if state.classified.is_empty() => Some(Stage::Archive),
        Stage::Classify => Some(Stage::BreakingCheck),
        Stage::BreakingCheck => Some(Stage::Enrich),
        Stage::Enrich => Some(Stage::QualityGate),
        Stage::QualityGate if !state.approved.is_empty() => Some(Stage::CreateFieldNotes),
        Stage::QualityGate if !state.flagged.is_empty() => Some(Stage::SendToModeration),
        Stage::QualityGate => Some(Stage::Archive),
        Stage::CreateFieldNotes if !state.flagged.is_empty() => Some(Stage::SendToModeration),
        Stage::CreateFieldNotes => Some(Stage::Archive),
        Stage::SendToModeration => Some(Stage::Archive),
        Stage::Archive => None,
    }
}

pub struct Pipeline {
    deps: PipelineDeps,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }

    /// Execute one full cycle, bookkeeping included. A stage failure marks
    /// the run failed and propagates so the scheduler can log it; the next
    /// cadence still fires.
    pub async fn run_cycle(
        &self,
        run_kind: RunKind,
        cycle_kind: CycleKind,
    ) -> Result<PipelineState> {
        let run = self.deps.store.create_run(run_kind).await?;
        info!(run_id = %run.id, %run_kind, %cycle_kind, "pipeline start");

        let mut state = PipelineState::new(run.id.clone(), run_kind, cycle_kind);

        match self.drive(&mut state).await {
            Ok(()) => {
                let errors = state
                    .collection_errors
                    .iter()
                    .map(|e| serde_json::to_value(e).unwrap_or(json!({})))
                    .collect();
                self.deps
                    .store
                    .complete_run(
                        &run.id,
                        RunStatus::Completed,
                        serde_json::to_value(&state.stats)?,
                        errors,
                        state.sources_polled.clone(),
                    )
                    .await?;
                info!(
                    run_id = %run.id,
                    field_notes = state.created_field_notes.len(),
                    "pipeline complete"
                );
                Ok(state)
            }
            Err(e) => {
                error!(run_id = %run.id, error = %e, "pipeline failed");
                // Best effort: the failure itself must not mask the run row.
                let _ = self
                    .deps
                    .store
                    .complete_run(
                        &run.id,
                        RunStatus::Failed,
                        json!({ "error": e.to_string() }),
                        vec![json!({ "error": e.to_string() })],
                        state.sources_polled.clone(),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn drive(&self, state: &mut PipelineState) -> Result<()> {
        let mut stage = Stage::Schedule;
        loop {
            self.run_stage(stage, state).await?;
            match next_stage(stage, state) {
                Some(next) => stage = next,
                None => return Ok(()),
            }
        }
    }

    async fn run_stage(&self, stage: Stage, state: &mut PipelineState) -> Result<()> {
        match stage {
            Stage::Schedule => schedule::run(&self.deps, state).await,
            Stage::Collect => collect::run(&self.deps, state).await,
            Stage::Classify => dedup_classify::run(&self.deps, state).await,
            Stage::BreakingCheck => breaking::run(&self.deps, state).await,
            Stage::Enrich => enrich::run(&self.deps, state).await,
            Stage::QualityGate => quality_gate::run(&self.deps, state).await,
            Stage::CreateFieldNotes => field_notes::run(&self.deps, state).await,
            Stage::SendToModeration => moderation::run(&self.deps, state).await,
            Stage::Archive => archive::run(&self.deps, state).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    fn empty_state() -> PipelineState {
        PipelineState::new("run-1".to_string(), RunKind::Manual, CycleKind::Main)
    }

    #[test]
    fn classify_with_survivors_routes_to_breaking_check() {
        let mut state = empty_state();
        state.classified = vec![fixtures::classified_article("A", 0.8)];
        assert_eq!(
            next_stage(Stage::Classify, &state),
            Some(Stage::BreakingCheck)
        );
    }

    #[test]
    fn classify_with_nothing_routes_to_archive() {
        let state = empty_state();
        assert_eq!(next_stage(Stage::Classify, &state), Some(Stage::Archive));
    }

    #[test]
    fn quality_gate_routes_approved_first() {
        let mut state = empty_state();
        state.approved = vec![fixtures::enriched_article(80)];
        state.flagged = vec![fixtures::enriched_article(20)];
        assert_eq!(
            next_stage(Stage::QualityGate, &state),
            Some(Stage::CreateFieldNotes)
        );
    }

    #[test]
    fn quality_gate_routes_flagged_only_to_moderation() {
        let mut state = empty_state();
        state.flagged = vec![fixtures::enriched_article(20)];
        assert_eq!(
            next_stage(Stage::QualityGate, &state),
            Some(Stage::SendToModeration)
        );
    }

    #[test]
    fn quality_gate_routes_neither_to_archive() {
        let state = empty_state();
        assert_eq!(next_stage(Stage::QualityGate, &state), Some(Stage::Archive));
    }

    #[test]
    fn field_notes_chains_to_moderation_when_flagged_exist() {
        let mut state = empty_state();
        state.flagged = vec![fixtures::enriched_article(20)];
        assert_eq!(
            next_stage(Stage::CreateFieldNotes, &state),
            Some(Stage::SendToModeration)
        );

        state.flagged.clear();
        assert_eq!(
            next_stage(Stage::CreateFieldNotes, &state),
            Some(Stage::Archive)
        );
    }

    #[test]
    fn moderation_always_archives_and_archive_terminates() {
        let state = empty_state();
        assert_eq!(
            next_stage(Stage::SendToModeration, &state),
            Some(Stage::Archive)
        );
        assert_eq!(next_stage(Stage::Archive, &state), None);
    }
}
