//! The state record that threads through a cycle, plus the immutable
//! dependency bundle the stages share.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use ai_client::LlmGenerate;
use haystack_common::types::{
    ClassifiedArticle, CycleKind, EnrichedArticle, RawArticle, RunKind, SourceFeed,
};
use haystack_common::Config;
use haystack_store::Store;

use crate::adaptive::AdaptiveThresholds;
use crate::collectors::{CollectError, CollectorRegistry};

/// Aggregated counters for one cycle, persisted on the run row.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleStats {
    pub sources_polled: usize,
    pub raw_count: usize,
    pub classified_count: usize,
    pub rejected_count: usize,
    pub breaking_count: usize,
    pub enriched_count: usize,
    pub translated_count: usize,
    pub approved_count: usize,
    pub flagged_count: usize,
    pub quality_rejected_count: usize,
    pub field_notes_created: usize,
    pub moderation_sent_count: usize,
    pub archived_count: usize,
}

/// Handle to a field note created this cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedFieldNote {
    pub field_note_id: String,
    pub headline: String,
    pub source: String,
    pub source_url: String,
}

/// Mutable state for one pipeline cycle. Stages append to the
/// accumulators; nothing is removed once added.
pub struct PipelineState {
    pub run_id: String,
    pub run_kind: RunKind,
    pub cycle_kind: CycleKind,

    // Collection
    pub raw_articles: Vec<RawArticle>,
    pub collection_errors: Vec<CollectError>,

    // Classification
    pub classified: Vec<ClassifiedArticle>,
    pub rejected: Vec<ClassifiedArticle>,

    // Enrichment
    pub enriched: Vec<EnrichedArticle>,

    // Quality gate
    pub approved: Vec<EnrichedArticle>,
    pub flagged: Vec<EnrichedArticle>,

    // Output
    pub created_field_notes: Vec<CreatedFieldNote>,

    pub stats: CycleStats,
    pub sources_polled: Vec<String>,

    /// Fingerprints of flagged articles the moderation sender already
    /// archived (with their moderation link). The archiver writes the
    /// remainder, so every article lands in crawl history exactly once.
    pub(crate) moderation_recorded: HashSet<String>,

    /// Working source list, populated by the schedule stage.
    pub(crate) sources: Vec<SourceFeed>,
}

impl PipelineState {
    pub fn new(run_id: String, run_kind: RunKind, cycle_kind: CycleKind) -> Self {
        Self {
            run_id,
            run_kind,
            cycle_kind,
            raw_articles: Vec::new(),
            collection_errors: Vec::new(),
            classified: Vec::new(),
            rejected: Vec::new(),
            enriched: Vec::new(),
            approved: Vec::new(),
            flagged: Vec::new(),
            created_field_notes: Vec::new(),
            stats: CycleStats::default(),
            sources_polled: Vec::new(),
            moderation_recorded: HashSet::new(),
            sources: Vec::new(),
        }
    }
}

/// Immutable dependencies shared by every stage.
pub struct PipelineDeps {
    pub store: Arc<dyn Store>,
    pub llm: Arc<dyn LlmGenerate>,
    pub thresholds: Arc<AdaptiveThresholds>,
    pub collectors: CollectorRegistry,
    pub config: Arc<Config>,
}
