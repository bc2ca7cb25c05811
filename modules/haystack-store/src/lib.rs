//! Store contract for the pipeline's persistence needs.
//!
//! Everything the engine reads or writes goes through the `Store` trait:
//! source feeds, crawl history, pipeline runs, the moderation queue, and
//! field notes. The trait boundary keeps every pipeline stage testable
//! against an in-memory double — no database, no network.

mod rest;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use haystack_common::types::{
    CrawlRecord, FieldNote, ModerationItem, NewCrawlRecord, NewFieldNote, PipelineRun, RunKind,
    RunStatus, SourceFeed, SourceKind,
};

pub use rest::RestStore;

#[async_trait]
pub trait Store: Send + Sync {
    // --- Source feeds ---

    /// Active sources of a kind, least-recently-fetched first (nulls first).
    async fn active_sources(&self, kind: SourceKind) -> Result<Vec<SourceFeed>>;

    /// Stamp a source's last fetch. `error == None` clears `last_error` and
    /// resets the consecutive-error counter.
    async fn mark_source_fetched(&self, source_id: &str, error: Option<&str>) -> Result<()>;

    /// Persist a recomputed reliability score. Implementations tolerate a
    /// missing column (log and continue).
    async fn set_reliability_score(&self, source_id: &str, score: f64) -> Result<()>;

    // --- Crawl history ---

    /// Exact fingerprint lookup, limit 1. The dedup fast path.
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<CrawlRecord>>;

    /// Most recent relevant rows (adaptive-threshold window).
    async fn recent_relevant(&self, limit: u32) -> Result<Vec<CrawlRecord>>;

    /// Most recent relevant, non-duplicate rows (cross-language candidates).
    async fn recent_relevant_nonduplicates(&self, limit: u32) -> Result<Vec<CrawlRecord>>;

    /// Most recent relevant rows for one source (reliability window).
    async fn recent_relevant_for_source(
        &self,
        source_id: &str,
        limit: u32,
    ) -> Result<Vec<CrawlRecord>>;

    /// Relevant rows fetched after `since` (trend window).
    async fn recent_relevant_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<CrawlRecord>>;

    async fn record_crawl(&self, record: NewCrawlRecord) -> Result<CrawlRecord>;

    // --- Pipeline runs ---

    async fn create_run(&self, run_kind: RunKind) -> Result<PipelineRun>;

    async fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        stats: Value,
        errors: Vec<Value>,
        sources_polled: Vec<String>,
    ) -> Result<()>;

    // --- Moderation queue ---

    async fn create_moderation_item(
        &self,
        item_type: &str,
        content: &str,
        metadata: Value,
    ) -> Result<ModerationItem>;

    /// Approved tips, oldest first.
    async fn approved_tips(&self, limit: u32) -> Result<Vec<ModerationItem>>;

    /// Replace a moderation item's metadata (used to mark tips ingested).
    async fn update_moderation_metadata(&self, item_id: &str, metadata: Value) -> Result<()>;

    // --- Field notes ---

    /// Insert a field note with status `raw`, authored by the bot identity.
    async fn create_field_note(&self, note: NewFieldNote) -> Result<FieldNote>;
}
