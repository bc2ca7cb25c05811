//! Test doubles for the pipeline's trait seams.
//!
//! Three mocks matching the three boundaries:
//! - `MockStore` (Store) — stateful in-memory tables with scriptable failures
//! - `MockLlm` (LlmGenerate) — queued responses, recorded prompts
//! - `DenyAllPolicy` (CrawlPolicy) — robots that refuse everything
//!
//! Plus `StaticCollector`, fixture builders, and the `TestDeps` harness
//! that assembles a `PipelineDeps` around the mocks.

use std::collections::{HashSet, VecDeque};
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use ai_client::LlmGenerate;
use haystack_common::types::{
    ClassifiedArticle, CrawlRecord, CrawlStatus, EnrichedArticle, FieldNote, Language,
    ModerationItem, NewCrawlRecord, NewFieldNote, PipelineRun, Priority, RawArticle,
    ReliabilityTier, RiskFlag, RunKind, RunStatus, Severity, SourceFeed, SourceKind,
    SourceLogEntry,
};
use haystack_common::Config;
use haystack_store::Store;

use crate::adaptive::AdaptiveThresholds;
use crate::collectors::{CollectError, Collector, CollectorRegistry};
use crate::infra::robots::CrawlPolicy;
use crate::pipeline::state::PipelineDeps;

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreInner {
    sources: Vec<SourceFeed>,
    crawl: Vec<CrawlRecord>,
    runs: Vec<PipelineRun>,
    moderation: Vec<ModerationItem>,
    field_notes: Vec<FieldNote>,
    reliability: Vec<(String, f64)>,
    fetched: Vec<(String, Option<String>)>,
    fail_next: HashSet<String>,
    counter: usize,
}

/// Stateful in-memory store. `fail_next(op)` makes the next call to that
/// operation fail once.
#[derive(Default)]
pub struct MockStore {
    inner: Mutex<StoreInner>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_source(&self, source: SourceFeed) {
        self.inner.lock().unwrap().sources.push(source);
    }

    pub fn push_crawl_record(&self, record: CrawlRecord) {
        self.inner.lock().unwrap().crawl.push(record);
    }

    pub fn push_moderation_item(&self, item: ModerationItem) {
        self.inner.lock().unwrap().moderation.push(item);
    }

    pub fn fail_next(&self, op: &str) {
        self.inner.lock().unwrap().fail_next.insert(op.to_string());
    }

    pub fn moderation_items(&self) -> Vec<ModerationItem> {
        self.inner.lock().unwrap().moderation.clone()
    }

    pub fn crawl_rows(&self) -> Vec<CrawlRecord> {
        self.inner.lock().unwrap().crawl.clone()
    }

    pub fn runs(&self) -> Vec<PipelineRun> {
        self.inner.lock().unwrap().runs.clone()
    }

    pub fn field_notes(&self) -> Vec<FieldNote> {
        self.inner.lock().unwrap().field_notes.clone()
    }

    pub fn reliability_score(&self, source_id: &str) -> Option<f64> {
        self.inner
            .lock()
            .unwrap()
            .reliability
            .iter()
            .rev()
            .find(|(id, _)| id == source_id)
            .map(|(_, score)| *score)
    }

    pub fn fetched_sources(&self) -> Vec<(String, Option<String>)> {
        self.inner.lock().unwrap().fetched.clone()
    }

    fn check_fail(&self, op: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_next.remove(op) {
            bail!("MockStore: scripted {op} failure");
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.counter += 1;
        format!("{prefix}-{}", inner.counter)
    }
}

#[async_trait]
impl Store for MockStore {
    async fn active_sources(&self, kind: SourceKind) -> Result<Vec<SourceFeed>> {
        self.check_fail("active_sources")?;
        let mut sources: Vec<SourceFeed> = self
            .inner
            .lock()
            .unwrap()
            .sources
            .iter()
            .filter(|s| s.is_active && s.source_kind == kind)
            .cloned()
            .collect();
        // Least recently fetched first, never-fetched leading.
        sources.sort_by(|a, b| match (a.last_fetched_at, b.last_fetched_at) {
            (None, None) => std::cmp::Ordering::Equal,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y),
        });
        Ok(sources)
    }

    async fn mark_source_fetched(&self, source_id: &str, error: Option<&str>) -> Result<()> {
        self.check_fail("mark_source_fetched")?;
        let mut inner = self.inner.lock().unwrap();
        inner
            .fetched
            .push((source_id.to_string(), error.map(String::from)));
        if let Some(source) = inner.sources.iter_mut().find(|s| s.id == source_id) {
            source.last_fetched_at = Some(Utc::now());
            source.last_error = error.map(String::from);
        }
        Ok(())
    }

    async fn set_reliability_score(&self, source_id: &str, score: f64) -> Result<()> {
        self.check_fail("set_reliability_score")?;
        self.inner
            .lock()
            .unwrap()
            .reliability
            .push((source_id.to_string(), score));
        Ok(())
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<CrawlRecord>> {
        self.check_fail("find_by_fingerprint")?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .crawl
            .iter()
            .find(|r| r.content_fingerprint == fingerprint)
            .cloned())
    }

    async fn recent_relevant(&self, limit: u32) -> Result<Vec<CrawlRecord>> {
        self.check_fail("recent_relevant")?;
        let mut records: Vec<CrawlRecord> = self
            .inner
            .lock()
            .unwrap()
            .crawl
            .iter()
            .filter(|r| r.was_relevant)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn recent_relevant_nonduplicates(&self, limit: u32) -> Result<Vec<CrawlRecord>> {
        self.check_fail("recent_relevant_nonduplicates")?;
        let mut records: Vec<CrawlRecord> = self
            .inner
            .lock()
            .unwrap()
            .crawl
            .iter()
            .filter(|r| r.was_relevant && !r.was_duplicate)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn recent_relevant_for_source(
        &self,
        source_id: &str,
        limit: u32,
    ) -> Result<Vec<CrawlRecord>> {
        self.check_fail("recent_relevant_for_source")?;
        let mut records: Vec<CrawlRecord> = self
            .inner
            .lock()
            .unwrap()
            .crawl
            .iter()
            .filter(|r| r.was_relevant && r.source_feed_id == source_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn recent_relevant_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<CrawlRecord>> {
        self.check_fail("recent_relevant_since")?;
        let mut records: Vec<CrawlRecord> = self
            .inner
            .lock()
            .unwrap()
            .crawl
            .iter()
            .filter(|r| r.was_relevant && r.fetched_at >= since)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn record_crawl(&self, record: NewCrawlRecord) -> Result<CrawlRecord> {
        self.check_fail("record_crawl")?;
        let stored = CrawlRecord {
            id: self.next_id("crawl"),
            source_feed_id: record.source_feed_id,
            source_url: record.source_url,
            content_fingerprint: record.content_fingerprint,
            pipeline_run_id: record.pipeline_run_id,
            raw_data: record.raw_data,
            status: record.status,
            relevance_score: record.relevance_score,
            was_relevant: record.was_relevant,
            was_duplicate: record.was_duplicate,
            classification_data: record.classification_data,
            field_note_id: record.field_note_id,
            moderation_item_id: record.moderation_item_id,
            error_message: record.error_message,
            fetched_at: Utc::now(),
        };
        self.inner.lock().unwrap().crawl.push(stored.clone());
        Ok(stored)
    }

    async fn create_run(&self, run_kind: RunKind) -> Result<PipelineRun> {
        self.check_fail("create_run")?;
        let run = PipelineRun {
            id: self.next_id("run"),
            run_type: run_kind,
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            stats: json!({}),
            errors: Vec::new(),
            sources_polled: Vec::new(),
        };
        self.inner.lock().unwrap().runs.push(run.clone());
        Ok(run)
    }

    async fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        stats: Value,
        errors: Vec<Value>,
        sources_polled: Vec<String>,
    ) -> Result<()> {
        self.check_fail("complete_run")?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.runs.iter_mut().find(|r| r.id == run_id) {
            run.status = status;
            run.completed_at = Some(Utc::now());
            run.stats = stats;
            run.errors = errors;
            run.sources_polled = sources_polled;
        }
        Ok(())
    }

    async fn create_moderation_item(
        &self,
        item_type: &str,
        content: &str,
        metadata: Value,
    ) -> Result<ModerationItem> {
        self.check_fail("create_moderation_item")?;
        let item = ModerationItem {
            id: self.next_id("mod"),
            item_type: item_type.to_string(),
            content: content.to_string(),
            status: "pending".to_string(),
            metadata,
            submitter_email: None,
            created_at: Some(Utc::now()),
        };
        self.inner.lock().unwrap().moderation.push(item.clone());
        Ok(item)
    }

    async fn approved_tips(&self, limit: u32) -> Result<Vec<ModerationItem>> {
        self.check_fail("approved_tips")?;
        let mut tips: Vec<ModerationItem> = self
            .inner
            .lock()
            .unwrap()
            .moderation
            .iter()
            .filter(|m| m.item_type == "tip" && m.status == "approved")
            .cloned()
            .collect();
        tips.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tips.truncate(limit as usize);
        Ok(tips)
    }

    async fn update_moderation_metadata(&self, item_id: &str, metadata: Value) -> Result<()> {
        self.check_fail("update_moderation_metadata")?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(item) = inner.moderation.iter_mut().find(|m| m.id == item_id) {
            item.metadata = metadata;
        }
        Ok(())
    }

    async fn create_field_note(&self, note: NewFieldNote) -> Result<FieldNote> {
        self.check_fail("create_field_note")?;
        let created = FieldNote {
            id: self.next_id("note"),
            what: note.what,
        };
        self.inner.lock().unwrap().field_notes.push(created.clone());
        Ok(created)
    }
}

// ---------------------------------------------------------------------------
// MockLlm
// ---------------------------------------------------------------------------

/// Queued-response LLM double. Runs dry loudly: an unexpected extra call
/// fails the test instead of silently returning something plausible.
#[derive(Default)]
pub struct MockLlm {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockLlm {
    pub fn with_responses(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn push_response(&self, response: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(response.to_string());
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmGenerate for MockLlm {
    async fn generate(&self, _system: &str, prompt: &str, _temperature: f32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => Ok(response),
            None => bail!("MockLlm: response queue exhausted"),
        }
    }
}

// ---------------------------------------------------------------------------
// Robots / collector doubles
// ---------------------------------------------------------------------------

/// Robots policy that disallows every URL.
pub struct DenyAllPolicy;

#[async_trait]
impl CrawlPolicy for DenyAllPolicy {
    async fn is_allowed(&self, _url: &str) -> bool {
        false
    }

    async fn crawl_delay(&self, _url: &str) -> Option<Duration> {
        None
    }
}

/// Collector returning canned articles for its kind.
pub struct StaticCollector {
    kind: SourceKind,
    articles: Vec<RawArticle>,
    errors: Vec<CollectError>,
}

impl StaticCollector {
    pub fn returning(kind: SourceKind, articles: Vec<RawArticle>) -> Self {
        Self {
            kind,
            articles,
            errors: Vec::new(),
        }
    }

    pub fn with_errors(mut self, errors: Vec<CollectError>) -> Self {
        self.errors = errors;
        self
    }
}

#[async_trait]
impl Collector for StaticCollector {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn collect(&self, _sources: &[SourceFeed]) -> (Vec<RawArticle>, Vec<CollectError>) {
        (self.articles.clone(), self.errors.clone())
    }
}

// ---------------------------------------------------------------------------
// TestDeps harness
// ---------------------------------------------------------------------------

pub struct TestDeps {
    store: Arc<MockStore>,
    llm_responses: Vec<String>,
    registry: CollectorRegistry,
    config: Config,
}

impl TestDeps {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            store: Arc::new(MockStore::new()),
            llm_responses: Vec::new(),
            registry: CollectorRegistry::new(),
            config: fixtures::test_config(),
        }
    }

    pub fn with_source(self, source: SourceFeed) -> Self {
        self.store.push_source(source);
        self
    }

    pub fn with_crawl_record(self, record: CrawlRecord) -> Self {
        self.store.push_crawl_record(record);
        self
    }

    pub fn with_tip(self, tip: ModerationItem) -> Self {
        self.store.push_moderation_item(tip);
        self
    }

    pub fn with_llm_responses(mut self, responses: Vec<&str>) -> Self {
        self.llm_responses
            .extend(responses.into_iter().map(String::from));
        self
    }

    pub fn with_collector(mut self, collector: StaticCollector) -> Self {
        self.registry = self.registry.register(Arc::new(collector));
        self
    }

    pub fn build(self) -> TestHarness {
        let llm = Arc::new(MockLlm::with_responses(
            self.llm_responses.iter().map(String::as_str).collect(),
        ));
        let config = Arc::new(self.config);
        let deps = PipelineDeps {
            store: self.store.clone(),
            llm: llm.clone(),
            thresholds: Arc::new(AdaptiveThresholds::new(config.min_relevance_score)),
            collectors: self.registry,
            config,
        };
        TestHarness {
            deps,
            store: self.store,
            llm,
        }
    }
}

/// Assembled deps plus handles to the mocks for assertions.
pub struct TestHarness {
    deps: PipelineDeps,
    store: Arc<MockStore>,
    llm: Arc<MockLlm>,
}

impl TestHarness {
    pub fn store_handle(&self) -> Arc<MockStore> {
        self.store.clone()
    }

    pub fn llm_handle(&self) -> Arc<MockLlm> {
        self.llm.clone()
    }

    pub fn thresholds_handle(&self) -> Arc<AdaptiveThresholds> {
        self.deps.thresholds.clone()
    }

    pub fn collectors_handle(&self) -> CollectorRegistry {
        self.deps.collectors.clone()
    }

    pub fn config_handle(&self) -> Arc<Config> {
        self.deps.config.clone()
    }

    pub fn push_llm_response(&self, response: &str) {
        self.llm.push_response(response);
    }

    pub fn moderation_items(&self) -> Vec<ModerationItem> {
        self.store.moderation_items()
    }

    pub fn crawl_rows(&self) -> Vec<CrawlRecord> {
        self.store.crawl_rows()
    }

    pub fn runs(&self) -> Vec<PipelineRun> {
        self.store.runs()
    }

    pub fn field_notes(&self) -> Vec<FieldNote> {
        self.store.field_notes()
    }

    pub fn llm_calls(&self) -> usize {
        self.llm.calls()
    }

    pub fn llm_prompts(&self) -> Vec<String> {
        self.llm.prompts()
    }
}

impl Deref for TestHarness {
    type Target = PipelineDeps;

    fn deref(&self) -> &Self::Target {
        &self.deps
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub mod fixtures {
    use super::*;
    use haystack_common::fingerprint::simhash;

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn next(prefix: &str) -> String {
        format!("{prefix}-{}", COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Deterministic config for tests — env-independent, defaults only.
    pub fn test_config() -> Config {
        Config {
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "qwen2.5-coder:7b".to_string(),
            anthropic_api_key: String::new(),
            anthropic_model: "claude-haiku-4-5-20251001".to_string(),
            openai_api_key: String::new(),
            openai_model: "gpt-4o-mini".to_string(),
            store_url: String::new(),
            store_service_key: String::new(),
            editorial_api_url: "http://localhost:3000".to_string(),
            bot_email: "haystack-bot@niseko-gazet.local".to_string(),
            bot_password: String::new(),
            newsapi_key: String::new(),
            openweather_api_key: String::new(),
            tavily_api_key: String::new(),
            brave_search_api_key: String::new(),
            currents_api_key: String::new(),
            gnews_api_key: String::new(),
            content_aggregation_enabled: true,
            content_quality_threshold: 0.6,
            main_poll_interval_minutes: 15,
            weather_poll_interval_minutes: 60,
            tip_poll_interval_minutes: 5,
            social_poll_interval_minutes: 30,
            min_relevance_score: 0.3,
            min_confidence_score: 30,
            duplicate_similarity_threshold: 0.85,
        }
    }

    pub fn source(kind: SourceKind) -> SourceFeed {
        SourceFeed {
            id: next("src"),
            name: format!("Test {kind} source"),
            source_kind: kind,
            url: "https://source.example.com/feed".to_string(),
            is_active: true,
            reliability_tier: ReliabilityTier::Standard,
            default_topics: Vec::new(),
            default_geo_tags: Vec::new(),
            poll_interval_minutes: None,
            config: json!({}),
            last_fetched_at: None,
            last_error: None,
            consecutive_errors: 0,
            reliability_score: None,
        }
    }

    pub fn scrape_source(url: &str) -> SourceFeed {
        let mut s = source(SourceKind::Scrape);
        s.url = url.to_string();
        s
    }

    pub fn raw_article(title: &str, body: &str) -> RawArticle {
        let slug: String = title
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        RawArticle {
            source_id: "src-fixture".to_string(),
            source_kind: SourceKind::Feed,
            source_url: format!("https://source.example.com/articles/{slug}"),
            source_name: "Fixture Source".to_string(),
            title: title.to_string(),
            body: body.to_string(),
            published_at: None,
            author: None,
            language: Language::En,
            raw_metadata: json!({}),
            fetched_at: Utc::now(),
        }
    }

    pub fn classified_article(title: &str, relevance: f64) -> ClassifiedArticle {
        let raw = raw_article(title, "Body text for the article.");
        let fingerprint = simhash(&format!("{} {}", raw.title, raw.body));
        ClassifiedArticle {
            raw,
            relevance_score: relevance,
            topics: vec!["tourism".to_string()],
            geo_tags: vec!["niseko".to_string()],
            priority: Priority::Normal,
            is_duplicate: false,
            duplicate_of: None,
            content_fingerprint: fingerprint,
            reasoning: "Test classification".to_string(),
        }
    }

    pub fn enriched_article(confidence: i64) -> EnrichedArticle {
        let classified = classified_article(&next("Enriched article"), 0.8);
        let raw = &classified.raw;
        let source_log = vec![SourceLogEntry {
            source_name: raw.source_name.clone(),
            source_url: raw.source_url.clone(),
            source_kind: raw.source_kind,
            fetched_at: raw.fetched_at,
            enrichment_error: None,
        }];
        EnrichedArticle {
            who: None,
            what: raw.title.clone(),
            when_occurred: None,
            where_location: Some("Niseko".to_string()),
            why: None,
            how: None,
            quotes: Vec::new(),
            evidence_refs: Vec::new(),
            risk_flags: Vec::new(),
            fact_check_notes: Vec::new(),
            confidence_score: confidence,
            source_log,
            classified,
        }
    }

    pub fn risk_flag(kind: &str) -> RiskFlag {
        RiskFlag {
            kind: kind.to_string(),
            description: format!("{kind} detected"),
            severity: Severity::Medium,
        }
    }

    pub fn crawl_record(source_id: &str, fingerprint: &str, published: bool) -> CrawlRecord {
        CrawlRecord {
            id: next("crawl"),
            source_feed_id: source_id.to_string(),
            source_url: format!("https://source.example.com/{fingerprint}"),
            content_fingerprint: fingerprint.to_string(),
            pipeline_run_id: "run-prior".to_string(),
            raw_data: json!({ "title": "Prior article", "body": "Prior body" }),
            status: CrawlStatus::Processed,
            relevance_score: Some(0.7),
            was_relevant: true,
            was_duplicate: false,
            classification_data: Some(json!({ "topics": ["tourism"] })),
            field_note_id: published.then(|| next("note")),
            moderation_item_id: None,
            error_message: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn approved_tip(id: &str, content: &str) -> ModerationItem {
        ModerationItem {
            id: id.to_string(),
            item_type: "tip".to_string(),
            content: content.to_string(),
            status: "approved".to_string(),
            metadata: json!({}),
            submitter_email: Some("reader@example.com".to_string()),
            created_at: Some(Utc::now()),
        }
    }

    /// Used by scheduler tests that need a whole pipeline.
    pub fn test_pipeline() -> Arc<crate::pipeline::Pipeline> {
        let harness = TestDeps::new().build();
        Arc::new(crate::pipeline::Pipeline::new(harness.deps))
    }
}
