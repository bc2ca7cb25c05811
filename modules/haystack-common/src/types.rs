use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// --- Closed vocabularies ---

pub const TOPICS: &[&str] = &[
    "tourism",
    "snow_conditions",
    "local_government",
    "business",
    "events",
    "infrastructure",
    "environment",
    "safety",
    "culture",
    "sports",
    "real_estate",
    "food_dining",
    "transport",
    "education",
    "health",
];

pub const GEO_TAGS: &[&str] = &[
    "niseko",
    "hirafu",
    "annupuri",
    "hanazono",
    "moiwa",
    "kutchan",
    "rusutsu",
    "niseko_town",
    "rankoshi",
    "kimobetsu",
    "makkari",
    "kyogoku",
    "shiribeshi",
    "yotei",
    "hokkaido",
];

/// Risk-flag kinds that always route an article to human review.
pub const HIGH_RISK_FLAGS: &[&str] = &[
    "minor_involved",
    "allegation_or_crime_accusation",
    "high_defamation_risk",
    "medical_or_public_health_claim",
];

pub fn is_high_risk(flag_kind: &str) -> bool {
    HIGH_RISK_FLAGS.contains(&flag_kind)
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Feed,
    Scrape,
    Api,
    Social,
    Tip,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Feed => write!(f, "feed"),
            SourceKind::Scrape => write!(f, "scrape"),
            SourceKind::Api => write!(f, "api"),
            SourceKind::Social => write!(f, "social"),
            SourceKind::Tip => write!(f, "tip"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "feed" => Ok(Self::Feed),
            "scrape" => Ok(Self::Scrape),
            "api" => Ok(Self::Api),
            "social" => Ok(Self::Social),
            "tip" => Ok(Self::Tip),
            other => Err(format!("unknown SourceKind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    Main,
    Weather,
    DeepScrape,
    Social,
    Tips,
}

impl CycleKind {
    /// Which source kinds a cycle polls.
    pub fn source_kinds(&self) -> &'static [SourceKind] {
        match self {
            CycleKind::Main => &[SourceKind::Feed, SourceKind::Scrape],
            CycleKind::Weather => &[SourceKind::Api],
            CycleKind::DeepScrape => &[SourceKind::Scrape],
            CycleKind::Social => &[SourceKind::Social],
            CycleKind::Tips => &[SourceKind::Tip],
        }
    }
}

impl std::fmt::Display for CycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleKind::Main => write!(f, "main"),
            CycleKind::Weather => write!(f, "weather"),
            CycleKind::DeepScrape => write!(f, "deep_scrape"),
            CycleKind::Social => write!(f, "social"),
            CycleKind::Tips => write!(f, "tips"),
        }
    }
}

impl std::str::FromStr for CycleKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "main" => Ok(Self::Main),
            "weather" => Ok(Self::Weather),
            "deep_scrape" => Ok(Self::DeepScrape),
            "social" => Ok(Self::Social),
            "tips" => Ok(Self::Tips),
            other => Err(format!("unknown CycleKind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Scheduled,
    Manual,
    Breaking,
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunKind::Scheduled => write!(f, "scheduled"),
            RunKind::Manual => write!(f, "manual"),
            RunKind::Breaking => write!(f, "breaking"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Breaking,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Parse a label from LLM output, degrading to `Normal` on anything unknown.
    pub fn from_label(s: &str) -> Self {
        match s {
            "breaking" => Self::Breaking,
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Normal,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Breaking => write!(f, "breaking"),
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ja,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::En => write!(f, "en"),
            Language::Ja => write!(f, "ja"),
        }
    }
}

impl Language {
    pub fn opposite(&self) -> Language {
        match self {
            Language::En => Language::Ja,
            Language::Ja => Language::En,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReliabilityTier {
    Official,
    #[default]
    Standard,
    YellowPress,
}

impl ReliabilityTier {
    /// Parse a tier label, degrading unknown tiers to `Standard`.
    pub fn from_label(s: &str) -> Self {
        match s {
            "official" => Self::Official,
            "yellow_press" => Self::YellowPress,
            _ => Self::Standard,
        }
    }
}

impl std::fmt::Display for ReliabilityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReliabilityTier::Official => write!(f, "official"),
            ReliabilityTier::Standard => write!(f, "standard"),
            ReliabilityTier::YellowPress => write!(f, "yellow_press"),
        }
    }
}

/// Quality-gate behavior for a reliability tier. The table is fixed:
/// yellow press gets a higher confidence bar and always routes to moderation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    pub min_confidence_override: Option<i64>,
    pub force_moderation: bool,
}

impl ReliabilityTier {
    pub fn policy(&self) -> TierPolicy {
        match self {
            ReliabilityTier::Official | ReliabilityTier::Standard => TierPolicy {
                min_confidence_override: None,
                force_moderation: false,
            },
            ReliabilityTier::YellowPress => TierPolicy {
                min_confidence_override: Some(60),
                force_moderation: true,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Processed,
    Rejected,
    Flagged,
    Error,
}

impl std::fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrawlStatus::Processed => write!(f, "processed"),
            CrawlStatus::Rejected => write!(f, "rejected"),
            CrawlStatus::Flagged => write!(f, "flagged"),
            CrawlStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

// --- Moderation item types (wire labels) ---

pub const MODERATION_TYPE_TIP: &str = "tip";
pub const MODERATION_TYPE_BREAKING_ALERT: &str = "breaking_alert";
pub const MODERATION_TYPE_FLAGGED: &str = "haystack_flagged";

// --- Articles ---

/// An article as fetched from a source, before any processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    pub source_id: String,
    pub source_kind: SourceKind,
    pub source_url: String,
    pub source_name: String,
    pub title: String,
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub language: Language,
    /// Source-typed metadata. Carries `reliability_tier` when the source has one.
    pub raw_metadata: Value,
    pub fetched_at: DateTime<Utc>,
}

impl RawArticle {
    /// The reliability tier carried in the article's metadata.
    /// Unknown or missing tiers degrade to `Standard`.
    pub fn reliability_tier(&self) -> ReliabilityTier {
        self.raw_metadata
            .get("reliability_tier")
            .and_then(|v| v.as_str())
            .map(ReliabilityTier::from_label)
            .unwrap_or_default()
    }
}

/// An article after dedup and relevance classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedArticle {
    pub raw: RawArticle,
    pub relevance_score: f64,
    pub topics: Vec<String>,
    pub geo_tags: Vec<String>,
    pub priority: Priority,
    pub is_duplicate: bool,
    /// Field-note id or crawl-history id of the canonical article.
    pub duplicate_of: Option<String>,
    /// 64-bit SimHash of title + body, hex-encoded.
    pub content_fingerprint: String,
    pub reasoning: String,
}

impl ClassifiedArticle {
    /// A rejection result carrying the raw article through to the archive.
    pub fn rejected(raw: RawArticle, fingerprint: String, reasoning: String) -> Self {
        Self {
            raw,
            relevance_score: 0.0,
            topics: Vec::new(),
            geo_tags: Vec::new(),
            priority: Priority::Low,
            is_duplicate: false,
            duplicate_of: None,
            content_fingerprint: fingerprint,
            reasoning,
        }
    }

    /// A duplicate result linking the canonical article.
    pub fn duplicate(
        raw: RawArticle,
        fingerprint: String,
        duplicate_of: Option<String>,
        reasoning: String,
    ) -> Self {
        Self {
            is_duplicate: true,
            duplicate_of,
            ..Self::rejected(raw, fingerprint, reasoning)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Quote {
    pub speaker: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRef {
    /// "document", "link", "photo", "video"
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFlag {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactCheckNote {
    pub claim: String,
    #[serde(default)]
    pub verification_suggestion: String,
}

/// One hop in an article's source-attribution chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceLogEntry {
    pub source_name: String,
    pub source_url: String,
    pub source_kind: SourceKind,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_error: Option<String>,
}

/// An article after 5W1H enrichment and risk analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedArticle {
    pub classified: ClassifiedArticle,
    pub who: Option<String>,
    pub what: String,
    pub when_occurred: Option<String>,
    pub where_location: Option<String>,
    pub why: Option<String>,
    pub how: Option<String>,
    pub quotes: Vec<Quote>,
    pub evidence_refs: Vec<EvidenceRef>,
    pub risk_flags: Vec<RiskFlag>,
    pub fact_check_notes: Vec<FactCheckNote>,
    /// 0-100 extraction-quality score assigned by the LLM.
    pub confidence_score: i64,
    pub source_log: Vec<SourceLogEntry>,
}

impl EnrichedArticle {
    pub fn has_high_risk_flag(&self) -> bool {
        self.risk_flags.iter().any(|f| is_high_risk(&f.kind))
    }
}

// --- Persisted shapes ---

/// A configured source feed row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFeed {
    pub id: String,
    pub name: String,
    pub source_kind: SourceKind,
    #[serde(default)]
    pub url: String,
    pub is_active: bool,
    #[serde(default)]
    pub reliability_tier: ReliabilityTier,
    #[serde(default)]
    pub default_topics: Vec<String>,
    #[serde(default)]
    pub default_geo_tags: Vec<String>,
    #[serde(default)]
    pub poll_interval_minutes: Option<i64>,
    /// Per-kind collector configuration (selectors, API type, queries, ...).
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub last_fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub consecutive_errors: i64,
    #[serde(default)]
    pub reliability_score: Option<f64>,
}

impl SourceFeed {
    /// Synthetic source used when a tips cycle finds no `tip` source rows.
    /// The tip collector ignores its source argument, but the collect stage
    /// still needs one row to dispatch on.
    pub fn virtual_tip_source() -> Self {
        Self {
            id: "moderation_queue".to_string(),
            name: "User Tips".to_string(),
            source_kind: SourceKind::Tip,
            url: String::new(),
            is_active: true,
            reliability_tier: ReliabilityTier::Standard,
            default_topics: Vec::new(),
            default_geo_tags: Vec::new(),
            poll_interval_minutes: None,
            config: Value::Null,
            last_fetched_at: None,
            last_error: None,
            consecutive_errors: 0,
            reliability_score: None,
        }
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    pub fn config_u64(&self, key: &str, default: u64) -> u64 {
        self.config
            .get(key)
            .and_then(|v| v.as_u64())
            .unwrap_or(default)
    }
}

/// A processed-article row in crawl history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub id: String,
    pub source_feed_id: String,
    pub source_url: String,
    pub content_fingerprint: String,
    pub pipeline_run_id: String,
    pub raw_data: Value,
    pub status: CrawlStatus,
    #[serde(default)]
    pub relevance_score: Option<f64>,
    #[serde(default)]
    pub was_relevant: bool,
    #[serde(default)]
    pub was_duplicate: bool,
    #[serde(default)]
    pub classification_data: Option<Value>,
    #[serde(default)]
    pub field_note_id: Option<String>,
    #[serde(default)]
    pub moderation_item_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Insert shape for a crawl-history row. The store assigns id and fetched_at.
#[derive(Debug, Clone, Serialize)]
pub struct NewCrawlRecord {
    pub source_feed_id: String,
    pub source_url: String,
    pub content_fingerprint: String,
    pub pipeline_run_id: String,
    pub raw_data: Value,
    pub status: CrawlStatus,
    pub relevance_score: Option<f64>,
    pub was_relevant: bool,
    pub was_duplicate: bool,
    pub classification_data: Option<Value>,
    pub field_note_id: Option<String>,
    pub moderation_item_id: Option<String>,
    pub error_message: Option<String>,
}

impl NewCrawlRecord {
    pub fn new(
        source_feed_id: impl Into<String>,
        source_url: impl Into<String>,
        content_fingerprint: impl Into<String>,
        pipeline_run_id: impl Into<String>,
        raw_data: Value,
        status: CrawlStatus,
    ) -> Self {
        Self {
            source_feed_id: source_feed_id.into(),
            source_url: source_url.into(),
            content_fingerprint: content_fingerprint.into(),
            pipeline_run_id: pipeline_run_id.into(),
            raw_data,
            status,
            relevance_score: None,
            was_relevant: false,
            was_duplicate: false,
            classification_data: None,
            field_note_id: None,
            moderation_item_id: None,
            error_message: None,
        }
    }
}

/// A moderation-queue row: an unverified tip, a flagged article, or a
/// breaking-news alert awaiting an editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub content: String,
    pub status: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub submitter_email: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert shape for a field note (status `raw`, authored by the bot).
#[derive(Debug, Clone, Serialize)]
pub struct NewFieldNote {
    pub what: String,
    pub who: Option<String>,
    pub when_occurred: Option<String>,
    pub where_location: Option<String>,
    pub why: Option<String>,
    pub how: Option<String>,
    pub quotes: Vec<Quote>,
    pub evidence_refs: Vec<EvidenceRef>,
    pub confidence_score: i64,
    pub safety_legal_flags: Vec<String>,
    pub raw_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldNote {
    pub id: String,
    #[serde(default)]
    pub what: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: String,
    pub run_type: RunKind,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stats: Value,
    #[serde(default)]
    pub errors: Vec<Value>,
    #[serde(default)]
    pub sources_polled: Vec<String>,
}
