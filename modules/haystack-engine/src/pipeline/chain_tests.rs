//! Full-cycle tests: mock collectors, store, and LLM wired into the real
//! stage graph. These pin the properties that matter — conservation,
//! routing, bookkeeping — not individual stage internals.

use haystack_common::fingerprint::simhash;
use haystack_common::types::{
    CrawlStatus, CycleKind, RunKind, RunStatus, SourceKind, MODERATION_TYPE_BREAKING_ALERT,
    MODERATION_TYPE_FLAGGED,
};

use crate::testing::{fixtures, StaticCollector, TestDeps, TestHarness};

use super::Pipeline;

fn pipeline_from(harness: &TestHarness) -> Pipeline {
    // Rebuild deps around the same mock instances so assertions on the
    // harness observe the pipeline's writes.
    Pipeline::new(crate::pipeline::state::PipelineDeps {
        store: harness.store_handle(),
        llm: harness.llm_handle(),
        thresholds: harness.thresholds_handle(),
        collectors: harness.collectors_handle(),
        config: harness.config_handle(),
    })
}

const CLASSIFY_TWO_RELEVANT: &str = r#"[
  {"relevance_score": 0.9, "topics": ["snow_conditions"], "geo_tags": ["niseko"], "priority": "normal", "reasoning": "Snow report"},
  {"relevance_score": 0.8, "topics": ["food_dining"], "geo_tags": ["hirafu"], "priority": "normal", "reasoning": "Restaurant news"}
]"#;

const ENRICH_CONFIDENT: &str =
    r#"{"what": "Fresh powder fell overnight", "confidence_score": 82}"#;
const ENRICH_CONFIDENT_2: &str =
    r#"{"what": "A new restaurant opened", "confidence_score": 76}"#;

#[tokio::test]
async fn full_cycle_approves_and_conserves_articles() {
    let articles = vec![
        fixtures::raw_article("Snow Report: 20cm Fresh Powder", "Fresh powder across the mountain"),
        fixtures::raw_article("New Restaurant Opens", "A new izakaya opened in Hirafu"),
    ];
    let harness = TestDeps::new()
        .with_source(fixtures::source(SourceKind::Feed))
        .with_collector(StaticCollector::returning(SourceKind::Feed, articles))
        .with_llm_responses(vec![CLASSIFY_TWO_RELEVANT, ENRICH_CONFIDENT, ENRICH_CONFIDENT_2])
        .build();
    let pipeline = pipeline_from(&harness);

    let state = pipeline
        .run_cycle(RunKind::Manual, CycleKind::Main)
        .await
        .unwrap();

    // Conservation: every raw article ends in exactly one bucket.
    assert_eq!(state.stats.raw_count, 2);
    assert_eq!(
        state.stats.approved_count
            + state.stats.flagged_count
            + state.stats.rejected_count
            + state.stats.quality_rejected_count,
        state.stats.raw_count
    );
    assert_eq!(state.stats.approved_count, 2);
    assert_eq!(state.created_field_notes.len(), 2);
    assert_eq!(harness.field_notes().len(), 2);

    // Both articles hit crawl history exactly once, as processed rows.
    let rows = harness.crawl_rows();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.status == CrawlStatus::Processed));
    assert!(rows.iter().all(|r| r.field_note_id.is_some()));

    // Fingerprints recorded in crawl history match the articles.
    for (row, note_headline) in rows.iter().zip(["Snow Report", "New Restaurant"]) {
        let title = row.raw_data["title"].as_str().unwrap();
        let body = row.raw_data["body"].as_str().unwrap();
        assert!(title.starts_with(note_headline));
        assert_eq!(row.content_fingerprint, simhash(&format!("{title} {body}")));
    }

    // The run row completed with stats attached.
    let runs = harness.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].stats["raw_count"], serde_json::json!(2));
}

#[tokio::test]
async fn yellow_press_is_flagged_even_with_high_confidence() {
    let mut article = fixtures::raw_article("Rumor about resort sale", "Unverified chatter");
    article.raw_metadata = serde_json::json!({ "reliability_tier": "yellow_press" });

    let harness = TestDeps::new()
        .with_source(fixtures::source(SourceKind::Social))
        .with_collector(StaticCollector::returning(SourceKind::Social, vec![article]))
        .with_llm_responses(vec![
            r#"{"relevance_score": 0.9, "topics": ["business"], "geo_tags": ["niseko"], "priority": "normal", "reasoning": "Resort business"}"#,
            r#"{"what": "A resort sale rumor is circulating", "confidence_score": 90}"#,
        ])
        .build();
    let pipeline = pipeline_from(&harness);

    let state = pipeline
        .run_cycle(RunKind::Manual, CycleKind::Social)
        .await
        .unwrap();

    assert_eq!(state.stats.approved_count, 0);
    assert_eq!(state.stats.flagged_count, 1);

    let items = harness.moderation_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].item_type, MODERATION_TYPE_FLAGGED);

    // Exactly one crawl row for the article, written by the moderation
    // sender with its moderation link.
    let rows = harness.crawl_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, CrawlStatus::Flagged);
    assert_eq!(rows[0].moderation_item_id.as_deref(), Some(items[0].id.as_str()));
}

#[tokio::test]
async fn irrelevant_articles_archive_without_enrichment() {
    let harness = TestDeps::new()
        .with_source(fixtures::source(SourceKind::Feed))
        .with_collector(StaticCollector::returning(
            SourceKind::Feed,
            vec![fixtures::raw_article("Tokyo stock markets", "Nikkei closed higher")],
        ))
        .with_llm_responses(vec![
            r#"{"relevance_score": 0.05, "topics": [], "geo_tags": [], "priority": "low", "reasoning": "Not local"}"#,
        ])
        .build();
    let pipeline = pipeline_from(&harness);

    let state = pipeline
        .run_cycle(RunKind::Manual, CycleKind::Main)
        .await
        .unwrap();

    assert_eq!(state.stats.classified_count, 0);
    assert_eq!(state.stats.rejected_count, 1);
    // Only the classification call happened; enrichment never ran.
    assert_eq!(harness.llm_calls(), 1);

    let rows = harness.crawl_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, CrawlStatus::Rejected);
}

#[tokio::test]
async fn known_fingerprint_is_rejected_without_any_llm_call() {
    let article = fixtures::raw_article("Repeated story", "Identical body text");
    let fingerprint = simhash(&format!("{} {}", article.title, article.body));

    let mut prior = fixtures::crawl_record("src-prior", &fingerprint, true);
    prior.was_relevant = true;

    let harness = TestDeps::new()
        .with_source(fixtures::source(SourceKind::Feed))
        .with_collector(StaticCollector::returning(SourceKind::Feed, vec![article]))
        .with_crawl_record(prior)
        .build();
    let pipeline = pipeline_from(&harness);

    let state = pipeline
        .run_cycle(RunKind::Manual, CycleKind::Main)
        .await
        .unwrap();

    assert_eq!(state.stats.rejected_count, 1);
    assert_eq!(harness.llm_calls(), 0);

    // One prior row + one new rejected row marked duplicate.
    let rows = harness.crawl_rows();
    assert_eq!(rows.len(), 2);
    let new_row = rows.iter().find(|r| r.pipeline_run_id != "run-prior").unwrap();
    assert!(new_row.was_duplicate);
    assert_eq!(new_row.status, CrawlStatus::Rejected);
}

#[tokio::test]
async fn breaking_priority_raises_an_alert_and_still_flows() {
    let harness = TestDeps::new()
        .with_source(fixtures::source(SourceKind::Feed))
        .with_collector(StaticCollector::returning(
            SourceKind::Feed,
            vec![fixtures::raw_article(
                "Avalanche near Annupuri gate",
                "Patrol reports an avalanche outside gate 3",
            )],
        ))
        .with_llm_responses(vec![
            r#"{"relevance_score": 0.95, "topics": ["safety"], "geo_tags": ["annupuri"], "priority": "breaking", "reasoning": "Avalanche"}"#,
            r#"{"what": "An avalanche occurred near the Annupuri backcountry gate", "confidence_score": 85}"#,
        ])
        .build();
    let pipeline = pipeline_from(&harness);

    let state = pipeline
        .run_cycle(RunKind::Manual, CycleKind::Main)
        .await
        .unwrap();

    assert_eq!(state.stats.breaking_count, 1);
    assert_eq!(state.stats.approved_count, 1);

    let items = harness.moderation_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].item_type, MODERATION_TYPE_BREAKING_ALERT);
    assert!(items[0].content.contains("BREAKING NEWS ALERT"));
}

#[tokio::test]
async fn enrichment_failure_degrades_to_quality_reject_and_archive() {
    let harness = TestDeps::new()
        .with_source(fixtures::source(SourceKind::Feed))
        .with_collector(StaticCollector::returning(
            SourceKind::Feed,
            vec![fixtures::raw_article("Hard to parse story", "Body")],
        ))
        .with_llm_responses(vec![
            r#"{"relevance_score": 0.8, "topics": ["events"], "geo_tags": [], "priority": "normal", "reasoning": "ok"}"#,
            "garbage that is not json",
        ])
        .build();
    let pipeline = pipeline_from(&harness);

    let state = pipeline
        .run_cycle(RunKind::Manual, CycleKind::Main)
        .await
        .unwrap();

    // Confidence 10 is at the reject floor, so the gate flags instead.
    assert_eq!(state.stats.enriched_count, 1);
    assert_eq!(state.stats.quality_rejected_count, 0);
    assert_eq!(state.stats.flagged_count, 1, "confidence 10 flags below min 30");

    let rows = harness.crawl_rows();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn schedule_failure_marks_run_failed() {
    let harness = TestDeps::new().build();
    harness.store_handle().fail_next("active_sources");
    let pipeline = pipeline_from(&harness);

    let result = pipeline.run_cycle(RunKind::Scheduled, CycleKind::Main).await;
    assert!(result.is_err());

    let runs = harness.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].stats["error"].is_string());
}

#[tokio::test]
async fn tips_cycle_ingests_and_is_idempotent_across_cycles() {
    let harness = TestDeps::new()
        .with_tip(fixtures::approved_tip("tip-9", "Icy sidewalk outside the school"))
        .build();
    // The tip collector needs the same store the harness observes.
    let registry = crate::collectors::CollectorRegistry::new().register(
        std::sync::Arc::new(crate::collectors::tip::TipCollector::new(
            harness.store_handle(),
        )),
    );
    let pipeline = Pipeline::new(crate::pipeline::state::PipelineDeps {
        store: harness.store_handle(),
        llm: harness.llm_handle(),
        thresholds: harness.thresholds_handle(),
        collectors: registry,
        config: harness.config_handle(),
    });

    // First cycle: the tip is collected and classified.
    harness.push_llm_response(
        r#"{"relevance_score": 0.7, "topics": ["safety"], "geo_tags": ["kutchan"], "priority": "normal", "reasoning": "Hazard tip"}"#,
    );
    harness.push_llm_response(r#"{"what": "An icy sidewalk was reported", "confidence_score": 60}"#);

    let first = pipeline
        .run_cycle(RunKind::Scheduled, CycleKind::Tips)
        .await
        .unwrap();
    assert_eq!(first.stats.raw_count, 1);

    // Second cycle: the ingested flag short-circuits, nothing collected.
    let second = pipeline
        .run_cycle(RunKind::Scheduled, CycleKind::Tips)
        .await
        .unwrap();
    assert_eq!(second.stats.raw_count, 0);
}
