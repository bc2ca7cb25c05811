//! Cross-language duplicate detection: did a Japanese source already cover
//! the story this English article tells (or vice versa)?

use anyhow::Result;
use tracing::{error, info};

use ai_client::generate_json;
use haystack_common::text::{contains_cjk, truncate};
use haystack_common::types::{CrawlRecord, Language, RawArticle, SourceKind};

use crate::prompts;

use super::state::PipelineDeps;

const CANDIDATE_WINDOW: u32 = 20;
const MAX_LLM_CHECKS: usize = 3;
const MATCH_CONFIDENCE: f64 = 0.7;

pub(crate) struct CrossLangMatch {
    pub duplicate_of: Option<String>,
    pub reasoning: String,
}

/// Check whether the article duplicates a recent story in the opposite
/// language. Social posts and tips are skipped — they are rarely
/// cross-language duplicates of news articles.
pub(crate) async fn check(
    deps: &PipelineDeps,
    article: &RawArticle,
) -> Result<Option<CrossLangMatch>> {
    if matches!(article.source_kind, SourceKind::Social | SourceKind::Tip) {
        return Ok(None);
    }

    let recent = deps
        .store
        .recent_relevant_nonduplicates(CANDIDATE_WINDOW)
        .await?;

    let candidates = opposite_language_candidates(article, &recent);
    if candidates.is_empty() {
        return Ok(None);
    }

    for candidate in candidates.into_iter().take(MAX_LLM_CHECKS) {
        let candidate_title = candidate
            .raw_data
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if candidate_title.is_empty() {
            continue;
        }
        let candidate_body = candidate
            .raw_data
            .get("body")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let prompt = prompts::cross_lang_prompt(
            &article.language.to_string(),
            &article.title,
            &article.body,
            &article.language.opposite().to_string(),
            candidate_title,
            candidate_body,
        );

        let verdict =
            match generate_json(deps.llm.as_ref(), prompts::CROSS_LANG_SYSTEM, &prompt, 0.1).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    error!(error = %e, "cross-language check failed");
                    continue;
                }
            };

        let is_same = verdict
            .get("is_same_story")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let confidence = verdict
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        if is_same && confidence >= MATCH_CONFIDENCE {
            info!(
                title = %truncate(&article.title, 60),
                match_title = %truncate(candidate_title, 60),
                confidence,
                "cross-language duplicate"
            );
            return Ok(Some(CrossLangMatch {
                duplicate_of: candidate
                    .field_note_id
                    .clone()
                    .or_else(|| Some(candidate.id.clone())),
                reasoning: verdict
                    .get("reasoning")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Cross-language duplicate")
                    .to_string(),
            }));
        }
    }

    Ok(None)
}

/// Filter crawl records to opposite-language candidates.
///
/// Detection keys on CJK presence in the stored title only — a candidate
/// whose title was stored fully translated (but whose body was not) is
/// missed. Known limitation, accepted.
pub(crate) fn opposite_language_candidates<'a>(
    article: &RawArticle,
    records: &'a [CrawlRecord],
) -> Vec<&'a CrawlRecord> {
    let want_cjk = article.language.opposite() == Language::Ja;

    records
        .iter()
        .filter(|record| record.source_url != article.source_url)
        .filter(|record| {
            let title = record
                .raw_data
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            contains_cjk(title) == want_cjk
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, TestDeps};

    fn record_titled(title: &str, url: &str) -> CrawlRecord {
        let mut record = fixtures::crawl_record("src-x", "fp-x", false);
        record.raw_data = serde_json::json!({ "title": title, "body": "body" });
        record.source_url = url.to_string();
        record
    }

    #[test]
    fn english_article_gets_japanese_candidates() {
        let article = fixtures::raw_article("Road closure tonight", "Route 5 closed");
        let records = vec![
            record_titled("道道5号が通行止め", "https://ja.example.com/a"),
            record_titled("Unrelated English story", "https://en.example.com/b"),
        ];

        let candidates = opposite_language_candidates(&article, &records);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source_url, "https://ja.example.com/a");
    }

    #[test]
    fn own_url_is_never_a_candidate() {
        let article = fixtures::raw_article("Road closure", "Route 5 closed");
        let records = vec![record_titled("道道5号", &article.source_url)];
        assert!(opposite_language_candidates(&article, &records).is_empty());
    }

    #[tokio::test]
    async fn social_articles_skip_the_check_entirely() {
        // Store primed with a Japanese candidate and an LLM scripted to
        // answer "same story". Neither may be consulted for social posts.
        let deps = TestDeps::new()
            .with_crawl_record(record_titled("大雪警報", "https://ja.example.com/a"))
            .with_llm_responses(vec![
                r#"{"is_same_story": true, "confidence": 0.99, "reasoning": "same"}"#,
            ])
            .build();

        let mut article = fixtures::raw_article("Heavy snow warning", "Warning issued");
        article.source_kind = SourceKind::Social;

        let result = check(&deps, &article).await.unwrap();
        assert!(result.is_none());
        assert_eq!(deps.llm_calls(), 0);
    }

    #[tokio::test]
    async fn confident_match_is_accepted() {
        let mut record = record_titled("大雪警報が発表", "https://ja.example.com/a");
        record.field_note_id = Some("note-7".to_string());

        let deps = TestDeps::new()
            .with_crawl_record(record)
            .with_llm_responses(vec![
                r#"{"is_same_story": true, "confidence": 0.9, "reasoning": "Same storm warning"}"#,
            ])
            .build();

        let article = fixtures::raw_article("Heavy snow warning issued", "JMA issued a warning");
        let result = check(&deps, &article).await.unwrap().unwrap();
        assert_eq!(result.duplicate_of.as_deref(), Some("note-7"));
        assert_eq!(result.reasoning, "Same storm warning");
    }

    #[tokio::test]
    async fn low_confidence_match_is_rejected() {
        let deps = TestDeps::new()
            .with_crawl_record(record_titled("大雪警報", "https://ja.example.com/a"))
            .with_llm_responses(vec![
                r#"{"is_same_story": true, "confidence": 0.5, "reasoning": "maybe"}"#,
            ])
            .build();

        let article = fixtures::raw_article("Heavy snow warning", "Warning issued");
        assert!(check(&deps, &article).await.unwrap().is_none());
    }
}
