//! Prompt templates for classification, enrichment, translation, and
//! cross-language dedup. Articles arrive in English or Japanese; every
//! prompt demands English JSON back.

use haystack_common::text::truncate;
use haystack_common::types::{RawArticle, GEO_TAGS, TOPICS};

pub const CLASSIFY_SYSTEM: &str = r#"You are Haystack, an AI news classifier for Niseko Gazet, a local news platform covering the Niseko area of Hokkaido, Japan.

Your job is to analyze articles and determine:
1. Relevance to the Niseko area and its readership
2. Topic categorization
3. Geographic tagging
4. Priority level
5. Brief reasoning

CRITICAL RULES:
- Score relevance 0.0 to 1.0 (1.0 = directly about Niseko)
- Articles about Hokkaido get moderate relevance (0.4-0.6)
- Articles about Japan-wide policy affecting Niseko get low-moderate (0.3-0.5)
- Completely unrelated articles get very low scores (0.0-0.2)
- Be generous with relevance — it's better to include marginally relevant content for human review
- You MUST handle articles in both English and Japanese (日本語)
- Always respond in English JSON regardless of the article language

JAPANESE ARTICLE HANDLING:
- Japanese place names should be matched to geo_tags (e.g., 倶知安町 → kutchan, ニセコ町 → niseko_town, 蘭越町 → rankoshi)
- Common Hokkaido terms: 北海道 = Hokkaido, 後志 = Shiribeshi (subprefecture containing Niseko), 羊蹄山 = Mt. Yotei
- Municipal sources (町, 市, 村) from the Niseko area are highly relevant (0.7-1.0)
- JMA weather warnings (気象警報) for Shiribeshi/Niseko area are high priority

Respond with ONLY valid JSON."#;

fn vocab_block() -> String {
    format!(
        "Valid topics: {}\n\nValid geo_tags: {}\n\nValid priorities: breaking, high, normal, low",
        TOPICS.join(", "),
        GEO_TAGS.join(", ")
    )
}

pub fn classify_prompt(article: &RawArticle) -> String {
    format!(
        r#"Classify this article for Niseko Gazet relevance.

TITLE: {title}
SOURCE: {source_name} ({source_kind})
LANGUAGE: {language}
BODY (first 2000 chars):
{body}

Respond with this exact JSON format:
{{
  "relevance_score": 0.0,
  "topics": ["topic1", "topic2"],
  "geo_tags": ["area1"],
  "priority": "normal",
  "reasoning": "Brief explanation in English"
}}

{vocab}"#,
        title = article.title,
        source_name = article.source_name,
        source_kind = article.source_kind,
        language = article.language,
        body = truncate(&article.body, 2000),
        vocab = vocab_block(),
    )
}

pub fn classify_batch_prompt(articles: &[&RawArticle]) -> String {
    let mut articles_block = String::new();
    for (i, article) in articles.iter().enumerate() {
        articles_block.push_str(&format!(
            "\n--- Article {n} ---\nTITLE: {title}\nSOURCE: {source_name} ({source_kind})\nLANGUAGE: {language}\nBODY: {body}\n",
            n = i + 1,
            title = article.title,
            source_name = article.source_name,
            source_kind = article.source_kind,
            language = article.language,
            body = truncate(&article.body, 800),
        ));
    }

    format!(
        r#"Classify these {count} articles for Niseko Gazet relevance.
Return a JSON array with one object per article, in the same order.

ARTICLES:
{articles_block}

Respond with ONLY a JSON array of {count} objects, each with this format:
{{
  "relevance_score": 0.0,
  "topics": ["topic1"],
  "geo_tags": ["area1"],
  "priority": "normal",
  "reasoning": "Brief explanation"
}}

{vocab}"#,
        count = articles.len(),
        vocab = vocab_block(),
    )
}

pub const ENRICH_SYSTEM: &str = r#"You are Haystack, an AI news enrichment engine for Niseko Gazet.

Your job is to extract structured 5W1H information from classified articles:
- WHO is involved
- WHAT happened
- WHEN it occurred
- WHERE it happened
- WHY it happened
- HOW it happened

Also extract direct quotes, evidence references, and identify any risk flags.

CRITICAL RULES:
- NEVER fabricate information that isn't in the source text
- NEVER add facts, quotes, or details not present in the article
- If information is unavailable, use null
- Extract actual quotes with proper attribution
- Flag content that may need editorial review
- You MUST handle articles in both English and Japanese (日本語)
- Always respond in English JSON regardless of the article language
- For Japanese articles: translate key facts to English in 5W1H fields, keep original quotes in Japanese with English translation

JAPANESE CONTENT RULES:
- Translate the "what" summary to English
- Keep Japanese proper nouns in both scripts: "倶知安町 (Kutchan Town)"
- For quotes: include original Japanese text AND English translation
- Where location: use English name with Japanese in parentheses, e.g. "Kutchan Town (倶知安町)"

Respond with ONLY valid JSON."#;

pub fn enrich_prompt(
    title: &str,
    source_name: &str,
    language: &str,
    published_at: &str,
    body: &str,
) -> String {
    format!(
        r#"Extract structured 5W1H information from this article.

TITLE: {title}
SOURCE: {source_name}
LANGUAGE: {language}
PUBLISHED: {published_at}
BODY:
{body}

Respond with this exact JSON format:
{{
  "who": "Person or organization involved, or null",
  "what": "Concise summary of what happened (in English)",
  "when_occurred": "ISO datetime if mentioned, or null",
  "where_location": "Specific location if mentioned (English with Japanese in parentheses), or null",
  "why": "Reason or cause if mentioned, or null",
  "how": "Method or process if mentioned, or null",
  "quotes": [
    {{"speaker": "Name", "text": "Exact quote (original language)", "translation": "English translation if not English", "context": "Context"}}
  ],
  "evidence_refs": [
    {{"type": "document|link|photo|video", "url": "URL if available", "description": "What it is"}}
  ],
  "risk_flags": [
    {{"type": "flag_type", "description": "Why flagged", "severity": "low|medium|high"}}
  ],
  "fact_check_notes": [
    {{"claim": "Verifiable claim", "verification_suggestion": "How to verify"}}
  ],
  "confidence_score": 75
}}

Valid risk_flag types: identifiable_private_individual, minor_involved, allegation_or_crime_accusation, ongoing_investigation, medical_or_public_health_claim, high_defamation_risk, graphic_content, sensitive_location

Confidence score (0-100): How confident you are in the extraction quality.
100 = all 5W1H clearly answered with quotes and evidence.
50 = partial information, some gaps.
0 = very little extractable information."#
    )
}

pub const TRANSLATE_SYSTEM: &str = r#"You are a professional Japanese-to-English translator for a local news platform covering the Niseko area of Hokkaido, Japan.

Rules:
- Translate accurately and naturally to English
- Preserve all factual content — NEVER add or remove information
- Keep proper nouns in both scripts: "倶知安町 (Kutchan Town)"
- Keep Japanese organization names with translation: "北海道開発局 (Hokkaido Development Bureau)"
- For quotes: include both Japanese original and English translation
- Maintain the journalistic tone of the original

Respond with ONLY valid JSON."#;

pub fn translate_prompt(title: &str, body: &str) -> String {
    format!(
        r#"Translate this Japanese news article to English.

TITLE (JA): {title}
BODY (JA):
{body}

Respond with:
{{
  "title_en": "English title",
  "body_en": "Full English translation of the body",
  "summary_en": "1-2 sentence English summary"
}}"#
    )
}

pub const CROSS_LANG_SYSTEM: &str = r#"You are a bilingual news deduplication engine. Given two articles in different languages, determine if they cover the SAME story/event.

Rules:
- Two articles about the same event are duplicates even if one is in Japanese and one in English
- Articles about different aspects of the same topic are NOT duplicates
- Focus on: same event, same date, same people/organizations, same location
- Respond with ONLY valid JSON."#;

#[allow(clippy::too_many_arguments)]
pub fn cross_lang_prompt(
    lang_a: &str,
    title_a: &str,
    body_a: &str,
    lang_b: &str,
    title_b: &str,
    body_b: &str,
) -> String {
    format!(
        r#"Are these two articles about the same story?

ARTICLE A ({lang_a}):
Title: {title_a}
Body: {body_a}

ARTICLE B ({lang_b}):
Title: {title_b}
Body: {body_b}

Respond with:
{{
  "is_same_story": true/false,
  "confidence": 0.0-1.0,
  "reasoning": "Brief explanation"
}}"#,
        body_a = truncate(body_a, 800),
        body_b = truncate(body_b, 800),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn classify_prompt_includes_vocabularies() {
        let article = fixtures::raw_article("Snow Report", "20cm overnight");
        let prompt = classify_prompt(&article);
        assert!(prompt.contains("snow_conditions"));
        assert!(prompt.contains("kutchan"));
        assert!(prompt.contains("breaking, high, normal, low"));
    }

    #[test]
    fn batch_prompt_numbers_articles_in_order() {
        let a = fixtures::raw_article("First", "body one");
        let b = fixtures::raw_article("Second", "body two");
        let prompt = classify_batch_prompt(&[&a, &b]);
        assert!(prompt.contains("--- Article 1 ---"));
        assert!(prompt.contains("--- Article 2 ---"));
        assert!(prompt.find("First").unwrap() < prompt.find("Second").unwrap());
        assert!(prompt.contains("these 2 articles"));
    }

    #[test]
    fn enrich_prompt_carries_published_fallback() {
        let prompt = enrich_prompt("T", "Source", "en", "Unknown", "Body");
        assert!(prompt.contains("PUBLISHED: Unknown"));
    }

    #[test]
    fn cross_lang_prompt_truncates_bodies() {
        let long_body = "x".repeat(2000);
        let prompt = cross_lang_prompt("en", "A", &long_body, "ja", "B", "short");
        assert!(prompt.len() < 2000 + 600);
    }
}
