//! JA→EN translation for Japanese articles, ahead of 5W1H extraction.

use ai_client::{generate_json, LlmGenerate};
use tracing::error;

use haystack_common::text::truncate;

use crate::prompts;

pub struct Translation {
    pub title_en: String,
    pub body_en: String,
    pub summary_en: String,
}

/// Translate a Japanese article title and body to English.
/// Falls back to the originals on any failure — enrichment must not lose
/// an article because the translator hiccuped.
pub async fn translate_article(llm: &dyn LlmGenerate, title: &str, body: &str) -> Translation {
    let prompt = prompts::translate_prompt(title, body);
    match generate_json(llm, prompts::TRANSLATE_SYSTEM, &prompt, 0.2).await {
        Ok(result) => Translation {
            title_en: result
                .get("title_en")
                .and_then(|v| v.as_str())
                .unwrap_or(title)
                .to_string(),
            body_en: result
                .get("body_en")
                .and_then(|v| v.as_str())
                .unwrap_or(body)
                .to_string(),
            summary_en: result
                .get("summary_en")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        },
        Err(e) => {
            error!(error = %e, title = %truncate(title, 60), "translation failed");
            Translation {
                title_en: title.to_string(),
                body_en: body.to_string(),
                summary_en: String::new(),
            }
        }
    }
}
