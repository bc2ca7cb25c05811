//! Text processing: HTML stripping, language detection, truncation.

use scraper::{Html, Node};

const SKIP_TAGS: &[&str] = &["script", "style", "noscript"];
const BLOCK_TAGS: &[&str] = &[
    "p", "br", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li",
];

/// Convert an HTML fragment to plain text. Script/style content is dropped,
/// block-level elements end a line, and whitespace is normalized.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    for child in fragment.tree.root().children() {
        collect_text(child, &mut out);
    }

    let collapsed_newlines = regex::Regex::new(r"\n{3,}")
        .expect("invalid newline regex")
        .replace_all(&out, "\n\n")
        .into_owned();
    regex::Regex::new(r"[ \t]+")
        .expect("invalid whitespace regex")
        .replace_all(&collapsed_newlines, " ")
        .trim()
        .to_string()
}

fn collect_text(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(&text),
        Node::Element(element) => {
            let name = element.name();
            if SKIP_TAGS.contains(&name) {
                return;
            }
            for child in node.children() {
                collect_text(child, out);
            }
            if BLOCK_TAGS.contains(&name) {
                out.push('\n');
            }
        }
        _ => {
            for child in node.children() {
                collect_text(child, out);
            }
        }
    }
}

/// Detect whether text is primarily Japanese or English.
///
/// Heuristic: more than 20% CJK characters classifies as Japanese. The 20%
/// bar (rather than 30%) catches mixed-language articles from bilingual
/// sources.
pub fn detect_language(text: &str) -> crate::types::Language {
    use crate::types::Language;

    let mut cjk = 0usize;
    let mut total = 0usize;
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        total += 1;
        if is_cjk(c) {
            cjk += 1;
        }
    }

    if total == 0 {
        return Language::En;
    }
    if (cjk as f64 / total as f64) > 0.2 {
        Language::Ja
    } else {
        Language::En
    }
}

/// CJK Unified Ideographs + Hiragana + Katakana + half-width Katakana.
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3040}'..='\u{309F}'
        | '\u{30A0}'..='\u{30FF}'
        | '\u{FF65}'..='\u{FF9F}')
}

/// True when the string contains any CJK character. Used as the
/// opposite-language proxy in cross-language dedup.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when
/// anything was cut. Counts characters, not bytes, so Japanese text is safe.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Collapse all whitespace runs to single spaces.
pub fn clean_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
