//! Minimal HTML text and link extraction.
//!
//! Pages are reduced to readable lines; this is not a DOM parser. Script,
//! style and head content is dropped, block-level closing tags become line
//! breaks, remaining tags are removed and common entities decoded.

use std::sync::LazyLock;

use regex_lite::Regex;

static INVISIBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|head|template)\b.*?</(script|style|noscript|head|template)\s*>")
        .expect("valid regex")
});
static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(br|/p|/div|/li|/tr|/h[1-6]|/section|/article|/header|/footer|/ul|/ol|/table)\b[^>]*>")
        .expect("valid regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a\s*>"#).expect("valid regex")
});

/// Decode the handful of entities that matter for readability.
pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Visible text of a page, one non-empty chunk per line.
pub fn extract_text(html: &str) -> String {
    let without_hidden = INVISIBLE.replace_all(html, "");
    let without_comments = COMMENT.replace_all(&without_hidden, "");
    let with_breaks = BLOCK_BREAK.replace_all(&without_comments, "\n");
    let bare = TAG.replace_all(&with_breaks, "");
    let decoded = decode_entities(&bare);

    decoded
        .lines()
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inner text with tags removed and whitespace collapsed.
pub fn inline_text(fragment: &str) -> String {
    decode_entities(&TAG.replace_all(fragment, ""))
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `(text, href)` for every anchor with an href, in document order.
pub fn extract_links(html: &str) -> Vec<(String, String)> {
    ANCHOR
        .captures_iter(html)
        .filter_map(|caps| {
            let href = decode_entities(caps.get(1)?.as_str().trim());
            let text = inline_text(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
            (!href.is_empty()).then_some((text, href))
        })
        .collect()
}

/// Split text into chunks of at most `max_length` characters on line
/// boundaries. A single line longer than the limit becomes its own chunk.
pub fn split_text(text: &str, max_length: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for paragraph in text.split('\n') {
        let len = paragraph.chars().count() + 1;
        if current_len + len <= max_length || current.is_empty() {
            current.push(paragraph);
            current_len += len;
        } else {
            chunks.push(current.join("\n"));
            current = vec![paragraph];
            current_len = len;
        }
    }
    if !current.is_empty() {
        chunks.push(current.join("\n"));
    }
    chunks
}
