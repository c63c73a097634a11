//! Lexical helpers: markup stripping and token overlap scoring.
//!
//! These are deliberately simple, deterministic heuristics. No embeddings,
//! no language models.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static DROP_BLOCKS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|head|nav|footer|svg)\b.*?</(script|style|noscript|head|nav|footer|svg)\s*>")
        .expect("drop-blocks regex")
});
static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(p|div|br|li|ul|ol|h[1-6]|tr|table|section|article|blockquote|pre)\b[^>]*>")
        .expect("block-tag regex")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex"));

/// Reduce raw HTML bytes to paragraph text separated by blank lines.
///
/// Non-HTML input passes through with whitespace normalized.
pub fn html_to_text(raw: &[u8]) -> String {
    let decoded = String::from_utf8_lossy(raw);
    let without_comments = COMMENT_RE.replace_all(&decoded, " ");
    let without_blocks = DROP_BLOCKS_RE.replace_all(&without_comments, " ");
    let with_breaks = BLOCK_TAG_RE.replace_all(&without_blocks, "\n");
    let stripped = TAG_RE.replace_all(&with_breaks, " ");
    let unescaped = decode_entities(&stripped);

    unescaped
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Lowercased whitespace-separated tokens with surrounding punctuation trimmed.
pub fn tokens(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .map(|token| {
            token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

/// Fraction of query tokens present in `text`.
pub fn lexical_overlap_score(query: &str, text: &str) -> f64 {
    let query_tokens = tokens(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let text_tokens = tokens(text);
    let overlap = query_tokens.intersection(&text_tokens).count();
    overlap as f64 / query_tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_and_scripts() {
        let html = b"<html><head><title>t</title></head><body><script>var x = 1;</script>\
<h1>Rust &amp; Safety</h1><p>Ownership prevents <b>data races</b>.</p><!-- hidden --></body></html>";
        let text = html_to_text(html);
        assert_eq!(text, "Rust & Safety\n\nOwnership prevents data races .");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(html_to_text(b"alpha  beta\n\ngamma"), "alpha beta\n\ngamma");
    }

    #[test]
    fn tokens_are_normalized() {
        let got = tokens("Hello, WORLD! (hello)");
        assert_eq!(got.into_iter().collect::<Vec<_>>(), vec!["hello", "world"]);
    }

    #[test]
    fn overlap_is_fraction_of_query_tokens() {
        assert_eq!(lexical_overlap_score("rust memory safety", "Rust gives memory safety."), 1.0);
        assert!((lexical_overlap_score("rust memory safety", "rust only") - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(lexical_overlap_score("", "anything"), 0.0);
        assert_eq!(lexical_overlap_score("absent", "nothing here"), 0.0);
    }
}
