//! Web search collaborator backed by the DuckDuckGo HTML endpoint.

use std::collections::HashSet;
use std::io::Read;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::core::robots::split_url;
use crate::io::config::HttpConfig;

const ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const MAX_RESPONSE_BYTES: u64 = 2 * 1024 * 1024;

static RESULT_ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*\bclass="[^"]*\bresult__a\b[^"]*"[^>]*>"#)
        .expect("result anchor regex")
});
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhref="([^"]+)""#).expect("href regex"));

/// Query string to ordered candidate URLs.
///
/// Implementations return an empty list instead of propagating faults.
pub trait Searcher {
    fn search(&self, query: &str, max_results: usize) -> Vec<String>;
}

pub struct DuckDuckGoSearch {
    agent: ureq::Agent,
    endpoint: String,
}

impl DuckDuckGoSearch {
    pub fn new(config: &HttpConfig) -> Self {
        Self::with_endpoint(config, ENDPOINT)
    }

    pub fn with_endpoint(config: &HttpConfig, endpoint: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
            .timeout_read(Duration::from_millis(config.read_timeout_ms))
            .user_agent(&config.user_agent)
            .build();
        Self {
            agent,
            endpoint: endpoint.to_string(),
        }
    }
}

impl Searcher for DuckDuckGoSearch {
    #[instrument(skip(self))]
    fn search(&self, query: &str, max_results: usize) -> Vec<String> {
        let response = match self.agent.get(&self.endpoint).query("q", query).call() {
            Ok(response) => response,
            Err(err) => {
                warn!(err = %err, "search request failed");
                return Vec::new();
            }
        };
        let mut body = Vec::new();
        if let Err(err) = response
            .into_reader()
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut body)
        {
            warn!(err = %err, "search response read failed");
            return Vec::new();
        }
        let urls = parse_results(&String::from_utf8_lossy(&body), max_results);
        debug!(count = urls.len(), "search results");
        urls
    }
}

/// Extract result URLs from a DuckDuckGo HTML results page, in page order,
/// deduplicated and truncated to `max_results`.
pub fn parse_results(html: &str, max_results: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    RESULT_ANCHOR_RE
        .find_iter(html)
        .filter_map(|anchor| HREF_RE.captures(anchor.as_str()))
        .filter_map(|caps| resolve_href(&caps[1].replace("&amp;", "&")))
        .filter(|url| split_url(url).is_some())
        .filter(|url| seen.insert(url.clone()))
        .take(max_results)
        .collect()
}

/// Unwrap DuckDuckGo redirect links (`/l/?uddg=<encoded>`) to their target.
fn resolve_href(href: &str) -> Option<String> {
    let Some((_, query)) = href.split_once('?') else {
        return Some(href.to_string());
    };
    if !href.contains("duckduckgo.com/l/") && !href.starts_with("/l/") {
        return Some(href.to_string());
    }
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("uddg="))
        .and_then(percent_decode)
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<div class="result">
  <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fdoc.rust-lang.org%2Fbook%2F&amp;rut=abc">The Book</a>
  <a class="result__snippet" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fignored.example%2F">snippet</a>
</div>
<div class="result">
  <a href="https://blog.example.com/ownership" class="result__a">Ownership</a>
</div>
<div class="result">
  <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fdoc.rust-lang.org%2Fbook%2F&amp;rut=def">Dup</a>
  <a class="result__a" href="javascript:void(0)">Ad</a>
  <a class="result__a" href="https://third.example/">Third</a>
</div>
"#;

    #[test]
    fn extracts_decodes_and_dedups() {
        let urls = parse_results(PAGE, 5);
        assert_eq!(
            urls,
            vec![
                "https://doc.rust-lang.org/book/",
                "https://blog.example.com/ownership",
                "https://third.example/",
            ]
        );
    }

    #[test]
    fn truncates_to_requested_count() {
        assert_eq!(parse_results(PAGE, 1), vec!["https://doc.rust-lang.org/book/"]);
        assert!(parse_results("<html>no results</html>", 5).is_empty());
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(percent_decode("a%20b+c").as_deref(), Some("a b c"));
        assert_eq!(percent_decode("%zz"), None);
    }

    #[test]
    fn unreachable_endpoint_yields_empty_list() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let search =
            DuckDuckGoSearch::with_endpoint(&HttpConfig::default(), &format!("http://{addr}/html/"));
        assert!(search.search("rust", 5).is_empty());
    }
}
