//! Transport and structure checks applied to fetched pages.
//!
//! Both validators are pure: they inspect a [`FetchedPage`] and return the
//! failure it represents, if any.

use crate::core::failure::{FailureClass, FailureEvent};
use crate::core::types::FetchedPage;

pub const MIN_BODY_BYTES: usize = 512;

/// Lowercase markers of pages that only render with JavaScript or behind a challenge.
pub const JS_ONLY_MARKERS: [&[u8]; 3] = [b"enable javascript", b"<noscript>", b"captcha"];

/// Classify the HTTP status of a response.
pub fn validate_transport(page: &FetchedPage) -> Option<FailureEvent> {
    match page.status {
        status if status >= 500 => Some(FailureEvent::new(
            FailureClass::ServerError,
            Some(status),
            "server error",
        )),
        429 => Some(FailureEvent::rate_limited(429, retry_after_seconds(page))),
        status @ (401 | 403 | 404) => Some(FailureEvent::new(
            FailureClass::ClientError,
            Some(status),
            "client blocked",
        )),
        _ => None,
    }
}

/// Reject bodies too small to carry content and JS-only placeholders.
pub fn validate_structure(page: &FetchedPage) -> Option<FailureEvent> {
    if page.body.len() < MIN_BODY_BYTES {
        return Some(FailureEvent::semantic(format!(
            "body too small ({} bytes)",
            page.body.len()
        )));
    }

    let lowered = page.body.to_ascii_lowercase();
    if JS_ONLY_MARKERS
        .iter()
        .any(|marker| contains_subslice(&lowered, marker))
    {
        return Some(FailureEvent::semantic("JS-only placeholder"));
    }

    None
}

fn retry_after_seconds(page: &FetchedPage) -> Option<u64> {
    page.headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, value)| value.trim().parse::<u64>().ok())
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn page(status: u16, body: &[u8]) -> FetchedPage {
        FetchedPage {
            url: "https://example.com/".to_string(),
            status,
            headers: BTreeMap::new(),
            body: body.to_vec(),
        }
    }

    fn long_body() -> Vec<u8> {
        let mut body = b"<html><body><p>".to_vec();
        body.extend(std::iter::repeat_n(b'x', MIN_BODY_BYTES));
        body.extend_from_slice(b"</p></body></html>");
        body
    }

    #[test]
    fn server_errors_are_classified() {
        let failure = validate_transport(&page(503, b"")).expect("failure");
        assert_eq!(failure.failure_class(), FailureClass::ServerError);
        assert_eq!(failure.http_status(), Some(503));
    }

    #[test]
    fn rate_limit_reads_retry_after_header() {
        let mut limited = page(429, b"");
        limited
            .headers
            .insert("Retry-After".to_string(), "12".to_string());
        let failure = validate_transport(&limited).expect("failure");
        assert_eq!(failure.failure_class(), FailureClass::RateLimit);
        assert_eq!(failure.retry_after_seconds(), Some(12));

        let failure = validate_transport(&page(429, b"")).expect("failure");
        assert_eq!(failure.retry_after_seconds(), None);
    }

    #[test]
    fn blocked_statuses_are_client_errors() {
        for status in [401, 403, 404] {
            let failure = validate_transport(&page(status, b"")).expect("failure");
            assert_eq!(failure.failure_class(), FailureClass::ClientError);
        }
        assert!(validate_transport(&page(200, b"")).is_none());
        assert!(validate_transport(&page(410, b"")).is_none());
    }

    #[test]
    fn small_body_is_semantic_failure() {
        let body = b"<html><body>Example Domain</body></html>";
        let failure = validate_structure(&page(200, body)).expect("failure");
        assert_eq!(failure.failure_class(), FailureClass::Semantic);
        assert!(failure.message().contains("too small"));
    }

    #[test]
    fn js_placeholder_is_semantic_failure() {
        let mut body = long_body();
        body.extend_from_slice(b"Please ENABLE JavaScript to continue");
        let failure = validate_structure(&page(200, &body)).expect("failure");
        assert_eq!(failure.message(), "JS-only placeholder");
    }

    #[test]
    fn normal_body_passes_structure() {
        assert!(validate_structure(&page(200, &long_body())).is_none());
    }
}
