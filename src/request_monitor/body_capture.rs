//! Pure decision logic for whether to fetch a paused response's body.
//!
//! Kept free of any devtools types so it can be tested without a browser.

use crate::utils::constants::REDIRECT_STATUS_CODES;

/// The inputs available about a paused response before deciding whether to
/// call `fetch.getResponseBody`.
#[derive(Debug, Clone, Copy)]
pub struct BodyDecisionInput<'a> {
    pub status_code: Option<i64>,
    pub content_length: Option<u64>,
    pub has_location_header: bool,
    pub max_content_size: u64,
    pub headers_present: bool,
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a> BodyDecisionInput<'a> {
    #[must_use]
    pub fn new(
        status_code: Option<i64>,
        content_length: Option<u64>,
        has_location_header: bool,
        max_content_size: u64,
        headers_present: bool,
    ) -> Self {
        Self {
            status_code,
            content_length,
            has_location_header,
            max_content_size,
            headers_present,
            _marker: std::marker::PhantomData,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyDecision {
    Fetch,
    SkipNoHeaders,
    SkipEmpty,
    SkipTooLarge,
    SkipRedirect,
}

/// Applies the body-capture policy from the response-stage interception
/// contract, in the documented precedence order.
#[must_use]
pub fn decide(input: BodyDecisionInput) -> BodyDecision {
    if !input.headers_present {
        return BodyDecision::SkipNoHeaders;
    }
    if input.content_length == Some(0) {
        return BodyDecision::SkipEmpty;
    }
    if let Some(len) = input.content_length
        && len > input.max_content_size
    {
        return BodyDecision::SkipTooLarge;
    }
    if let Some(status) = input.status_code
        && REDIRECT_STATUS_CODES.contains(&status)
        && input.has_location_header
    {
        return BodyDecision::SkipRedirect;
    }
    BodyDecision::Fetch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(
        status_code: Option<i64>,
        content_length: Option<u64>,
        has_location_header: bool,
        max_content_size: u64,
        headers_present: bool,
    ) -> BodyDecisionInput<'static> {
        BodyDecisionInput::new(status_code, content_length, has_location_header, max_content_size, headers_present)
    }

    #[test]
    fn no_headers_skips() {
        assert_eq!(decide(input(Some(200), None, false, 1_000_000, false)), BodyDecision::SkipNoHeaders);
    }

    #[test]
    fn zero_length_skips() {
        assert_eq!(decide(input(Some(200), Some(0), false, 1_000_000, true)), BodyDecision::SkipEmpty);
    }

    #[test]
    fn oversized_body_skips() {
        assert_eq!(decide(input(Some(200), Some(2_000_000), false, 1_000_000, true)), BodyDecision::SkipTooLarge);
    }

    #[test]
    fn redirect_with_location_skips() {
        assert_eq!(decide(input(Some(302), Some(50), true, 1_000_000, true)), BodyDecision::SkipRedirect);
    }

    #[test]
    fn redirect_status_without_location_fetches() {
        // A 304 without a Location header still gets the body decision treated
        // as an ordinary response — only a Location header marks it a redirect.
        assert_eq!(decide(input(Some(304), Some(50), false, 1_000_000, true)), BodyDecision::Fetch);
    }

    #[test]
    fn ordinary_response_is_fetched() {
        assert_eq!(decide(input(Some(200), Some(512), false, 1_000_000, true)), BodyDecision::Fetch);
    }

    #[test]
    fn precedence_favors_no_headers_over_everything() {
        assert_eq!(decide(input(Some(302), Some(0), true, 1_000_000, false)), BodyDecision::SkipNoHeaders);
    }
}
