//! URL helpers shared by request normalisation and the data processor's
//! extraction sweep.

use url::Url;

/// Schemes excluded from the DataProcessor's URL-extraction sweep.
const EXCLUDED_EXTRACTION_SCHEMES: &[&str] = &["data", "blob"];

/// Schemes excluded from request retention (invariant 1).
const EXCLUDED_REQUEST_SCHEMES: &[&str] = &["chrome", "chrome-extension", "devtools"];

/// Prepends `https://` to a bare host/URL if it carries no scheme.
#[must_use]
pub fn normalize_scheme(raw: &str) -> String {
    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    }
}

/// True if `url` should be kept in a redirect/request list (invariant 1).
#[must_use]
pub fn is_retainable_request_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => !EXCLUDED_REQUEST_SCHEMES.contains(&parsed.scheme()),
        Err(_) => false,
    }
}

/// True if `url` should be considered during the extraction sweep.
#[must_use]
pub fn is_extractable_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => !EXCLUDED_EXTRACTION_SCHEMES.contains(&parsed.scheme()),
        Err(_) => false,
    }
}

/// Extracts the registrable host from a URL, if any.
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_owned))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_scheme_when_missing() {
        assert_eq!(normalize_scheme("example.com"), "https://example.com");
        assert_eq!(normalize_scheme("http://example.com"), "http://example.com");
    }

    #[test]
    fn rejects_chrome_scheme() {
        assert!(!is_retainable_request_url("chrome://settings"));
        assert!(is_retainable_request_url("https://example.com"));
    }

    #[test]
    fn extraction_sweep_excludes_data_and_blob() {
        assert!(!is_extractable_url("data:text/plain,hi"));
        assert!(!is_extractable_url("blob:https://example.com/uuid"));
        assert!(is_extractable_url("https://example.com/a"));
    }
}
