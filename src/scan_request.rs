//! Bus message shape and its validation against worker state.

use crate::emulation::EmulationRegistry;
use crate::errors::ScanError;
use crate::utils::normalize_scheme;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(default)]
    pub http_only: Option<bool>,
}

/// The raw JSON body published to the scan queue.
#[derive(Debug, Clone, Deserialize)]
pub struct RawScanRequest {
    pub url: Option<String>,
    #[serde(default)]
    pub emulation_device: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub page_cookies: Option<Vec<CookieSpec>>,
}

/// A validated scan request, ready to hand to the orchestrator.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub url: String,
    pub emulation_device: Option<String>,
    pub proxy: Option<String>,
    pub page_cookies: Vec<CookieSpec>,
}

impl ScanRequest {
    /// Parses and validates a raw bus message body.
    ///
    /// Mirrors the original worker's message normalisation: a missing `url`
    /// or an unknown `emulation_device` is rejected without requeue.
    pub fn from_bytes(body: &[u8], emulation: &EmulationRegistry) -> Result<ScanRequest, ScanError> {
        let raw: RawScanRequest = serde_json::from_slice(body)
            .map_err(|e| ScanError::Validation(format!("malformed JSON body: {e}")))?;

        let url = raw
            .url
            .ok_or_else(|| ScanError::Validation("'url' field is required".into()))?;
        let url = normalize_scheme(&url);

        if let Some(device) = &raw.emulation_device
            && !emulation.has_device(device)
        {
            return Err(ScanError::Validation(format!(
                "emulation device '{device}' is not configured"
            )));
        }

        Ok(ScanRequest {
            url,
            emulation_device: raw.emulation_device,
            proxy: raw.proxy,
            page_cookies: raw.page_cookies.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_url() {
        let registry = EmulationRegistry::empty();
        let err = ScanRequest::from_bytes(b"{}", &registry).unwrap_err();
        assert!(matches!(err, ScanError::Validation(_)));
    }

    #[test]
    fn normalizes_bare_host_to_https() {
        let registry = EmulationRegistry::empty();
        let req = ScanRequest::from_bytes(br#"{"url":"example.com"}"#, &registry).unwrap();
        assert_eq!(req.url, "https://example.com");
    }

    #[test]
    fn rejects_unknown_emulation_device() {
        let registry = EmulationRegistry::empty();
        let err = ScanRequest::from_bytes(
            br#"{"url":"https://example.com","emulation_device":"pixel_7"}"#,
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::Validation(_)));
    }
}
