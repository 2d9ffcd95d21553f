//! The canonical, persisted scan artefact and its wire-format projections.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Explicit field projection of a `requestWillBeSent` event, replacing the
/// source worker's reflection-based encoder with a bounded, typed set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedRequest {
    pub request: Value,
    pub request_id: String,
    pub loader_id: String,
    pub document_url: String,
    pub timestamp: f64,
    pub wall_time: f64,
    pub initiator: Value,
    pub redirect_has_extra_info: bool,
    pub redirect_response: Option<Value>,
    pub r#type: Option<String>,
    pub frame_id: Option<String>,
    pub has_user_gesture: Option<bool>,
}

/// Explicit field projection of a `responseReceived` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedResponse {
    pub response: Value,
    pub request_id: String,
    pub loader_id: String,
    pub timestamp: f64,
    pub r#type: String,
    pub has_extra_info: bool,
    pub frame_id: Option<String>,
}

/// One entry in `ScanRecord.requests`: either a bare request/response pair
/// or a folded redirect chain (invariant: `requests[].request_id` all equal
/// this entry's top-level `request.request_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEntry {
    pub request: EncodedRequest,
    pub response: Option<EncodedResponse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requests: Vec<EncodedRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScanInfo {
    pub url: String,
    pub final_url: String,
    pub domain: Option<String>,
    pub ip: Option<String>,
    pub asn: Option<u32>,
    pub certificate_hash: Option<String>,
    pub initial_frame_id: Option<String>,
    pub screenshot_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtractedData {
    pub urls: Vec<String>,
    pub ips: Vec<String>,
    pub domains: Vec<String>,
    pub asns: Vec<u32>,
    pub servers: Vec<String>,
    pub hashes: Vec<String>,
    pub certificates: Vec<String>,
    pub redirects: Vec<Vec<String>>,
    pub cookies: Vec<Value>,
    pub console_logs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub scan_id: uuid::Uuid,
    pub scan_info: ScanInfo,
    pub requests: Vec<RequestEntry>,
    pub extracted_data: ExtractedData,
}
