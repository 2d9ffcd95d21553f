//! Folds raw request/response events into [`RequestEntry`] groups, merging
//! redirect chains that share one `request_id`, and applies the certificate/
//! timing redaction every retained response and redirect hop carries.

use super::certificate;
use crate::asn::AsnResolver;
use crate::request_monitor::PausedResponse;
use crate::scan_record::{EncodedRequest, EncodedResponse, RequestEntry};
use crate::utils::constants::REDIRECT_STATUS_CODES;
use crate::utils::is_retainable_request_url;
use chromiumoxide::cdp::browser_protocol::network::{EventRequestWillBeSent, EventResponseReceived};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Replaces `securityDetails` with its certificate hash and drops `timing`
/// (connection-specific, useless once persisted). Returns the hash and its
/// canonical JSON if a certificate was present.
fn redact_security_and_timing(value: &mut Value) -> Option<(String, Value)> {
    let Value::Object(map) = value else { return None };
    map.remove("timing");
    let security_details = map.get("securityDetails")?.clone();
    if security_details.is_null() {
        map.remove("securityDetails");
        return None;
    }
    let canonical = certificate::canonicalize(&security_details);
    let hash = certificate::hash(&security_details);
    map.insert("securityDetails".to_string(), Value::String(hash.clone()));
    Some((hash, canonical))
}

/// Redirect-response enrichment: hash and redact the hop's certificate, and
/// attach an ASN resolved from its `remoteIPAddress`.
fn enrich_redirect_response(value: &mut Value, asn_resolver: &dyn AsnResolver) -> Option<(String, Value)> {
    let ip = value.get("remoteIPAddress").and_then(Value::as_str).map(str::to_string);
    let certificate = redact_security_and_timing(value);
    if let (Value::Object(map), Some(ip)) = (&mut *value, ip)
        && let Some(asn) = asn_resolver.lookup(&ip)
    {
        map.insert("asn".to_string(), Value::from(asn));
    }
    certificate
}

fn encode_request(
    evt: &EventRequestWillBeSent,
    asn_resolver: &dyn AsnResolver,
) -> (EncodedRequest, Option<(String, Value)>) {
    let mut redirect_response = evt.redirect_response.as_ref().map(|r| serde_json::to_value(r).unwrap_or(Value::Null));
    let redirect_certificate = redirect_response
        .as_mut()
        .and_then(|v| enrich_redirect_response(v, asn_resolver));

    let encoded = EncodedRequest {
        request: serde_json::to_value(&evt.request).unwrap_or(Value::Null),
        request_id: evt.request_id.inner().to_string(),
        loader_id: evt.loader_id.inner().to_string(),
        document_url: evt.document_url.clone(),
        timestamp: *evt.timestamp.inner(),
        wall_time: *evt.wall_time.inner(),
        initiator: serde_json::to_value(&evt.initiator).unwrap_or(Value::Null),
        redirect_has_extra_info: evt.redirect_has_extra_info,
        redirect_response,
        r#type: evt.r#type.as_ref().map(|t| format!("{t:?}")),
        frame_id: evt.frame_id.as_ref().map(|f| f.inner().to_string()),
        has_user_gesture: evt.has_user_gesture,
    };
    (encoded, redirect_certificate)
}

fn encode_response(evt: &EventResponseReceived) -> EncodedResponse {
    EncodedResponse {
        response: serde_json::to_value(&evt.response).unwrap_or(Value::Null),
        request_id: evt.request_id.inner().to_string(),
        loader_id: evt.loader_id.inner().to_string(),
        timestamp: *evt.timestamp.inner(),
        r#type: format!("{:?}", evt.r#type),
        has_extra_info: evt.has_extra_info,
        frame_id: evt.frame_id.as_ref().map(|f| f.inner().to_string()),
    }
}

/// True if an event should be excluded per invariant 1: neither the
/// request's own URL nor its initiator's URL may be a chrome-internal URL.
fn is_retainable(evt: &EventRequestWillBeSent) -> bool {
    if !is_retainable_request_url(&evt.request.url) {
        return false;
    }
    match &evt.initiator.url {
        Some(initiator_url) => !initiator_url.starts_with("chrome"),
        None => true,
    }
}

/// Finds the body captured for a response, matched by `network_id` (the
/// fetch-domain linkage back to the originating network request) and the
/// response's own status code, so a redirect hop's paused event can never
/// attach to the wrong response.
fn body_for_response<'a>(
    response_request_id: &str,
    expected_status: i64,
    paused: &'a [PausedResponse],
) -> Option<&'a PausedResponse> {
    paused
        .iter()
        .find(|p| p.request_id == response_request_id && p.status_code == Some(expected_status))
}

/// Sorts requests by their request's timestamp, and within each redirect
/// group sorts `requests[]` by timestamp, re-pointing the group's `request`
/// field at the chronologically latest hop (invariant 3).
fn sort_by_timestamp(entries: &mut [RequestEntry]) {
    for entry in entries.iter_mut() {
        if entry.requests.len() > 1 {
            entry
                .requests
                .sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap_or(Ordering::Equal));
            if let Some(last) = entry.requests.last() {
                entry.request = last.clone();
            }
        }
    }
    entries.sort_by(|a, b| a.request.timestamp.partial_cmp(&b.request.timestamp).unwrap_or(Ordering::Equal));
}

/// Produces the ordered, redirect-folded request list plus the unique body
/// and certificate content hashes referenced from it (invariant 4).
pub fn fold(
    requests: &[EventRequestWillBeSent],
    responses: &[EventResponseReceived],
    paused: &[PausedResponse],
    asn_resolver: &dyn AsnResolver,
) -> (Vec<RequestEntry>, Vec<String>, Vec<(String, Value)>) {
    let mut entries: Vec<RequestEntry> = Vec::new();
    let mut index_by_request_id: HashMap<String, usize> = HashMap::new();
    let mut body_hashes: Vec<String> = Vec::new();
    let mut certificates: Vec<(String, Value)> = Vec::new();

    for raw_request in requests {
        if !is_retainable(raw_request) {
            continue;
        }
        let request_id = raw_request.request_id.inner().to_string();
        let (encoded, redirect_certificate) = encode_request(raw_request, asn_resolver);
        if let Some((hash, canonical)) = redirect_certificate
            && !certificates.iter().any(|(h, _)| h == &hash)
        {
            certificates.push((hash, canonical));
        }

        if let Some(&idx) = index_by_request_id.get(&request_id) {
            let entry = &mut entries[idx];
            if entry.requests.is_empty() {
                entry.requests.push(entry.request.clone());
            }
            entry.requests.push(encoded.clone());
            entry.request = encoded;
            continue;
        }

        let idx = entries.len();
        index_by_request_id.insert(request_id.clone(), idx);
        entries.push(RequestEntry {
            request: encoded,
            response: None,
            requests: Vec::new(),
        });

        let mut matched_response: Option<EncodedResponse> = None;
        for raw_response in responses {
            if *raw_response.request_id.inner() != request_id {
                continue;
            }
            if REDIRECT_STATUS_CODES.contains(&raw_response.response.status) {
                continue;
            }
            let mut response = encode_response(raw_response);

            if let Some(body) = body_for_response(&request_id, raw_response.response.status, paused)
                && let Some(hash) = &body.sha256_hash
            {
                response.response["sha256_hash"] = Value::String(hash.clone());
                if !body_hashes.contains(hash) {
                    body_hashes.push(hash.clone());
                }
            }

            if let Some((hash, canonical)) = redact_security_and_timing(&mut response.response)
                && !certificates.iter().any(|(h, _)| h == &hash)
            {
                certificates.push((hash, canonical));
            }

            matched_response = Some(response);
        }

        if let Some(response) = matched_response {
            entries[idx].response = Some(response);
        }
    }

    sort_by_timestamp(&mut entries);

    (entries, body_hashes, certificates)
}
