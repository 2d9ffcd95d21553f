//! Turns one scan's raw devtools events into a [`ScanRecord`]: fold
//! redirects, hash certificates and bodies, and sweep for URLs/IPs/ASNs.

pub mod certificate;
pub mod extraction;
pub mod redirects;

use crate::asn::AsnResolver;
use crate::request_monitor::RequestMonitor;
use crate::scan_record::ScanRecord;
use chromiumoxide::cdp::browser_protocol::network::Cookie;
use serde_json::Value;

fn encode_cookie(cookie: &Cookie) -> Value {
    serde_json::to_value(cookie).unwrap_or(Value::Null)
}

/// Builds the canonical scan record from a finished monitor's captured
/// state, plus the certificate hash -> canonical JSON pairs collected while
/// folding (the raw `securityDetails` is redacted out of the record itself,
/// so persistence needs this side channel to still write full documents).
/// `scan_id` and `scan_url` come from the originating scan request.
pub fn process(
    scan_id: uuid::Uuid,
    scan_url: &str,
    monitor: &RequestMonitor,
    asn_resolver: &dyn AsnResolver,
) -> (ScanRecord, Vec<(String, Value)>) {
    let requests = monitor.requests();
    let responses = monitor.responses();
    let paused = monitor.paused_responses();

    let (entries, content_hashes, certificates) = redirects::fold(&requests, &responses, &paused, asn_resolver);

    let cookies: Vec<Value> = monitor.cookies().iter().map(encode_cookie).collect();
    let console_logs = monitor.console_logs();

    let (scan_info, mut extracted_data) =
        extraction::sweep(&entries, scan_url, cookies, console_logs, asn_resolver);
    extracted_data.hashes = content_hashes;
    extracted_data.certificates = certificates.iter().map(|(hash, _)| hash.clone()).collect();

    let record = ScanRecord {
        scan_id,
        scan_info,
        requests: entries,
        extracted_data,
    };
    (record, certificates)
}
