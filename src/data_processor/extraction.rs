//! Sweeps the folded request list for URLs, IPs, domains, ASNs, servers,
//! certificates, and picks out the scan's main-document info.

use crate::asn::AsnResolver;
use crate::scan_record::{EncodedRequest, ExtractedData, RequestEntry, ScanInfo};
use crate::utils::{host_of, is_extractable_url};
use serde_json::Value;
use std::net::IpAddr;

fn str_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str)
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

fn push_unique_u32(list: &mut Vec<u32>, item: u32) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// The first hop of a (possibly redirect-folded) entry, in arrival order.
fn first_hop(entry: &RequestEntry) -> &EncodedRequest {
    entry.requests.first().unwrap_or(&entry.request)
}

/// First non-empty `frame_id` across every entry's earliest hop, in arrival
/// order — the frame the main document is loading into.
fn find_initial_frame_id(entries: &[RequestEntry]) -> Option<String> {
    entries.iter().map(first_hop).find_map(|r| r.frame_id.clone().filter(|f| !f.is_empty()))
}

fn collect_ip(data: &mut ExtractedData, asn_resolver: &dyn AsnResolver, ip: &str) {
    if ip.parse::<IpAddr>().is_err() {
        return;
    }
    push_unique(&mut data.ips, ip.to_string());
    if let Some(asn) = asn_resolver.lookup(ip) {
        push_unique_u32(&mut data.asns, asn);
    }
}

/// Runs the extraction sweep and builds the scan-level summary in one pass.
pub fn sweep(
    entries: &[RequestEntry],
    scan_url: &str,
    cookies: Vec<Value>,
    console_logs: Vec<String>,
    asn_resolver: &dyn AsnResolver,
) -> (ScanInfo, ExtractedData) {
    let mut data = ExtractedData {
        cookies,
        console_logs,
        ..Default::default()
    };
    let mut info = ScanInfo {
        url: scan_url.to_string(),
        final_url: scan_url.to_string(),
        ..Default::default()
    };

    let initial_frame_id = find_initial_frame_id(entries);
    info.initial_frame_id = initial_frame_id.clone();

    for entry in entries {
        collect_request_urls(&entry.request, &mut data.urls);
        for redirect_hop in &entry.requests {
            collect_request_urls(redirect_hop, &mut data.urls);
        }

        let Some(response) = &entry.response else { continue };
        let response_value = &response.response;

        if let Some(url) = str_field(response_value, "url")
            && is_extractable_url(url)
        {
            push_unique(&mut data.urls, url.to_string());
            if let Some(domain) = host_of(url) {
                push_unique(&mut data.domains, domain);
            }
        }

        if let Some(ip) = str_field(response_value, "remoteIPAddress") {
            collect_ip(&mut data, asn_resolver, ip);
        }

        if let Some(server) = response_value
            .get("headers")
            .and_then(|h| h.get("Server").or_else(|| h.get("server")))
            .and_then(Value::as_str)
        {
            push_unique(&mut data.servers, server.to_string());
        }
    }

    // Final URL, its certificate/IP, and the redirect chains leading to it
    // are all scoped to the frame the main document loaded into.
    for entry in entries {
        if entry.request.frame_id != initial_frame_id {
            continue;
        }
        if entry.request.document_url != info.final_url {
            info.final_url = entry.request.document_url.clone();
            if let Some(domain) = host_of(&info.final_url) {
                info.domain = Some(domain);
            }
            if let Some(response) = &entry.response {
                if let Some(ip) = str_field(&response.response, "remoteIPAddress") {
                    info.ip = Some(ip.to_string());
                    if let Some(asn) = asn_resolver.lookup(ip) {
                        info.asn = Some(asn);
                    }
                }
                if let Some(hash) = response.response.get("securityDetails").and_then(Value::as_str) {
                    info.certificate_hash = Some(hash.to_string());
                }
            }
        }
    }

    for entry in entries {
        if entry.request.frame_id != initial_frame_id || entry.requests.len() <= 1 {
            continue;
        }
        let Some(last_hop) = entry.requests.last() else { continue };
        let Some(last_url) = str_field(&last_hop.request, "url") else { continue };
        if last_url != info.final_url {
            continue;
        }
        let chain: Vec<String> = entry
            .requests
            .iter()
            .filter_map(|r| str_field(&r.request, "url").map(str::to_string))
            .collect();
        if chain.len() > 1 {
            data.redirects.push(chain);
        }
    }

    (info, data)
}

fn collect_request_urls(request: &EncodedRequest, urls: &mut Vec<String>) {
    if let Some(url) = str_field(&request.request, "url")
        && is_extractable_url(url)
    {
        push_unique(urls, url.to_string());
    }
}
