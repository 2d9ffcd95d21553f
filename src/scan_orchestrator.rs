//! Ties one scan request to its browser session, devtools monitor, data
//! processing pass, and persistence — the unit of work dispatched per bus
//! message.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::asn::AsnResolver;
use crate::browser_session::{BrowserSession, SessionConfig};
use crate::config::BrowserConfig;
use crate::content_store::ContentStore;
use crate::data_processor;
use crate::emulation::EmulationRegistry;
use crate::errors::ScanError;
use crate::hasher::Hasher;
use crate::request_monitor::RequestMonitor;
use crate::scan_request::ScanRequest;

/// Process-global handles shared across every scan, constructed once at
/// startup and cheap to clone into each task.
#[derive(Clone)]
pub struct SharedResources {
    pub hasher: Hasher,
    pub asn_resolver: Arc<dyn AsnResolver>,
    pub emulation: Arc<EmulationRegistry>,
    pub content_store: Arc<dyn ContentStore>,
    pub browser: Arc<BrowserConfig>,
}

/// Runs one scan end to end: launch, capture, process, persist. Every exit
/// path tears down the browser before returning.
pub async fn run_scan(request: ScanRequest, shared: SharedResources) -> Result<(), ScanError> {
    let scan_id = Uuid::new_v4();
    let span = info_span!("scan", scan_id = %scan_id, url = %request.url);

    async move {
        let device = request
            .emulation_device
            .as_deref()
            .and_then(|name| shared.emulation.get(name));

        let monitor = RequestMonitor::new(shared.hasher.clone(), shared.browser.max_content_size);
        let mut session = BrowserSession::new(SessionConfig {
            executable_path: shared.browser.executable_path.clone().map(Into::into),
            headless: true,
            execution_args: shared.browser.execution_args.clone(),
            proxy: request.proxy.clone().or_else(|| shared.browser.proxy.clone()),
        });

        let pageload_timeout = Duration::from_secs(shared.browser.pageload_timeout);
        let browser_timeout = Duration::from_secs(shared.browser.browser_timeout);

        let run_result = tokio::time::timeout(
            browser_timeout,
            session.run(&request.url, pageload_timeout, &monitor, device, &request.page_cookies),
        )
        .await;

        match run_result {
            Err(_) => {
                session.teardown().await;
                return Err(ScanError::Timeout(browser_timeout));
            }
            Ok(Err(e)) => {
                session.teardown().await;
                return Err(e);
            }
            Ok(Ok(())) => {}
        }

        let (record, certificates) =
            data_processor::process(scan_id, &request.url, &monitor, shared.asn_resolver.as_ref());

        persist(&record, &certificates, &monitor, shared.content_store.as_ref()).await;

        Ok(())
    }
    .instrument(span)
    .await
}

/// Writes the scan record and its content-addressed bodies/certificates.
/// Persistence failures are logged, not propagated: the scan itself
/// succeeded, and a lost write here does not warrant a requeue.
async fn persist(
    record: &crate::scan_record::ScanRecord,
    certificates: &[(String, serde_json::Value)],
    monitor: &RequestMonitor,
    store: &dyn ContentStore,
) {
    for paused in monitor.paused_responses() {
        let (Some(body), Some(hash)) = (paused.body, paused.sha256_hash) else {
            continue;
        };
        if let Err(e) = store.put_body(&hash, &body).await {
            warn!(error = %e, hash, "failed to persist response body");
        }
    }

    for (hash, canonical) in certificates {
        if let Err(e) = store.put_certificate(hash, canonical).await {
            warn!(error = %e, hash, "failed to persist certificate");
        }
    }

    if let Err(e) = store.put_scan(record).await {
        warn!(error = %e, scan_id = %record.scan_id, "failed to persist scan record");
    }
}
