//! Subscribes to network/fetch devtools events for one tab, records
//! request/response metadata, and resolves every paused response exactly
//! once (continue-or-strand is the monitor's central invariant).

pub mod body_capture;

use anyhow::{Context, Result};
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, ContinueResponseParams, EventRequestPaused, GetResponseBodyParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self, EventRequestWillBeSent, EventResponseReceived, SetCacheDisabledParams,
};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use tracing::warn;

use crate::hasher::Hasher;
use crate::utils::constants::COMPLETION_POLL_DIVISOR;
use body_capture::{BodyDecision, BodyDecisionInput, decide};

/// A captured paused response, with its body (if retained) and hash.
#[derive(Debug, Clone)]
pub struct PausedResponse {
    pub request_id: String,
    pub status_code: Option<i64>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub sha256_hash: Option<String>,
}

#[derive(Default)]
struct MonitorState {
    requests: Vec<EventRequestWillBeSent>,
    responses: Vec<EventResponseReceived>,
    paused_responses: Vec<PausedResponse>,
    cookies: Vec<network::Cookie>,
    console_logs: Vec<String>,
}

/// Tracks the last time a `requestWillBeSent` event arrived, for the
/// completion detector's idle test.
struct ActivityClock {
    last_request_at: Mutex<Instant>,
}

impl ActivityClock {
    fn new() -> Self {
        Self {
            last_request_at: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_request_at.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_request_at.lock().elapsed()
    }
}

/// Live state for one scan's tab. Construct once per scan; never reused.
pub struct RequestMonitor {
    state: Arc<Mutex<MonitorState>>,
    clock: Arc<ActivityClock>,
    hasher: Hasher,
    max_content_size: u64,
    in_flight: Arc<AsyncMutex<JoinSet<()>>>,
    fatal: Arc<Mutex<Option<String>>>,
}

impl RequestMonitor {
    #[must_use]
    pub fn new(hasher: Hasher, max_content_size: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(MonitorState::default())),
            clock: Arc::new(ActivityClock::new()),
            hasher,
            max_content_size,
            in_flight: Arc::new(AsyncMutex::new(JoinSet::new())),
            fatal: Arc::new(Mutex::new(None)),
        }
    }

    /// Set once a paused devtools event could not be resolved with
    /// `continueRequest`/`continueResponse`, stranding the tab. Checked by
    /// the session after `finalize` to decide whether the scan is fatal.
    #[must_use]
    pub fn fatal_error(&self) -> Option<String> {
        self.fatal.lock().clone()
    }

    /// Subscribes to `requestWillBeSent`, `responseReceived`, and
    /// `fetchRequestPaused`, enables response-stage fetch interception, and
    /// disables the browser cache. Must run before navigation.
    pub async fn attach(&self, page: &Page) -> Result<()> {
        page.execute(SetCacheDisabledParams { cache_disabled: true })
            .await
            .context("network.setCacheDisabled failed")?;

        page.execute(fetch::EnableParams {
            patterns: Some(vec![fetch::RequestPattern {
                url_pattern: None,
                resource_type: None,
                request_stage: Some(fetch::RequestStage::Response),
            }]),
            handle_auth_requests: Some(false),
        })
        .await
        .context("fetch.enable failed")?;

        let mut request_events = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("subscribing to requestWillBeSent failed")?;
        let state = self.state.clone();
        let clock = self.clock.clone();
        tokio::spawn(async move {
            while let Some(event) = request_events.next().await {
                state.lock().requests.push((*event).clone());
                clock.touch();
            }
        });

        let mut response_events = page
            .event_listener::<EventResponseReceived>()
            .await
            .context("subscribing to responseReceived failed")?;
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(event) = response_events.next().await {
                state.lock().responses.push((*event).clone());
            }
        });

        let mut paused_events = page
            .event_listener::<EventRequestPaused>()
            .await
            .context("subscribing to requestPaused failed")?;
        let page_for_paused = page.clone();
        let state = self.state.clone();
        let hasher = self.hasher.clone();
        let max_content_size = self.max_content_size;
        let in_flight = self.in_flight.clone();
        let fatal = self.fatal.clone();
        tokio::spawn(async move {
            while let Some(event) = paused_events.next().await {
                let page = page_for_paused.clone();
                let state = state.clone();
                let hasher = hasher.clone();
                let fatal = fatal.clone();
                in_flight.lock().await.spawn(async move {
                    if let Err(e) = handle_paused_event(&page, &event, &state, &hasher, max_content_size).await {
                        warn!(error = %e, "failed to resolve paused devtools event; tab is stranded");
                        fatal.lock().get_or_insert_with(|| e.to_string());
                    }
                });
            }
        });

        let mut log_events = page
            .event_listener::<chromiumoxide::cdp::browser_protocol::log::EventEntryAdded>()
            .await
            .context("subscribing to Log.entryAdded failed")?;
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(event) = log_events.next().await {
                state.lock().console_logs.push(event.entry.text.clone());
            }
        });

        Ok(())
    }

    /// Captures the tab's current cookie jar. Run once after navigation
    /// settles — cookies set via JS during load would be missed earlier.
    pub async fn capture_cookies(&self, page: &Page) -> Result<()> {
        let result = page
            .execute(network::GetCookiesParams::default())
            .await
            .context("network.getAllCookies failed")?;
        self.state.lock().cookies = result.cookies.clone();
        Ok(())
    }

    /// Blocks until the page has been idle for `min_idle` with no
    /// in-flight paused-event handlers, or `timeout` elapses.
    pub async fn wait_for_completion(&self, timeout: Duration, min_idle: Duration) {
        let start = Instant::now();
        let poll_interval = timeout / COMPLETION_POLL_DIVISOR.max(1);
        let poll_interval = poll_interval.max(Duration::from_millis(50));

        loop {
            let idle_long_enough = self.clock.idle_for() > min_idle;
            let nothing_in_flight = self.in_flight.lock().await.is_empty();
            if idle_long_enough && nothing_in_flight {
                return;
            }
            if start.elapsed() > timeout {
                return;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Drains any still-running paused-event handlers with a bounded wait,
    /// then stops accepting new work.
    pub async fn finalize(&self, drain_timeout: Duration) {
        let mut set = self.in_flight.lock().await;
        let _ = tokio::time::timeout(drain_timeout, async {
            while set.join_next().await.is_some() {}
        })
        .await;
    }

    pub fn requests(&self) -> Vec<EventRequestWillBeSent> {
        self.state.lock().requests.clone()
    }

    pub fn responses(&self) -> Vec<EventResponseReceived> {
        self.state.lock().responses.clone()
    }

    pub fn paused_responses(&self) -> Vec<PausedResponse> {
        self.state.lock().paused_responses.clone()
    }

    pub fn cookies(&self) -> Vec<network::Cookie> {
        self.state.lock().cookies.clone()
    }

    pub fn console_logs(&self) -> Vec<String> {
        self.state.lock().console_logs.clone()
    }
}

async fn handle_paused_event(
    page: &Page,
    event: &EventRequestPaused,
    state: &Arc<Mutex<MonitorState>>,
    hasher: &Hasher,
    max_content_size: u64,
) -> Result<()> {
    let is_response = event.response_status_code.is_some() || event.response_error_reason.is_some();

    if !is_response {
        page.execute(ContinueRequestParams {
            request_id: event.request_id.clone(),
            url: None,
            method: None,
            post_data: None,
            headers: None,
            intercept_response: None,
        })
        .await
        .map_err(|e| anyhow::anyhow!("fetch.continueRequest failed: {e}"))?;
        return Ok(());
    }

    let headers_present = event.response_headers.is_some();
    let headers: Vec<(String, String)> = event
        .response_headers
        .as_ref()
        .map(|hs| hs.iter().map(|h| (h.name.clone(), h.value.clone())).collect())
        .unwrap_or_default();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<u64>().ok());
    let has_location_header = headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("location"));

    let decision = decide(BodyDecisionInput::new(
        event.response_status_code,
        content_length,
        has_location_header,
        max_content_size,
        headers_present,
    ));

    let (body, sha256_hash) = if decision == BodyDecision::Fetch {
        match page
            .execute(GetResponseBodyParams {
                request_id: event.request_id.clone(),
            })
            .await
        {
            Ok(resp) => {
                let bytes = if resp.base64_encoded {
                    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &resp.body).unwrap_or_default()
                } else {
                    resp.body.clone().into_bytes()
                };
                let hash = hasher.hash(bytes.clone()).await.ok();
                (Some(bytes), hash)
            }
            Err(e) => {
                warn!(error = %e, request_id = %event.request_id.inner(), "getResponseBody failed");
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    // Always continue, even when no body was captured — a missing
    // continueResponse strands the browser on this tab.
    page.execute(ContinueResponseParams {
        request_id: event.request_id.clone(),
        response_code: event.response_status_code,
        response_phrase: None,
        response_headers: event.response_headers.clone(),
        binary_response_headers: None,
    })
    .await
    .map_err(|e| anyhow::anyhow!("fetch.continueResponse failed: {e}"))?;

    // `event.request_id` is the Fetch-domain id; responses are matched back
    // to network events by `network_id`, the shared Network-domain id.
    let network_request_id = event
        .network_id
        .as_ref()
        .map(|id| id.inner().to_string())
        .unwrap_or_else(|| event.request_id.inner().to_string());

    state.lock().paused_responses.push(PausedResponse {
        request_id: network_request_id,
        status_code: event.response_status_code,
        headers,
        body,
        sha256_hash,
    });

    Ok(())
}
