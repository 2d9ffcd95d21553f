//! Owns one scan's browser lifecycle: launch, attach, navigate, wait, and
//! guaranteed teardown regardless of how the scan ends.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use chromiumoxide::Browser;
use chromiumoxide::page::Page;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::browser_profile::{self, ScanProfile};
use crate::browser_setup::{self, LaunchParams};
use crate::emulation::{self, EmulationDevice};
use crate::errors::ScanError;
use crate::request_monitor::RequestMonitor;
use crate::scan_request::CookieSpec;
use crate::utils::constants::DEFAULT_MIN_IDLE_SECS;

/// Resolved launch settings for one scan; a narrower view of `BrowserConfig`
/// plus the per-request overrides a scan message may carry.
pub struct SessionConfig {
    pub executable_path: Option<PathBuf>,
    pub headless: bool,
    pub execution_args: Vec<String>,
    pub proxy: Option<String>,
}

/// Drives one tab through navigation and completion detection. Tears down
/// its browser on drop if `run` did not already do so.
pub struct BrowserSession {
    config: SessionConfig,
    profile: Option<ScanProfile>,
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
}

impl BrowserSession {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            profile: None,
            browser: None,
            handler_task: None,
        }
    }

    /// Runs one full scan: launch, attach the monitor and emulation profile,
    /// navigate, wait for completion, then tear everything down. Returns
    /// once the page is idle or `pageload_timeout` elapses.
    pub async fn run(
        &mut self,
        url: &str,
        pageload_timeout: Duration,
        monitor: &RequestMonitor,
        device: Option<&EmulationDevice>,
        cookies: &[CookieSpec],
    ) -> Result<(), ScanError> {
        let start = Instant::now();
        let profile = browser_profile::allocate_scan_profile().context("failed to allocate scan profile")?;

        let (browser, handler_task) = browser_setup::launch_browser(LaunchParams {
            executable_path: self.config.executable_path.clone(),
            user_data_dir: profile.path().to_path_buf(),
            proxy: self.config.proxy.clone(),
            execution_args: self.config.execution_args.clone(),
            headless: self.config.headless,
        })
        .await?;

        self.profile = Some(profile);
        self.handler_task = Some(handler_task);

        let page = browser.new_page("about:blank").await.context("failed to open tab")?;

        monitor.attach(&page).await.context("failed to attach request monitor")?;
        emulation::apply(&page, device, cookies)
            .await
            .context("failed to apply emulation profile")?;

        self.browser = Some(browser);

        if let Err(e) = self.navigate(&page, url, pageload_timeout).await {
            self.teardown().await;
            return Err(e);
        }

        if let Err(e) = monitor.capture_cookies(&page).await {
            warn!(error = %e, "failed to capture cookies after navigation");
        }

        let remaining = pageload_timeout.saturating_sub(start.elapsed());
        monitor
            .wait_for_completion(remaining, Duration::from_secs(DEFAULT_MIN_IDLE_SECS))
            .await;

        monitor.finalize(Duration::from_secs(5)).await;
        let fatal = monitor.fatal_error();

        self.teardown().await;

        if let Some(message) = fatal {
            return Err(ScanError::Fatal(message));
        }
        Ok(())
    }

    /// Drives the page to `url`. A pageload timeout is a hard failure — it
    /// produces no partial scan record, not a success with a half-loaded
    /// page.
    async fn navigate(&self, page: &Page, url: &str, pageload_timeout: Duration) -> Result<(), ScanError> {
        let navigation = async {
            page.goto(url).await.context("navigation failed")?;
            page.wait_for_navigation().await.context("wait_for_navigation failed")?;
            Ok::<(), anyhow::Error>(())
        };

        match tokio::time::timeout(pageload_timeout, navigation).await {
            Ok(result) => result.map_err(ScanError::Browser),
            Err(_) => {
                warn!(url, timeout = ?pageload_timeout, "pageload timed out");
                Err(ScanError::Timeout(pageload_timeout))
            }
        }
    }

    /// Closes the browser and waits for its handler task to finish. Safe to
    /// call more than once; later calls are no-ops.
    pub async fn teardown(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!(error = %e, "failed to close browser cleanly");
            }
        }
        if let Some(task) = self.handler_task.take() {
            let _ = task.await;
        }
        // `profile` drops here, cleaning up the temp directory via its RAII guard.
        info!("browser session torn down");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if self.browser.is_some() {
            warn!("BrowserSession dropped without explicit teardown; browser process may leak");
        }
    }
}
