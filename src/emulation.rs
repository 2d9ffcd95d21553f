//! Named device-emulation profiles, applied to a tab before navigation.

use anyhow::{Context, Result};
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::emulation as cdp_emulation;
use chromiumoxide::cdp::browser_protocol::network as cdp_network;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::scan_request::CookieSpec;

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceMetrics {
    pub width: i64,
    pub height: i64,
    pub device_scale_factor: f64,
    pub mobile: bool,
    #[serde(default)]
    pub screen_width: Option<i64>,
    #[serde(default)]
    pub screen_height: Option<i64>,
    #[serde(default)]
    pub position_x: Option<i64>,
    #[serde(default)]
    pub position_y: Option<i64>,
    #[serde(default)]
    pub dont_set_visible_size: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentOverride {
    pub user_agent: String,
    pub accept_language: String,
    pub platform: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmulationDevice {
    pub name: String,
    pub device_metrics: DeviceMetrics,
    pub user_agent_override: UserAgentOverride,
    pub is_mobile: bool,
    #[serde(default)]
    pub accepted_encodings: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct DevicesFile {
    #[serde(default)]
    devices: Vec<EmulationDevice>,
}

/// Named device profiles loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct EmulationRegistry {
    devices: HashMap<String, EmulationDevice>,
}

impl EmulationRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read emulation devices file {}", path.display()))?;
        let parsed: DevicesFile = serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse emulation devices file {}", path.display()))?;

        let devices = parsed
            .devices
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();

        Ok(Self { devices })
    }

    #[must_use]
    pub fn has_device(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EmulationDevice> {
        self.devices.get(name)
    }
}

fn content_encoding(raw: &str) -> Option<cdp_network::ContentEncoding> {
    match raw.to_ascii_lowercase().as_str() {
        "gzip" => Some(cdp_network::ContentEncoding::Gzip),
        "deflate" => Some(cdp_network::ContentEncoding::Deflate),
        "br" => Some(cdp_network::ContentEncoding::Br),
        "zstd" => Some(cdp_network::ContentEncoding::Zstd),
        _ => None,
    }
}

/// Applies a device profile (and optional cookies) to a tab. Must run
/// before navigation to take effect on the first request.
pub async fn apply(page: &Page, device: Option<&EmulationDevice>, cookies: &[CookieSpec]) -> Result<()> {
    if let Some(device) = device {
        let metrics = &device.device_metrics;
        let mut builder = cdp_emulation::SetDeviceMetricsOverrideParams::builder()
            .width(metrics.width)
            .height(metrics.height)
            .device_scale_factor(metrics.device_scale_factor)
            .mobile(metrics.mobile);
        if let Some(sw) = metrics.screen_width {
            builder = builder.screen_width(sw);
        }
        if let Some(sh) = metrics.screen_height {
            builder = builder.screen_height(sh);
        }
        if let Some(px) = metrics.position_x {
            builder = builder.position_x(px);
        }
        if let Some(py) = metrics.position_y {
            builder = builder.position_y(py);
        }
        if let Some(dont_set) = metrics.dont_set_visible_size {
            builder = builder.dont_set_visible_size(dont_set);
        }
        let params = builder
            .build()
            .map_err(|e| anyhow::anyhow!("invalid device metrics override: {e}"))?;
        page.execute(params).await.context("setDeviceMetricsOverride failed")?;

        let ua = &device.user_agent_override;
        page.execute(cdp_network::SetUserAgentOverrideParams {
            user_agent: ua.user_agent.clone(),
            accept_language: Some(ua.accept_language.clone()),
            platform: Some(ua.platform.clone()),
            user_agent_metadata: None,
        })
        .await
        .context("network.setUserAgentOverride failed")?;

        page.execute(cdp_emulation::SetUserAgentOverrideParams {
            user_agent: ua.user_agent.clone(),
            accept_language: Some(ua.accept_language.clone()),
            platform: Some(ua.platform.clone()),
            user_agent_metadata: None,
        })
        .await
        .context("emulation.setUserAgentOverride failed")?;

        if device.is_mobile {
            page.execute(cdp_emulation::SetTouchEmulationEnabledParams {
                enabled: true,
                max_touch_points: None,
            })
            .await
            .context("setTouchEmulationEnabled failed")?;
        }

        if let Some(raw_encodings) = &device.accepted_encodings {
            let encodings: Vec<_> = raw_encodings.iter().filter_map(|s| content_encoding(s)).collect();
            if !encodings.is_empty() {
                page.execute(cdp_network::SetAcceptedEncodingsParams { encodings })
                    .await
                    .context("setAcceptedEncodings failed")?;
            }
        }

        debug!(device = %device.name, "applied emulation profile");
    }

    if !cookies.is_empty() {
        let cdp_cookies: Vec<_> = cookies
            .iter()
            .map(|c| cdp_network::CookieParam {
                name: c.name.clone(),
                value: c.value.clone(),
                url: None,
                domain: Some(c.domain.clone()),
                path: c.path.clone(),
                secure: c.secure,
                http_only: c.http_only,
                same_site: None,
                expires: None,
                priority: None,
                same_party: None,
                source_scheme: None,
                source_port: None,
                partition_key: None,
            })
            .collect();
        page.execute(cdp_network::SetCookiesParams { cookies: cdp_cookies })
            .await
            .context("setCookies failed")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_looks_up_by_name() {
        let yaml = r#"
devices:
  - name: pixel_7
    device_metrics: { width: 412, height: 915, device_scale_factor: 2.625, mobile: true }
    user_agent_override: { user_agent: "Mozilla/5.0 (Linux; Android 13; Pixel 7)", accept_language: "en-US", platform: "Linux armv8l" }
    is_mobile: true
    accepted_encodings: ["gzip", "br"]
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.yaml");
        std::fs::write(&path, yaml).unwrap();

        let registry = EmulationRegistry::load(&path).unwrap();
        assert!(registry.has_device("pixel_7"));
        assert!(!registry.has_device("nonexistent"));
        assert_eq!(registry.get("pixel_7").unwrap().device_metrics.width, 412);
    }
}
