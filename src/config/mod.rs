//! Worker configuration, loaded once at process start from a YAML file.

use crate::errors::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct MongoDbConfig {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub request_collection: String,
    pub content_collection: String,
    pub certificate_collection: String,
}

impl MongoDbConfig {
    #[must_use]
    pub fn connection_url(&self) -> String {
        format!(
            "mongodb://{}:{}@{}:{}/",
            self.username, self.password, self.host, self.port
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RabbitMqConfig {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub url_queue: String,
}

impl RabbitMqConfig {
    #[must_use]
    pub fn connection_url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/%2f",
            self.username, self.password, self.host, self.port
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaxMindDbConfig {
    pub asn_database_path: String,
    pub country_database_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmulationConfig {
    /// Path to the YAML file listing named emulation devices.
    pub emulation_config: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub content_database: u8,
    pub certificate_database: u8,
}

/// Raw, pre-validated form of [`BrowserConfig`] as it appears in YAML.
#[derive(Debug, Clone, Deserialize)]
struct RawBrowserConfig {
    max_tabs: usize,
    pageload_timeout: u64,
    browser_timeout: u64,
    min_request_wait: u64,
    max_content_size: String,
    executable_path: Option<String>,
    proxy: Option<String>,
    #[serde(default)]
    execution_args: Vec<String>,
}

/// Default CLI flags every launched browser carries, per the redirect/body
/// capture contract (TLS error tolerance, test-mode automation banner off).
const DEFAULT_EXECUTION_ARGS: &[&str] = &["--ignore-certificate-errors", "--test-type"];

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub max_tabs: usize,
    pub pageload_timeout: u64,
    pub browser_timeout: u64,
    pub min_request_wait: u64,
    pub max_content_size: u64,
    pub executable_path: Option<String>,
    pub proxy: Option<String>,
    pub execution_args: Vec<String>,
}

impl TryFrom<RawBrowserConfig> for BrowserConfig {
    type Error = ConfigError;

    fn try_from(raw: RawBrowserConfig) -> Result<Self, Self::Error> {
        let mut args: std::collections::BTreeSet<String> =
            raw.execution_args.into_iter().collect();
        args.extend(DEFAULT_EXECUTION_ARGS.iter().map(|s| s.to_string()));
        if let Some(proxy) = &raw.proxy {
            args.insert(format!("--proxy-server={proxy}"));
        }

        Ok(BrowserConfig {
            max_tabs: raw.max_tabs,
            pageload_timeout: raw.pageload_timeout,
            browser_timeout: raw.browser_timeout,
            min_request_wait: raw.min_request_wait,
            max_content_size: parse_content_size(&raw.max_content_size)?,
            executable_path: raw.executable_path,
            proxy: raw.proxy,
            execution_args: args.into_iter().collect(),
        })
    }
}

/// Parses a `"NNN(B|KB|MB)"` size string (case-insensitive) into bytes.
pub fn parse_content_size(raw: &str) -> Result<u64, ConfigError> {
    let normalized = raw.trim().to_uppercase();
    let re = Regex::new(r"^(\d+)(B|KB|MB)$").expect("static regex is valid");
    let caps = re
        .captures(&normalized)
        .ok_or_else(|| ConfigError::InvalidContentSize(raw.to_string()))?;

    let size: u64 = caps[1]
        .parse()
        .map_err(|_| ConfigError::InvalidContentSize(raw.to_string()))?;
    let unit_multiplier = match &caps[2] {
        "B" => 1,
        "KB" => 1024,
        "MB" => 1024 * 1024,
        _ => unreachable!("regex only matches B|KB|MB"),
    };

    Ok(size * unit_multiplier)
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    mongodb: MongoDbConfig,
    rabbitmq: RabbitMqConfig,
    browser: RawBrowserConfig,
    redis: RedisConfig,
    maxminddb: MaxMindDbConfig,
    emulation: EmulationConfig,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mongodb: MongoDbConfig,
    pub rabbitmq: RabbitMqConfig,
    pub browser: BrowserConfig,
    pub redis: RedisConfig,
    pub maxminddb: MaxMindDbConfig,
    pub emulation: EmulationConfig,
}

impl Config {
    /// Loads and validates the worker configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> Result<Config, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(text)?;
        Ok(Config {
            mongodb: raw.mongodb,
            rabbitmq: raw.rabbitmq,
            browser: raw.browser.try_into()?,
            redis: raw.redis,
            maxminddb: raw.maxminddb,
            emulation: raw.emulation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_size_units() {
        assert_eq!(parse_content_size("10MB").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_content_size("512kb").unwrap(), 512 * 1024);
        assert_eq!(parse_content_size("100B").unwrap(), 100);
    }

    #[test]
    fn rejects_malformed_size() {
        assert!(parse_content_size("10 MB").is_err());
        assert!(parse_content_size("MB10").is_err());
        assert!(parse_content_size("10GB").is_err());
    }

    #[test]
    fn merges_default_execution_args_and_proxy() {
        let raw = RawBrowserConfig {
            max_tabs: 4,
            pageload_timeout: 30,
            browser_timeout: 60,
            min_request_wait: 2,
            max_content_size: "5MB".into(),
            executable_path: None,
            proxy: Some("10.0.0.1:8080".into()),
            execution_args: vec!["--disable-gpu".into()],
        };
        let cfg: BrowserConfig = raw.try_into().unwrap();
        assert!(cfg.execution_args.contains(&"--ignore-certificate-errors".to_string()));
        assert!(cfg.execution_args.contains(&"--test-type".to_string()));
        assert!(cfg.execution_args.contains(&"--disable-gpu".to_string()));
        assert!(cfg.execution_args.contains(&"--proxy-server=10.0.0.1:8080".to_string()));
    }

    #[test]
    fn loads_full_config_from_yaml() {
        let yaml = r#"
mongodb:
  username: u
  password: p
  host: localhost
  port: 27017
  database: pagescan
  request_collection: requests
  content_collection: content
  certificate_collection: certificates
rabbitmq:
  username: u
  password: p
  host: localhost
  port: 5672
  url_queue: pf_urlqueue
browser:
  max_tabs: 4
  pageload_timeout: 30
  browser_timeout: 90
  min_request_wait: 2
  max_content_size: "50MB"
redis:
  host: localhost
  port: 6379
  content_database: 0
  certificate_database: 1
maxminddb:
  asn_database_path: /data/GeoLite2-ASN.mmdb
  country_database_path: /data/GeoLite2-Country.mmdb
emulation:
  emulation_config: config/devices.yaml
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.browser.max_content_size, 50 * 1024 * 1024);
        assert_eq!(config.rabbitmq.connection_url(), "amqp://u:p@localhost:5672/%2f");
    }
}
