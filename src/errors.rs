//! Error types for the scan pipeline.
//!
//! Validation and timeout errors are recoverable per-message; everything
//! else propagates to the orchestrator's top frame and is logged there.

use thiserror::Error;

/// Failure modes a single scan can end in. The consumer loop maps each
/// variant to an ack/nack(requeue) decision.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The bus message itself was malformed or named an unknown emulation
    /// profile. Rejected without requeue — retrying won't fix it.
    #[error("invalid scan request: {0}")]
    Validation(String),

    /// Pageload or completion-detector deadline exceeded. Requeued.
    #[error("scan timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Browser launch, navigation, or devtools command failed in a way
    /// that leaves no usable scan record. Requeued.
    #[error("browser error: {0}")]
    Browser(#[from] anyhow::Error),

    /// A paused event could not be resolved with `continueResponse` /
    /// `continueRequest`. This strands the tab and ends the scan.
    #[error("failed to continue intercepted exchange: {0}")]
    Fatal(String),
}

/// Failures from the content store (Mongo/Redis). Duplicate-key races are
/// not represented here — callers swallow them before returning.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Configuration load/parse failures, surfaced at process startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid max_content_size {0:?}: expected \"NNN(B|KB|MB)\"")]
    InvalidContentSize(String),

    #[error("emulation device file {path} could not be loaded: {source}")]
    EmulationDevices {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
