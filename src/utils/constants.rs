//! Shared tunables, most overridable through configuration.

/// Minimum idle gap (seconds) the completion detector requires before
/// declaring a page finished, absent a request in flight.
pub const DEFAULT_MIN_IDLE_SECS: u64 = 2;

/// Number of blocking workers in the SHA-256 hashing pool.
pub const DEFAULT_HASHER_POOL_SIZE: usize = 5;

/// The completion detector polls at `timeout / COMPLETION_POLL_DIVISOR`.
pub const COMPLETION_POLL_DIVISOR: u32 = 60;

/// HTTP status codes treated as redirects; body capture is skipped for them.
pub const REDIRECT_STATUS_CODES: &[i64] = &[300, 301, 302, 303, 304, 305, 306, 307, 308];

/// `securityDetails` fields stripped before certificate hashing because they
/// vary per connection rather than per certificate.
pub const VOLATILE_SECURITY_FIELDS: &[&str] = &[
    "protocol",
    "certificateId",
    "keyExchange",
    "cipher",
    "keyExchangeGroup",
    "mac",
    "serverSignatureAlgorithm",
    "encryptedClientHello",
];

/// Attempts before a transient infra connection (bus, Mongo, Redis) is
/// treated as fatal.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
