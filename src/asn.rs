//! ASN lookup by IP address, backed by a MaxMind ASN database.

use anyhow::{Context, Result};
use maxminddb::geoip2;
use std::net::IpAddr;
use std::sync::Arc;

/// Resolves an IP to its announcing AS number. Implementations are shared
/// process-wide (opening the database per call would be wasteful).
pub trait AsnResolver: Send + Sync {
    fn lookup(&self, ip: &str) -> Option<u32>;
}

/// MaxMind-DB-backed resolver, opened once and reused across scans.
pub struct MaxMindAsnResolver {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxMindAsnResolver {
    pub fn open(path: &str) -> Result<Self> {
        let reader = maxminddb::Reader::open_readfile(path)
            .with_context(|| format!("failed to open ASN database at {path}"))?;
        Ok(Self { reader })
    }

    #[must_use]
    pub fn shared(self) -> Arc<dyn AsnResolver> {
        Arc::new(self)
    }
}

impl AsnResolver for MaxMindAsnResolver {
    fn lookup(&self, ip: &str) -> Option<u32> {
        let addr: IpAddr = ip.parse().ok()?;
        let record: geoip2::Asn = self.reader.lookup(addr).ok()?;
        record.autonomous_system_number
    }
}

/// A resolver that never finds anything, for tests and environments
/// without a configured MaxMind database.
#[derive(Default)]
pub struct NullAsnResolver;

impl AsnResolver for NullAsnResolver {
    fn lookup(&self, _ip: &str) -> Option<u32> {
        None
    }
}
