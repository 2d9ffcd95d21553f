//! Content-addressed storage for scan records, response bodies, and
//! certificates, with Redis-backed refcounts so bodies shared across scans
//! are written to Mongo exactly once.

use crate::config::{Config, RedisConfig};
use crate::errors::StoreError;
use crate::scan_record::ScanRecord;
use crate::utils::constants::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_SECS};
use async_trait::async_trait;
use mongodb::bson::{doc, Binary};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

const RETRY_ATTEMPTS: u32 = DEFAULT_RETRY_ATTEMPTS;
const RETRY_DELAY: Duration = Duration::from_secs(DEFAULT_RETRY_DELAY_SECS);

/// Persistence surface the orchestrator depends on; a trait so tests can
/// swap in an in-memory fake without touching Mongo or Redis.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put_scan(&self, record: &ScanRecord) -> Result<(), StoreError>;

    /// Stores `body` under `hash` if this is the first scan to reference it.
    /// Returns `true` when the document was newly written.
    async fn put_body(&self, hash: &str, body: &[u8]) -> Result<bool, StoreError>;

    /// Stores the canonicalized certificate under `hash` if not already
    /// present. Returns `true` when the document was newly written.
    async fn put_certificate(&self, hash: &str, canonical: &Value) -> Result<bool, StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentDocument {
    #[serde(rename = "_id")]
    hash: String,
    body: Binary,
}

#[derive(Debug, Serialize, Deserialize)]
struct CertificateDocument {
    #[serde(rename = "_id")]
    hash: String,
    #[serde(flatten)]
    canonical: Value,
}

pub struct MongoRedisContentStore {
    requests: Collection<ScanRecord>,
    content: Collection<ContentDocument>,
    certificates: Collection<CertificateDocument>,
    content_refs: redis::aio::ConnectionManager,
    certificate_refs: redis::aio::ConnectionManager,
}

impl MongoRedisContentStore {
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let client = connect_mongo_with_retry(&config.mongodb.connection_url()).await?;
        let db: Database = client.database(&config.mongodb.database);

        let requests = db.collection(&config.mongodb.request_collection);
        let content = db.collection(&config.mongodb.content_collection);
        let certificates = db.collection(&config.mongodb.certificate_collection);

        ensure_unique_id_index(&content).await?;
        ensure_unique_id_index(&certificates).await?;

        let content_refs = redis_connection_with_retry(&config.redis, config.redis.content_database).await?;
        let certificate_refs = redis_connection_with_retry(&config.redis, config.redis.certificate_database).await?;

        Ok(Self {
            requests,
            content,
            certificates,
            content_refs,
            certificate_refs,
        })
    }
}

/// Connects to Mongo with the same fixed retry policy (5 attempts, 5s) the
/// consumer loop applies to the bus connection; Mongo being down at startup
/// is just as transient and just as fatal after the budget runs out.
async fn connect_mongo_with_retry(url: &str) -> Result<Client, StoreError> {
    let mut last_err = None;
    for attempt in 1..=RETRY_ATTEMPTS {
        match Client::with_uri_str(url).await {
            Ok(client) => return Ok(client),
            Err(e) => {
                warn!(attempt, error = %e, "mongodb connection attempt failed");
                last_err = Some(e);
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
    Err(last_err.expect("loop runs at least once").into())
}

async fn redis_connection_with_retry(cfg: &RedisConfig, db: u8) -> Result<redis::aio::ConnectionManager, StoreError> {
    let mut last_err = None;
    for attempt in 1..=RETRY_ATTEMPTS {
        match redis_connection(cfg, db).await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                warn!(attempt, error = %e, db, "redis connection attempt failed");
                last_err = Some(e);
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

/// Mongo's `_id` is already a unique index by default; this is a defensive
/// no-op against a server where the collection was created without one.
async fn ensure_unique_id_index<T>(collection: &Collection<T>) -> Result<(), StoreError>
where
    T: Send + Sync,
{
    let index = IndexModel::builder()
        .keys(doc! { "_id": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    let _ = collection.create_index(index).await;
    Ok(())
}

async fn redis_connection(cfg: &RedisConfig, db: u8) -> Result<redis::aio::ConnectionManager, StoreError> {
    let url = format!("redis://{}:{}/{}", cfg.host, cfg.port, db);
    let client = redis::Client::open(url)?;
    Ok(client.get_connection_manager().await?)
}

/// `INCR`s the refcount for `hash` and reports whether this call created it
/// (count went from absent/zero to one), the signal to write the backing
/// document to Mongo.
async fn claim_first_reference(conn: &redis::aio::ConnectionManager, hash: &str) -> Result<bool, StoreError> {
    let mut conn = conn.clone();
    let count: i64 = conn.incr(hash, 1).await?;
    Ok(count == 1)
}

#[async_trait]
impl ContentStore for MongoRedisContentStore {
    async fn put_scan(&self, record: &ScanRecord) -> Result<(), StoreError> {
        self.requests.insert_one(record).await?;
        Ok(())
    }

    async fn put_body(&self, hash: &str, body: &[u8]) -> Result<bool, StoreError> {
        if !claim_first_reference(&self.content_refs, hash).await? {
            return Ok(false);
        }
        let doc = ContentDocument {
            hash: hash.to_string(),
            body: Binary {
                subtype: mongodb::bson::spec::BinarySubtype::Generic,
                bytes: body.to_vec(),
            },
        };
        match self.content.insert_one(doc).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_certificate(&self, hash: &str, canonical: &Value) -> Result<bool, StoreError> {
        if !claim_first_reference(&self.certificate_refs, hash).await? {
            return Ok(false);
        }
        let doc = CertificateDocument {
            hash: hash.to_string(),
            canonical: canonical.clone(),
        };
        match self.certificates.insert_one(doc).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// True for Mongo's E11000 duplicate-key error, the race between two
/// workers both winning `claim_first_reference` for the same hash under
/// concurrent Redis `INCR` (possible after a refcount reset).
fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        error.kind.as_ref(),
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(write_error))
            if write_error.code == 11000
    )
}
