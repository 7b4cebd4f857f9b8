//! Distributed job leases.
//!
//! Long-running maintenance jobs (a full reindex, draft sweeps) must run on
//! one instance at a time. A lease is a keyed, owner-stamped lock with a
//! TTL: acquisition takes the key only while nobody holds it, and renewal
//! or release succeed only for the current owner, so a crashed holder just
//! ages out.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::Client as RedisClient;
use thiserror::Error;
use tracing::debug;

const LEASE_PREFIX: &str = "lease:";

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("lease backend failure")]
    Backend(#[from] anyhow::Error),
}

/// Identity stamped into held leases.
pub fn lease_owner() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}:{}", host, std::process::id())
}

#[async_trait]
pub trait JobLease: Send + Sync {
    /// Attempts to take the lease. Returns the owner stamp on success,
    /// `None` while another holder is alive.
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<String>, LeaseError>;

    /// Extends a held lease; false when the caller no longer owns it.
    async fn renew(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, LeaseError>;

    /// Releases a held lease; false when the caller no longer owns it.
    async fn release(&self, key: &str, owner: &str) -> Result<bool, LeaseError>;
}

/// Process-local lease for tests and single-node deployments.
#[derive(Default)]
pub struct MemoryLease {
    held: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryLease {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for MemoryLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLease")
            .field("held", &self.held.lock().len())
            .finish()
    }
}

#[async_trait]
impl JobLease for MemoryLease {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<String>, LeaseError> {
        let mut held = self.held.lock();
        let now = Instant::now();
        if let Some((_, expires)) = held.get(key) {
            if *expires > now {
                return Ok(None);
            }
        }
        let owner = lease_owner();
        held.insert(key.to_owned(), (owner.clone(), now + ttl));
        Ok(Some(owner))
    }

    async fn renew(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, LeaseError> {
        let mut held = self.held.lock();
        let now = Instant::now();
        match held.get_mut(key) {
            Some((held_owner, expires)) if held_owner == owner && *expires > now => {
                *expires = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, owner: &str) -> Result<bool, LeaseError> {
        let mut held = self.held.lock();
        let owned = matches!(
            held.get(key),
            Some((held_owner, expires)) if held_owner == owner && *expires > Instant::now()
        );
        if owned {
            held.remove(key);
        }
        Ok(owned)
    }
}

/// Redis-backed lease for multi-instance deployments.
pub struct RedisLease {
    client: RedisClient,
}

impl RedisLease {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    pub fn connect(url: &str) -> Result<Self, LeaseError> {
        let client = RedisClient::open(url).context("failed to open Redis client")?;
        Ok(Self::new(client))
    }

    fn key(key: &str) -> String {
        format!("{LEASE_PREFIX}{key}")
    }
}

impl fmt::Debug for RedisLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisLease").finish_non_exhaustive()
    }
}

#[async_trait]
impl JobLease for RedisLease {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<String>, LeaseError> {
        let owner = lease_owner();
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("failed to get Redis connection")?;

        // SET NX EX - set only if not exists, with expiry
        let result: Option<String> = redis::cmd("SET")
            .arg(Self::key(key))
            .arg(&owner)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .context("failed to acquire lease")?;

        if result.is_some() {
            debug!(key, owner = %owner, "lease acquired");
        }
        Ok(result.map(|_| owner))
    }

    async fn renew(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, LeaseError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("failed to get Redis connection")?;

        let script = redis::Script::new(RENEW_LEASE_SCRIPT);
        let extended: i64 = script
            .key(Self::key(key))
            .arg(owner)
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await
            .context("failed to renew lease")?;
        Ok(extended == 1)
    }

    async fn release(&self, key: &str, owner: &str) -> Result<bool, LeaseError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("failed to get Redis connection")?;

        let script = redis::Script::new(RELEASE_LEASE_SCRIPT);
        let removed: i64 = script
            .key(Self::key(key))
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .context("failed to release lease")?;
        if removed == 1 {
            debug!(key, owner = %owner, "lease released");
        }
        Ok(removed == 1)
    }
}

/// Lua script to release the lease only if we own it.
const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Lua script to extend the lease TTL only if we own it.
const RENEW_LEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("EXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;
