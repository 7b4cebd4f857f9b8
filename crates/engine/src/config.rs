//! Configuration loaded from environment variables.

use std::env;

use anyhow::{Context, Result};

use crate::publish::DEFAULT_RESET_GRACE_SECS;
use crate::search::DEFAULT_REINDEX_CHUNK;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Redis connection URL for job leases (default: redis://127.0.0.1:6379).
    pub redis_url: String,

    /// Seconds after page creation during which a reset spares its scaffold
    /// drafts (default: 3).
    pub reset_grace_secs: i64,

    /// Pages reprojected per batch during a full reindex (default: 50).
    pub reindex_chunk: usize,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let reset_grace_secs = env::var("BOZZA_RESET_GRACE_SECS")
            .unwrap_or_else(|_| DEFAULT_RESET_GRACE_SECS.to_string())
            .parse()
            .context("BOZZA_RESET_GRACE_SECS must be a valid i64")?;

        let reindex_chunk = env::var("BOZZA_REINDEX_CHUNK")
            .unwrap_or_else(|_| DEFAULT_REINDEX_CHUNK.to_string())
            .parse()
            .context("BOZZA_REINDEX_CHUNK must be a valid usize")?;

        Ok(Self {
            database_url,
            database_max_connections,
            redis_url,
            reset_grace_secs,
            reindex_chunk,
        })
    }
}
