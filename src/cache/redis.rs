//! Redis Cache Module
//!
//! [`CacheClient`] backed by a real Redis server through a multiplexed
//! connection. Only compiled with the `redis` feature.

use std::time::Duration;

use async_trait::async_trait;
use ::redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tracing::info;

use crate::cache::CacheClient;
use crate::error::{CacheError, CacheResult};

/// Keys fetched per SCAN round trip.
const SCAN_COUNT: usize = 100;

pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    /// Opens a multiplexed connection to `url` (e.g. `redis://localhost:6379`).
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client =
            Client::open(url).map_err(|e| CacheError::Client(format!("Redis client error: {}", e)))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Client(format!("Redis connection error: {}", e)))?;

        info!("Connected to Redis at {}", url);
        Ok(Self { conn })
    }
}

fn client_error(command: &str, err: ::redis::RedisError) -> CacheError {
    CacheError::Client(format!("Redis {} error: {}", command, err))
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| client_error("GET", e))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        // SETEX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key, value, seconds)
            .await
            .map_err(|e| client_error("SETEX", e))?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        conn.del(keys).await.map_err(|e| client_error("DEL", e))
    }

    async fn scan(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = ::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|e| client_error("SCAN", e))?;

            found.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        found.sort();
        found.dedup();
        Ok(found)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: String = ::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| client_error("PING", e))?;
        Ok(())
    }
}
