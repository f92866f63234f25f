//! Redis-backed counter store.
//!
//! The connection is owned by the caller. This store only issues commands on
//! a clone of the multiplexed handle and never closes or reconnects it.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tracing::{trace, warn};

use super::store::CounterStore;
use crate::error::{Result, WindowGateError};

/// INCR and the first-hit EXPIRE, run as one script so no other client can
/// interleave between them. A counter left without a TTL by another writer is
/// given one; a counter that already has a TTL is never extended.
const INCREMENT_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 or redis.call('TTL', KEYS[1]) == -1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// A [`CounterStore`] over a Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    script: Script,
}

impl RedisStore {
    /// Wrap an established multiplexed connection.
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            script: Script::new(INCREMENT_SCRIPT),
        }
    }

    /// Open a multiplexed connection to `url` and wrap it.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, key: &str, window_secs: u64) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: i64 = self
            .script
            .key(key)
            .arg(window_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Counter increment failed");
                WindowGateError::Store(e)
            })?;

        trace!(key = %key, count = count, "Incremented counter");
        positive_count(key, count)
    }

    async fn count(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn.get(key).await?;
        match value {
            None => Ok(0),
            Some(count) if count >= 0 => Ok(count as u64),
            Some(count) => Err(WindowGateError::UnexpectedResponse(format!(
                "negative counter {} at {}",
                count, key
            ))),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn.clone();
        let millis: i64 = conn.pttl(key).await?;
        ttl_from_pttl(key, millis)
    }
}

/// Interpret the INCR result. Anything below 1 means the store is not
/// behaving like a counter and must not be read as an admission.
fn positive_count(key: &str, count: i64) -> Result<u64> {
    if count < 1 {
        return Err(WindowGateError::UnexpectedResponse(format!(
            "increment of {} returned {}",
            key, count
        )));
    }
    Ok(count as u64)
}

/// Interpret a PTTL reply: -2 is a missing key, -1 a key without expiry.
fn ttl_from_pttl(key: &str, millis: i64) -> Result<Option<Duration>> {
    match millis {
        -2 => Ok(None),
        -1 => Err(WindowGateError::UnexpectedResponse(format!(
            "counter {} has no expiry",
            key
        ))),
        m if m >= 0 => Ok(Some(Duration::from_millis(m as u64))),
        m => Err(WindowGateError::UnexpectedResponse(format!(
            "PTTL of {} returned {}",
            key, m
        ))),
    }
}
