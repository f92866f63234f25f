//! Counter store trait for abstracting the shared store and the in-process one.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// The capability a window limiter needs from the shared counter store.
///
/// Implementations must make [`CounterStore::increment`] linearizable per key:
/// the increment and the first-hit expiry are one indivisible step.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter at `key` by one and return the new value.
    ///
    /// When the key did not exist (the result is 1) the key is set to expire
    /// after `window_secs` seconds. Later increments never touch the expiry.
    async fn increment(&self, key: &str, window_secs: u64) -> Result<u64>;

    /// Current value of the counter, 0 when the key is absent or expired.
    async fn count(&self, key: &str) -> Result<u64>;

    /// Time left before the counter expires, `None` when the key is absent.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;
}
