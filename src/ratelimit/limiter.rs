//! Fixed-window rate limiter over a shared counter store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::key::{RateLimitKey, DEFAULT_CLIENT};
use super::store::CounterStore;
use crate::error::{Result, WindowGateError};

/// Caller-supplied limiter settings. Immutable once a limiter is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Logical name of the thing being protected
    pub resource: String,
    /// Logical name of the principal being limited
    #[serde(default = "default_client")]
    pub client: String,
    /// Quota ceiling per window
    pub max_requests: u64,
    /// Window length in seconds
    pub time_window: u64,
}

/// Longest accepted window: 100 years, well inside both `Instant` and the
/// Redis EXPIRE range.
pub const MAX_TIME_WINDOW: u64 = 100 * 365 * 24 * 60 * 60;

fn default_client() -> String {
    DEFAULT_CLIENT.to_string()
}

impl RateLimiterConfig {
    /// Create settings for a resource and client.
    pub fn new(resource: &str, client: &str, max_requests: u64, time_window: u64) -> Self {
        Self {
            resource: resource.to_string(),
            client: client.to_string(),
            max_requests,
            time_window,
        }
    }

    /// Check that the settings describe a usable quota.
    pub fn validate(&self) -> Result<()> {
        if self.resource.is_empty() {
            return Err(WindowGateError::Config("resource must not be empty".to_string()));
        }
        if self.client.is_empty() {
            return Err(WindowGateError::Config("client must not be empty".to_string()));
        }
        // The client is the last key segment, so a ':' in it could alias another pair
        if self.client.contains(':') {
            return Err(WindowGateError::Config(format!(
                "client {:?} must not contain ':'",
                self.client
            )));
        }
        if self.max_requests == 0 {
            return Err(WindowGateError::Config(
                "max_requests must be greater than 0".to_string(),
            ));
        }
        if self.time_window == 0 {
            return Err(WindowGateError::Config(
                "time_window must be greater than 0".to_string(),
            ));
        }
        if self.time_window > MAX_TIME_WINDOW {
            return Err(WindowGateError::Config(format!(
                "time_window must be at most {} seconds",
                MAX_TIME_WINDOW
            )));
        }
        Ok(())
    }
}

/// Proof of admission for one unit of work.
///
/// Dropping a permit does nothing: usage is charged when the permit is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    count: u64,
    limit: u64,
}

impl Permit {
    /// Position of this hit within the current window (1-based).
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The quota ceiling for the window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Hits left in the window after this one.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }
}

/// A fixed-window admission gate for one (resource, client) pair.
///
/// The limiter holds only its configuration. All counting happens in the
/// store, so one instance may be shared by any number of tasks, and two
/// instances built with the same pair (in any process) share one quota.
pub struct WindowRateLimiter<S: CounterStore> {
    /// The shared counter store
    store: Arc<S>,
    /// Identity of this quota
    key: RateLimitKey,
    /// Derived store key, computed once
    store_key: String,
    /// Quota ceiling per window
    max_requests: u64,
    /// Window length in seconds
    time_window: u64,
}

impl<S: CounterStore> WindowRateLimiter<S> {
    /// Create a limiter for `resource` as seen by `client`.
    pub fn new(
        store: Arc<S>,
        resource: &str,
        client: &str,
        max_requests: u64,
        time_window: u64,
    ) -> Result<Self> {
        let config = RateLimiterConfig::new(resource, client, max_requests, time_window);
        Self::from_config(store, &config)
    }

    /// Create a limiter for `resource` using the default client name.
    pub fn with_default_client(
        store: Arc<S>,
        resource: &str,
        max_requests: u64,
        time_window: u64,
    ) -> Result<Self> {
        Self::new(store, resource, DEFAULT_CLIENT, max_requests, time_window)
    }

    /// Create a limiter from validated settings.
    pub fn from_config(store: Arc<S>, config: &RateLimiterConfig) -> Result<Self> {
        config.validate()?;
        let key = RateLimitKey::new(&config.resource, &config.client);
        let store_key = key.to_store_key();

        Ok(Self {
            store,
            key,
            store_key,
            max_requests: config.max_requests,
            time_window: config.time_window,
        })
    }

    /// The quota identity.
    pub fn key(&self) -> &RateLimitKey {
        &self.key
    }

    /// The key the counter lives under in the store.
    pub fn store_key(&self) -> &str {
        &self.store_key
    }

    /// Quota ceiling per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Window length in seconds.
    pub fn time_window(&self) -> u64 {
        self.time_window
    }

    /// Count one hit and decide whether it is admitted.
    ///
    /// A denied hit is not rolled back: it still occupies a slot in the
    /// current window.
    pub async fn try_acquire(&self) -> Result<Permit> {
        let count = self
            .store
            .increment(&self.store_key, self.time_window)
            .await?;

        trace!(
            key = %self.store_key,
            count = count,
            limit = self.max_requests,
            "Checked window quota"
        );

        if count > self.max_requests {
            debug!(
                key = %self.store_key,
                count = count,
                limit = self.max_requests,
                "Rate limit exceeded"
            );
            return Err(WindowGateError::TooManyRequests {
                resource: self.key.resource.clone(),
                client: self.key.client.clone(),
                limit: self.max_requests,
                count,
            });
        }

        Ok(Permit {
            count,
            limit: self.max_requests,
        })
    }

    /// Enter the guarded scope. Same as [`WindowRateLimiter::try_acquire`].
    pub async fn enter(&self) -> Result<Permit> {
        self.try_acquire().await
    }

    /// Run `work` only if a hit is admitted.
    ///
    /// On denial `work` is never called. Its outcome has no effect on the
    /// counter.
    pub async fn run<F, Fut, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce(Permit) -> Fut,
        Fut: Future<Output = T>,
    {
        let permit = self.try_acquire().await?;
        Ok(work(permit).await)
    }

    /// Hits recorded in the current window, without counting a new one.
    pub async fn usage(&self) -> Result<u64> {
        self.store.count(&self.store_key).await
    }

    /// Hits left in the current window.
    pub async fn remaining(&self) -> Result<u64> {
        let used = self.usage().await?;
        Ok(self.max_requests.saturating_sub(used))
    }

    /// Time until the current window closes, `None` when no window is open.
    pub async fn reset_after(&self) -> Result<Option<Duration>> {
        self.store.ttl(&self.store_key).await
    }
}

impl<S: CounterStore> Clone for WindowRateLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
            store_key: self.store_key.clone(),
            max_requests: self.max_requests,
            time_window: self.time_window,
        }
    }
}

impl<S: CounterStore> std::fmt::Debug for WindowRateLimiter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowRateLimiter")
            .field("key", &self.store_key)
            .field("max_requests", &self.max_requests)
            .field("time_window", &self.time_window)
            .finish()
    }
}
