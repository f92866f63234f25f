//! Fixed-window rate limiting over a shared counter store.

mod key;
mod limiter;
mod memory;
mod redis_store;
mod rules;
mod store;

pub use key::{RateLimitKey, DEFAULT_CLIENT, KEY_PREFIX};
pub use limiter::{Permit, RateLimiterConfig, WindowRateLimiter, MAX_TIME_WINDOW};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use rules::{LimitRule, LimitRules};
pub use store::CounterStore;
