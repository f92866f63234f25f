//! Windowgate - Distributed Fixed-Window Rate Limiting
//!
//! This crate answers one question for a calling process: may this
//! (resource, client) pair perform one more action in the current window?
//! Counters live in a shared store (Redis), so every process asking about the
//! same pair sees the same quota.

pub mod config;
pub mod error;
pub mod ratelimit;

pub use error::{Result, WindowGateError};
pub use ratelimit::{CounterStore, MemoryStore, Permit, RedisStore, WindowRateLimiter};
