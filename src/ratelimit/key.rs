//! Counter key derivation.

use std::fmt;

/// Prefix shared by every counter key this crate writes.
pub const KEY_PREFIX: &str = "rate_limit";

/// Client name used when the caller does not distinguish principals.
pub const DEFAULT_CLIENT: &str = "default";

/// Identity of a quota: the protected resource and the principal using it.
///
/// The store key is `rate_limit:{resource}:{client}`. Other deployments sharing
/// the same store rely on this exact shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// The resource being protected
    pub resource: String,
    /// The principal being limited
    pub client: String,
}

impl RateLimitKey {
    /// Create a new key for a resource and client pair.
    pub fn new(resource: &str, client: &str) -> Self {
        Self {
            resource: resource.to_string(),
            client: client.to_string(),
        }
    }

    /// Create a key for a resource using the default client.
    pub fn for_resource(resource: &str) -> Self {
        Self::new(resource, DEFAULT_CLIENT)
    }

    /// The string the counter is stored under.
    pub fn to_store_key(&self) -> String {
        format!("{}:{}:{}", KEY_PREFIX, self.resource, self.client)
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}
