//! Named quota rules loaded from configuration.
//!
//! A rules file lists one quota per resource. Limiters for any client of that
//! resource can then be built by name instead of repeating the numbers at
//! every call site.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::key::DEFAULT_CLIENT;
use super::limiter::{RateLimiterConfig, WindowRateLimiter};
use super::store::CounterStore;
use crate::error::{Result, WindowGateError};

/// A quota for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitRule {
    /// The resource this quota protects
    pub resource: String,
    /// Hits allowed per window
    pub max_requests: u64,
    /// Window length in seconds
    pub time_window: u64,
    /// Optional name/description for this rule
    #[serde(default)]
    pub name: Option<String>,
}

/// The set of configured quotas, indexed by resource.
#[derive(Debug, Clone, Default)]
pub struct LimitRules {
    rules: HashMap<String, LimitRule>,
}

/// On-disk layout of a rules file.
#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    limits: Vec<LimitRule>,
}

impl LimitRules {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: RulesFile = serde_yaml::from_str(yaml)
            .map_err(|e| WindowGateError::Config(format!("Failed to parse rules: {}", e)))?;
        Self::from_rules(file.limits)
    }

    /// Build a rule set, rejecting duplicates and unusable quotas.
    pub fn from_rules(rules: Vec<LimitRule>) -> Result<Self> {
        let mut indexed: HashMap<String, LimitRule> = HashMap::with_capacity(rules.len());

        for rule in rules {
            if indexed.contains_key(&rule.resource) {
                return Err(WindowGateError::Config(format!(
                    "duplicate rule for resource {:?}",
                    rule.resource
                )));
            }
            rule.to_config(DEFAULT_CLIENT).validate()?;
            indexed.insert(rule.resource.clone(), rule);
        }

        Ok(Self { rules: indexed })
    }

    /// Find the rule for a resource.
    pub fn find(&self, resource: &str) -> Option<&LimitRule> {
        self.rules.get(resource)
    }

    /// Number of configured rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Build a limiter for `client` on a configured resource.
    pub fn limiter_for<S: CounterStore>(
        &self,
        store: Arc<S>,
        resource: &str,
        client: &str,
    ) -> Result<WindowRateLimiter<S>> {
        let rule = self.find(resource).ok_or_else(|| {
            WindowGateError::Config(format!("no rate limit rule for resource {:?}", resource))
        })?;
        WindowRateLimiter::from_config(store, &rule.to_config(client))
    }
}

impl LimitRule {
    /// Limiter settings for this rule as seen by `client`.
    pub fn to_config(&self, client: &str) -> RateLimiterConfig {
        RateLimiterConfig::new(&self.resource, client, self.max_requests, self.time_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::MemoryStore;

    const RULES: &str = r#"
limits:
  - resource: uploads
    max_requests: 10
    time_window: 60
    name: upload quota
  - resource: search
    max_requests: 100
    time_window: 1
"#;

    #[test]
    fn test_parse_rules() {
        let rules = LimitRules::from_yaml(RULES).unwrap();
        assert_eq!(rules.len(), 2);

        let uploads = rules.find("uploads").unwrap();
        assert_eq!(uploads.max_requests, 10);
        assert_eq!(uploads.time_window, 60);
        assert_eq!(uploads.name.as_deref(), Some("upload quota"));

        let search = rules.find("search").unwrap();
        assert_eq!(search.name, None);
    }

    #[test]
    fn test_find_no_match() {
        let rules = LimitRules::from_yaml(RULES).unwrap();
        assert!(rules.find("downloads").is_none());
    }

    #[test]
    fn test_empty_rules() {
        let rules = LimitRules::from_yaml("limits: []\n").unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_rejects_duplicate_resource() {
        let yaml = r#"
limits:
  - resource: uploads
    max_requests: 10
    time_window: 60
  - resource: uploads
    max_requests: 5
    time_window: 60
"#;
        assert!(matches!(
            LimitRules::from_yaml(yaml),
            Err(WindowGateError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_zero_quota() {
        let yaml = r#"
limits:
  - resource: uploads
    max_requests: 0
    time_window: 60
"#;
        assert!(matches!(
            LimitRules::from_yaml(yaml),
            Err(WindowGateError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        assert!(matches!(
            LimitRules::from_yaml("limits: [resource: {"),
            Err(WindowGateError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_limiter_for_configured_resource() {
        let rules = LimitRules::from_yaml(RULES).unwrap();
        let store = Arc::new(MemoryStore::new());

        let limiter = rules.limiter_for(store, "uploads", "alice").unwrap();
        assert_eq!(limiter.store_key(), "rate_limit:uploads:alice");
        assert_eq!(limiter.max_requests(), 10);
        assert_eq!(limiter.time_window(), 60);
        assert!(limiter.try_acquire().await.is_ok());
    }

    #[test]
    fn test_limiter_for_unknown_resource() {
        let rules = LimitRules::from_yaml(RULES).unwrap();
        let store = Arc::new(MemoryStore::new());

        assert!(matches!(
            rules.limiter_for(store, "downloads", "alice"),
            Err(WindowGateError::Config(_))
        ));
    }
}
