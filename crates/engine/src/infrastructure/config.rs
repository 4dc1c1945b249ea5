//! Runtime configuration read from the environment.
//!
//! Supported environment variables:
//! - HEROSHEET_REMOTE_URL: Base URL of the backend API
//! - HEROSHEET_REMOTE_TIMEOUT_MS: Bound for a single remote call (range: 100-60000)
//! - HEROSHEET_CACHE_DB: Path of the SQLite cache file
//! - HEROSHEET_CONFLICT_POLICY: `local_wins`, `remote_wins` or `field_merge`
//! - HEROSHEET_STRICT_CONFLICTS: Compare content fingerprints on equal timestamps
//!
//! Invalid values are logged and replaced by the default.

use std::time::Duration;

use herosheet_domain::ConflictPolicy;

use crate::infrastructure::timeout_remote::DEFAULT_REMOTE_TIMEOUT;

pub const DEFAULT_REMOTE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_CACHE_DB: &str = "herosheet-cache.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub remote_url: String,
    pub remote_timeout: Duration,
    pub cache_db: String,
    pub conflict_policy: ConflictPolicy,
    pub strict_conflicts: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: DEFAULT_REMOTE_URL.to_string(),
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            cache_db: DEFAULT_CACHE_DB.to_string(),
            conflict_policy: ConflictPolicy::default(),
            strict_conflicts: false,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(url) = read("HEROSHEET_REMOTE_URL") {
            config.remote_url = url;
        }

        if let Some(val) = read("HEROSHEET_REMOTE_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) if (100..=60_000).contains(&ms) => {
                    config.remote_timeout = Duration::from_millis(ms);
                }
                Ok(ms) => {
                    tracing::warn!(ms, "HEROSHEET_REMOTE_TIMEOUT_MS out of range [100, 60000], ignoring");
                }
                Err(_) => {
                    tracing::warn!(val = %val, "HEROSHEET_REMOTE_TIMEOUT_MS is not a valid u64, ignoring");
                }
            }
        }

        if let Some(path) = read("HEROSHEET_CACHE_DB") {
            config.cache_db = path;
        }

        if let Some(val) = read("HEROSHEET_CONFLICT_POLICY") {
            match val.parse::<ConflictPolicy>() {
                Ok(policy) => config.conflict_policy = policy,
                Err(e) => tracing::warn!(error = %e, "Ignoring HEROSHEET_CONFLICT_POLICY"),
            }
        }

        if let Some(val) = read("HEROSHEET_STRICT_CONFLICTS") {
            match parse_flag(&val) {
                Some(flag) => config.strict_conflicts = flag,
                None => {
                    tracing::warn!(val = %val, "HEROSHEET_STRICT_CONFLICTS is not a boolean, ignoring");
                }
            }
        }

        config
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> SyncConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config_from(&[]), SyncConfig::default());
        assert_eq!(SyncConfig::default().remote_timeout, Duration::from_secs(5));
    }

    #[test]
    fn reads_every_variable() {
        let config = config_from(&[
            ("HEROSHEET_REMOTE_URL", "https://sheets.example/api"),
            ("HEROSHEET_REMOTE_TIMEOUT_MS", "1500"),
            ("HEROSHEET_CACHE_DB", "/tmp/sheets.db"),
            ("HEROSHEET_CONFLICT_POLICY", "field_merge"),
            ("HEROSHEET_STRICT_CONFLICTS", "yes"),
        ]);

        assert_eq!(config.remote_url, "https://sheets.example/api");
        assert_eq!(config.remote_timeout, Duration::from_millis(1500));
        assert_eq!(config.cache_db, "/tmp/sheets.db");
        assert_eq!(config.conflict_policy, ConflictPolicy::FieldMerge);
        assert!(config.strict_conflicts);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("HEROSHEET_REMOTE_TIMEOUT_MS", "5"),
            ("HEROSHEET_CONFLICT_POLICY", "coin_flip"),
            ("HEROSHEET_STRICT_CONFLICTS", "maybe"),
            ("HEROSHEET_REMOTE_URL", "   "),
        ]);

        assert_eq!(config, SyncConfig::default());
    }
}
