//! Runtime configuration.
//!
//! Every setting can be overridden through an environment variable:
//!
//! | variable | default | meaning |
//! |----------|---------|---------|
//! | `BIND_ADDR` | `0.0.0.0:8080` | HTTP listen address |
//! | `USE_PERSISTENT_STORES` | `false` | Postgres stores instead of in-memory |
//! | `DATABASE_URL` | unset | Postgres connection string |
//! | `DATABASE_MAX_CONNECTIONS` | `5` | pool size |
//! | `TRANSFER_LEG_ATTEMPTS` | `3` | attempts per transfer leg |
//! | `TRANSFER_LEG_TIMEOUT_MS` | `2000` | timeout per attempt |
//! | `TRANSFER_RETRY_BACKOFF_MS` | `50` | delay before the first retry (doubles) |
//! | `INVENTORY_CACHE_TTL_SECS` | `30` | max age of a cached stock figure |
//! | `SEED_DEMO_DATA` | `false` | load demo catalog on startup |

use std::str::FromStr;
use std::time::Duration;

/// Retry budget for a single transfer leg (and its compensation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            attempt_timeout: Duration::from_millis(2000),
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), doubling each time.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(10);
        self.backoff.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub transfer_retry: RetryPolicy,
    pub inventory_cache_ttl: Duration,
    pub seed_demo_data: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to the default for that key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| lookup(key).map(|v| v.trim().to_string());
        let defaults = RetryPolicy::default();

        Self {
            bind_addr: parsed("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
            use_persistent_stores: parse_or(parsed("USE_PERSISTENT_STORES"), false),
            database_url: parsed("DATABASE_URL").filter(|v| !v.is_empty()),
            database_max_connections: parse_or(parsed("DATABASE_MAX_CONNECTIONS"), 5),
            transfer_retry: RetryPolicy {
                attempts: parse_or(parsed("TRANSFER_LEG_ATTEMPTS"), defaults.attempts).max(1),
                attempt_timeout: Duration::from_millis(
                    parse_or(
                        parsed("TRANSFER_LEG_TIMEOUT_MS"),
                        defaults.attempt_timeout.as_millis() as u64,
                    )
                    .max(1),
                ),
                backoff: Duration::from_millis(parse_or(
                    parsed("TRANSFER_RETRY_BACKOFF_MS"),
                    defaults.backoff.as_millis() as u64,
                )),
            },
            inventory_cache_ttl: Duration::from_secs(parse_or(parsed("INVENTORY_CACHE_TTL_SECS"), 30)),
            seed_demo_data: parse_or(parsed("SEED_DEMO_DATA"), false),
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert!(!cfg.use_persistent_stores);
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.transfer_retry, RetryPolicy::default());
        assert_eq!(cfg.inventory_cache_ttl, Duration::from_secs(30));
    }

    #[test]
    fn overrides_are_applied_and_garbage_is_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/salon"),
            ("TRANSFER_LEG_ATTEMPTS", "5"),
            ("TRANSFER_LEG_TIMEOUT_MS", "not-a-number"),
        ]);
        let cfg = AppConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert!(cfg.use_persistent_stores);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/salon"));
        assert_eq!(cfg.transfer_retry.attempts, 5);
        assert_eq!(cfg.transfer_retry.attempt_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let cfg = AppConfig::from_lookup(|k| (k == "TRANSFER_LEG_ATTEMPTS").then(|| "0".to_string()));
        assert_eq!(cfg.transfer_retry.attempts, 1);
    }

    #[test]
    fn zero_timeout_is_raised_to_one_millisecond() {
        let cfg = AppConfig::from_lookup(|k| (k == "TRANSFER_LEG_TIMEOUT_MS").then(|| "0".to_string()));
        assert_eq!(cfg.transfer_retry.attempt_timeout, Duration::from_millis(1));
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy {
            attempts: 4,
            attempt_timeout: Duration::from_millis(10),
            backoff: Duration::from_millis(50),
        };
        assert_eq!(p.delay_for(1), Duration::from_millis(50));
        assert_eq!(p.delay_for(3), Duration::from_millis(200));
    }
}
