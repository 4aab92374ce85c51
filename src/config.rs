//! Runtime configuration.
//!
//! [`CoreConfig`] gathers every tunable of the vault. All fields have
//! defaults, so a JSON document only needs to name what it overrides:
//!
//! ```rust
//! use cookievault::config::CoreConfig;
//!
//! let config = CoreConfig::from_json(r#"{"batch_size": 20, "retry": {"max_retries": 1}}"#)?;
//! assert_eq!(config.batch_size, 20);
//! assert_eq!(config.retry.max_retries, 1);
//! assert_eq!(config.cache.max_entries, 100);
//! # Ok::<(), cookievault::base::coreerror::CoreError>(())
//! ```

use crate::base::coreerror::CoreError;
use crate::cache::ttlcache::CacheConfig;
use crate::cookies::codec::{DEFAULT_KEY_ITERATIONS, MAX_ENVELOPE_AGE_MS};
use crate::cookies::validator::MAX_COOKIE_SIZE;
use crate::errors::manager::DEFAULT_MAX_LOG;
use crate::errors::retry::RetryConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Cookies per import chunk (default: 50)
    pub batch_size: usize,
    /// Serialized size above which the validator warns (default: 4096)
    pub max_cookie_size: usize,
    /// Lock timeout in milliseconds (default: 30000)
    pub lock_timeout_ms: u64,
    /// Freshness window for sealed envelopes (default: 24 hours)
    pub envelope_max_age_ms: i64,
    /// PBKDF2 iterations for newly generated keys (default: 100000)
    pub key_iterations: usize,
    /// Surfaced errors kept in the error log (default: 100)
    pub max_error_log: usize,
    /// Domain used for the session-validity probe cookie
    pub probe_domain: String,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_cookie_size: MAX_COOKIE_SIZE,
            lock_timeout_ms: 30_000,
            envelope_max_age_ms: MAX_ENVELOPE_AGE_MS,
            key_iterations: DEFAULT_KEY_ITERATIONS,
            max_error_log: DEFAULT_MAX_LOG,
            probe_domain: "cookievault.invalid".to_string(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let config: CoreConfig = serde_json::from_str(json).map_err(|e| CoreError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Settings for tests: no backoff waits and a single PBKDF2 iteration.
    pub fn for_testing() -> Self {
        Self {
            key_iterations: 1,
            retry: RetryConfig {
                base_delay_ms: 0,
                max_delay_ms: 0,
                ..RetryConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Reject settings that would make the vault unusable.
    pub fn validate(&self) -> Result<(), CoreError> {
        let fail = |message: &str| {
            Err(CoreError::Config {
                message: message.to_string(),
            })
        };

        if self.batch_size == 0 {
            return fail("batch_size must be at least 1");
        }
        if self.lock_timeout_ms == 0 {
            return fail("lock_timeout_ms must be positive");
        }
        if self.envelope_max_age_ms <= 0 {
            return fail("envelope_max_age_ms must be positive");
        }
        if self.key_iterations == 0 {
            return fail("key_iterations must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return fail("retry.jitter_factor must be within 0.0..=1.0");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return fail("retry.base_delay_ms must not exceed retry.max_delay_ms");
        }
        Ok(())
    }
}
