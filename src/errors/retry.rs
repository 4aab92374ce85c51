//! Retry policy with exponential backoff.
//!
//! Each retry waits `base_delay * 2^(attempt-1)`; with the default one-second
//! base the waits are 1s, 2s, 4s for the three permitted retries.

use serde::Deserialize;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 3)
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds (default: 1000)
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds (default: 30000)
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) added on top of the delay (default: 0.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Short delays, for interactive paths that must not stall the UI.
    pub fn fast() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter_factor: 0.1,
        }
    }
}

/// Calculate backoff delay before retry number `attempt` (1-based).
///
/// Uses exponential backoff: `base_delay * 2^(attempt-1)`, capped at
/// `max_delay_ms`.
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let delay_ms = config
        .base_delay_ms
        .saturating_mul(1 << (attempt - 1).min(20));
    let capped_ms = delay_ms.min(config.max_delay_ms);

    let jitter_range = (capped_ms as f64 * config.jitter_factor) as u64;
    let jittered_ms = if jitter_range > 0 {
        // Deterministic jitter based on attempt number
        let jitter = (attempt as u64 * 7) % jitter_range;
        capped_ms.saturating_add(jitter)
    } else {
        capped_ms
    };

    Duration::from_millis(jittered_ms)
}

/// Check if another retry is allowed after `retries_so_far` retries.
pub fn should_retry(retries_so_far: u32, config: &RetryConfig) -> bool {
    retries_so_far < config.max_retries
}
