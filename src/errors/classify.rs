//! Error classification.
//!
//! Severity is derived from the error message so that errors coming back
//! from other layers (store last-error strings, validation text) are graded
//! the same way as the crate's own.

use crate::base::coreerror::{CoreError, ErrorCode};
use serde::{Deserialize, Serialize};

/// Severity of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLevel {
    Info,
    Warning,
    Critical,
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub level: ErrorLevel,
    pub code: ErrorCode,
    pub recoverable: bool,
}

const CRITICAL_MARKERS: &[&str] = &["parse", "json", "invalid cookie data", "security violation"];

const WARNING_MARKERS: &[&str] = &[
    "missing domain",
    "__host-",
    "host prefix",
    "validation",
    "invalid cookie format",
];

/// Severity level for an error message.
pub fn level_for_message(message: &str) -> ErrorLevel {
    let lower = message.to_lowercase();

    if CRITICAL_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorLevel::Critical
    } else if WARNING_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorLevel::Warning
    } else {
        ErrorLevel::Info
    }
}

/// Classify an error.
///
/// `recoverable` holds for network-related errors and for platform errors
/// other than an exceeded quota.
pub fn classify(error: &CoreError) -> Classification {
    let recoverable = error.is_network_related() || matches!(error, CoreError::Platform { .. });

    Classification {
        level: level_for_message(&error.to_string()),
        code: error.code(),
        recoverable,
    }
}
