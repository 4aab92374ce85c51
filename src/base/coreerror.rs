//! Error taxonomy.
//!
//! Every failure in the crate is a [`CoreError`] with a stable
//! [`ErrorCode`]. Integrity failures carry an [`IntegrityError`] and read as
//! security violations. Cookie store failures arrive as a [`PlatformError`]
//! holding the platform's last-error text, which is normalized by message:
//!
//! | Message contains | Code |
//! |------------------|------|
//! | `quota` | `QUOTA_EXCEEDED` |
//! | `timeout`, `timed out` | `TIMEOUT` |
//! | `network`, `net::`, `connection`, `offline` | `NETWORK_ERROR` |
//! | `temporar`, `try again`, `busy`, `unavailable` | `TEMPORARY_FAILURE` |
//! | anything else | `PLATFORM_ERROR` |

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes carried by every [`CoreError`].
///
/// The string forms are part of the notification wire format and must not
/// change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Transient
    NetworkError,
    Timeout,
    TemporaryFailure,

    // Cookie data
    ValidationError,
    SecurityViolation,
    ParseError,

    // Envelope
    IntegrityFailure,
    CryptoFailure,

    // Coordination
    LockContention,
    LockTimeout,
    RetriesExhausted,
    BatchFailed,

    // Platform
    QuotaExceeded,
    PlatformError,
    StorageError,
    ConfigError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::TemporaryFailure => "TEMPORARY_FAILURE",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::SecurityViolation => "SECURITY_VIOLATION",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::IntegrityFailure => "INTEGRITY_FAILURE",
            ErrorCode::CryptoFailure => "CRYPTO_FAILURE",
            ErrorCode::LockContention => "LOCK_CONTENTION",
            ErrorCode::LockTimeout => "LOCK_TIMEOUT",
            ErrorCode::RetriesExhausted => "RETRIES_EXHAUSTED",
            ErrorCode::BatchFailed => "BATCH_FAILED",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::PlatformError => "PLATFORM_ERROR",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::ConfigError => "CONFIG_ERROR",
        }
    }

    /// Codes eligible for backoff retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkError | ErrorCode::Timeout | ErrorCode::TemporaryFailure
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons an envelope is refused by the integrity codec.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum IntegrityError {
    #[error("integrity tag mismatch")]
    TagMismatch,
    #[error("envelope is stale ({age_ms} ms old)")]
    Stale { age_ms: i64 },
    #[error("unsupported envelope version {found}")]
    UnsupportedVersion { found: String },
    #[error("envelope was sealed with a different key")]
    KeyMismatch,
    #[error("malformed envelope: {reason}")]
    Malformed { reason: String },
}

/// A failure reported by the external cookie store.
///
/// Carries the platform's raw last-error text; [`CoreError::from`] maps it
/// onto the crate taxonomy.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("{message}")]
pub struct PlatformError {
    pub message: String,
}

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error type for every fallible operation in the crate.
///
/// Display strings are load-bearing: [`crate::errors::classify`] derives the
/// severity level from them.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CoreError {
    #[error("Validation failed: {}", errors.join("; "))]
    Validation {
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    #[error("Invalid cookie format: {}", errors.join("; "))]
    InvalidCookieFormat { errors: Vec<String> },

    #[error("Security violation: {message}")]
    Security { message: String },

    #[error("Security violation: envelope rejected: {0}")]
    Integrity(IntegrityError),

    #[error("Security violation: cryptographic operation failed: {message}")]
    Crypto { message: String },

    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("{message}")]
    Transient { code: ErrorCode, message: String },

    #[error("Storage quota exceeded: {message}")]
    QuotaExceeded { message: String },

    #[error("Cookie store error: {message}")]
    Platform { message: String },

    #[error("Operation already in progress: {key}")]
    LockContention { key: String },

    #[error("Lock timed out after {timeout_ms} ms: {key}")]
    LockTimeout { key: String, timeout_ms: u64 },

    #[error("Lock holder for {key} terminated unexpectedly")]
    LockAborted { key: String },

    #[error("Operation failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<CoreError> },

    /// Every item of a non-empty batch failed. `errors` holds one entry per
    /// item, prefixed with the cookie name.
    #[error("All {total} cookies in batch failed: {}", .errors.join("; "))]
    BatchFailed { total: usize, errors: Vec<String> },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Validation { .. } | CoreError::InvalidCookieFormat { .. } => {
                ErrorCode::ValidationError
            }
            CoreError::Security { .. } => ErrorCode::SecurityViolation,
            CoreError::Integrity(_) => ErrorCode::IntegrityFailure,
            CoreError::Crypto { .. } => ErrorCode::CryptoFailure,
            CoreError::Parse { .. } => ErrorCode::ParseError,
            CoreError::Transient { code, .. } => *code,
            CoreError::QuotaExceeded { .. } => ErrorCode::QuotaExceeded,
            CoreError::Platform { .. } => ErrorCode::PlatformError,
            CoreError::LockContention { .. } => ErrorCode::LockContention,
            CoreError::LockTimeout { .. } | CoreError::LockAborted { .. } => ErrorCode::LockTimeout,
            CoreError::RetriesExhausted { .. } => ErrorCode::RetriesExhausted,
            CoreError::BatchFailed { .. } => ErrorCode::BatchFailed,
            CoreError::Storage { .. } => ErrorCode::StorageError,
            CoreError::Config { .. } => ErrorCode::ConfigError,
        }
    }

    /// Network-class failures (network, timeout, temporary).
    pub fn is_network_related(&self) -> bool {
        matches!(self, CoreError::Transient { .. })
    }

    pub fn security(message: impl Into<String>) -> Self {
        CoreError::Security {
            message: message.into(),
        }
    }

    pub fn parse(what: impl Into<String>, message: impl fmt::Display) -> Self {
        CoreError::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    pub fn storage(message: impl fmt::Display) -> Self {
        CoreError::Storage {
            message: message.to_string(),
        }
    }

    pub fn crypto(message: impl fmt::Display) -> Self {
        CoreError::Crypto {
            message: message.to_string(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        CoreError::Transient {
            code: ErrorCode::NetworkError,
            message: message.into(),
        }
    }
}

impl From<IntegrityError> for CoreError {
    fn from(err: IntegrityError) -> Self {
        CoreError::Integrity(err)
    }
}

impl From<PlatformError> for CoreError {
    /// Normalize a platform last-error string.
    fn from(err: PlatformError) -> Self {
        let lower = err.message.to_lowercase();
        let message = err.message;

        if lower.contains("quota") {
            CoreError::QuotaExceeded { message }
        } else if lower.contains("timeout") || lower.contains("timed out") {
            CoreError::Transient {
                code: ErrorCode::Timeout,
                message,
            }
        } else if lower.contains("network")
            || lower.contains("net::")
            || lower.contains("connection")
            || lower.contains("offline")
        {
            CoreError::Transient {
                code: ErrorCode::NetworkError,
                message,
            }
        } else if lower.contains("temporar")
            || lower.contains("try again")
            || lower.contains("busy")
            || lower.contains("unavailable")
        {
            CoreError::Transient {
                code: ErrorCode::TemporaryFailure,
                message,
            }
        } else {
            CoreError::Platform { message }
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::parse("JSON", err)
    }
}

impl From<boring::error::ErrorStack> for CoreError {
    fn from(err: boring::error::ErrorStack) -> Self {
        CoreError::crypto(err)
    }
}
