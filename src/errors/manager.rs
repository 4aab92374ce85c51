//! Retry and error manager.
//!
//! Wraps fallible operations with classification, bounded exponential-backoff
//! retry and noise suppression.
//!
//! ## Suppression
//! The manager tracks a session-valid flag, set after a write/remove probe
//! against the cookie store succeeds. While it is set, errors whose message
//! matches a known, already-reported validation condition are logged at debug
//! level and kept out of the surfaced log. The generic invalid-format error
//! is surfaced once per code before being suppressed. Clearing the flag
//! forgets all suppression state.

use crate::base::coreerror::{CoreError, ErrorCode};
use crate::cookies::record::CookieRecord;
use crate::cookies::store::CookieStore;
use crate::errors::classify::{classify, ErrorLevel};
use crate::errors::retry::{calculate_backoff, should_retry, RetryConfig};
use crate::messaging::notify::{Notification, Notifier};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use time::OffsetDateTime;

/// Name of the throwaway cookie written by the session probe.
pub const PROBE_COOKIE_NAME: &str = "__cookievault_probe";

/// Default number of surfaced errors retained.
pub const DEFAULT_MAX_LOG: usize = 100;

/// Generic format error; surfaced once per code while the session is valid.
const GENERIC_FORMAT_ERROR: &str = "invalid cookie format";

/// Messages for conditions already reported to the user by validation.
const EXPECTED_MESSAGES: &[&str] = &[
    "cookie has expired",
    "missing domain",
    "__host- prefix",
    "should have secure flag",
    "should have httponly flag",
];

/// Where an error happened.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    /// Object of the operation, e.g. a cookie identity or domain.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn counter_key(&self, code: ErrorCode) -> String {
        format!(
            "{}:{}:{}",
            code,
            self.operation,
            self.target.as_deref().unwrap_or("")
        )
    }
}

/// Immutable record of one handled error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub message: String,
    pub level: ErrorLevel,
    pub code: ErrorCode,
    pub context: ErrorContext,
    pub recoverable: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub retry_count: u32,
}

/// What the manager did with a handled error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Logged at its level and kept in the surfaced log.
    Surfaced,
    /// Logged at debug level only.
    Suppressed,
}

pub struct ErrorManager {
    config: RetryConfig,
    retry_counts: DashMap<String, u32>,
    session_valid: AtomicBool,
    surfaced_generic: DashSet<ErrorCode>,
    log: Mutex<VecDeque<ErrorRecord>>,
    max_log: usize,
    suppressed: AtomicUsize,
    notifier: Option<Notifier>,
}

impl Default for ErrorManager {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl ErrorManager {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            retry_counts: DashMap::new(),
            session_valid: AtomicBool::new(false),
            surfaced_generic: DashSet::new(),
            log: Mutex::new(VecDeque::new()),
            max_log: DEFAULT_MAX_LOG,
            suppressed: AtomicUsize::new(0),
            notifier: None,
        }
    }

    /// Push critical errors to `notifier`.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_max_log(mut self, max_log: usize) -> Self {
        self.max_log = max_log.max(1);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn is_session_valid(&self) -> bool {
        self.session_valid.load(Ordering::Acquire)
    }

    /// Set the session-valid flag. Clearing it forgets suppression state.
    pub fn set_session_valid(&self, valid: bool) {
        let was = self.session_valid.swap(valid, Ordering::AcqRel);
        if !valid {
            self.surfaced_generic.clear();
        }
        if was != valid {
            tracing::debug!(valid, "session validity changed");
        }
    }

    /// Probe the store by writing and removing a marker cookie, then record
    /// the result as the session-valid flag.
    pub async fn probe_session(&self, store: &dyn CookieStore, domain: &str) -> bool {
        let marker = CookieRecord::new(
            PROBE_COOKIE_NAME,
            OffsetDateTime::now_utc().unix_timestamp().to_string(),
            Some(domain),
            "/",
        );

        let valid = match store.set(marker.clone()).await {
            Ok(()) => match store.remove(&marker).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(domain, error = %e, "session probe: remove failed");
                    false
                }
            },
            Err(e) => {
                tracing::debug!(domain, error = %e, "session probe: write failed");
                false
            }
        };

        self.set_session_valid(valid);
        valid
    }

    /// Current retry count for a (code, context) pair.
    pub fn retry_count(&self, code: ErrorCode, context: &ErrorContext) -> u32 {
        self.retry_counts
            .get(&context.counter_key(code))
            .map(|c| *c)
            .unwrap_or(0)
    }

    /// Run `operation`, retrying retryable failures with exponential backoff.
    ///
    /// Each retryable code has its own budget within one call. Once a budget
    /// is spent the call fails with [`CoreError::RetriesExhausted`] carrying
    /// the number of attempts this call made and the last error.
    /// Non-retryable errors are handled and returned unchanged. Counters for
    /// the context are cleared on every exit.
    pub async fn with_retry<T, F, Fut>(
        &self,
        context: ErrorContext,
        mut operation: F,
    ) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut attempts: u32 = 0;
        let mut retries_by_code: HashMap<ErrorCode, u32> = HashMap::new();

        let result = loop {
            attempts += 1;
            let err = match operation().await {
                Ok(value) => break Ok(value),
                Err(err) => err,
            };

            let code = err.code();
            let retries = retries_by_code.get(&code).copied().unwrap_or(0);

            if code.is_retryable() && should_retry(retries, &self.config) {
                let retry = retries + 1;
                retries_by_code.insert(code, retry);
                self.retry_counts.insert(context.counter_key(code), retry);
                let delay = calculate_backoff(retry, &self.config);
                tracing::debug!(
                    operation = %context.operation,
                    code = %code,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let err = if code.is_retryable() {
                CoreError::RetriesExhausted {
                    attempts,
                    last: Box::new(err),
                }
            } else {
                err
            };
            self.record(&err, &context, retries);
            break Err(err);
        };

        self.reset_counters(&context);
        result
    }

    fn reset_counters(&self, context: &ErrorContext) {
        for code in [ErrorCode::NetworkError, ErrorCode::Timeout, ErrorCode::TemporaryFailure] {
            self.retry_counts.remove(&context.counter_key(code));
        }
    }

    /// Classify, log and possibly surface an error.
    pub fn handle_error(
        &self,
        error: &CoreError,
        context: &ErrorContext,
    ) -> (ErrorRecord, Disposition) {
        let retry_count = self
            .retry_counts
            .get(&context.counter_key(error.code()))
            .map(|c| *c)
            .unwrap_or(0);
        self.record(error, context, retry_count)
    }

    fn record(
        &self,
        error: &CoreError,
        context: &ErrorContext,
        retry_count: u32,
    ) -> (ErrorRecord, Disposition) {
        let classification = classify(error);
        let record = ErrorRecord {
            message: error.to_string(),
            level: classification.level,
            code: classification.code,
            context: context.clone(),
            recoverable: classification.recoverable,
            timestamp: OffsetDateTime::now_utc(),
            retry_count,
        };

        if self.should_suppress(&record) {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                operation = %record.context.operation,
                code = %record.code,
                message = %record.message,
                "suppressed expected error"
            );
            return (record, Disposition::Suppressed);
        }

        match record.level {
            ErrorLevel::Critical => tracing::error!(
                operation = %record.context.operation,
                code = %record.code,
                message = %record.message,
                "critical error"
            ),
            ErrorLevel::Warning => tracing::warn!(
                operation = %record.context.operation,
                code = %record.code,
                message = %record.message,
                "error"
            ),
            ErrorLevel::Info => tracing::info!(
                operation = %record.context.operation,
                code = %record.code,
                message = %record.message,
                "error"
            ),
        }

        {
            let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
            if log.len() >= self.max_log {
                log.pop_front();
            }
            log.push_back(record.clone());
        }

        if record.level == ErrorLevel::Critical {
            if let Some(notifier) = &self.notifier {
                notifier.notify(Notification::Error {
                    error: record.clone(),
                });
            }
        }

        (record, Disposition::Surfaced)
    }

    fn should_suppress(&self, record: &ErrorRecord) -> bool {
        if !self.is_session_valid() {
            return false;
        }

        let lower = record.message.to_lowercase();
        if lower.contains(GENERIC_FORMAT_ERROR) {
            // First occurrence per code is surfaced
            return !self.surfaced_generic.insert(record.code);
        }

        EXPECTED_MESSAGES.iter().any(|m| lower.contains(m))
    }

    /// Surfaced errors, oldest first.
    pub fn surfaced_errors(&self) -> Vec<ErrorRecord> {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.iter().cloned().collect()
    }

    /// Number of errors suppressed so far.
    pub fn suppressed_count(&self) -> usize {
        self.suppressed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::store::MemoryCookieStore;

    fn format_error() -> CoreError {
        CoreError::InvalidCookieFormat {
            errors: vec!["Missing required field: path".into()],
        }
    }

    #[test]
    fn test_nothing_suppressed_without_session() {
        let manager = ErrorManager::default();
        let ctx = ErrorContext::new("import_cookie");

        for _ in 0..3 {
            let (_, disposition) = manager.handle_error(&format_error(), &ctx);
            assert_eq!(disposition, Disposition::Surfaced);
        }
        assert_eq!(manager.surfaced_errors().len(), 3);
        assert_eq!(manager.suppressed_count(), 0);
    }

    #[test]
    fn test_generic_format_error_surfaces_once() {
        let manager = ErrorManager::default();
        manager.set_session_valid(true);
        let ctx = ErrorContext::new("import_cookie");

        assert_eq!(manager.handle_error(&format_error(), &ctx).1, Disposition::Surfaced);
        assert_eq!(manager.handle_error(&format_error(), &ctx).1, Disposition::Suppressed);
        assert_eq!(manager.handle_error(&format_error(), &ctx).1, Disposition::Suppressed);
        assert_eq!(manager.suppressed_count(), 2);
    }

    #[test]
    fn test_invalidating_session_clears_suppression() {
        let manager = ErrorManager::default();
        manager.set_session_valid(true);
        let ctx = ErrorContext::new("import_cookie");

        manager.handle_error(&format_error(), &ctx);
        assert_eq!(manager.handle_error(&format_error(), &ctx).1, Disposition::Suppressed);

        manager.set_session_valid(false);
        assert_eq!(manager.handle_error(&format_error(), &ctx).1, Disposition::Surfaced);

        manager.set_session_valid(true);
        assert_eq!(manager.handle_error(&format_error(), &ctx).1, Disposition::Surfaced);
    }

    #[test]
    fn test_expected_messages_suppressed_while_valid() {
        let manager = ErrorManager::default();
        manager.set_session_valid(true);
        let err = CoreError::Validation {
            errors: vec![
                "Missing domain: required unless the name carries the __Host- prefix".into(),
            ],
            warnings: vec![],
        };
        let (record, disposition) = manager.handle_error(&err, &ErrorContext::new("import_cookie"));
        assert_eq!(disposition, Disposition::Suppressed);
        assert_eq!(record.level, ErrorLevel::Warning);
        assert!(manager.surfaced_errors().is_empty());
    }

    #[test]
    fn test_unrelated_errors_never_suppressed() {
        let manager = ErrorManager::default();
        manager.set_session_valid(true);
        let err = CoreError::security("suspicious content");
        assert_eq!(
            manager.handle_error(&err, &ErrorContext::new("import_cookie")).1,
            Disposition::Surfaced
        );
    }

    #[test]
    fn test_log_is_bounded() {
        let manager = ErrorManager::default().with_max_log(2);
        for i in 0..5 {
            manager.handle_error(
                &CoreError::Platform { message: format!("failure {}", i) },
                &ErrorContext::new("set_cookie"),
            );
        }
        let log = manager.surfaced_errors();
        assert_eq!(log.len(), 2);
        assert!(log[1].message.contains("failure 4"));
    }

    #[tokio::test]
    async fn test_critical_errors_notify() {
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();
        let manager = ErrorManager::default().with_notifier(notifier);

        manager.handle_error(&CoreError::security("bad"), &ErrorContext::new("open"));
        manager.handle_error(
            &CoreError::Platform {
                message: "nope".into(),
            },
            &ErrorContext::new("set"),
        );

        match rx.recv().await.unwrap() {
            Notification::Error { error } => assert_eq!(error.code, ErrorCode::SecurityViolation),
            other => panic!("unexpected notification {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_probe_session_sets_flag() {
        let manager = ErrorManager::default();
        let store = MemoryCookieStore::new();

        assert!(manager.probe_session(&store, "example.com").await);
        assert!(manager.is_session_valid());
        assert_eq!(store.total_cookie_count(), 0);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let manager = ErrorManager::default();
        let mut calls = 0;
        let result: Result<(), CoreError> = manager
            .with_retry(ErrorContext::new("set_cookie"), || {
                calls += 1;
                async {
                    Err(CoreError::Platform {
                        message: "denied".into(),
                    })
                }
            })
            .await;

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(CoreError::Platform { .. })));
    }
}
