use cookievault::base::coreerror::{CoreError, ErrorCode, PlatformError};
use cookievault::errors::classify::ErrorLevel;
use cookievault::errors::manager::{Disposition, ErrorContext, ErrorManager};
use cookievault::errors::retry::RetryConfig;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_retryable_failure_attempted_four_times_with_backoff() {
    let manager = ErrorManager::new(RetryConfig::default());
    let mut attempts: Vec<Instant> = Vec::new();

    let result: Result<(), CoreError> = manager
        .with_retry(ErrorContext::new("set_cookie").with_target("sid@example.com"), || {
            attempts.push(Instant::now());
            async { Err(CoreError::from(PlatformError::new("net::ERR_INTERNET_DISCONNECTED"))) }
        })
        .await;

    assert_eq!(attempts.len(), 4);
    let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
    let expected = [1, 2, 4].map(Duration::from_secs);
    for (gap, want) in gaps.iter().zip(expected) {
        assert!(
            *gap >= want && *gap < want + Duration::from_millis(10),
            "gap {:?}, want {:?}",
            gap,
            want
        );
    }

    match result {
        Err(CoreError::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 4);
            assert_eq!(last.code(), ErrorCode::NetworkError);
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }

    let ctx = ErrorContext::new("set_cookie").with_target("sid@example.com");
    assert_eq!(manager.retry_count(ErrorCode::NetworkError, &ctx), 0);

    let log = manager.surfaced_errors();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].code, ErrorCode::RetriesExhausted);
    assert_eq!(log[0].retry_count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers() {
    let manager = ErrorManager::new(RetryConfig::default());
    let mut calls = 0;
    let start = Instant::now();

    let result = manager
        .with_retry(ErrorContext::new("get_cookies"), || {
            calls += 1;
            let outcome = if calls < 3 {
                Err(CoreError::from(PlatformError::new("Service temporarily unavailable")))
            } else {
                Ok(calls)
            };
            async move { outcome }
        })
        .await;

    assert_eq!(result, Ok(3));
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert_eq!(
        manager.retry_count(ErrorCode::TemporaryFailure, &ErrorContext::new("get_cookies")),
        0
    );
    assert!(manager.surfaced_errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_is_fresh_for_each_call() {
    let manager = ErrorManager::new(RetryConfig::default());
    let ctx = ErrorContext::new("set_cookie").with_target("sid@example.com");

    // Network failure, then a non-retryable platform failure
    let mut calls = 0;
    let first: Result<(), CoreError> = manager
        .with_retry(ctx.clone(), || {
            calls += 1;
            let message = if calls == 1 {
                "net::ERR_CONNECTION_RESET"
            } else {
                "No host permissions for cookies at url"
            };
            async move { Err(CoreError::from(PlatformError::new(message))) }
        })
        .await;
    assert_eq!(calls, 2);
    assert_eq!(first.unwrap_err().code(), ErrorCode::PlatformError);
    assert_eq!(manager.retry_count(ErrorCode::NetworkError, &ctx), 0);

    let mut calls = 0;
    let second: Result<(), CoreError> = manager
        .with_retry(ctx.clone(), || {
            calls += 1;
            async { Err(CoreError::from(PlatformError::new("net::ERR_CONNECTION_RESET"))) }
        })
        .await;
    assert_eq!(calls, 4);
    match second {
        Err(CoreError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 4),
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_attempts_count_every_call_across_codes() {
    let manager = ErrorManager::new(RetryConfig::default());
    let mut calls = 0;

    let result: Result<(), CoreError> = manager
        .with_retry(ErrorContext::new("get_cookies"), || {
            calls += 1;
            let message = if calls == 1 {
                "Service temporarily unavailable"
            } else {
                "net::ERR_INTERNET_DISCONNECTED"
            };
            async move { Err(CoreError::from(PlatformError::new(message))) }
        })
        .await;

    // One temporary retry, then the network budget of 3
    assert_eq!(calls, 5);
    match result {
        Err(CoreError::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 5);
            assert_eq!(last.code(), ErrorCode::NetworkError);
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
    assert_eq!(
        manager.retry_count(ErrorCode::TemporaryFailure, &ErrorContext::new("get_cookies")),
        0
    );
}

#[tokio::test]
async fn test_quota_errors_fail_immediately() {
    let manager = ErrorManager::new(RetryConfig::default());
    let mut calls = 0;

    let result: Result<(), _> = manager
        .with_retry(ErrorContext::new("set_cookie"), || {
            calls += 1;
            async { Err(CoreError::from(PlatformError::new("QUOTA_BYTES quota exceeded"))) }
        })
        .await;

    assert_eq!(calls, 1);
    let err = result.unwrap_err();
    assert_eq!(err.code(), ErrorCode::QuotaExceeded);
    assert!(!manager.surfaced_errors()[0].recoverable);
}

#[test]
fn test_suppression_state_machine() {
    let manager = ErrorManager::default();
    let ctx = ErrorContext::new("import_cookie");
    let generic = CoreError::InvalidCookieFormat {
        errors: vec!["Missing required field: value".into()],
    };
    let expired = CoreError::Validation {
        errors: vec!["Cookie has expired".into()],
        warnings: vec![],
    };

    // Session not yet known good: everything surfaces
    assert_eq!(manager.handle_error(&expired, &ctx).1, Disposition::Surfaced);

    manager.set_session_valid(true);
    assert_eq!(manager.handle_error(&expired, &ctx).1, Disposition::Suppressed);
    assert_eq!(manager.handle_error(&generic, &ctx).1, Disposition::Surfaced);
    assert_eq!(manager.handle_error(&generic, &ctx).1, Disposition::Suppressed);

    manager.set_session_valid(false);
    assert_eq!(manager.handle_error(&expired, &ctx).1, Disposition::Surfaced);
    assert_eq!(manager.handle_error(&generic, &ctx).1, Disposition::Surfaced);

    assert_eq!(manager.suppressed_count(), 2);
    assert_eq!(manager.surfaced_errors().len(), 4);
}

#[test]
fn test_records_carry_classification() {
    let manager = ErrorManager::default();
    let (record, _) = manager.handle_error(
        &CoreError::parse("JSON", "unexpected end of input"),
        &ErrorContext::new("import").with_meta("source", "popup"),
    );

    assert_eq!(record.level, ErrorLevel::Critical);
    assert_eq!(record.code, ErrorCode::ParseError);
    assert!(!record.recoverable);
    assert_eq!(record.context.metadata.get("source").map(String::as_str), Some("popup"));

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["code"], "PARSE_ERROR");
    assert_eq!(json["level"], "critical");
    assert!(json["retryCount"].is_u64());
}
