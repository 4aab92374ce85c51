use crate::base::coreerror::{CoreError, ErrorCode, IntegrityError, PlatformError};

#[test]
fn test_platform_error_normalization() {
    let cases = [
        ("QUOTA_BYTES quota exceeded", ErrorCode::QuotaExceeded),
        ("Request timed out", ErrorCode::Timeout),
        ("net::ERR_INTERNET_DISCONNECTED", ErrorCode::NetworkError),
        ("Store temporarily unavailable", ErrorCode::TemporaryFailure),
        ("No host permissions for cookies at url", ErrorCode::PlatformError),
    ];

    for (message, expected) in cases {
        let err = CoreError::from(PlatformError::new(message));
        assert_eq!(err.code(), expected, "message: {}", message);
    }
}

#[test]
fn test_retryable_codes() {
    assert!(ErrorCode::NetworkError.is_retryable());
    assert!(ErrorCode::Timeout.is_retryable());
    assert!(ErrorCode::TemporaryFailure.is_retryable());
    assert!(!ErrorCode::ValidationError.is_retryable());
    assert!(!ErrorCode::IntegrityFailure.is_retryable());
    assert!(!ErrorCode::LockContention.is_retryable());
    assert!(!ErrorCode::QuotaExceeded.is_retryable());
}

#[test]
fn test_code_wire_strings() {
    assert_eq!(ErrorCode::NetworkError.as_str(), "NETWORK_ERROR");
    assert_eq!(
        serde_json::to_string(&ErrorCode::LockContention).unwrap(),
        "\"LOCK_CONTENTION\""
    );
}

#[test]
fn test_integrity_errors_read_as_security() {
    let err = CoreError::from(IntegrityError::TagMismatch);
    assert!(err.to_string().starts_with("Security violation"));
    assert_eq!(err.code(), ErrorCode::IntegrityFailure);
}

#[test]
fn test_retries_exhausted_embeds_last_error() {
    let err = CoreError::RetriesExhausted {
        attempts: 4,
        last: Box::new(CoreError::network("connection reset")),
    };
    let text = err.to_string();
    assert!(text.contains("4 attempts"));
    assert!(text.contains("connection reset"));
}
