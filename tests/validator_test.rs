use cookievault::cookies::record::{CookieRecord, SameSitePolicy};
use cookievault::cookies::validator::{is_valid_domain, validate, CookieValidator};
use time::macros::datetime;

#[test]
fn test_missing_fields_reported_together() {
    let outcome = validate(&CookieRecord::default());
    assert!(!outcome.is_valid);
    assert!(outcome.errors.contains(&"Missing required field: name".to_string()));
    assert!(outcome.errors.contains(&"Missing required field: value".to_string()));
    assert!(outcome.errors.contains(&"Missing required field: path".to_string()));
    assert!(outcome.errors.iter().any(|e| e.starts_with("Missing domain")));
}

#[test]
fn test_host_prefix_without_domain_is_valid() {
    let cookie = CookieRecord::new("__Host-auth", "xyz", None, "/").with_secure(true);
    let outcome = validate(&cookie);
    assert!(outcome.is_valid, "{:?}", outcome.errors);
    assert!(!outcome.warnings.iter().any(|w| w.contains("must not specify a domain")));
}

#[test]
fn test_host_prefix_with_domain_warns() {
    let cookie =
        CookieRecord::new("__Host-auth", "xyz", Some("example.com"), "/").with_secure(true);
    let outcome = validate(&cookie);
    assert!(outcome.is_valid);
    assert!(outcome
        .warnings
        .contains(&"__Host- prefix cookies must not specify a domain".to_string()));
}

#[test]
fn test_host_bound_cookie_domain_is_not_an_attribute() {
    let mut cookie =
        CookieRecord::new("__Host-auth", "xyz", Some("example.com"), "/").with_secure(true);
    cookie.host_only = true;
    let outcome = validate(&cookie);
    assert!(outcome.is_valid);
    assert!(!outcome.warnings.iter().any(|w| w.contains("must not specify a domain")));
}

#[test]
fn test_host_prefix_requirements() {
    let cookie = CookieRecord::new("__Host-auth", "xyz", None, "/app");
    let outcome = validate(&cookie);
    assert!(!outcome.is_valid);
    assert!(outcome
        .errors
        .contains(&"__Host- prefix requires the secure flag".to_string()));
    assert!(outcome
        .errors
        .contains(&"__Host- prefix requires path \"/\"".to_string()));

    let secure = CookieRecord::new("__Secure-id", "1", Some("example.com"), "/");
    assert!(!validate(&secure).is_valid);
    assert!(validate(&secure.with_secure(true)).is_valid);
}

#[test]
fn test_domain_grammar() {
    let cases = [
        ("example.com", true),
        ("sub.example.com", true),
        ("a-b.example.com", true),
        ("example.co.uk", true),
        ("a.b.example.co.uk", true),
        ("xn--bcher-kva.example", true),
        ("my-site.io", true),
        ("localhost", false),
        ("example.c", false),
        ("-bad.com", false),
        ("bad-.com", false),
        ("under_score.com", false),
        ("example!.com", false),
        ("double..dot.com", false),
        ("", false),
    ];
    for (domain, expected) in cases {
        assert_eq!(is_valid_domain(domain), expected, "domain {:?}", domain);
    }

    let long_label = format!("{}.com", "a".repeat(64));
    assert!(!is_valid_domain(&long_label));

    let max_label = format!("{}.com", "a".repeat(63));
    assert!(is_valid_domain(&max_label));
}

#[test]
fn test_domain_total_length_bound() {
    let label = "a".repeat(63);
    let at_limit = format!("{0}.{0}.{0}.{1}.com", label, "b".repeat(59));
    assert_eq!(at_limit.len(), 255);
    assert!(is_valid_domain(&at_limit));

    let over_limit = format!("{0}.{0}.{0}.{1}.com", label, "b".repeat(60));
    assert_eq!(over_limit.len(), 256);
    assert!(!is_valid_domain(&over_limit));

    let cookie = CookieRecord::new("pref", "1", Some(over_limit.as_str()), "/");
    let outcome = validate(&cookie);
    assert!(!outcome.is_valid);
    assert!(outcome.errors.iter().any(|e| e.starts_with("Invalid domain format")));
}

#[test]
fn test_leading_dot_domain_accepted() {
    let cookie = CookieRecord::new("pref", "1", Some(".example.com"), "/")
        .with_same_site(SameSitePolicy::Lax);
    assert!(validate(&cookie).is_valid);
}

#[test]
fn test_suspicious_values_rejected() {
    for value in [
        "<script>alert(1)</script>",
        "JavaScript:void(0)",
        "data:text/html;base64,AAAA",
        "vbscript:msgbox",
        "x onload=steal()",
        "%3Cscript%3E",
    ] {
        let cookie = CookieRecord::new("pref", value, Some("example.com"), "/");
        let outcome = validate(&cookie);
        assert!(!outcome.is_valid, "value {:?}", value);
        assert!(outcome.errors.iter().any(|e| e.starts_with("Security violation")));
    }

    let benign = CookieRecord::new("pref", "lemonade", Some("example.com"), "/");
    assert!(validate(&benign).is_valid);
}

#[test]
fn test_warnings_never_invalidate() {
    let cookie = CookieRecord::new("session_id", "", Some("example.com"), "/")
        .with_same_site(SameSitePolicy::NoRestriction)
        .with_expiration(1.0);
    let outcome = validate(&cookie);

    assert!(outcome.is_valid);
    assert!(outcome.warnings.contains(&"Cookie value is empty".to_string()));
    assert!(outcome.warnings.contains(&"Cookie has expired".to_string()));
    assert!(outcome.warnings.iter().any(|w| w.starts_with("SameSite=None")));
    assert!(outcome.warnings.iter().any(|w| w.ends_with("should have secure flag")));
    assert!(outcome.warnings.iter().any(|w| w.ends_with("should have httpOnly flag")));
}

#[test]
fn test_expiration_and_same_site_errors() {
    let cookie: CookieRecord = serde_json::from_str(
        r#"{
            "name": "a",
            "value": "b",
            "domain": "example.com",
            "path": "/",
            "expirationDate": "soon",
            "sameSite": "sometimes"
        }"#,
    )
    .unwrap();
    let outcome = validate(&cookie);
    assert!(outcome.errors.contains(&"Expiration date must be a number".to_string()));
    assert!(outcome.errors.contains(&"Invalid sameSite value: sometimes".to_string()));
}

#[test]
fn test_oversized_cookie_warns() {
    let cookie = CookieRecord::new("big", "x".repeat(5000), Some("example.com"), "/");
    let outcome = validate(&cookie);
    assert!(outcome.is_valid);
    assert!(outcome.metadata.size > 4096);
    assert!(outcome.warnings.iter().any(|w| w.contains("exceeds 4096 byte limit")));

    let strict = CookieValidator::with_max_size(16);
    let small = CookieRecord::new("pref", "a-fairly-long-value", Some("example.com"), "/");
    assert!(strict
        .validate(&small)
        .warnings
        .iter()
        .any(|w| w.contains("exceeds 16 byte limit")));
}

#[test]
fn test_validate_at_uses_given_clock() {
    let cookie = CookieRecord::new("pref", "1", Some("example.com"), "/")
        .with_same_site(SameSitePolicy::Strict)
        .with_expiration(1_700_000_000.0);
    let validator = CookieValidator::new();

    let before = validator.validate_at(&cookie, datetime!(2023-01-01 0:00 UTC));
    assert!(before.warnings.is_empty());
    assert_eq!(before.metadata.created_at, datetime!(2023-01-01 0:00 UTC));

    let after = validator.validate_at(&cookie, datetime!(2024-01-01 0:00 UTC));
    assert_eq!(after.warnings, vec!["Cookie has expired".to_string()]);
}
