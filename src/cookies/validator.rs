//! Cookie validation.
//!
//! Classifies a single [`CookieRecord`] as valid or invalid. Errors block
//! persistence; warnings are advisory and never affect validity. All checks
//! run on every cookie so that one record can collect several errors and
//! warnings at once.
//!
//! The individual checks are exposed as pure functions
//! ([`is_valid_domain`], [`find_suspicious_pattern`], [`serialized_size`])
//! operating on typed fields.

use crate::cookies::psl;
use crate::cookies::record::{
    CookieRecord, ExpirationDate, SameSitePolicy, HOST_PREFIX, SECURE_PREFIX,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Maximum serialized cookie size in bytes (RFC 6265 recommended minimum).
pub const MAX_COOKIE_SIZE: usize = 4096;

/// Maximum total length of a domain name.
const MAX_DOMAIN_LENGTH: usize = 255;

/// Maximum length of a single domain label.
const MAX_LABEL_LENGTH: usize = 63;

/// Value fragments that signal script injection. Matched case-insensitively.
const SUSPICIOUS_FRAGMENTS: &[&str] =
    &["<script", "javascript:", "data:", "vbscript:", "%3cscript"];

/// Name fragments suggesting a session or authentication token.
const SENSITIVE_NAME_FRAGMENTS: &[&str] = &["session", "auth", "token", "sid", "login", "jwt"];

/// Result of validating one cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: ValidationMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationMetadata {
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub size: usize,
    pub is_secure: bool,
}

/// Configurable cookie validator.
#[derive(Debug, Clone)]
pub struct CookieValidator {
    max_size: usize,
}

impl Default for CookieValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieValidator {
    pub fn new() -> Self {
        Self {
            max_size: MAX_COOKIE_SIZE,
        }
    }

    /// Use a different size ceiling for the size warning.
    pub fn with_max_size(max_size: usize) -> Self {
        Self { max_size }
    }

    /// Validate against the current wall clock.
    pub fn validate(&self, cookie: &CookieRecord) -> ValidationOutcome {
        self.validate_at(cookie, OffsetDateTime::now_utc())
    }

    /// Validate with an explicit clock.
    pub fn validate_at(&self, cookie: &CookieRecord, now: OffsetDateTime) -> ValidationOutcome {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let host_prefixed = cookie.has_host_prefix();

        // 1. Required fields
        if cookie.name.is_none() {
            errors.push("Missing required field: name".to_string());
        }
        if cookie.value.is_none() {
            errors.push("Missing required field: value".to_string());
        }
        if cookie.path.is_none() {
            errors.push("Missing required field: path".to_string());
        }
        if cookie.domain.is_none() && !host_prefixed {
            errors.push(
                "Missing domain: required unless the name carries the __Host- prefix".to_string(),
            );
        }

        // 2. Domain format
        if let Some(domain) = cookie.domain.as_deref() {
            let bare = domain.strip_prefix('.').unwrap_or(domain);
            if !is_valid_domain(bare) {
                errors.push(format!("Invalid domain format: {}", domain));
            } else if psl::is_public_suffix(bare) {
                warnings.push(format!("Domain {} is a public suffix", bare));
            }
        }

        // 3. Empty value
        if cookie.value.as_deref() == Some("") {
            warnings.push("Cookie value is empty".to_string());
        }

        // 4. Suspicious content
        if let Some(pattern) = cookie.value.as_deref().and_then(find_suspicious_pattern) {
            errors.push(format!(
                "Security violation: suspicious content in cookie value ({})",
                pattern
            ));
        }

        // 5. Size
        let size = serialized_size(cookie);
        if size > self.max_size {
            warnings.push(format!(
                "Cookie size {} bytes exceeds {} byte limit",
                size, self.max_size
            ));
        }

        // 6. Special prefixes
        if host_prefixed {
            if !cookie.secure {
                errors.push(format!("{} prefix requires the secure flag", HOST_PREFIX));
            }
            if cookie.path.as_deref() != Some("/") {
                errors.push(format!("{} prefix requires path \"/\"", HOST_PREFIX));
            }
            if cookie.domain.is_some() && !cookie.host_only {
                warnings.push(format!("{} prefix cookies must not specify a domain", HOST_PREFIX));
            }
        } else if cookie.has_secure_prefix() && !cookie.secure {
            errors.push(format!("{} prefix requires the secure flag", SECURE_PREFIX));
        }

        // 7. Expiration
        if cookie.is_expired(now.unix_timestamp() as f64) {
            warnings.push("Cookie has expired".to_string());
        } else if cookie
            .expiration_date
            .as_ref()
            .is_some_and(|e| e.as_seconds().is_none())
        {
            errors.push("Expiration date must be a number".to_string());
        }

        // 8. SameSite
        match &cookie.same_site {
            Some(SameSitePolicy::Unrecognized(raw)) => {
                errors.push(format!("Invalid sameSite value: {}", raw));
            }
            Some(SameSitePolicy::NoRestriction) => {
                warnings.push(
                    "SameSite=None is permissive; consider \"lax\" or \"strict\"".to_string(),
                );
            }
            None | Some(SameSitePolicy::Unspecified) => {
                warnings.push("SameSite not set; consider \"lax\" or \"strict\"".to_string());
            }
            Some(SameSitePolicy::Lax) | Some(SameSitePolicy::Strict) => {}
        }

        // 9. Security flags on token-like names
        if is_sensitive_name(cookie.name_str()) {
            if !cookie.secure {
                warnings.push(format!(
                    "Session cookie {} should have secure flag",
                    cookie.name_str()
                ));
            }
            if !cookie.http_only {
                warnings.push(format!(
                    "Session cookie {} should have httpOnly flag",
                    cookie.name_str()
                ));
            }
        }

        ValidationOutcome {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            metadata: ValidationMetadata {
                created_at: now,
                size,
                is_secure: cookie.secure,
            },
        }
    }
}

/// Validate a cookie with the default validator.
pub fn validate(cookie: &CookieRecord) -> ValidationOutcome {
    CookieValidator::new().validate(cookie)
}

/// Conservative hostname grammar.
///
/// Labels are 1–63 characters of `[A-Za-z0-9-]`, start and end with an
/// alphanumeric character; at least two labels; top label of 2+ characters;
/// total length at most 255.
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LENGTH {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let top = labels[labels.len() - 1];
    if top.len() < 2 {
        return false;
    }

    labels.iter().all(|label| is_valid_label(label))
}

fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_LABEL_LENGTH {
        return false;
    }
    let first = bytes[0];
    let last = bytes[bytes.len() - 1];
    first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}

/// Return the first injection-signaling pattern found in `value`, if any.
pub fn find_suspicious_pattern(value: &str) -> Option<&'static str> {
    let lower = value.to_ascii_lowercase();

    if let Some(fragment) = SUSPICIOUS_FRAGMENTS.iter().find(|f| lower.contains(*f)) {
        return Some(fragment);
    }

    if contains_event_handler(&lower) {
        return Some("on*= event handler");
    }

    None
}

/// Matches `on<letters>\s*=`, e.g. `onload=` or `onerror =`.
fn contains_event_handler(lower: &str) -> bool {
    let bytes = lower.as_bytes();
    let mut i = 0;
    while i + 2 < bytes.len() {
        if bytes[i] == b'o' && bytes[i + 1] == b'n' {
            let mut j = i + 2;
            while j < bytes.len() && bytes[j].is_ascii_alphanumeric() {
                j += 1;
            }
            if j > i + 2 {
                while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                if j < bytes.len() && bytes[j] == b'=' {
                    return true;
                }
            }
        }
        i += 1;
    }
    false
}

/// Size of the cookie as a `Set-Cookie` line built from its typed fields.
pub fn serialized_size(cookie: &CookieRecord) -> usize {
    let mut builder =
        cookie::Cookie::build((cookie.name_str().to_string(), cookie.value_str().to_string()))
            .path(cookie.path_str().to_string())
            .secure(cookie.secure)
            .http_only(cookie.http_only);

    if let Some(domain) = cookie.domain.clone().filter(|_| !cookie.host_only) {
        builder = builder.domain(domain);
    }

    builder = match cookie.same_site {
        Some(SameSitePolicy::Strict) => builder.same_site(cookie::SameSite::Strict),
        Some(SameSitePolicy::Lax) => builder.same_site(cookie::SameSite::Lax),
        Some(SameSitePolicy::NoRestriction) => builder.same_site(cookie::SameSite::None),
        _ => builder,
    };

    if let Some(secs) = cookie.expiration_date.as_ref().and_then(ExpirationDate::as_seconds) {
        if let Ok(expires) = OffsetDateTime::from_unix_timestamp(secs as i64) {
            builder = builder.expires(expires);
        }
    }

    builder.build().to_string().len()
}

fn is_sensitive_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_NAME_FRAGMENTS.iter().any(|f| lower.contains(f))
}
