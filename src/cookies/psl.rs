//! Domain helpers backed by the Public Suffix List.
//!
//! Used by the validator to flag cookies scoped to a bare public suffix
//! (`co.uk`, `github.io`), and by stores to match cookies against a
//! requested domain.

use psl::{List, Psl};

/// Check if a domain is itself a public suffix (e.g., "com", "co.uk").
pub fn is_public_suffix(domain: &str) -> bool {
    let domain_lower = domain.trim_start_matches('.').to_lowercase();
    let domain_bytes = domain_lower.as_bytes();

    match List.suffix(domain_bytes) {
        Some(suffix) => suffix.as_bytes() == domain_bytes,
        None => false,
    }
}

/// Registrable domain (eTLD+1), used to group cookies for enumeration.
pub fn registrable_domain(domain: &str) -> Option<String> {
    let domain_lower = domain.trim_start_matches('.').to_lowercase();
    psl::domain(domain_lower.as_bytes())
        .and_then(|d| std::str::from_utf8(d.as_bytes()).ok())
        .map(|s| s.to_string())
}

/// Whether a cookie scoped to `cookie_domain` belongs to `requested`.
///
/// True when both are equal or the cookie domain is a subdomain of the
/// requested one. Leading dots and case are ignored.
pub fn domain_matches(cookie_domain: &str, requested: &str) -> bool {
    let cookie_domain = cookie_domain.trim_start_matches('.');
    let requested = requested.trim_start_matches('.');

    if cookie_domain.eq_ignore_ascii_case(requested) {
        return true;
    }

    if cookie_domain.len() > requested.len() {
        let split = cookie_domain.len() - requested.len();
        return cookie_domain.as_bytes()[split - 1] == b'.'
            && cookie_domain[split..].eq_ignore_ascii_case(requested);
    }

    false
}
