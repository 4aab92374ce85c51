use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Name prefix for host-only cookies (`__Host-`).
pub const HOST_PREFIX: &str = "__Host-";
/// Name prefix for secure cookies (`__Secure-`).
pub const SECURE_PREFIX: &str = "__Secure-";

/// A cookie as exchanged with the browser cookie store and the UI layer.
///
/// Wire shape: `{domain, name, value, path, secure, httpOnly, hostOnly, sameSite,
/// expirationDate}`. Required fields are optional here so that the validator can report them
/// as missing instead of failing deserialization. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    /// `domain` names the exact host the cookie is bound to rather than a
    /// `Domain` attribute.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub host_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSitePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<ExpirationDate>,
}

/// SameSite policy as reported by the cookie store.
///
/// `"none"` and `"no_restriction"` both denote [`SameSitePolicy::NoRestriction`].
/// Any other unknown string is kept as [`SameSitePolicy::Unrecognized`] so
/// the validator can reject it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SameSitePolicy {
    Strict,
    Lax,
    NoRestriction,
    Unspecified,
    Unrecognized(String),
}

impl SameSitePolicy {
    pub fn as_str(&self) -> &str {
        match self {
            SameSitePolicy::Strict => "strict",
            SameSitePolicy::Lax => "lax",
            SameSitePolicy::NoRestriction => "no_restriction",
            SameSitePolicy::Unspecified => "unspecified",
            SameSitePolicy::Unrecognized(s) => s,
        }
    }
}

impl From<String> for SameSitePolicy {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "strict" => SameSitePolicy::Strict,
            "lax" => SameSitePolicy::Lax,
            "none" | "no_restriction" => SameSitePolicy::NoRestriction,
            "unspecified" => SameSitePolicy::Unspecified,
            _ => SameSitePolicy::Unrecognized(raw),
        }
    }
}

impl Serialize for SameSitePolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SameSitePolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SameSitePolicy::from)
    }
}

/// Expiration as epoch seconds, or whatever non-numeric value was supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpirationDate {
    Seconds(f64),
    Invalid(serde_json::Value),
}

impl ExpirationDate {
    /// Finite epoch seconds, if this is a usable timestamp.
    pub fn as_seconds(&self) -> Option<f64> {
        match self {
            ExpirationDate::Seconds(s) if s.is_finite() => Some(*s),
            _ => None,
        }
    }
}

impl CookieRecord {
    /// Build a record with the required fields set and everything else defaulted.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: Option<&str>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.map(str::to_string),
            name: Some(name.into()),
            value: Some(value.into()),
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSitePolicy) -> Self {
        self.same_site = Some(same_site);
        self
    }

    pub fn with_expiration(mut self, seconds: f64) -> Self {
        self.expiration_date = Some(ExpirationDate::Seconds(seconds));
        self
    }

    pub fn name_str(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn value_str(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }

    pub fn path_str(&self) -> &str {
        self.path.as_deref().unwrap_or("/")
    }

    /// Domain without the leading dot of domain-cookie notation, lowercased.
    pub fn normalized_domain(&self) -> Option<String> {
        self.domain
            .as_deref()
            .map(|d| d.trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
    }

    pub fn has_host_prefix(&self) -> bool {
        self.name_str().starts_with(HOST_PREFIX)
    }

    pub fn has_secure_prefix(&self) -> bool {
        self.name_str().starts_with(SECURE_PREFIX)
    }

    /// Whether the cookie expired before `now_secs`. Session cookies never expire.
    pub fn is_expired(&self, now_secs: f64) -> bool {
        self.expiration_date
            .as_ref()
            .and_then(ExpirationDate::as_seconds)
            .is_some_and(|expiry| expiry < now_secs)
    }

    /// Identity used by cookie stores: (domain, name, path).
    pub fn identity(&self) -> (String, String, String) {
        (
            self.normalized_domain().unwrap_or_default(),
            self.name_str().to_string(),
            self.path_str().to_string(),
        )
    }

    /// Copy suitable for persisting.
    ///
    /// A `__Host-` cookie keeps its domain as the host it is bound to and is
    /// marked host-only, so same-named cookies of different hosts stay apart.
    pub fn for_store(&self) -> Self {
        let mut cookie = self.clone();
        if cookie.has_host_prefix() {
            cookie.domain = cookie.normalized_domain();
            cookie.host_only = true;
        }
        cookie
    }
}
