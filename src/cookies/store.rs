//! Boundary to the browser cookie store.
//!
//! [`CookieStore`] is the contract the orchestrator persists through. Every
//! call is asynchronous and may fail with a [`PlatformError`] carrying the
//! platform's last-error text. [`MemoryCookieStore`] is an in-process
//! implementation with the browser's per-domain limit and oldest-first
//! eviction.

use crate::base::coreerror::PlatformError;
use crate::cookies::psl;
use crate::cookies::record::CookieRecord;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Maximum cookies per registrable domain (Chromium default).
const MAX_COOKIES_PER_DOMAIN: usize = 180;

/// Asynchronous cookie store.
#[async_trait]
pub trait CookieStore: Send + Sync {
    /// Every cookie in the store.
    async fn get_all(&self) -> Result<Vec<CookieRecord>, PlatformError>;

    /// Cookies whose domain equals or is a subdomain of `domain`.
    async fn get_all_for_domain(&self, domain: &str) -> Result<Vec<CookieRecord>, PlatformError>;

    /// Insert or replace a cookie, keyed by (domain, name, path).
    async fn set(&self, cookie: CookieRecord) -> Result<(), PlatformError>;

    /// Remove a cookie. Removing an absent cookie is not an error.
    async fn remove(&self, cookie: &CookieRecord) -> Result<(), PlatformError>;
}

#[derive(Debug, Clone)]
struct StoredCookie {
    cookie: CookieRecord,
    seq: u64,
}

/// In-memory cookie store.
///
/// Cookies are bucketed by registrable domain; `__Host-` cookies stored
/// without a domain land in the empty bucket.
#[derive(Clone, Default)]
pub struct MemoryCookieStore {
    store: Arc<DashMap<String, Vec<StoredCookie>>>,
    next_seq: Arc<AtomicU64>,
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket_for(domain: &str) -> String {
        psl::registrable_domain(domain).unwrap_or_else(|| domain.to_string())
    }

    /// Total number of stored cookies.
    pub fn total_cookie_count(&self) -> usize {
        self.store.iter().map(|e| e.value().len()).sum()
    }

    /// Drop every cookie.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Synchronous lookup by identity, for tests and diagnostics.
    pub fn find(&self, domain: &str, name: &str, path: &str) -> Option<CookieRecord> {
        let bucket = self.store.get(&Self::bucket_for(domain))?;
        bucket
            .iter()
            .map(|s| &s.cookie)
            .find(|c| c.identity() == (domain.to_string(), name.to_string(), path.to_string()))
            .cloned()
    }
}

#[async_trait]
impl CookieStore for MemoryCookieStore {
    async fn get_all(&self) -> Result<Vec<CookieRecord>, PlatformError> {
        Ok(self
            .store
            .iter()
            .flat_map(|entry| entry.value().iter().map(|s| s.cookie.clone()).collect::<Vec<_>>())
            .collect())
    }

    async fn get_all_for_domain(&self, domain: &str) -> Result<Vec<CookieRecord>, PlatformError> {
        let Some(bucket) = self.store.get(&Self::bucket_for(domain)) else {
            return Ok(Vec::new());
        };

        Ok(bucket
            .iter()
            .filter(|s| {
                s.cookie
                    .normalized_domain()
                    .is_some_and(|d| psl::domain_matches(&d, domain))
            })
            .map(|s| s.cookie.clone())
            .collect())
    }

    async fn set(&self, cookie: CookieRecord) -> Result<(), PlatformError> {
        if cookie.name.is_none() {
            return Err(PlatformError::new("Invalid cookie: name is required"));
        }

        let identity = cookie.identity();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut entry = self.store.entry(Self::bucket_for(&identity.0)).or_default();

        // Replace existing cookie with the same identity
        entry.retain(|s| s.cookie.identity() != identity);

        // Evict oldest while at the per-domain limit
        while entry.len() >= MAX_COOKIES_PER_DOMAIN {
            if let Some(oldest_idx) = entry
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.seq)
                .map(|(i, _)| i)
            {
                entry.remove(oldest_idx);
            } else {
                break;
            }
        }

        entry.push(StoredCookie { cookie, seq });
        Ok(())
    }

    async fn remove(&self, cookie: &CookieRecord) -> Result<(), PlatformError> {
        let identity = cookie.identity();
        if let Some(mut entry) = self.store.get_mut(&Self::bucket_for(&identity.0)) {
            entry.retain(|s| s.cookie.identity() != identity);
        }
        Ok(())
    }
}
