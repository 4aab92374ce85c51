//! # cookievault
//!
//! Validation, integrity protection and retry orchestration for exporting and
//! re-importing browser session cookies.
//!
//! `cookievault` sits between a UI layer and the browser's cookie store. It
//! checks every cookie before it is written, seals exported cookies into
//! authenticated and timestamped envelopes, retries transient store failures
//! with exponential backoff, and serializes conflicting operations through
//! named locks.
//!
//! ## Features
//!
//! - **Validation**: required fields, hostname grammar, script-injection patterns, cookie prefixes, SameSite and expiry checks
//! - **Integrity**: AES-256-CBC + HMAC-SHA256 envelopes with a 24 hour freshness window
//! - **Retry**: 1s/2s/4s backoff for network, timeout and temporary failures
//! - **Suppression**: repeated, already-reported validation noise is hidden while the session is known good
//! - **Locks**: at most one in-flight operation per key, with forced release on timeout
//! - **Batching**: chunked imports with per-item reports
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cookievault::batch::CookieVault;
//! use cookievault::cookies::record::CookieRecord;
//! use cookievault::cookies::store::MemoryCookieStore;
//!
//! # async fn run() -> Result<(), cookievault::base::coreerror::CoreError> {
//! let vault = CookieVault::builder(Arc::new(MemoryCookieStore::new())).build()?;
//!
//! let report = vault
//!     .import_cookies(vec![CookieRecord::new("sid", "abc", Some("example.com"), "/")])
//!     .await?;
//! assert_eq!(report.succeeded, 1);
//!
//! let export = vault.export_domain("example.com").await?;
//! let restored = vault.codec().open(&export.envelope)?;
//! assert_eq!(restored.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error taxonomy and store error context
//! - [`cookies`] - Cookie records, validator, integrity codec, store boundary
//! - [`errors`] - Classification, retry policy and the error manager
//! - [`sync`] - Named locks
//! - [`cache`] - TTL cache
//! - [`batch`] - The [`CookieVault`](batch::CookieVault) orchestrator
//! - [`messaging`] - Request/response protocol and notifications
//! - [`config`] - Runtime configuration

pub mod base;
pub mod batch;
pub mod cache;
pub mod config;
pub mod cookies;
pub mod errors;
pub mod messaging;
pub mod sync;

pub use base::coreerror::{CoreError, ErrorCode};
pub use batch::CookieVault;
pub use config::CoreConfig;
