//! Chunked bulk import and export.

pub mod orchestrator;

pub use orchestrator::{BatchReport, CookieVault, CookieVaultBuilder, ItemReport, ItemStatus};
