//! Error classification, suppression and retry.
//!
//! - [`classify`]: severity and recoverability from an error
//! - [`retry`]: backoff policy
//! - [`manager`]: the [`ErrorManager`](manager::ErrorManager) combining both with the session-valid suppression state

pub mod classify;
pub mod manager;
pub mod retry;
