//! Ergonomic error context helpers.
//!
//! Provides extension traits for adding context to cookie store results,
//! converting raw platform errors into normalized `CoreError` variants.

use crate::base::coreerror::{CoreError, PlatformError};

/// Extension trait for adding context to cookie store results.
pub trait StoreResultExt<T> {
    /// Normalize a platform error and log which store operation produced it.
    ///
    /// # Example
    /// ```ignore
    /// use cookievault::base::context::StoreResultExt;
    ///
    /// store.set(cookie).await.store_context("set_cookie", "example.com")?;
    /// ```
    fn store_context(self, operation: &str, target: &str) -> Result<T, CoreError>;
}

impl<T> StoreResultExt<T> for Result<T, PlatformError> {
    fn store_context(self, operation: &str, target: &str) -> Result<T, CoreError> {
        self.map_err(|e| {
            tracing::debug!(operation, target, error = %e, "cookie store call failed");
            CoreError::from(e)
        })
    }
}
