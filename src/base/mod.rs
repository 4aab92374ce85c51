//! Base types and error handling.
//!
//! Provides the foundational types shared by every component:
//! - [`CoreError`](coreerror::CoreError): the crate-wide error taxonomy
//! - [`ErrorCode`](coreerror::ErrorCode): stable codes used on the wire
//! - [`StoreResultExt`](context::StoreResultExt): context for cookie store results

pub mod context;
pub mod coreerror;

#[cfg(test)]
mod tests;
