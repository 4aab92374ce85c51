//! Coordination primitives.

pub mod lockmanager;

pub use lockmanager::{LockManager, LockOptions};
