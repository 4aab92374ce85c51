//! In-memory caching.

pub mod ttlcache;

pub use ttlcache::{CacheConfig, TtlCache};
