//! Cookie records, validation, sealing and storage.
//!
//! This module provides the cookie-facing half of the crate:
//!
//! - **Records**: the wire-shaped [`CookieRecord`](record::CookieRecord)
//! - **Validation**: [`CookieValidator`](validator::CookieValidator) with separate error and warning channels
//! - **Sealing**: the [`codec`] turning cookie lists into authenticated, timestamped envelopes
//! - **Storage**: the [`CookieStore`](store::CookieStore) boundary and an in-memory implementation
//! - **Persistence**: install keys and sealed backups
//!
//! # Validate a cookie
//!
//! ```rust
//! use cookievault::cookies::record::CookieRecord;
//! use cookievault::cookies::validator::validate;
//!
//! let cookie = CookieRecord::new("__Host-auth", "xyz", None, "/").with_secure(true);
//! let outcome = validate(&cookie);
//! assert!(outcome.is_valid);
//! ```
//!
//! # Seal and open
//!
//! ```rust
//! use cookievault::cookies::codec::{self, IntegrityKey};
//! use cookievault::cookies::record::CookieRecord;
//!
//! let key = IntegrityKey::generate(1_000)?;
//! let cookies = vec![CookieRecord::new("sid", "abc", Some("example.com"), "/")];
//! let envelope = codec::seal(&cookies, &key)?;
//! assert_eq!(codec::open(&envelope, &key)?, cookies);
//! # Ok::<(), cookievault::base::coreerror::CoreError>(())
//! ```

pub mod codec;
pub mod persistence;
pub mod psl;
pub mod record;
pub mod store;
pub mod validator;
