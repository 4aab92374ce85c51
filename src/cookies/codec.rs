//! Integrity codec for cookie collections.
//!
//! Seals a list of cookies into an [`IntegrityEnvelope`] and opens it again.
//!
//! ## Envelope format (version `1.0`)
//! - **Cipher**: AES-256-CBC with PKCS7 padding, fresh random IV per seal
//! - **Tag**: HMAC-SHA256 over `iv || ciphertext`
//! - **Key**: PBKDF2-HMAC-SHA256 over 32 bytes of random entropy, split into
//!   a 32-byte encryption key and a 32-byte MAC key
//! - **Plaintext**: JSON `{version, timestamp, cookies}`
//!
//! `open` checks the tag in constant time before touching the ciphertext.
//! Version and freshness are asserted from the authenticated plaintext, and
//! must agree with the envelope's outer fields.

use crate::base::coreerror::{CoreError, IntegrityError};
use crate::cookies::record::CookieRecord;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use time::OffsetDateTime;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Envelope format version, compared for exact equality.
pub const ENVELOPE_VERSION: &str = "1.0";

/// Envelopes older than this are refused (24 hours).
pub const MAX_ENVELOPE_AGE_MS: i64 = 24 * 60 * 60 * 1000;

/// PBKDF2 iterations used when generating install keys.
pub const DEFAULT_KEY_ITERATIONS: usize = 100_000;

const IV_LEN: usize = 16;
const SALT_LEN: usize = 16;
const ENTROPY_LEN: usize = 32;
const KEY_LEN: usize = 32;

/// Derived key material for sealing and opening envelopes.
pub struct IntegrityKey {
    salt: [u8; SALT_LEN],
    enc_key: Zeroizing<[u8; KEY_LEN]>,
    mac_key: Zeroizing<[u8; KEY_LEN]>,
}

impl fmt::Debug for IntegrityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrityKey")
            .field("salt", &STANDARD.encode(self.salt))
            .finish_non_exhaustive()
    }
}

impl IntegrityKey {
    /// Generate a new key by stretching fresh random entropy.
    pub fn generate(iterations: usize) -> Result<Self, CoreError> {
        use boring::hash::MessageDigest;
        use boring::pkcs5::pbkdf2_hmac;

        let mut entropy = Zeroizing::new([0u8; ENTROPY_LEN]);
        boring::rand::rand_bytes(&mut entropy[..])?;

        let mut salt = [0u8; SALT_LEN];
        boring::rand::rand_bytes(&mut salt)?;

        let mut material = Zeroizing::new([0u8; KEY_LEN * 2]);
        pbkdf2_hmac(
            &entropy[..],
            &salt,
            iterations.max(1),
            MessageDigest::sha256(),
            &mut material[..],
        )?;

        Self::from_parts(salt, &material[..])
    }

    /// Rebuild a key from its salt and 64 bytes of derived material.
    pub fn from_parts(salt: [u8; SALT_LEN], material: &[u8]) -> Result<Self, CoreError> {
        if material.len() != KEY_LEN * 2 {
            return Err(CoreError::crypto(format!(
                "key material must be {} bytes, got {}",
                KEY_LEN * 2,
                material.len()
            )));
        }

        let mut enc_key = Zeroizing::new([0u8; KEY_LEN]);
        let mut mac_key = Zeroizing::new([0u8; KEY_LEN]);
        enc_key.copy_from_slice(&material[..KEY_LEN]);
        mac_key.copy_from_slice(&material[KEY_LEN..]);

        Ok(Self {
            salt,
            enc_key,
            mac_key,
        })
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// Concatenated encryption and MAC keys, for persistence.
    pub(crate) fn material(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(KEY_LEN * 2));
        out.extend_from_slice(&self.enc_key[..]);
        out.extend_from_slice(&self.mac_key[..]);
        out
    }

    fn mac(&self) -> Result<HmacSha256, CoreError> {
        <HmacSha256 as Mac>::new_from_slice(&self.mac_key[..]).map_err(CoreError::crypto)
    }
}

/// Sealed cookie collection. Wire shape `{data, iv, hash, salt, timestamp, version}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityEnvelope {
    /// Base64 ciphertext.
    pub data: String,
    /// Base64 initialization vector.
    pub iv: String,
    /// Base64 HMAC-SHA256 tag.
    pub hash: String,
    /// Base64 key-derivation salt.
    pub salt: String,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
    pub version: String,
}

#[derive(Serialize, Deserialize)]
struct SealedPayload {
    version: String,
    timestamp: i64,
    cookies: Vec<CookieRecord>,
}

fn unix_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, IntegrityError> {
    STANDARD.decode(value).map_err(|e| IntegrityError::Malformed {
        reason: format!("{} is not valid base64: {}", name, e),
    })
}

/// Seal `cookies` with `key`, stamped with the current time.
pub fn seal(cookies: &[CookieRecord], key: &IntegrityKey) -> Result<IntegrityEnvelope, CoreError> {
    seal_at(cookies, key, OffsetDateTime::now_utc())
}

/// Seal `cookies` with an explicit creation time.
pub fn seal_at(
    cookies: &[CookieRecord],
    key: &IntegrityKey,
    now: OffsetDateTime,
) -> Result<IntegrityEnvelope, CoreError> {
    use boring::symm::{encrypt, Cipher};

    let timestamp = unix_millis(now);
    let payload = SealedPayload {
        version: ENVELOPE_VERSION.to_string(),
        timestamp,
        cookies: cookies.to_vec(),
    };
    let plaintext = Zeroizing::new(serde_json::to_vec(&payload)?);

    let mut iv = [0u8; IV_LEN];
    boring::rand::rand_bytes(&mut iv)?;

    let ciphertext = encrypt(Cipher::aes_256_cbc(), &key.enc_key[..], Some(&iv), &plaintext)?;

    let mut mac = key.mac()?;
    mac.update(&iv);
    mac.update(&ciphertext);
    let tag = mac.finalize().into_bytes();

    Ok(IntegrityEnvelope {
        data: STANDARD.encode(&ciphertext),
        iv: STANDARD.encode(iv),
        hash: STANDARD.encode(tag),
        salt: STANDARD.encode(key.salt),
        timestamp,
        version: ENVELOPE_VERSION.to_string(),
    })
}

/// Verify and decrypt an envelope against the current time.
pub fn open(
    envelope: &IntegrityEnvelope,
    key: &IntegrityKey,
) -> Result<Vec<CookieRecord>, CoreError> {
    open_at(envelope, key, OffsetDateTime::now_utc(), MAX_ENVELOPE_AGE_MS)
}

/// Verify and decrypt an envelope with an explicit clock and freshness window.
pub fn open_at(
    envelope: &IntegrityEnvelope,
    key: &IntegrityKey,
    now: OffsetDateTime,
    max_age_ms: i64,
) -> Result<Vec<CookieRecord>, CoreError> {
    use boring::symm::{decrypt, Cipher};

    if envelope.version != ENVELOPE_VERSION {
        return Err(IntegrityError::UnsupportedVersion {
            found: envelope.version.clone(),
        }
        .into());
    }

    let salt = decode_field("salt", &envelope.salt)?;
    if salt.as_slice() != key.salt.as_slice() {
        return Err(IntegrityError::KeyMismatch.into());
    }

    let iv = decode_field("iv", &envelope.iv)?;
    if iv.len() != IV_LEN {
        return Err(IntegrityError::Malformed {
            reason: format!("iv must be {} bytes, got {}", IV_LEN, iv.len()),
        }
        .into());
    }
    let ciphertext = decode_field("data", &envelope.data)?;
    let tag = decode_field("hash", &envelope.hash)?;

    let mut mac = key.mac()?;
    mac.update(&iv);
    mac.update(&ciphertext);
    mac.verify_slice(&tag).map_err(|_| IntegrityError::TagMismatch)?;

    let plaintext = Zeroizing::new(decrypt(
        Cipher::aes_256_cbc(),
        &key.enc_key[..],
        Some(&iv),
        &ciphertext,
    )?);
    let payload: SealedPayload = serde_json::from_slice(&plaintext)
        .map_err(|e| CoreError::parse("sealed cookie payload", e))?;

    if payload.version != ENVELOPE_VERSION {
        return Err(IntegrityError::UnsupportedVersion {
            found: payload.version,
        }
        .into());
    }
    if payload.timestamp != envelope.timestamp {
        return Err(IntegrityError::Malformed {
            reason: "envelope timestamp does not match sealed timestamp".to_string(),
        }
        .into());
    }

    let age_ms = unix_millis(now) - payload.timestamp;
    if age_ms > max_age_ms {
        return Err(IntegrityError::Stale { age_ms }.into());
    }

    Ok(payload.cookies)
}

/// Seals and opens envelopes with one install key.
#[derive(Debug)]
pub struct IntegrityCodec {
    key: IntegrityKey,
    max_age_ms: i64,
}

impl IntegrityCodec {
    pub fn new(key: IntegrityKey) -> Self {
        Self {
            key,
            max_age_ms: MAX_ENVELOPE_AGE_MS,
        }
    }

    /// Override the freshness window.
    pub fn with_max_age_ms(mut self, max_age_ms: i64) -> Self {
        self.max_age_ms = max_age_ms;
        self
    }

    pub fn key(&self) -> &IntegrityKey {
        &self.key
    }

    pub fn seal(&self, cookies: &[CookieRecord]) -> Result<IntegrityEnvelope, CoreError> {
        seal(cookies, &self.key)
    }

    pub fn open(&self, envelope: &IntegrityEnvelope) -> Result<Vec<CookieRecord>, CoreError> {
        open_at(envelope, &self.key, OffsetDateTime::now_utc(), self.max_age_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> IntegrityKey {
        IntegrityKey::generate(1).unwrap()
    }

    #[test]
    fn test_generated_keys_differ() {
        let a = test_key();
        let b = test_key();
        assert_ne!(a.salt(), b.salt());
        assert_ne!(&a.material()[..], &b.material()[..]);
    }

    #[test]
    fn test_fresh_iv_per_seal() {
        let key = test_key();
        let cookies = vec![CookieRecord::new("a", "b", Some("example.com"), "/")];
        let first = seal(&cookies, &key).unwrap();
        let second = seal(&cookies, &key).unwrap();
        assert_ne!(first.iv, second.iv);
        assert_ne!(first.data, second.data);
    }

    #[test]
    fn test_from_parts_rejects_short_material() {
        assert!(IntegrityKey::from_parts([0u8; SALT_LEN], &[0u8; 10]).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = test_key();
        let rendered = format!("{:?}", key);
        assert!(rendered.contains("salt"));
        assert!(!rendered.contains("enc_key"));
    }

    #[test]
    fn test_outer_timestamp_tamper_is_rejected() {
        let key = test_key();
        let cookies = [CookieRecord::new("a", "b", Some("example.com"), "/")];
        let mut envelope = seal(&cookies, &key).unwrap();
        envelope.timestamp += 1;
        let err = open(&envelope, &key).unwrap_err();
        assert!(matches!(err, CoreError::Integrity(IntegrityError::Malformed { .. })));
    }

    #[test]
    fn test_wrong_key_is_key_mismatch() {
        let cookies = [CookieRecord::new("a", "b", Some("example.com"), "/")];
        let envelope = seal(&cookies, &test_key()).unwrap();
        let err = open(&envelope, &test_key()).unwrap_err();
        assert!(matches!(err, CoreError::Integrity(IntegrityError::KeyMismatch)));
    }
}
