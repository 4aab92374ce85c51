//! Persistence for install keys and sealed backups.
//!
//! The integrity key is generated once per install and saved as JSON next
//! to the rest of the extension state. Backups are sealed envelopes kept in
//! a single slot behind the [`BackupStore`] trait.

use crate::base::coreerror::CoreError;
use crate::cookies::codec::{IntegrityEnvelope, IntegrityKey};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Serializable representation of an install key.
#[derive(Serialize, Deserialize)]
struct PersistentKey {
    salt: String,
    material: String,
    created_unix_secs: i64,
}

/// Save a key to `path`, replacing any existing file.
pub fn save_key(key: &IntegrityKey, path: &Path) -> Result<(), CoreError> {
    let persistent = PersistentKey {
        salt: STANDARD.encode(key.salt()),
        material: STANDARD.encode(&key.material()[..]),
        created_unix_secs: time::OffsetDateTime::now_utc().unix_timestamp(),
    };

    let json = serde_json::to_string_pretty(&persistent)?;
    fs::write(path, json).map_err(CoreError::storage)
}

/// Load a key previously written by [`save_key`].
pub fn load_key(path: &Path) -> Result<IntegrityKey, CoreError> {
    let json = fs::read_to_string(path).map_err(CoreError::storage)?;
    let persistent: PersistentKey = serde_json::from_str(&json)?;

    let salt_bytes = STANDARD
        .decode(&persistent.salt)
        .map_err(|e| CoreError::parse("key salt", e))?;
    let salt: [u8; 16] = salt_bytes
        .as_slice()
        .try_into()
        .map_err(|_| CoreError::parse("key salt", "expected 16 bytes"))?;
    let material = zeroize::Zeroizing::new(
        STANDARD
            .decode(&persistent.material)
            .map_err(|e| CoreError::parse("key material", e))?,
    );

    IntegrityKey::from_parts(salt, &material)
}

/// Load the install key at `path`, generating and saving one on first use.
pub fn load_or_create_key(path: &Path, iterations: usize) -> Result<IntegrityKey, CoreError> {
    if path.exists() {
        return load_key(path);
    }

    tracing::debug!(path = %path.display(), "generating install key");
    let key = IntegrityKey::generate(iterations)?;
    save_key(&key, path)?;
    Ok(key)
}

/// Single-slot storage for the most recent sealed backup.
#[async_trait]
pub trait BackupStore: Send + Sync {
    async fn save(&self, envelope: &IntegrityEnvelope) -> Result<(), CoreError>;

    /// The stored envelope, or `None` if no backup was ever taken.
    async fn load(&self) -> Result<Option<IntegrityEnvelope>, CoreError>;
}

/// Backup slot held in memory.
#[derive(Default)]
pub struct MemoryBackupStore {
    slot: Mutex<Option<IntegrityEnvelope>>,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackupStore for MemoryBackupStore {
    async fn save(&self, envelope: &IntegrityEnvelope) -> Result<(), CoreError> {
        *self.slot.lock().await = Some(envelope.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<IntegrityEnvelope>, CoreError> {
        Ok(self.slot.lock().await.clone())
    }
}

/// Backup slot stored as a JSON file.
pub struct FileBackupStore {
    path: PathBuf,
}

impl FileBackupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BackupStore for FileBackupStore {
    async fn save(&self, envelope: &IntegrityEnvelope) -> Result<(), CoreError> {
        let json = serde_json::to_vec_pretty(envelope)?;
        tokio::fs::write(&self.path, json).await.map_err(CoreError::storage)
    }

    async fn load(&self) -> Result<Option<IntegrityEnvelope>, CoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::storage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::codec;
    use crate::cookies::record::CookieRecord;
    use tempfile::tempdir;

    #[test]
    fn test_key_survives_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("install_key.json");

        let key = load_or_create_key(&path, 1).unwrap();
        let cookies = [CookieRecord::new("a", "b", Some("example.com"), "/")];
        let envelope = codec::seal(&cookies, &key).unwrap();

        // Second call must load, not regenerate
        let reloaded = load_or_create_key(&path, 1).unwrap();
        assert_eq!(reloaded.salt(), key.salt());

        let cookies = codec::open(&envelope, &reloaded).unwrap();
        assert_eq!(cookies[0].name.as_deref(), Some("a"));
    }

    #[test]
    fn test_load_key_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("install_key.json");
        fs::write(
            &path,
            r#"{"salt":"AA==","material":"AA==","created_unix_secs":0}"#,
        )
        .unwrap();
        assert!(load_key(&path).is_err());
    }

    #[tokio::test]
    async fn test_file_backup_store() {
        let dir = tempdir().unwrap();
        let store = FileBackupStore::new(dir.path().join("backup.json"));
        assert!(store.load().await.unwrap().is_none());

        let key = IntegrityKey::generate(1).unwrap();
        let envelope = codec::seal(&[], &key).unwrap();
        store.save(&envelope).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(envelope));
    }

    #[tokio::test]
    async fn test_memory_backup_store() {
        let store = MemoryBackupStore::new();
        assert!(store.load().await.unwrap().is_none());

        let key = IntegrityKey::generate(1).unwrap();
        let envelope = codec::seal(&[], &key).unwrap();
        store.save(&envelope).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(envelope));
    }
}
