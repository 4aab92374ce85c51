//! Bulk import and export.
//!
//! [`CookieVault`] owns every stateful component and drives cookie lists
//! through them:
//!
//! ```text
//! import:  [envelope -> open] -> chunks of N -> validate -> retry(store.set)
//! export:  cache | retry(store.get) -> validate -> seal
//! ```
//!
//! Chunks run one after another; the items of a chunk run concurrently. An
//! item that fails validation or whose store write fails is recorded in the
//! report and the batch carries on. Only whole-operation failures (lock
//! contention or timeout, a rejected envelope, exhausted retries outside an
//! item, or a batch in which nothing succeeded) are returned as errors.
//!
//! ## Lock keys
//!
//! | Operation | Key | Reentrant |
//! |-----------|-----|-----------|
//! | import, sealed import, restore | `import_cookies` | no |
//! | export | `export_<domain>` | yes, per domain |
//! | clear | `clear_<domain>` | no |
//! | backup | `backup` | no |
//!
//! Concurrent exports of one domain share a single in-flight result.

use crate::base::context::StoreResultExt;
use crate::base::coreerror::CoreError;
use crate::cache::ttlcache::TtlCache;
use crate::config::CoreConfig;
use crate::cookies::codec::{IntegrityCodec, IntegrityEnvelope, IntegrityKey};
use crate::cookies::persistence::{load_or_create_key, BackupStore, MemoryBackupStore};
use crate::cookies::record::CookieRecord;
use crate::cookies::store::CookieStore;
use crate::cookies::validator::{is_valid_domain, CookieValidator};
use crate::errors::manager::{Disposition, ErrorContext, ErrorManager};
use crate::messaging::notify::{Notification, Notifier, ValidationFailure};
use crate::sync::lockmanager::{LockManager, LockOptions};
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

const IMPORT_LOCK: &str = "import_cookies";
const BACKUP_LOCK: &str = "backup";

/// Outcome of one cookie in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Validated and written to the store.
    Imported,
    /// Refused by the validator; never sent to the store.
    Rejected,
    /// Valid, but the store write failed.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReport {
    /// Position in the submitted list.
    pub index: usize,
    pub name: Option<String>,
    pub domain: Option<String>,
    pub status: ItemStatus,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ItemReport {
    fn labelled<'a>(&'a self, messages: &'a [String]) -> impl Iterator<Item = String> + 'a {
        let name = self.name.as_deref().unwrap_or("<unnamed>");
        messages.iter().map(move |m| format!("{}: {}", name, m))
    }
}

/// Aggregate result of an import.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items that carried at least one warning, whatever their status.
    pub warnings: usize,
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    fn from_items(items: Vec<ItemReport>) -> Self {
        let succeeded = items
            .iter()
            .filter(|i| i.status == ItemStatus::Imported)
            .count();
        Self {
            total: items.len(),
            succeeded,
            failed: items.len() - succeeded,
            warnings: items.iter().filter(|i| !i.warnings.is_empty()).count(),
            items,
        }
    }

    /// Warnings of every item, prefixed with the cookie name.
    pub fn all_warnings(&self) -> Vec<String> {
        self.items.iter().flat_map(|item| item.labelled(&item.warnings)).collect()
    }

    /// Errors of every item, prefixed with the cookie name.
    pub fn all_errors(&self) -> Vec<String> {
        self.items.iter().flat_map(|item| item.labelled(&item.errors)).collect()
    }
}

/// Result of sealing one domain's cookies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub domain: String,
    pub envelope: IntegrityEnvelope,
    pub exported: usize,
    /// Cookies left out because they failed validation.
    pub skipped: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    pub domain: String,
    pub removed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupReport {
    pub cookies: usize,
    /// Envelope timestamp, epoch milliseconds.
    pub timestamp: i64,
}

struct VaultInner {
    config: CoreConfig,
    store: Arc<dyn CookieStore>,
    validator: CookieValidator,
    codec: IntegrityCodec,
    errors: ErrorManager,
    locks: LockManager,
    cache: TtlCache<Vec<CookieRecord>>,
    backups: Arc<dyn BackupStore>,
    notifier: Notifier,
}

/// Cookie import/export service. Cloning shares all state.
#[derive(Clone)]
pub struct CookieVault {
    inner: Arc<VaultInner>,
}

impl std::fmt::Debug for CookieVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieVault")
            .field("config", &self.inner.config)
            .field("locks", &self.inner.locks)
            .finish_non_exhaustive()
    }
}

/// Builder for [`CookieVault`].
pub struct CookieVaultBuilder {
    store: Arc<dyn CookieStore>,
    config: CoreConfig,
    key: Option<IntegrityKey>,
    key_path: Option<PathBuf>,
    backups: Option<Arc<dyn BackupStore>>,
    notifier: Option<Notifier>,
}

impl CookieVaultBuilder {
    pub fn config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing install key.
    pub fn key(mut self, key: IntegrityKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Load the install key from `path`, creating it on first use.
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn backups(mut self, backups: Arc<dyn BackupStore>) -> Self {
        self.backups = Some(backups);
        self
    }

    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Result<CookieVault, CoreError> {
        let config = self.config;
        config.validate()?;

        let key = match (self.key, self.key_path) {
            (Some(key), _) => key,
            (None, Some(path)) => load_or_create_key(&path, config.key_iterations)?,
            (None, None) => IntegrityKey::generate(config.key_iterations)?,
        };

        let notifier = self.notifier.unwrap_or_default();
        let errors = ErrorManager::new(config.retry.clone())
            .with_max_log(config.max_error_log)
            .with_notifier(notifier.clone());

        Ok(CookieVault {
            inner: Arc::new(VaultInner {
                store: self.store,
                validator: CookieValidator::with_max_size(config.max_cookie_size),
                codec: IntegrityCodec::new(key).with_max_age_ms(config.envelope_max_age_ms),
                errors,
                locks: LockManager::new(),
                cache: TtlCache::new(config.cache.clone()),
                backups: self
                    .backups
                    .unwrap_or_else(|| Arc::new(MemoryBackupStore::new()) as Arc<dyn BackupStore>),
                notifier,
                config,
            }),
        })
    }
}

fn cookie_label(cookie: &CookieRecord) -> String {
    match cookie.normalized_domain() {
        Some(domain) => format!("{}@{}", cookie.name_str(), domain),
        None => cookie.name_str().to_string(),
    }
}

impl CookieVault {
    pub fn builder(store: Arc<dyn CookieStore>) -> CookieVaultBuilder {
        CookieVaultBuilder {
            store,
            config: CoreConfig::default(),
            key: None,
            key_path: None,
            backups: None,
            notifier: None,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn errors(&self) -> &ErrorManager {
        &self.inner.errors
    }

    pub fn locks(&self) -> &LockManager {
        &self.inner.locks
    }

    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    pub fn codec(&self) -> &IntegrityCodec {
        &self.inner.codec
    }

    fn lock_options(&self) -> LockOptions {
        LockOptions::default().with_timeout(self.inner.config.lock_timeout())
    }

    async fn locked<T, F, Fut>(
        &self,
        key: &str,
        options: LockOptions,
        operation: F,
    ) -> Result<T, CoreError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, CoreError>> + Send + 'static,
    {
        let result = self.inner.locks.with_lock(key, options, operation).await;
        if let Err(
            err @ (CoreError::LockContention { .. }
            | CoreError::LockTimeout { .. }
            | CoreError::LockAborted { .. }),
        ) = &result
        {
            self.inner
                .errors
                .handle_error(err, &ErrorContext::new("lock").with_target(key));
        }
        result
    }

    /// Validate and store `cookies`.
    pub async fn import_cookies(
        &self,
        cookies: Vec<CookieRecord>,
    ) -> Result<BatchReport, CoreError> {
        let vault = self.clone();
        self.locked(IMPORT_LOCK, self.lock_options(), move || async move {
            vault.run_import(cookies).await
        })
        .await
    }

    /// Open a sealed envelope and import its cookies.
    pub async fn import_sealed(
        &self,
        envelope: IntegrityEnvelope,
    ) -> Result<BatchReport, CoreError> {
        let vault = self.clone();
        self.locked(IMPORT_LOCK, self.lock_options(), move || async move {
            let cookies = vault.open_envelope(&envelope, "import_sealed")?;
            vault.run_import(cookies).await
        })
        .await
    }

    /// Seal the valid cookies currently stored for `domain`.
    pub async fn export_domain(&self, domain: &str) -> Result<ExportReport, CoreError> {
        let domain = self.check_domain(domain)?;
        let options = self.lock_options().reentrant(format!("export:{}", domain));
        let vault = self.clone();
        let key = format!("export_{}", domain);
        self.locked(&key, options, move || async move { vault.run_export(domain).await })
            .await
    }

    /// Remove every stored cookie for `domain`.
    pub async fn clear_domain(&self, domain: &str) -> Result<ClearReport, CoreError> {
        let domain = self.check_domain(domain)?;
        let vault = self.clone();
        let key = format!("clear_{}", domain);
        self.locked(&key, self.lock_options(), move || async move {
            vault.run_clear(domain).await
        })
        .await
    }

    /// Seal every stored cookie into the backup slot.
    pub async fn backup(&self) -> Result<BackupReport, CoreError> {
        let vault = self.clone();
        self.locked(BACKUP_LOCK, self.lock_options(), move || async move {
            vault.run_backup().await
        })
        .await
    }

    /// Import the cookies of the most recent backup.
    pub async fn restore(&self) -> Result<BatchReport, CoreError> {
        let vault = self.clone();
        self.locked(IMPORT_LOCK, self.lock_options(), move || async move {
            let envelope = vault.inner.backups.load().await?.ok_or_else(|| CoreError::Storage {
                message: "no backup available".to_string(),
            })?;
            let cookies = vault.open_envelope(&envelope, "restore")?;
            vault.run_import(cookies).await
        })
        .await
    }

    /// Probe the store and update the session-valid flag.
    pub async fn probe_session(&self) -> bool {
        self.inner
            .errors
            .probe_session(self.inner.store.as_ref(), &self.inner.config.probe_domain)
            .await
    }

    /// Cookies stored for `domain`, served from the cache when fresh.
    pub async fn cookies_for_domain(&self, domain: &str) -> Result<Vec<CookieRecord>, CoreError> {
        let domain = self.check_domain(domain)?;
        self.lookup(&domain).await
    }

    fn check_domain(&self, domain: &str) -> Result<String, CoreError> {
        let normalized = domain.trim().trim_start_matches('.').to_ascii_lowercase();
        if is_valid_domain(&normalized) {
            Ok(normalized)
        } else {
            Err(CoreError::Validation {
                errors: vec![format!("Invalid domain format: {}", domain)],
                warnings: Vec::new(),
            })
        }
    }

    fn open_envelope(
        &self,
        envelope: &IntegrityEnvelope,
        operation: &str,
    ) -> Result<Vec<CookieRecord>, CoreError> {
        self.inner.codec.open(envelope).map_err(|err| {
            self.inner.errors.handle_error(
                &err,
                &ErrorContext::new(operation).with_meta("version", envelope.version.as_str()),
            );
            err
        })
    }

    async fn lookup(&self, domain: &str) -> Result<Vec<CookieRecord>, CoreError> {
        let cache_key = format!("cookies_{}", domain);
        if let Some(cookies) = self.inner.cache.get(&cache_key) {
            tracing::trace!(domain, "cookie lookup served from cache");
            return Ok(cookies);
        }

        let store = &self.inner.store;
        let cookies = self
            .inner
            .errors
            .with_retry(ErrorContext::new("get_cookies").with_target(domain), || async move {
                store
                    .get_all_for_domain(domain)
                    .await
                    .store_context("get_cookies", domain)
            })
            .await?;

        self.inner.cache.set(cache_key, cookies.clone());
        Ok(cookies)
    }

    async fn run_import(&self, cookies: Vec<CookieRecord>) -> Result<BatchReport, CoreError> {
        let total = cookies.len();
        if total == 0 {
            return Ok(BatchReport::default());
        }

        let batch_size = self.inner.config.batch_size;
        let mut items = Vec::with_capacity(total);

        for (chunk_idx, chunk) in cookies.chunks(batch_size).enumerate() {
            let offset = chunk_idx * batch_size;
            let results = join_all(
                chunk
                    .iter()
                    .enumerate()
                    .map(|(i, cookie)| self.import_one(offset + i, cookie)),
            )
            .await;
            tracing::debug!(chunk = chunk_idx, size = chunk.len(), "import chunk processed");
            items.extend(results);
        }

        self.inner.cache.clear();

        let report = BatchReport::from_items(items);
        tracing::info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            warnings = report.warnings,
            "import finished"
        );

        if report.succeeded == 0 {
            let err = CoreError::BatchFailed {
                total,
                errors: report.all_errors(),
            };
            self.inner
                .errors
                .handle_error(&err, &ErrorContext::new("import_cookies"));
            return Err(err);
        }
        Ok(report)
    }

    async fn import_one(&self, index: usize, cookie: &CookieRecord) -> ItemReport {
        let outcome = self.inner.validator.validate(cookie);
        let label = cookie_label(cookie);
        let mut item = ItemReport {
            index,
            name: cookie.name.clone(),
            domain: cookie.domain.clone(),
            status: ItemStatus::Imported,
            errors: Vec::new(),
            warnings: outcome.warnings,
        };

        if !outcome.is_valid {
            let err = CoreError::InvalidCookieFormat {
                errors: outcome.errors.clone(),
            };
            let context = ErrorContext::new("import_cookie").with_target(label.as_str());
            let (_, disposition) = self.inner.errors.handle_error(&err, &context);
            if disposition == Disposition::Surfaced {
                self.inner.notifier.notify(Notification::CookieValidationFailure {
                    error: ValidationFailure {
                        cookie_name: cookie.name.clone(),
                        domain: cookie.domain.clone(),
                        errors: outcome.errors.clone(),
                    },
                });
            }
            item.status = ItemStatus::Rejected;
            item.errors = outcome.errors;
            return item;
        }

        let stored = cookie.for_store();
        let store = &self.inner.store;
        let target = label.as_str();
        let written = self
            .inner
            .errors
            .with_retry(ErrorContext::new("set_cookie").with_target(target), || {
                let cookie = stored.clone();
                async move { store.set(cookie).await.store_context("set_cookie", target) }
            })
            .await;

        if let Err(err) = written {
            item.status = ItemStatus::Failed;
            item.errors.push(err.to_string());
        }
        item
    }

    async fn run_export(&self, domain: String) -> Result<ExportReport, CoreError> {
        let cookies = self.lookup(&domain).await?;

        let mut valid = Vec::with_capacity(cookies.len());
        let mut warnings = Vec::new();
        let mut skipped = 0;

        for cookie in cookies {
            let outcome = self.inner.validator.validate(&cookie);
            if !outcome.is_valid {
                tracing::debug!(
                    cookie = %cookie_label(&cookie),
                    errors = ?outcome.errors,
                    "skipping invalid cookie in export"
                );
                skipped += 1;
                continue;
            }
            warnings.extend(
                outcome
                    .warnings
                    .into_iter()
                    .map(|w| format!("{}: {}", cookie.name_str(), w)),
            );
            valid.push(cookie);
        }

        let envelope = self.inner.codec.seal(&valid).map_err(|err| {
            self.inner
                .errors
                .handle_error(&err, &ErrorContext::new("export").with_target(domain.as_str()));
            err
        })?;

        tracing::info!(domain = %domain, exported = valid.len(), skipped, "export sealed");
        Ok(ExportReport {
            domain,
            envelope,
            exported: valid.len(),
            skipped,
            warnings,
        })
    }

    async fn run_clear(&self, domain: String) -> Result<ClearReport, CoreError> {
        let store = &self.inner.store;
        let target = domain.as_str();
        let cookies = self
            .inner
            .errors
            .with_retry(ErrorContext::new("get_cookies").with_target(target), || async move {
                store
                    .get_all_for_domain(target)
                    .await
                    .store_context("get_cookies", target)
            })
            .await?;

        let mut removed = 0;
        let mut failed = 0;
        for cookie in &cookies {
            let label = cookie_label(cookie);
            let context = ErrorContext::new("remove_cookie").with_target(label.as_str());
            let result = self
                .inner
                .errors
                .with_retry(context, || async move {
                    store.remove(cookie).await.store_context("remove_cookie", target)
                })
                .await;
            match result {
                Ok(()) => removed += 1,
                Err(_) => failed += 1,
            }
        }

        self.inner.cache.clear();
        tracing::info!(domain = %domain, removed, failed, "domain cleared");
        Ok(ClearReport {
            domain,
            removed,
            failed,
        })
    }

    async fn run_backup(&self) -> Result<BackupReport, CoreError> {
        let store = &self.inner.store;
        let cookies = self
            .inner
            .errors
            .with_retry(ErrorContext::new("get_all_cookies"), || async move {
                store.get_all().await.store_context("get_all_cookies", "*")
            })
            .await?;

        let envelope = self.inner.codec.seal(&cookies)?;
        self.inner.backups.save(&envelope).await.map_err(|err| {
            self.inner.errors.handle_error(&err, &ErrorContext::new("backup"));
            err
        })?;

        tracing::info!(cookies = cookies.len(), "backup written");
        Ok(BackupReport {
            cookies: cookies.len(),
            timestamp: envelope.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::store::MemoryCookieStore;

    fn vault() -> (CookieVault, MemoryCookieStore) {
        let store = MemoryCookieStore::new();
        let vault = CookieVault::builder(Arc::new(store.clone()))
            .config(CoreConfig::for_testing())
            .build()
            .unwrap();
        (vault, store)
    }

    #[tokio::test]
    async fn test_empty_import_is_ok() {
        let (vault, _) = vault();
        let report = vault.import_cookies(Vec::new()).await.unwrap();
        assert_eq!(report, BatchReport::default());
    }

    #[tokio::test]
    async fn test_all_rejected_is_batch_failure() {
        let (vault, store) = vault();
        let cookies = vec![CookieRecord {
            name: Some("x".into()),
            ..Default::default()
        }];
        let err = vault.import_cookies(cookies).await.unwrap_err();
        match &err {
            CoreError::BatchFailed { total, errors } => {
                assert_eq!(*total, 1);
                assert!(errors.contains(&"x: Missing required field: value".to_string()));
                assert!(errors.contains(&"x: Missing required field: path".to_string()));
            }
            other => panic!("expected BatchFailed, got {:?}", other),
        }
        assert!(err.to_string().starts_with("All 1 cookies in batch failed: x: Missing"));
        assert_eq!(store.total_cookie_count(), 0);
    }

    #[tokio::test]
    async fn test_item_indices_follow_input_order() {
        let (vault, _) = vault();
        let cookies: Vec<_> = (0..5)
            .map(|i| CookieRecord::new(format!("c{}", i), "v", Some("example.com"), "/"))
            .collect();
        let report = vault.import_cookies(cookies).await.unwrap();
        let indices: Vec<_> = report.items.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_export_rejects_bad_domain() {
        let (vault, _) = vault();
        let err = vault.export_domain("not a domain").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_cache_invalidated_by_import() {
        let (vault, _) = vault();
        assert!(vault.cookies_for_domain("example.com").await.unwrap().is_empty());

        vault
            .import_cookies(vec![CookieRecord::new("a", "1", Some("example.com"), "/")])
            .await
            .unwrap();
        assert_eq!(vault.cookies_for_domain("example.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_without_backup() {
        let (vault, _) = vault();
        let err = vault.restore().await.unwrap_err();
        assert!(matches!(err, CoreError::Storage { .. }));
    }
}
