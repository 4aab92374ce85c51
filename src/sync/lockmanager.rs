//! Named-mutex table.
//!
//! At most one operation is in flight per key. Acquisition happens
//! synchronously when [`LockManager::with_lock`] is called, so two calls
//! issued back to back cannot both win. A second caller fails fast with
//! [`CoreError::LockContention`] unless it opted into reentry with the same
//! context as the holder, in which case it awaits the holder's result.
//!
//! Each operation runs on its own task. A supervisor task bounds it by the
//! lock timeout: when the timeout fires the entry is removed and waiters get
//! [`CoreError::LockTimeout`], but the operation itself keeps running and its
//! effects still land. Entries carry a generation number so a late
//! settlement never releases a successor's lock.

use crate::base::coreerror::CoreError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Default time an operation may hold its lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

type SharedOutcome = Shared<BoxFuture<'static, Result<Arc<dyn Any + Send + Sync>, CoreError>>>;

/// Options for [`LockManager::with_lock`].
#[derive(Debug, Clone)]
pub struct LockOptions {
    pub timeout: Duration,
    pub allow_reentry: bool,
    /// Identity of the caller; reentry requires the holder's context to match.
    pub context: Option<String>,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
            allow_reentry: false,
            context: None,
        }
    }
}

impl LockOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Allow callers presenting the same `context` to share the in-flight result.
    pub fn reentrant(mut self, context: impl Into<String>) -> Self {
        self.allow_reentry = true;
        self.context = Some(context.into());
        self
    }
}

struct LockEntry {
    handle: SharedOutcome,
    acquired_at: Instant,
    timeout: Duration,
    generation: u64,
    context: Option<String>,
}

impl LockEntry {
    fn admits(&self, options: &LockOptions) -> bool {
        options.allow_reentry && options.context.is_some() && self.context == options.context
    }
}

/// Table of named locks. Cloning shares the table.
#[derive(Clone, Default)]
pub struct LockManager {
    locks: Arc<DashMap<String, LockEntry>>,
    next_generation: Arc<AtomicU64>,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("active", &self.locks.len())
            .finish()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `operation` while holding the lock named `key`.
    ///
    /// The lock is taken before this returns; the returned future resolves
    /// with the operation's result. `operation` is invoked after the lock is
    /// recorded, so it may query this manager. Must be called from within a
    /// tokio runtime.
    pub fn with_lock<T, F, Fut>(
        &self,
        key: &str,
        options: LockOptions,
        operation: F,
    ) -> BoxFuture<'static, Result<T, CoreError>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoreError>> + Send + 'static,
    {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                let err = CoreError::Config {
                    message: format!("lock manager requires a tokio runtime: {}", e),
                };
                return futures::future::ready(Err(err)).boxed();
            }
        };

        let (handle, start) = match self.locks.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                let entry = occupied.get();
                if !entry.admits(&options) {
                    tracing::debug!(
                        key,
                        held_ms = entry.acquired_at.elapsed().as_millis() as u64,
                        "lock contention"
                    );
                    let err = CoreError::LockContention {
                        key: key.to_string(),
                    };
                    return futures::future::ready(Err(err)).boxed();
                }
                tracing::debug!(key, context = ?options.context, "joining in-flight operation");
                (entry.handle.clone(), None)
            }
            Entry::Vacant(vacant) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let (start, pending) = oneshot::channel::<Fut>();
                let aborted_key = key.to_string();
                let gated = async move {
                    match pending.await {
                        Ok(operation) => operation.await,
                        Err(_) => Err(CoreError::LockAborted { key: aborted_key }),
                    }
                };
                let handle =
                    self.spawn_supervised(&runtime, key, generation, options.timeout, gated);
                vacant.insert(LockEntry {
                    handle: handle.clone(),
                    acquired_at: Instant::now(),
                    timeout: options.timeout,
                    generation,
                    context: options.context,
                });
                tracing::debug!(key, generation, "lock acquired");
                (handle, Some(start))
            }
        };

        // The table's shard guard is released here; the operation may use the table
        if let Some(start) = start {
            let _ = start.send(operation());
        }

        let key = key.to_string();
        async move {
            let value = handle.await?;
            value
                .downcast_ref::<T>()
                .cloned()
                .ok_or(CoreError::LockContention { key })
        }
        .boxed()
    }

    fn spawn_supervised<T, Fut>(
        &self,
        runtime: &Handle,
        key: &str,
        generation: u64,
        timeout: Duration,
        operation: Fut,
    ) -> SharedOutcome
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T, CoreError>> + Send + 'static,
    {
        let mut task = runtime.spawn(async move {
            operation
                .await
                .map(|value| Arc::new(value) as Arc<dyn Any + Send + Sync>)
        });

        let locks = Arc::clone(&self.locks);
        let key = key.to_string();
        let abort_key = key.clone();
        let supervisor = runtime.spawn(async move {
            let outcome = match tokio::time::timeout(timeout, &mut task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => {
                    tracing::error!(key = %key, error = %join_err, "lock holder terminated");
                    Err(CoreError::LockAborted { key: key.clone() })
                }
                Err(_) => {
                    tracing::warn!(
                        key = %key,
                        timeout_ms = timeout.as_millis() as u64,
                        "lock timed out, releasing"
                    );
                    let late_key = key.clone();
                    tokio::spawn(async move {
                        if task.await.is_ok() {
                            tracing::warn!(
                                key = %late_key,
                                "operation settled after its lock timed out"
                            );
                        }
                    });
                    Err(CoreError::LockTimeout {
                        key: key.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            };

            if locks.remove_if(&key, |_, entry| entry.generation == generation).is_some() {
                tracing::debug!(key = %key, generation, "lock released");
            }
            outcome
        });

        async move {
            supervisor
                .await
                .unwrap_or_else(|_| Err(CoreError::LockAborted { key: abort_key }))
        }
        .boxed()
        .shared()
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.locks.contains_key(key)
    }

    /// Number of keys currently held.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    /// How long `key` has been held and its configured timeout.
    pub fn lock_age(&self, key: &str) -> Option<(Duration, Duration)> {
        self.locks
            .get(key)
            .map(|entry| (entry.acquired_at.elapsed(), entry.timeout))
    }
}
