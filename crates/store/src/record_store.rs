use crate::app_lock::AppWriteLock;
use crate::{Filter, RecordKey, RecordKind, Result, StoredRecord, WriteBatch};
use async_trait::async_trait;
use serde_json::Value;

/// Persistence port shared by every backend.
///
/// Callers never branch on the backend: reads go through `get`/`list`, and all
/// writes of one request are collected into a [`WriteBatch`] handed to `apply`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &RecordKey) -> Result<Option<Value>>;

    /// Records of `kind`, optionally restricted to one application, whose top-level
    /// fields match `filter`. Results are ordered by key.
    async fn list(
        &self,
        kind: RecordKind,
        app: Option<&str>,
        filter: &Filter,
    ) -> Result<Vec<StoredRecord>>;

    /// Apply every write of the batch. Transactional backends apply all or nothing;
    /// the file backend applies in order and stops at the first failure.
    async fn apply(&self, batch: WriteBatch) -> Result<()>;

    async fn put(&self, key: &RecordKey, value: Value) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key.clone(), value);
        self.apply(batch).await
    }

    /// Returns whether a record was removed.
    async fn delete(&self, key: &RecordKey) -> Result<bool> {
        if self.get(key).await?.is_none() {
            return Ok(false);
        }
        let mut batch = WriteBatch::new();
        batch.delete(key.clone());
        self.apply(batch).await?;
        Ok(true)
    }

    /// Serialize writers of one application for the lifetime of the guard.
    async fn lock_app(&self, app: &str) -> Result<AppGuard>;

    /// Human-readable locator of a record (a file path, a database URI).
    fn locate(&self, key: &RecordKey) -> String;

    /// Locator of the collection holding every run of an application.
    fn app_locator(&self, app: &str) -> String;
}

/// Held while an application's records are read, modified and written back.
#[derive(Debug)]
pub struct AppGuard {
    _inner: GuardInner,
}

#[derive(Debug)]
enum GuardInner {
    File(AppWriteLock),
    Memory(tokio::sync::OwnedMutexGuard<()>),
}

impl AppGuard {
    pub(crate) fn file(lock: AppWriteLock) -> Self {
        Self {
            _inner: GuardInner::File(lock),
        }
    }

    pub(crate) fn memory(guard: tokio::sync::OwnedMutexGuard<()>) -> Self {
        Self {
            _inner: GuardInner::Memory(guard),
        }
    }
}
