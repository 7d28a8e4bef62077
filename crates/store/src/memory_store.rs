use crate::{
    AppGuard, Filter, RecordKey, RecordKind, RecordStore, Result, StoredRecord, WriteBatch,
    WriteOp,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-process backend for tests and embedding. Batches are all-or-nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<RecordKey, Value>>,
    app_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Value>> {
        key.validate()?;
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn list(
        &self,
        kind: RecordKind,
        app: Option<&str>,
        filter: &Filter,
    ) -> Result<Vec<StoredRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|(key, _)| key.kind == kind && app.map_or(true, |app| key.app == app))
            .filter(|(_, value)| filter.matches(value))
            .map(|(key, value)| StoredRecord {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn apply(&self, batch: WriteBatch) -> Result<()> {
        batch.validate()?;
        let mut records = self.records.lock().await;
        for op in batch {
            match op {
                WriteOp::Put(key, value) => {
                    records.insert(key, value);
                }
                WriteOp::Delete(key) => {
                    records.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn lock_app(&self, app: &str) -> Result<AppGuard> {
        RecordKey::app(app).validate()?;
        let lock = {
            let mut locks = self.app_locks.lock().await;
            locks.entry(app.to_string()).or_default().clone()
        };
        Ok(AppGuard::memory(lock.lock_owned().await))
    }

    fn locate(&self, key: &RecordKey) -> String {
        format!("memory://{key}")
    }

    fn app_locator(&self, app: &str) -> String {
        format!("memory://app:{app}")
    }
}
