use crate::app_lock::{acquire_app_write_lock, LockOptions};
use crate::paths::{
    tmp_path_for, APP_LOCK_FILE_NAME, APP_METADATA_FILE_NAME, ARTIFACT_FILE_NAME,
    REPORT_FILE_NAME, RUN_STATE_FILE_NAME,
};
use crate::types::METADATA_DIR_NAME;
use crate::{
    AppGuard, Filter, RecordKey, RecordKind, RecordStore, Result, StoreError, StoredRecord,
    WriteBatch, WriteOp,
};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

/// File-tree backend.
///
/// ```text
/// <root>/<app>/metadata/metadata.json   application record
/// <root>/<app>/app.lock                 writer lock
/// <root>/<app>/<run>/state.json         partial aggregation state
/// <root>/<app>/<run>/report.json        final report
/// <root>/<app>/<run>/report.rendered    rendered artifact
/// ```
///
/// There is no transaction: each file is replaced atomically (write + rename), and a
/// failing batch leaves the files it already wrote.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    lock_options: LockOptions,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_options: LockOptions::default(),
        }
    }

    #[must_use]
    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.lock_options = lock_options;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn app_dir(&self, app: &str) -> PathBuf {
        self.root.join(app)
    }

    fn path_for(&self, key: &RecordKey) -> Result<PathBuf> {
        key.validate()?;
        let app_dir = self.app_dir(&key.app);
        let run = key.run.as_deref().unwrap_or_default();
        Ok(match key.kind {
            RecordKind::App => app_dir.join(METADATA_DIR_NAME).join(APP_METADATA_FILE_NAME),
            RecordKind::RunState => app_dir.join(run).join(RUN_STATE_FILE_NAME),
            RecordKind::Report => app_dir.join(run).join(REPORT_FILE_NAME),
            RecordKind::Artifact => app_dir.join(run).join(ARTIFACT_FILE_NAME),
        })
    }

    async fn read_record(&self, key: &RecordKey) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if key.kind == RecordKind::Artifact {
            return Ok(Some(Value::String(
                String::from_utf8_lossy(&bytes).into_owned(),
            )));
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn write_record(&self, key: &RecordKey, value: &Value) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = match (key.kind, value) {
            (RecordKind::Artifact, Value::String(text)) => text.clone().into_bytes(),
            (RecordKind::Artifact, _) => {
                return Err(StoreError::Other(format!(
                    "artifact {key} must be a string payload"
                )))
            }
            _ => serde_json::to_vec_pretty(value)?,
        };
        let tmp = tmp_path_for(&path);
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        log::debug!("Wrote {key} to {}", path.display());
        Ok(())
    }

    async fn remove_record(&self, key: &RecordKey) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn child_dirs(dir: &Path) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn candidate_keys(&self, kind: RecordKind, app: Option<&str>) -> Result<Vec<RecordKey>> {
        let apps = match app {
            Some(app) => vec![app.to_string()],
            None => Self::child_dirs(&self.root).await?,
        };
        let mut keys = Vec::new();
        for app in apps {
            if !kind.is_run_scoped() {
                keys.push(RecordKey::app(app));
                continue;
            }
            for run in Self::child_dirs(&self.app_dir(&app)).await? {
                if run == METADATA_DIR_NAME {
                    continue;
                }
                keys.push(RecordKey::run_scoped(kind, app.clone(), run));
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Value>> {
        self.read_record(key).await
    }

    async fn list(
        &self,
        kind: RecordKind,
        app: Option<&str>,
        filter: &Filter,
    ) -> Result<Vec<StoredRecord>> {
        let mut records = Vec::new();
        for key in self.candidate_keys(kind, app).await? {
            if key.validate().is_err() {
                continue;
            }
            let value = match self.read_record(&key).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(err) => {
                    log::warn!("Skipping unreadable record {key}: {err}");
                    continue;
                }
            };
            if filter.matches(&value) {
                records.push(StoredRecord { key, value });
            }
        }
        Ok(records)
    }

    async fn apply(&self, batch: WriteBatch) -> Result<()> {
        batch.validate()?;
        for op in batch {
            match op {
                WriteOp::Put(key, value) => self.write_record(&key, &value).await?,
                WriteOp::Delete(key) => self.remove_record(&key).await?,
            }
        }
        Ok(())
    }

    async fn lock_app(&self, app: &str) -> Result<AppGuard> {
        RecordKey::app(app).validate()?;
        let path = self.app_dir(app).join(APP_LOCK_FILE_NAME);
        let lock = acquire_app_write_lock(&path, self.lock_options).await?;
        Ok(AppGuard::file(lock))
    }

    fn locate(&self, key: &RecordKey) -> String {
        match self.path_for(key) {
            Ok(path) => path.display().to_string(),
            Err(_) => format!("{}#{key}", self.root.display()),
        }
    }

    fn app_locator(&self, app: &str) -> String {
        self.app_dir(app).display().to_string()
    }
}
