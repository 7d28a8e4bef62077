use crate::error::{FindingsError, Result};
use findings_store::{expand_home, FileStore, LockOptions, RecordStore, SqliteStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const ENV_SNIPPET_LIMIT: &str = "FINDINGS_SNIPPET_LIMIT";
pub const ENV_TOP_FINDINGS_LIMIT: &str = "FINDINGS_TOP_FINDINGS_LIMIT";
pub const ENV_LOAD_HISTORY_LIMIT: &str = "FINDINGS_LOAD_HISTORY_LIMIT";
pub const ENV_ANONYMIZE_SNIPPETS: &str = "FINDINGS_ANONYMIZE_SNIPPETS";
pub const ENV_STORAGE_TYPE: &str = "FINDINGS_STORAGE_TYPE";
pub const ENV_STORAGE_LOCATION: &str = "FINDINGS_STORAGE_LOCATION";
pub const ENV_LOG_LEVEL: &str = "FINDINGS_LOG_LEVEL";

const DEFAULT_STORAGE_LOCATION: &str = "~/.findings";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub reports: ReportsConfig,
    pub storage: StorageConfig,
    pub lock: LockConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportsConfig {
    /// Snippets displayed per run, shared by every label.
    pub snippet_limit: usize,
    pub top_findings_limit: usize,
    pub load_history_limit: usize,
    /// Store the classifier's masked text as evidence instead of the raw document.
    pub anonymize_snippets: bool,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            snippet_limit: 100,
            top_findings_limit: 5,
            load_history_limit: 5,
            anonymize_snippets: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Db,
}

impl FromStr for StorageKind {
    type Err = FindingsError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "db" => Ok(Self::Db),
            other => Err(FindingsError::InvalidConfig(format!(
                "storage.type '{other}' is not supported (expected file or db)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbKind {
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: StorageKind,
    pub db: DbKind,
    pub location: String,
    /// Database file stem, used when `type = "db"`.
    pub name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::File,
            db: DbKind::Sqlite,
            location: DEFAULT_STORAGE_LOCATION.to_string(),
            name: "findings".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn root(&self) -> PathBuf {
        expand_home(self.location.trim())
    }

    pub fn db_path(&self) -> PathBuf {
        self.root().join(format!("{}.db", self.name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    pub retry_interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 100,
            timeout_ms: 30_000,
        }
    }
}

impl LockConfig {
    pub fn options(&self) -> LockOptions {
        LockOptions {
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<log::LevelFilter> {
        log::LevelFilter::from_str(self.level.trim()).map_err(|_| {
            FindingsError::InvalidConfig(format!(
                "logging.level '{}' is not a log level",
                self.level
            ))
        })
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, applies `FINDINGS_*` overrides from the process environment and validates.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let mut config: Self = toml::from_str(&raw)?;
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                ENV_SNIPPET_LIMIT => self.reports.snippet_limit = parse_env(ENV_SNIPPET_LIMIT, value)?,
                ENV_TOP_FINDINGS_LIMIT => {
                    self.reports.top_findings_limit = parse_env(ENV_TOP_FINDINGS_LIMIT, value)?;
                }
                ENV_LOAD_HISTORY_LIMIT => {
                    self.reports.load_history_limit = parse_env(ENV_LOAD_HISTORY_LIMIT, value)?;
                }
                ENV_ANONYMIZE_SNIPPETS => {
                    self.reports.anonymize_snippets = parse_env(ENV_ANONYMIZE_SNIPPETS, value)?;
                }
                ENV_STORAGE_TYPE => self.storage.kind = value.parse()?,
                ENV_STORAGE_LOCATION => self.storage.location = value.to_string(),
                ENV_LOG_LEVEL => self.logging.level = value.to_string(),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.reports.top_findings_limit == 0 {
            return Err(FindingsError::InvalidConfig(
                "reports.top_findings_limit must be at least 1".into(),
            ));
        }
        if self.storage.location.trim().is_empty() {
            return Err(FindingsError::InvalidConfig(
                "storage.location must not be empty".into(),
            ));
        }
        let name = self.storage.name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(FindingsError::InvalidConfig(format!(
                "storage.name '{}' must be a plain file stem",
                self.storage.name
            )));
        }
        if self.lock.retry_interval_ms == 0 {
            return Err(FindingsError::InvalidConfig(
                "lock.retry_interval_ms must be positive".into(),
            ));
        }
        if self.lock.timeout_ms < self.lock.retry_interval_ms {
            return Err(FindingsError::InvalidConfig(
                "lock.timeout_ms must not be shorter than lock.retry_interval_ms".into(),
            ));
        }
        self.logging.level_filter()?;
        Ok(())
    }

    /// Opens the configured backend.
    pub async fn open_store(&self) -> Result<Arc<dyn RecordStore>> {
        let lock_options = self.lock.options();
        let store: Arc<dyn RecordStore> = match self.storage.kind {
            StorageKind::File => {
                Arc::new(FileStore::new(self.storage.root()).with_lock_options(lock_options))
            }
            StorageKind::Db => match self.storage.db {
                DbKind::Sqlite => Arc::new(
                    SqliteStore::open(self.storage.db_path())
                        .await?
                        .with_lock_options(lock_options),
                ),
            },
        };
        Ok(store)
    }
}

fn parse_env<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| FindingsError::InvalidConfig(format!("{key}='{raw}' is not a valid value")))
}
