use crate::app_lock::{acquire_app_write_lock, LockOptions};
use crate::paths::LOCKS_DIR_NAME;
use crate::{
    AppGuard, Filter, RecordKey, RecordKind, RecordStore, Result, StoreError, StoredRecord,
    WriteBatch, WriteOp,
};
use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS records (
        kind TEXT NOT NULL,
        app TEXT NOT NULL,
        run TEXT NOT NULL DEFAULT '',
        payload TEXT NOT NULL,
        updated_at_unix_ms INTEGER NOT NULL,
        PRIMARY KEY (kind, app, run)
    );",
    "CREATE INDEX IF NOT EXISTS idx_records_app_kind ON records(app, kind);",
];

/// Relational backend: one row per logical entity with a JSON payload column.
///
/// Every call opens its own connection; a batch is applied inside one transaction.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
    lock_options: LockOptions,
}

impl SqliteStore {
    /// Open (and create if needed) the database at `db_path`.
    pub async fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let store = Self {
            db_path,
            lock_options: LockOptions::default(),
        };
        store
            .with_connection(|conn| {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
                for stmt in SCHEMA_STATEMENTS {
                    conn.execute_batch(stmt)?;
                }
                Ok(())
            })
            .await?;
        Ok(store)
    }

    #[must_use]
    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.lock_options = lock_options;
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Self::connect(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|err| StoreError::Other(format!("join sqlite task: {err}")))?
    }
}

fn run_column(key: &RecordKey) -> String {
    key.run.clone().unwrap_or_default()
}

fn unix_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// Scalars are pushed down into SQL; arrays and objects are matched after decoding.
fn scalar_param(value: &Value) -> Option<SqlValue> {
    match value {
        Value::Null => Some(SqlValue::Null),
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real)),
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Value>> {
        key.validate()?;
        let kind = key.kind.as_str();
        let app = key.app.clone();
        let run = run_column(key);
        let payload: Option<String> = self
            .with_connection(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT payload FROM records WHERE kind = ?1 AND app = ?2 AND run = ?3;",
                        params![kind, app, run],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        match payload {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        kind: RecordKind,
        app: Option<&str>,
        filter: &Filter,
    ) -> Result<Vec<StoredRecord>> {
        let mut sql = String::from("SELECT app, run, payload FROM records WHERE kind = ?");
        let mut bind: Vec<SqlValue> = vec![SqlValue::Text(kind.as_str().to_string())];
        if let Some(app) = app {
            sql.push_str(" AND app = ?");
            bind.push(SqlValue::Text(app.to_string()));
        }
        for (field, expected) in filter.fields() {
            if let Some(param) = scalar_param(expected) {
                sql.push_str(" AND json_extract(payload, ?) IS ?");
                bind.push(SqlValue::Text(json_path(field)));
                bind.push(param);
            }
        }
        sql.push_str(" ORDER BY app, run;");

        let rows: Vec<(String, String, String)> = self
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(bind.iter()), |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for (app, run, payload) in rows {
            let value: Value = match serde_json::from_str(&payload) {
                Ok(value) => value,
                Err(err) => {
                    log::warn!("Skipping undecodable {} row {app}/{run}: {err}", kind.as_str());
                    continue;
                }
            };
            if !filter.matches(&value) {
                continue;
            }
            let key = RecordKey {
                kind,
                app,
                run: kind.is_run_scoped().then_some(run),
            };
            records.push(StoredRecord { key, value });
        }
        Ok(records)
    }

    async fn apply(&self, batch: WriteBatch) -> Result<()> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }
        let mut ops = Vec::with_capacity(batch.len());
        for op in batch {
            let encoded = match &op {
                WriteOp::Put(_, value) => Some(serde_json::to_string(value)?),
                WriteOp::Delete(_) => None,
            };
            ops.push((op, encoded));
        }
        let count = ops.len();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            let now = unix_now_ms();
            for (op, encoded) in &ops {
                let key = op.key();
                match encoded {
                    Some(payload) => {
                        tx.execute(
                            "INSERT INTO records(kind, app, run, payload, updated_at_unix_ms)
                             VALUES(?1, ?2, ?3, ?4, ?5)
                             ON CONFLICT(kind, app, run) DO UPDATE SET
                                payload = excluded.payload,
                                updated_at_unix_ms = excluded.updated_at_unix_ms;",
                            params![key.kind.as_str(), key.app, run_column(key), payload, now],
                        )?;
                    }
                    None => {
                        tx.execute(
                            "DELETE FROM records WHERE kind = ?1 AND app = ?2 AND run = ?3;",
                            params![key.kind.as_str(), key.app, run_column(key)],
                        )?;
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await?;
        log::debug!("Committed {count} record writes to {}", self.db_path.display());
        Ok(())
    }

    async fn lock_app(&self, app: &str) -> Result<AppGuard> {
        RecordKey::app(app).validate()?;
        let dir = self
            .db_path
            .parent()
            .map_or_else(|| PathBuf::from(LOCKS_DIR_NAME), |p| p.join(LOCKS_DIR_NAME));
        let lock = acquire_app_write_lock(&dir.join(format!("{app}.lock")), self.lock_options).await?;
        Ok(AppGuard::file(lock))
    }

    fn locate(&self, key: &RecordKey) -> String {
        format!("sqlite://{}#{key}", self.db_path.display())
    }

    fn app_locator(&self, app: &str) -> String {
        format!("sqlite://{}#app:{app}", self.db_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_path_quotes_field_names() {
        assert_eq!(json_path("owner"), "$.\"owner\"");
        assert_eq!(json_path("we\"ird"), "$.\"we\\\"ird\"");
    }

    #[test]
    fn only_scalars_are_pushed_down() {
        assert_eq!(
            scalar_param(&Value::from("x")),
            Some(SqlValue::Text("x".into()))
        );
        assert_eq!(scalar_param(&Value::from(true)), Some(SqlValue::Integer(1)));
        assert_eq!(scalar_param(&Value::from(3)), Some(SqlValue::Integer(3)));
        assert_eq!(scalar_param(&serde_json::json!([1])), None);
    }
}
