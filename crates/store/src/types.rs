use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved directory name for application-level metadata inside an app root.
pub(crate) const METADATA_DIR_NAME: &str = "metadata";

/// Logical entity kinds the engine persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Application record: owner, description and the ordered list of run ids.
    App,
    /// Partially aggregated state of a run, used to resume multi-call runs.
    RunState,
    /// Final report of a finished run.
    Report,
    /// Rendered form of a report (whatever the renderer produced).
    Artifact,
}

impl RecordKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::RunState => "run_state",
            Self::Report => "report",
            Self::Artifact => "artifact",
        }
    }

    /// Run-scoped kinds live under a run id; `App` is keyed by the application only.
    #[must_use]
    pub const fn is_run_scoped(self) -> bool {
        !matches!(self, Self::App)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "app" => Some(Self::App),
            "run_state" => Some(Self::RunState),
            "report" => Some(Self::Report),
            "artifact" => Some(Self::Artifact),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub kind: RecordKind,
    pub app: String,
    pub run: Option<String>,
}

impl RecordKey {
    pub fn app(app: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::App,
            app: app.into(),
            run: None,
        }
    }

    pub fn run_state(app: impl Into<String>, run: impl Into<String>) -> Self {
        Self::run_scoped(RecordKind::RunState, app, run)
    }

    pub fn report(app: impl Into<String>, run: impl Into<String>) -> Self {
        Self::run_scoped(RecordKind::Report, app, run)
    }

    pub fn artifact(app: impl Into<String>, run: impl Into<String>) -> Self {
        Self::run_scoped(RecordKind::Artifact, app, run)
    }

    pub fn run_scoped(kind: RecordKind, app: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            kind,
            app: app.into(),
            run: Some(run.into()),
        }
    }

    /// Keys double as path segments for the file store, so both components must be a
    /// single safe segment.
    pub fn validate(&self) -> Result<()> {
        validate_segment("application name", &self.app)?;
        match (&self.run, self.kind.is_run_scoped()) {
            (Some(run), true) => {
                validate_segment("run id", run)?;
                if run == METADATA_DIR_NAME {
                    return Err(StoreError::InvalidKey(format!(
                        "run id `{run}` is reserved"
                    )));
                }
                Ok(())
            }
            (None, true) => Err(StoreError::InvalidKey(format!(
                "{} record for `{}` needs a run id",
                self.kind.as_str(),
                self.app
            ))),
            (Some(_), false) => Err(StoreError::InvalidKey(format!(
                "{} record for `{}` cannot carry a run id",
                self.kind.as_str(),
                self.app
            ))),
            (None, false) => Ok(()),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.run {
            Some(run) => write!(f, "{}:{}/{}", self.kind.as_str(), self.app, run),
            None => write!(f, "{}:{}", self.kind.as_str(), self.app),
        }
    }
}

fn validate_segment(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StoreError::InvalidKey(format!("{what} is empty")));
    }
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(StoreError::InvalidKey(format!(
            "{what} `{value}` is not a single path segment"
        )));
    }
    Ok(())
}

/// Equality filter over top-level fields of a record payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: Vec<(String, Value)>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A missing field only matches an explicit `null`.
    pub fn matches(&self, payload: &Value) -> bool {
        self.fields.iter().all(|(field, expected)| {
            let actual = payload.get(field).unwrap_or(&Value::Null);
            actual == expected
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: RecordKey,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put(RecordKey, Value),
    Delete(RecordKey),
}

impl WriteOp {
    pub fn key(&self) -> &RecordKey {
        match self {
            Self::Put(key, _) | Self::Delete(key) => key,
        }
    }
}

/// Ordered set of writes applied together by [`crate::RecordStore::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: RecordKey, value: Value) -> &mut Self {
        self.ops.push(WriteOp::Put(key, value));
        self
    }

    pub fn delete(&mut self, key: RecordKey) -> &mut Self {
        self.ops.push(WriteOp::Delete(key));
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn validate(&self) -> Result<()> {
        self.ops.iter().try_for_each(|op| op.key().validate())
    }
}

impl IntoIterator for WriteBatch {
    type Item = WriteOp;
    type IntoIter = std::vec::IntoIter<WriteOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}
