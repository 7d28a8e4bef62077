use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Label name to occurrence count, in classifier order.
pub type LabelCounts = IndexMap<String, u64>;

/// Placeholder used for unknown owners, descriptions and history pointers.
pub const UNKNOWN: &str = "-";

/// Data source that files are attributed to when a batch names no loader.
pub const DEFAULT_DATA_SOURCE: &str = "default";

fn label_total(labels: &LabelCounts) -> u64 {
    labels.values().sum()
}

/// Labels detected in one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Classification {
    pub entities: LabelCounts,
    pub topics: LabelCounts,
    /// Document text with detected entities masked, when the classifier provides it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymized_text: Option<String>,
}

impl Classification {
    pub fn entity_count(&self) -> u64 {
        label_total(&self.entities)
    }

    pub fn topic_count(&self) -> u64 {
        label_total(&self.topics)
    }

    pub fn total(&self) -> u64 {
        self.entity_count() + self.topic_count()
    }
}

/// A classified document, ready to be folded into the run state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFinding {
    pub source_path: String,
    pub file_owner: String,
    pub source_size: u64,
    pub entities: LabelCounts,
    pub topics: LabelCounts,
    /// Text kept only as evidence. Masked when anonymization is on.
    pub text: String,
}

impl DocumentFinding {
    /// With `anonymize` set, the classifier's masked text replaces the raw document
    /// as evidence. Falls back to the raw text when no masked text was produced.
    pub fn new(doc: &InputDocument, classification: Classification, anonymize: bool) -> Self {
        let text = match classification.anonymized_text {
            Some(masked) if anonymize => masked,
            _ => doc.doc.clone(),
        };
        Self {
            source_path: doc.source_path.clone(),
            file_owner: doc.file_owner.clone(),
            source_size: doc.source_path_size,
            entities: classification.entities,
            topics: classification.topics,
            text,
        }
    }

    pub fn entity_count(&self) -> u64 {
        label_total(&self.entities)
    }

    pub fn topic_count(&self) -> u64 {
        label_total(&self.topics)
    }

    pub fn findings(&self) -> u64 {
        self.entity_count() + self.topic_count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingsType {
    Entities,
    Topics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub snippet: String,
    pub source_path: String,
    pub file_owner: String,
}

/// Running totals for one label across the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelAggregate {
    pub label_name: String,
    pub findings_type: FindingsType,
    pub findings: u64,
    pub snippet_count: u64,
    pub file_count: u64,
    #[serde(default)]
    pub unique_source_paths: IndexSet<String>,
    #[serde(default)]
    pub snippets: Vec<Snippet>,
}

impl LabelAggregate {
    pub fn summary(&self) -> LabelSummary {
        LabelSummary {
            label_name: self.label_name.clone(),
            findings_type: self.findings_type,
            findings: self.findings,
            snippet_count: self.snippet_count,
            file_count: self.file_count,
        }
    }

    pub fn detail(&self) -> LabelDetail {
        LabelDetail {
            label_name: self.label_name.clone(),
            findings_type: self.findings_type,
            findings: self.findings,
            snippet_count: self.snippet_count,
            file_count: self.file_count,
            snippets: self.snippets.clone(),
        }
    }
}

/// Report view of a label without evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSummary {
    pub label_name: String,
    pub findings_type: FindingsType,
    pub findings: u64,
    pub snippet_count: u64,
    pub file_count: u64,
}

/// Report view of a label with its displayed evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelDetail {
    pub label_name: String,
    pub findings_type: FindingsType,
    pub findings: u64,
    pub snippet_count: u64,
    pub file_count: u64,
    pub snippets: Vec<Snippet>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerFileAggregate {
    pub findings_entities: u64,
    pub findings_topics: u64,
    pub findings: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_size: Option<u64>,
}

/// Flat run totals as they appear in the report summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCounters {
    pub total_findings: u64,
    pub findings_entities: u64,
    pub findings_topics: u64,
    pub file_count: u64,
    pub snippet_count: u64,
    pub snippet_counter: u64,
    pub total_snippet_counter: u64,
    pub data_source_count: u64,
}

/// Per-file totals contributed through one loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFindings {
    pub findings_entities: u64,
    pub findings_topics: u64,
    pub findings: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderState {
    pub name: String,
    pub source_path: String,
    pub source_type: String,
    pub source_size: u64,
    #[serde(default)]
    pub source_files: IndexMap<String, FileFindings>,
    pub last_modified_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceRecord {
    pub name: String,
    pub source_path: String,
    pub source_type: String,
    pub source_size: u64,
    pub total_snippet_count: u64,
    pub displayed_snippet_count: u64,
    pub findings_summary: Vec<LabelSummary>,
    pub findings_details: Vec<LabelDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopFinding {
    pub file_name: String,
    pub file_owner: String,
    pub source_size: u64,
    pub findings_entities: u64,
    pub findings_topics: u64,
    pub findings: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    #[serde(flatten)]
    pub counters: RunCounters,
    pub files_with_findings: u64,
    pub owner: String,
    pub created_at_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub load_id: String,
    pub report_name: String,
    pub findings: u64,
    pub files_with_findings: u64,
    pub generated_on_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadHistory {
    pub history: Vec<HistoryEntry>,
    pub more_reports_path: String,
}

impl Default for LoadHistory {
    fn default() -> Self {
        Self {
            history: Vec::new(),
            more_reports_path: UNKNOWN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<FrameworkInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_details: Option<InstanceDetails>,
    pub report_summary: ReportSummary,
    pub top_findings: Vec<TopFinding>,
    pub data_sources: Vec<DataSourceRecord>,
    pub load_history: LoadHistory,
}

/// Framework the loading application runs on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// Where the loading application runs. Passed through to the report untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceDetails {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub host: Option<String>,
    pub path: Option<String>,
    pub runtime: Option<String>,
    pub ip: Option<String>,
    pub language: Option<String>,
    pub language_version: Option<String>,
    pub platform: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
}

/// Application metadata, created on first ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRecord {
    pub name: String,
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<FrameworkInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_details: Option<InstanceDetails>,
    /// Registration order, oldest first.
    #[serde(default)]
    pub run_ids: Vec<String>,
    pub created_at_unix_ms: u64,
    pub modified_at_unix_ms: u64,
}

impl AppRecord {
    pub fn new(name: impl Into<String>, now_unix_ms: u64) -> Self {
        Self {
            name: name.into(),
            owner: UNKNOWN.to_string(),
            description: None,
            framework: None,
            instance_details: None,
            run_ids: Vec::new(),
            created_at_unix_ms: now_unix_ms,
            modified_at_unix_ms: now_unix_ms,
        }
    }

    /// Appends `run_id` unless it is already registered. Returns true when appended.
    pub fn register_run(&mut self, run_id: &str, now_unix_ms: u64) -> bool {
        self.modified_at_unix_ms = now_unix_ms;
        if self.run_ids.iter().any(|id| id == run_id) {
            return false;
        }
        self.run_ids.push(run_id.to_string());
        true
    }
}

/// One document as submitted by a loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputDocument {
    pub doc: String,
    pub source_path: String,
    pub file_owner: String,
    pub source_path_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderDetails {
    #[serde(alias = "loader")]
    pub name: String,
    pub source_path: String,
    pub source_type: String,
    pub source_path_size: Option<u64>,
    pub source_aggregate_size: Option<u64>,
}

impl LoaderDetails {
    /// Explicit path size wins over the aggregate size of a directory source.
    pub fn source_size(&self) -> u64 {
        self.source_path_size
            .or(self.source_aggregate_size)
            .unwrap_or_default()
    }
}

/// One ingest call: a slice of a run's documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestBatch {
    #[serde(alias = "name")]
    pub app_name: String,
    #[serde(alias = "load_id")]
    pub run_id: String,
    pub owner: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "loader_details")]
    pub loader: Option<LoaderDetails>,
    pub framework: Option<FrameworkInfo>,
    #[serde(alias = "instanceDetails")]
    pub instance_details: Option<InstanceDetails>,
    /// Overrides `reports.anonymize_snippets` for this batch.
    #[serde(alias = "anonymizeSnippets")]
    pub anonymize_snippets: Option<bool>,
    pub docs: Vec<InputDocument>,
    pub loading_end: bool,
}
