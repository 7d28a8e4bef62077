use crate::model::{HistoryEntry, LoadHistory, UNKNOWN};
use findings_store::{RecordKey, RecordStore};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredReport {
    report_summary: StoredSummary,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSummary {
    total_findings: u64,
    files_with_findings: u64,
    created_at_unix_ms: u64,
}

/// Builds the "previous runs" section of a report from finished runs in the store.
pub struct HistoryCompiler<'a> {
    store: &'a dyn RecordStore,
    limit: usize,
}

impl<'a> HistoryCompiler<'a> {
    pub fn new(store: &'a dyn RecordStore, limit: usize) -> Self {
        Self { store, limit }
    }

    /// Walks `run_ids` newest first, skipping `current_run` and any run without a
    /// readable report and artifact. Keeps at most `limit` entries; when more valid
    /// runs exist, `more_reports_path` points at the application.
    pub async fn compile(&self, app: &str, run_ids: &[String], current_run: &str) -> LoadHistory {
        let mut history = Vec::with_capacity(self.limit);
        let mut has_more = false;

        for run_id in run_ids.iter().rev() {
            if run_id == current_run {
                continue;
            }
            let Some(entry) = self.entry(app, run_id).await else {
                continue;
            };
            if history.len() == self.limit {
                has_more = true;
                break;
            }
            history.push(entry);
        }

        LoadHistory {
            history,
            more_reports_path: if has_more {
                self.store.app_locator(app)
            } else {
                UNKNOWN.to_string()
            },
        }
    }

    async fn entry(&self, app: &str, run_id: &str) -> Option<HistoryEntry> {
        let report_key = RecordKey::report(app, run_id);
        let report = match self.store.get(&report_key).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                log::debug!("No report for {report_key}, skipping in history");
                return None;
            }
            Err(err) => {
                log::warn!("Unreadable report {report_key}: {err}");
                return None;
            }
        };
        let report: StoredReport = match serde_json::from_value(report) {
            Ok(report) => report,
            Err(err) => {
                log::warn!("Malformed report {report_key}: {err}");
                return None;
            }
        };

        let artifact_key = RecordKey::artifact(app, run_id);
        match self.store.get(&artifact_key).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                log::warn!("Report {report_key} has no rendered artifact, skipping in history");
                return None;
            }
            Err(err) => {
                log::warn!("Unreadable artifact {artifact_key}: {err}");
                return None;
            }
        }

        Some(HistoryEntry {
            load_id: run_id.to_string(),
            report_name: self.store.locate(&artifact_key),
            findings: report.report_summary.total_findings,
            files_with_findings: report.report_summary.files_with_findings,
            generated_on_unix_ms: report.report_summary.created_at_unix_ms,
        })
    }
}
