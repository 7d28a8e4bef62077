use crate::accumulator::AggregationState;
use crate::model::{
    DataSourceRecord, LabelAggregate, LoaderState, PerFileAggregate, ReportSummary, TopFinding,
    UNKNOWN,
};
use indexmap::{IndexMap, IndexSet};

/// Distinct files, across all data sources, with at least one finding.
pub fn files_with_findings(loaders: &[LoaderState]) -> u64 {
    loaders
        .iter()
        .flat_map(|loader| loader.source_files.iter())
        .filter(|(_, totals)| totals.findings > 0)
        .map(|(path, _)| path.as_str())
        .collect::<IndexSet<_>>()
        .len() as u64
}

/// The `n` files with the most findings. Ties keep first-seen order.
pub fn top_n(files: &IndexMap<String, PerFileAggregate>, n: usize) -> Vec<TopFinding> {
    let mut ranked: Vec<_> = files.iter().collect();
    ranked.sort_by(|(_, a), (_, b)| b.findings.cmp(&a.findings));
    ranked
        .into_iter()
        .take(n)
        .map(|(path, file)| TopFinding {
            file_name: path.clone(),
            file_owner: file
                .file_owner
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            source_size: file.source_size.unwrap_or_default(),
            findings_entities: file.findings_entities,
            findings_topics: file.findings_topics,
            findings: file.findings,
        })
        .collect()
}

/// One record per loader. Label aggregates and snippet counters are run-wide, so
/// every data source carries the same label lists.
pub fn data_source_summaries(state: &AggregationState) -> Vec<DataSourceRecord> {
    let counters = state.counters();
    let labels: Vec<&LabelAggregate> = state.evidence().labels().collect();
    state
        .loaders()
        .iter()
        .map(|loader| DataSourceRecord {
            name: loader.name.clone(),
            source_path: loader.source_path.clone(),
            source_type: loader.source_type.clone(),
            source_size: loader.source_size,
            total_snippet_count: counters.total_snippet_counter,
            displayed_snippet_count: counters.snippet_counter,
            findings_summary: labels.iter().map(|label| label.summary()).collect(),
            findings_details: labels.iter().map(|label| label.detail()).collect(),
        })
        .collect()
}

pub fn report_summary(state: &AggregationState, owner: &str, now_unix_ms: u64) -> ReportSummary {
    ReportSummary {
        counters: state.counters(),
        files_with_findings: files_with_findings(state.loaders()),
        owner: owner.to_string(),
        created_at_unix_ms: now_unix_ms,
    }
}
