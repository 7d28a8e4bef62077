use crate::evidence::LabelEvidenceStore;
use crate::model::{
    DocumentFinding, FindingsType, LoaderDetails, LoaderState, PerFileAggregate, RunCounters,
    DEFAULT_DATA_SOURCE, UNKNOWN,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Everything a run has accumulated so far. Persisted between ingest calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregationState {
    total_findings: u64,
    findings_entities: u64,
    findings_topics: u64,
    file_count: u64,
    snippet_count: u64,
    files: IndexMap<String, PerFileAggregate>,
    evidence: LabelEvidenceStore,
    loaders: Vec<LoaderState>,
}

impl AggregationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> RunCounters {
        RunCounters {
            total_findings: self.total_findings,
            findings_entities: self.findings_entities,
            findings_topics: self.findings_topics,
            file_count: self.file_count,
            snippet_count: self.snippet_count,
            snippet_counter: self.evidence.snippet_counter(),
            total_snippet_counter: self.evidence.total_snippet_counter(),
            data_source_count: self.loaders.len() as u64,
        }
    }

    /// Per-file aggregates in first-seen order.
    pub fn files(&self) -> &IndexMap<String, PerFileAggregate> {
        &self.files
    }

    pub fn evidence(&self) -> &LabelEvidenceStore {
        &self.evidence
    }

    pub fn loaders(&self) -> &[LoaderState] {
        &self.loaders
    }

    pub fn loader(&self, name: &str) -> Option<&LoaderState> {
        self.loaders.iter().find(|loader| loader.name == name)
    }

    /// Registers a loader or refreshes the location and size of a known one.
    /// Files already attributed to the loader are kept.
    pub fn upsert_loader(&mut self, details: &LoaderDetails, now_unix_ms: u64) {
        match self.loaders.iter_mut().find(|l| l.name == details.name) {
            Some(loader) => {
                loader.source_path = details.source_path.clone();
                loader.source_type = details.source_type.clone();
                loader.source_size = details.source_size();
                loader.last_modified_unix_ms = now_unix_ms;
            }
            None => self.loaders.push(LoaderState {
                name: details.name.clone(),
                source_path: details.source_path.clone(),
                source_type: details.source_type.clone(),
                source_size: details.source_size(),
                source_files: IndexMap::new(),
                last_modified_unix_ms: now_unix_ms,
            }),
        }
    }
}

/// Folds classified documents into an [`AggregationState`], one at a time.
#[derive(Debug, Clone)]
pub struct FindingsAccumulator {
    state: AggregationState,
    snippet_limit: usize,
}

impl FindingsAccumulator {
    pub fn new(snippet_limit: usize) -> Self {
        Self::resume(AggregationState::new(), snippet_limit)
    }

    /// Continues a run from a previously persisted state.
    pub fn resume(state: AggregationState, snippet_limit: usize) -> Self {
        Self {
            state,
            snippet_limit,
        }
    }

    pub fn upsert_loader(&mut self, details: &LoaderDetails, now_unix_ms: u64) {
        self.state.upsert_loader(details, now_unix_ms);
    }

    /// Adds one document to the run and attributes its totals to the data source
    /// named by `loader`, or to [`DEFAULT_DATA_SOURCE`] when there is none. Unknown
    /// names are registered on the spot, so every file belongs to some data source.
    pub fn fold(&mut self, doc: &DocumentFinding, loader: Option<&str>) {
        let entities = doc.entity_count();
        let topics = doc.topic_count();
        let findings = entities + topics;
        let state = &mut self.state;

        match state.files.get_mut(&doc.source_path) {
            Some(file) => {
                file.findings_entities += entities;
                file.findings_topics += topics;
                file.findings += findings;
            }
            None => {
                state.files.insert(
                    doc.source_path.clone(),
                    PerFileAggregate {
                        findings_entities: entities,
                        findings_topics: topics,
                        findings,
                        file_owner: (!doc.file_owner.is_empty()).then(|| doc.file_owner.clone()),
                        source_size: Some(doc.source_size),
                    },
                );
                state.file_count += 1;
            }
        }

        state.total_findings += findings;
        state.findings_entities += entities;
        state.findings_topics += topics;
        state.snippet_count += 1;

        for (label, count) in &doc.entities {
            state
                .evidence
                .update(label, *count, doc, FindingsType::Entities, self.snippet_limit);
        }
        for (label, count) in &doc.topics {
            state
                .evidence
                .update(label, *count, doc, FindingsType::Topics, self.snippet_limit);
        }

        let name = loader.unwrap_or(DEFAULT_DATA_SOURCE);
        let index = match state.loaders.iter().position(|l| l.name == name) {
            Some(index) => index,
            None => {
                log::debug!("Attributing {} to unregistered data source {name}", doc.source_path);
                state.loaders.push(LoaderState {
                    name: name.to_string(),
                    source_path: UNKNOWN.to_string(),
                    source_type: UNKNOWN.to_string(),
                    ..LoaderState::default()
                });
                state.loaders.len() - 1
            }
        };
        let file = state.loaders[index]
            .source_files
            .entry(doc.source_path.clone())
            .or_default();
        file.findings_entities += entities;
        file.findings_topics += topics;
        file.findings += findings;

        log::debug!(
            "Folded {} ({} findings, run total {})",
            doc.source_path,
            findings,
            state.total_findings
        );
    }

    pub fn state(&self) -> &AggregationState {
        &self.state
    }

    pub fn into_state(self) -> AggregationState {
        self.state
    }
}
