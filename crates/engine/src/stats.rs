use serde::{Deserialize, Serialize};

/// Statistics about one ingest call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStats {
    /// Documents received
    pub documents: usize,

    /// Documents sent to the classifier
    pub classified: usize,

    /// Findings contributed by this call
    pub findings: u64,

    /// Time taken in milliseconds
    pub time_ms: u64,

    /// Classification failures, one message per document
    pub errors: Vec<String>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&mut self, classified: bool, findings: u64) {
        self.documents += 1;
        if classified {
            self.classified += 1;
        }
        self.findings += findings;
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn failures(&self) -> usize {
        self.errors.len()
    }
}
