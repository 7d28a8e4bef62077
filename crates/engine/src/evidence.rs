use crate::model::{DocumentFinding, FindingsType, LabelAggregate, Snippet};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Per-label aggregates plus the run-wide evidence budget.
///
/// Both label spaces share one map, keyed by label name. Evidence is displayed
/// first-come: once `snippet_counter` reaches the limit no label receives more
/// snippets, while `total_snippet_counter` keeps counting every (document, label)
/// pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelEvidenceStore {
    labels: IndexMap<String, LabelAggregate>,
    snippet_counter: u64,
    total_snippet_counter: u64,
}

impl LabelEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(
        &mut self,
        label: &str,
        count: u64,
        doc: &DocumentFinding,
        findings_type: FindingsType,
        snippet_limit: usize,
    ) {
        let aggregate = self
            .labels
            .entry(label.to_string())
            .and_modify(|agg| {
                agg.findings += count;
                agg.snippet_count += 1;
                agg.unique_source_paths.insert(doc.source_path.clone());
                agg.file_count = agg.unique_source_paths.len() as u64;
            })
            .or_insert_with(|| LabelAggregate {
                label_name: label.to_string(),
                findings_type,
                findings: count,
                snippet_count: 1,
                file_count: 1,
                unique_source_paths: IndexSet::from([doc.source_path.clone()]),
                snippets: Vec::new(),
            });

        if self.snippet_counter < snippet_limit as u64 {
            aggregate.snippets.push(Snippet {
                snippet: doc.text.clone(),
                source_path: doc.source_path.clone(),
                file_owner: doc.file_owner.clone(),
            });
            self.snippet_counter += 1;
        }
        self.total_snippet_counter += 1;
    }

    pub fn get(&self, label: &str) -> Option<&LabelAggregate> {
        self.labels.get(label)
    }

    /// Labels in first-seen order.
    pub fn labels(&self) -> impl Iterator<Item = &LabelAggregate> {
        self.labels.values()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Displayed snippets across all labels.
    pub fn snippet_counter(&self) -> u64 {
        self.snippet_counter
    }

    pub fn total_snippet_counter(&self) -> u64 {
        self.total_snippet_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(path: &str, text: &str) -> DocumentFinding {
        DocumentFinding {
            source_path: path.to_string(),
            file_owner: "root".to_string(),
            text: text.to_string(),
            ..DocumentFinding::default()
        }
    }

    #[test]
    fn first_sighting_seeds_the_aggregate() {
        let mut store = LabelEvidenceStore::new();
        store.update("us-ssn", 2, &doc("a.csv", "ssn"), FindingsType::Entities, 10);

        let agg = store.get("us-ssn").expect("label");
        assert_eq!(agg.findings, 2);
        assert_eq!(agg.snippet_count, 1);
        assert_eq!(agg.file_count, 1);
        assert_eq!(agg.findings_type, FindingsType::Entities);
        assert_eq!(
            agg.snippets,
            vec![Snippet {
                snippet: "ssn".into(),
                source_path: "a.csv".into(),
                file_owner: "root".into(),
            }]
        );
    }

    #[test]
    fn repeated_paths_do_not_inflate_file_count() {
        let mut store = LabelEvidenceStore::new();
        for path in ["a.csv", "a.csv", "b.csv", "a.csv"] {
            store.update("x", 1, &doc(path, "t"), FindingsType::Topics, 10);
        }
        let agg = store.get("x").expect("label");
        assert_eq!(agg.findings, 4);
        assert_eq!(agg.snippet_count, 4);
        assert_eq!(agg.file_count, 2);
    }

    #[test]
    fn evidence_budget_is_shared_across_labels() {
        let mut store = LabelEvidenceStore::new();
        store.update("a", 1, &doc("1", "one"), FindingsType::Entities, 2);
        store.update("b", 1, &doc("2", "two"), FindingsType::Entities, 2);
        store.update("a", 1, &doc("3", "three"), FindingsType::Entities, 2);
        store.update("c", 1, &doc("4", "four"), FindingsType::Topics, 2);

        assert_eq!(store.snippet_counter(), 2);
        assert_eq!(store.total_snippet_counter(), 4);
        assert_eq!(store.get("a").expect("a").snippets.len(), 1);
        assert_eq!(store.get("b").expect("b").snippets.len(), 1);
        assert!(store.get("c").expect("c").snippets.is_empty());
    }

    #[test]
    fn zero_limit_displays_nothing() {
        let mut store = LabelEvidenceStore::new();
        store.update("a", 1, &doc("1", "one"), FindingsType::Entities, 0);
        assert_eq!(store.snippet_counter(), 0);
        assert_eq!(store.total_snippet_counter(), 1);
    }
}
