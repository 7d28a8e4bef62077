use async_trait::async_trait;
use findings_engine::{
    AppRecord, Classification, EngineConfig, FindingsError, FrameworkInfo, IngestBatch,
    IngestPipeline, InputDocument, InstanceDetails, LoaderDetails, Report, ReportsConfig,
    StorageKind, DEFAULT_DATA_SOURCE,
};
use findings_store::{
    AppGuard, FileStore, Filter, MemoryStore, RecordKey, RecordKind, RecordStore, StoreError,
    StoredRecord, WriteBatch,
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

/// Counts "ssn" words as entities and "secret" words as topics; "boom" fails.
fn keyword_classifier(text: &str) -> findings_engine::Result<Classification> {
    if text.contains("boom") {
        return Err(FindingsError::ClassificationError("classifier crashed".into()));
    }
    let mut classification = Classification::default();
    let ssn = text.matches("ssn").count() as u64;
    if ssn > 0 {
        classification.entities.insert("us-ssn".into(), ssn);
    }
    let secret = text.matches("secret").count() as u64;
    if secret > 0 {
        classification.topics.insert("harmful-advice".into(), secret);
    }
    Ok(classification)
}

fn pipeline(store: Arc<dyn RecordStore>, reports: ReportsConfig) -> IngestPipeline {
    IngestPipeline::new(store, Arc::new(keyword_classifier), reports)
}

fn doc(path: &str, text: &str) -> InputDocument {
    InputDocument {
        doc: text.to_string(),
        source_path: path.to_string(),
        file_owner: "alice".to_string(),
        source_path_size: 128,
    }
}

fn batch(run: &str, docs: Vec<InputDocument>, loading_end: bool) -> IngestBatch {
    IngestBatch {
        app_name: "support-bot".into(),
        run_id: run.into(),
        owner: Some("ops".into()),
        description: Some("Support assistant".into()),
        loader: Some(LoaderDetails {
            name: "CSVLoader".into(),
            source_path: "/data".into(),
            source_type: "directory".into(),
            source_path_size: None,
            source_aggregate_size: Some(4096),
        }),
        docs,
        loading_end,
        ..IngestBatch::default()
    }
}

fn sample_docs() -> Vec<InputDocument> {
    vec![
        doc("a.csv", "ssn 123-45-6789"),
        doc("b.csv", "a secret plan"),
        doc("a.csv", "ssn and ssn"),
        doc("c.csv", "nothing here"),
    ]
}

#[tokio::test]
async fn finished_run_is_persisted_to_the_file_tree() {
    let temp = TempDir::new().expect("tempdir");
    let store: Arc<dyn RecordStore> = Arc::new(FileStore::new(temp.path()));
    let outcome = pipeline(store.clone(), ReportsConfig::default())
        .ingest(batch("run-1", sample_docs(), true))
        .await
        .expect("ingest");

    assert!(outcome.finalized);
    assert_eq!(outcome.stats.documents, 4);
    assert_eq!(outcome.stats.findings, 4);

    let report = &outcome.report;
    assert_eq!(report.name, "support-bot");
    assert_eq!(report.description, "Support assistant");
    let summary = &report.report_summary;
    assert_eq!(summary.counters.total_findings, 4);
    assert_eq!(summary.counters.findings_entities, 3);
    assert_eq!(summary.counters.findings_topics, 1);
    assert_eq!(summary.counters.file_count, 3);
    assert_eq!(summary.counters.snippet_count, 4);
    assert_eq!(summary.counters.data_source_count, 1);
    assert_eq!(summary.files_with_findings, 2);
    assert_eq!(summary.owner, "ops");

    let top: Vec<_> = report
        .top_findings
        .iter()
        .map(|t| (t.file_name.as_str(), t.findings))
        .collect();
    assert_eq!(top, vec![("a.csv", 3), ("b.csv", 1), ("c.csv", 0)]);

    let source = &report.data_sources[0];
    assert_eq!(source.name, "CSVLoader");
    assert_eq!(source.source_size, 4096);
    let ssn = source
        .findings_summary
        .iter()
        .find(|l| l.label_name == "us-ssn")
        .expect("us-ssn label");
    assert_eq!((ssn.findings, ssn.file_count, ssn.snippet_count), (3, 1, 2));

    let run_dir = temp.path().join("support-bot").join("run-1");
    assert!(run_dir.join("state.json").is_file());
    let stored: Report = serde_json::from_slice(
        &std::fs::read(run_dir.join("report.json")).expect("read report"),
    )
    .expect("decode report");
    assert_eq!(&stored, report);
    let rendered = std::fs::read_to_string(run_dir.join("report.rendered")).expect("artifact");
    let rendered: Report = serde_json::from_str(&rendered).expect("decode artifact");
    assert_eq!(&rendered, report);

    let app: AppRecord = serde_json::from_value(
        store
            .get(&RecordKey::app("support-bot"))
            .await
            .expect("get app")
            .expect("app record"),
    )
    .expect("decode app");
    assert_eq!(app.run_ids, vec!["run-1".to_string()]);
    assert_eq!(app.owner, "ops");
}

#[tokio::test]
async fn resumed_run_matches_a_single_call() {
    let docs = sample_docs();
    let single_store = Arc::new(MemoryStore::new());
    let single = pipeline(single_store, ReportsConfig::default())
        .ingest(batch("run-1", docs.clone(), true))
        .await
        .expect("single ingest");

    let split_store = Arc::new(MemoryStore::new());
    let split = pipeline(split_store.clone(), ReportsConfig::default());
    let first = split
        .ingest(batch("run-1", docs[..2].to_vec(), false))
        .await
        .expect("first half");
    assert!(!first.finalized);
    assert_eq!(
        split_store
            .get(&RecordKey::report("support-bot", "run-1"))
            .await
            .expect("get report"),
        None
    );
    let second = split
        .ingest(batch("run-1", docs[2..].to_vec(), true))
        .await
        .expect("second half");

    assert_eq!(second.report.report_summary.counters, single.report.report_summary.counters);
    assert_eq!(second.report.top_findings, single.report.top_findings);
    assert_eq!(second.report.data_sources, single.report.data_sources);
    assert!(split_store
        .get(&RecordKey::artifact("support-bot", "run-1"))
        .await
        .expect("get artifact")
        .is_some());
}

#[tokio::test]
async fn classification_failure_counts_as_zero_findings() {
    let store = Arc::new(MemoryStore::new());
    let outcome = pipeline(store, ReportsConfig::default())
        .ingest(batch(
            "run-1",
            vec![
                doc("a.csv", "boom"),
                doc("b.csv", ""),
                doc("c.csv", "ssn"),
            ],
            true,
        ))
        .await
        .expect("ingest");

    assert_eq!(outcome.stats.documents, 3);
    assert_eq!(outcome.stats.classified, 2);
    assert_eq!(outcome.stats.failures(), 1);
    assert!(outcome.stats.errors[0].starts_with("a.csv: "));
    let counters = outcome.report.report_summary.counters;
    assert_eq!(counters.total_findings, 1);
    assert_eq!(counters.snippet_count, 3);
    assert_eq!(counters.file_count, 3);
}

/// Delegates reads to memory and refuses every write.
struct ReadOnlyStore {
    inner: MemoryStore,
}

#[async_trait]
impl RecordStore for ReadOnlyStore {
    async fn get(&self, key: &RecordKey) -> findings_store::Result<Option<Value>> {
        self.inner.get(key).await
    }

    async fn list(
        &self,
        kind: RecordKind,
        app: Option<&str>,
        filter: &Filter,
    ) -> findings_store::Result<Vec<StoredRecord>> {
        self.inner.list(kind, app, filter).await
    }

    async fn apply(&self, _batch: WriteBatch) -> findings_store::Result<()> {
        Err(StoreError::Other("disk full".into()))
    }

    async fn lock_app(&self, app: &str) -> findings_store::Result<AppGuard> {
        self.inner.lock_app(app).await
    }

    fn locate(&self, key: &RecordKey) -> String {
        self.inner.locate(key)
    }

    fn app_locator(&self, app: &str) -> String {
        self.inner.app_locator(app)
    }
}

#[tokio::test]
async fn failed_commit_surfaces_and_writes_nothing() {
    let store = Arc::new(ReadOnlyStore {
        inner: MemoryStore::new(),
    });
    let err = pipeline(store.clone(), ReportsConfig::default())
        .ingest(batch("run-1", sample_docs(), true))
        .await
        .expect_err("commit must fail");
    assert!(matches!(err, FindingsError::StoreError(_)));
    assert!(store.inner.is_empty().await);
}

#[tokio::test]
async fn history_lists_previous_finished_runs() {
    let store = Arc::new(MemoryStore::new());
    let reports = ReportsConfig {
        load_history_limit: 2,
        ..ReportsConfig::default()
    };
    let engine = pipeline(store.clone(), reports);

    for run in ["run-1", "run-2", "run-3"] {
        engine
            .ingest(batch(run, vec![doc("a.csv", "ssn")], true))
            .await
            .expect("ingest");
    }
    // Unfinished runs never show up in history.
    engine
        .ingest(batch("run-4", vec![doc("a.csv", "ssn")], false))
        .await
        .expect("partial ingest");

    let exact = engine
        .ingest(batch("run-5", vec![], true))
        .await
        .expect("ingest run-5");
    let loads: Vec<_> = exact
        .report
        .load_history
        .history
        .iter()
        .map(|h| h.load_id.as_str())
        .collect();
    assert_eq!(loads, vec!["run-3", "run-2"]);
    assert_eq!(exact.report.load_history.more_reports_path, "memory://app:support-bot");
    assert_eq!(exact.report.load_history.history[0].findings, 1);
    assert_eq!(
        exact.report.load_history.history[0].report_name,
        "memory://artifact:support-bot/run-3"
    );

    store
        .delete(&RecordKey::artifact("support-bot", "run-1"))
        .await
        .expect("delete artifact");
    let trimmed = engine
        .ingest(batch("run-6", vec![], true))
        .await
        .expect("ingest run-6");
    let loads: Vec<_> = trimmed
        .report
        .load_history
        .history
        .iter()
        .map(|h| h.load_id.as_str())
        .collect();
    assert_eq!(loads, vec!["run-5", "run-3"]);
    assert_eq!(trimmed.report.load_history.more_reports_path, "memory://app:support-bot");

    store
        .delete(&RecordKey::report("support-bot", "run-2"))
        .await
        .expect("delete report");
    store
        .delete(&RecordKey::artifact("support-bot", "run-6"))
        .await
        .expect("delete artifact");
    let bounded = engine
        .ingest(batch("run-7", vec![], true))
        .await
        .expect("ingest run-7");
    let loads: Vec<_> = bounded
        .report
        .load_history
        .history
        .iter()
        .map(|h| h.load_id.as_str())
        .collect();
    assert_eq!(loads, vec!["run-5", "run-3"]);
    assert_eq!(bounded.report.load_history.more_reports_path, "-");
}

#[tokio::test]
async fn concurrent_runs_of_one_application_keep_both_run_ids() {
    let temp = TempDir::new().expect("tempdir");
    let store: Arc<dyn RecordStore> = Arc::new(FileStore::new(temp.path()));
    let left = pipeline(store.clone(), ReportsConfig::default());
    let right = pipeline(store.clone(), ReportsConfig::default());

    let (a, b) = tokio::join!(
        left.ingest(batch("run-a", vec![doc("a.csv", "ssn")], true)),
        right.ingest(batch("run-b", vec![doc("b.csv", "secret")], true)),
    );
    a.expect("run-a");
    b.expect("run-b");

    let app: AppRecord = serde_json::from_value(
        store
            .get(&RecordKey::app("support-bot"))
            .await
            .expect("get app")
            .expect("app record"),
    )
    .expect("decode app");
    let mut runs = app.run_ids.clone();
    runs.sort();
    assert_eq!(runs, vec!["run-a".to_string(), "run-b".to_string()]);
}

#[tokio::test]
async fn sqlite_backend_runs_the_same_flow() {
    let temp = TempDir::new().expect("tempdir");
    let mut config = EngineConfig::default();
    config.storage.kind = StorageKind::Db;
    config.storage.location = temp.path().display().to_string();
    config.reports.load_history_limit = 1;
    let store = config.open_store().await.expect("open sqlite");
    let engine = pipeline(store.clone(), config.reports);

    for run in ["run-1", "run-2"] {
        engine
            .ingest(batch(run, sample_docs(), true))
            .await
            .expect("ingest");
    }
    let last = engine
        .ingest(batch("run-3", sample_docs(), true))
        .await
        .expect("ingest run-3");

    assert_eq!(last.report.load_history.history.len(), 1);
    assert_eq!(last.report.load_history.history[0].load_id, "run-2");
    assert!(last
        .report
        .load_history
        .more_reports_path
        .starts_with("sqlite://"));

    let finished = store
        .list(
            RecordKind::Report,
            Some("support-bot"),
            &Filter::new().eq("name", "support-bot"),
        )
        .await
        .expect("list reports");
    assert_eq!(finished.len(), 3);
}

#[tokio::test]
async fn loader_less_batches_use_the_default_data_source() {
    let store = Arc::new(MemoryStore::new());
    let single = pipeline(store.clone(), ReportsConfig::default())
        .ingest(IngestBatch {
            loader: None,
            ..batch("run-1", vec![doc("a.csv", "ssn")], true)
        })
        .await
        .expect("ingest");

    let summary = &single.report.report_summary;
    assert_eq!(summary.counters.total_findings, 1);
    assert_eq!(summary.counters.file_count, 1);
    assert_eq!(summary.files_with_findings, 1);
    assert_eq!(summary.counters.data_source_count, 1);
    assert_eq!(single.report.data_sources.len(), 1);
    assert_eq!(single.report.data_sources[0].name, DEFAULT_DATA_SOURCE);
    assert_eq!(single.report.top_findings.len(), 1);

    let many = pipeline(store, ReportsConfig::default())
        .ingest(IngestBatch {
            loader: None,
            ..batch("run-2", sample_docs(), true)
        })
        .await
        .expect("ingest");
    assert_eq!(many.report.report_summary.files_with_findings, 2);
    assert_eq!(many.report.report_summary.counters.total_findings, 4);
}

fn masking_classifier(text: &str) -> findings_engine::Result<Classification> {
    let mut classification = keyword_classifier(text)?;
    classification.anonymized_text = Some(text.replace("123-45-6789", "<US_SSN>"));
    Ok(classification)
}

fn first_snippet(report: &Report) -> String {
    report.data_sources[0].findings_details[0].snippets[0]
        .snippet
        .clone()
}

#[tokio::test]
async fn anonymized_text_replaces_raw_evidence() {
    let store = Arc::new(MemoryStore::new());
    let reports = ReportsConfig {
        anonymize_snippets: true,
        ..ReportsConfig::default()
    };
    let engine = IngestPipeline::new(store.clone(), Arc::new(masking_classifier), reports);

    let masked = engine
        .ingest(batch("run-1", vec![doc("a.csv", "ssn 123-45-6789")], true))
        .await
        .expect("ingest");
    assert_eq!(first_snippet(&masked.report), "ssn <US_SSN>");
    assert_eq!(masked.report.report_summary.counters.total_findings, 1);

    let raw = engine
        .ingest(IngestBatch {
            anonymize_snippets: Some(false),
            ..batch("run-2", vec![doc("a.csv", "ssn 123-45-6789")], true)
        })
        .await
        .expect("ingest");
    assert_eq!(first_snippet(&raw.report), "ssn 123-45-6789");

    let plain = IngestPipeline::new(store, Arc::new(masking_classifier), ReportsConfig::default())
        .ingest(batch("run-3", vec![doc("a.csv", "ssn 123-45-6789")], true))
        .await
        .expect("ingest");
    assert_eq!(first_snippet(&plain.report), "ssn 123-45-6789");
}

#[tokio::test]
async fn framework_and_instance_details_reach_the_report() {
    let store = Arc::new(MemoryStore::new());
    let engine = pipeline(store.clone(), ReportsConfig::default());
    engine
        .ingest(IngestBatch {
            framework: Some(FrameworkInfo {
                name: Some("langchain".into()),
                version: Some("0.2.35".into()),
            }),
            instance_details: Some(InstanceDetails {
                kind: Some("desktop".into()),
                host: Some("ops-mbp".into()),
                language: Some("python".into()),
                ..InstanceDetails::default()
            }),
            ..batch("run-1", vec![doc("a.csv", "ssn")], false)
        })
        .await
        .expect("first batch");
    // Later batches without metadata keep what the application registered.
    let outcome = engine
        .ingest(batch("run-1", vec![doc("b.csv", "secret")], true))
        .await
        .expect("final batch");

    let framework = outcome.report.framework.as_ref().expect("framework");
    assert_eq!(framework.name.as_deref(), Some("langchain"));

    let stored = store
        .get(&RecordKey::report("support-bot", "run-1"))
        .await
        .expect("read")
        .expect("report persisted");
    assert_eq!(stored["framework"]["version"], "0.2.35");
    assert_eq!(stored["instanceDetails"]["type"], "desktop");
    assert_eq!(stored["instanceDetails"]["host"], "ops-mbp");

    let app: AppRecord = serde_json::from_value(
        store
            .get(&RecordKey::app("support-bot"))
            .await
            .expect("read")
            .expect("app"),
    )
    .expect("decode app");
    assert_eq!(
        app.instance_details.and_then(|details| details.language),
        Some("python".to_string())
    );
}
