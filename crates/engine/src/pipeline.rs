use crate::accumulator::{AggregationState, FindingsAccumulator};
use crate::assembler::ReportAssembler;
use crate::classify::{classify_document, Classifier};
use crate::config::ReportsConfig;
use crate::error::{FindingsError, Result};
use crate::model::{
    AppRecord, DocumentFinding, IngestBatch, LoaderDetails, Report, DEFAULT_DATA_SOURCE, UNKNOWN,
};
use crate::render::{JsonRenderer, ReportRenderer};
use crate::stats::IngestStats;
use findings_store::{RecordKey, RecordStore, WriteBatch};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Result of one ingest call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub report: Report,
    /// True when the call finished the run and the report was persisted.
    pub finalized: bool,
    pub stats: IngestStats,
}

/// Classifies a batch of documents, folds them into the run and persists the result.
pub struct IngestPipeline {
    store: Arc<dyn RecordStore>,
    classifier: Arc<dyn Classifier>,
    renderer: Arc<dyn ReportRenderer>,
    reports: ReportsConfig,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        classifier: Arc<dyn Classifier>,
        reports: ReportsConfig,
    ) -> Self {
        Self {
            store,
            classifier,
            renderer: Arc::new(JsonRenderer),
            reports,
        }
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub async fn ingest(&self, batch: IngestBatch) -> Result<IngestOutcome> {
        let start = Instant::now();
        validate_batch(&batch)?;
        let app_name = batch.app_name.as_str();
        let run_id = batch.run_id.as_str();
        let mut stats = IngestStats::new();

        let _app_lock = self.store.lock_app(app_name).await?;
        log::info!(
            "Ingesting {} documents for {app_name}/{run_id}",
            batch.docs.len()
        );
        let now = unix_now_ms();

        // 1. Application record
        let app_key = RecordKey::app(app_name);
        let mut app = match self.store.get(&app_key).await? {
            Some(value) => serde_json::from_value::<AppRecord>(value)?,
            None => {
                log::info!("Registering application {app_name}");
                AppRecord::new(app_name, now)
            }
        };
        if let Some(owner) = batch.owner.as_deref().filter(|o| !o.trim().is_empty()) {
            app.owner = owner.to_string();
        }
        if let Some(description) = batch
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
        {
            app.description = Some(description.to_string());
        }
        if let Some(framework) = &batch.framework {
            app.framework = Some(framework.clone());
        }
        if let Some(instance) = &batch.instance_details {
            app.instance_details = Some(instance.clone());
        }
        if app.register_run(run_id, now) {
            log::debug!("Registered run {run_id} for {app_name}");
        }

        // 2. Partial run state
        let state_key = RecordKey::run_state(app_name, run_id);
        let state = match self.store.get(&state_key).await? {
            Some(value) => serde_json::from_value::<AggregationState>(value)?,
            None => AggregationState::new(),
        };
        let mut accumulator = FindingsAccumulator::resume(state, self.reports.snippet_limit);
        let default_loader;
        let loader = match &batch.loader {
            Some(loader) => loader,
            None => {
                default_loader = LoaderDetails {
                    name: DEFAULT_DATA_SOURCE.to_string(),
                    source_path: UNKNOWN.to_string(),
                    source_type: UNKNOWN.to_string(),
                    ..LoaderDetails::default()
                };
                &default_loader
            }
        };
        accumulator.upsert_loader(loader, now);
        let anonymize = batch
            .anonymize_snippets
            .unwrap_or(self.reports.anonymize_snippets);

        // 3. Classify and fold, in submission order
        for doc in &batch.docs {
            let classified = !doc.doc.is_empty();
            let (classification, error) =
                classify_document(self.classifier.as_ref(), &doc.doc).await;
            if let Some(error) = error {
                log::error!("Classification failed for {}: {error}", doc.source_path);
                stats.add_error(format!("{}: {error}", doc.source_path));
            }
            let finding = DocumentFinding::new(doc, classification, anonymize);
            stats.add_document(classified, finding.findings());
            accumulator.fold(&finding, Some(loader.name.as_str()));
        }
        let state = accumulator.into_state();

        // 4. Report
        let report = ReportAssembler::new(&self.reports)
            .assemble(self.store.as_ref(), &app, run_id, &state, now)
            .await;

        // 5. Commit everything at once
        let mut writes = WriteBatch::new();
        writes
            .put(app_key, serde_json::to_value(&app)?)
            .put(state_key, serde_json::to_value(&state)?);
        if batch.loading_end {
            let rendered = self.renderer.render(&report)?;
            writes
                .put(
                    RecordKey::report(app_name, run_id),
                    serde_json::to_value(&report)?,
                )
                .put(
                    RecordKey::artifact(app_name, run_id),
                    serde_json::Value::String(rendered),
                );
        }
        self.store.apply(writes).await?;

        stats.time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        if batch.loading_end {
            log::info!(
                "Finalized report for {app_name}/{run_id} at {}",
                self.store.locate(&RecordKey::artifact(app_name, run_id))
            );
        }
        log::info!("Ingest completed: {stats:?}");

        Ok(IngestOutcome {
            report,
            finalized: batch.loading_end,
            stats,
        })
    }
}

fn validate_batch(batch: &IngestBatch) -> Result<()> {
    if batch.app_name.trim().is_empty() {
        return Err(FindingsError::InvalidBatch("application name is empty".into()));
    }
    if batch.run_id.trim().is_empty() {
        return Err(FindingsError::InvalidBatch("run id is empty".into()));
    }
    RecordKey::run_state(batch.app_name.as_str(), batch.run_id.as_str())
        .validate()
        .map_err(|err| FindingsError::InvalidBatch(err.to_string()))?;
    if let Some(loader) = &batch.loader {
        if loader.name.trim().is_empty() {
            return Err(FindingsError::InvalidBatch("loader name is empty".into()));
        }
    }
    Ok(())
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
