//! # Findings Engine
//!
//! Aggregates classifier findings for an application's load runs into reports.
//!
//! ## Pipeline
//!
//! ```text
//! IngestBatch
//!     │
//!     ├──> Classifier (per document)
//!     │      └─> entities / topics
//!     │
//!     ├──> Findings Accumulator ──> Label Evidence Store
//!     │      └─> AggregationState (resumable across calls)
//!     │
//!     ├──> Report Assembler
//!     │      ├─> Summarizer (totals, top files, data sources)
//!     │      └─> History Compiler (previous runs)
//!     │
//!     └──> RecordStore (one write batch per call)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use findings_engine::{Classification, EngineConfig, IngestBatch, IngestPipeline};
//!
//! #[tokio::main]
//! async fn main() -> findings_engine::Result<()> {
//!     let config = EngineConfig::from_env()?;
//!     let store = config.open_store().await?;
//!     let classifier = |_: &str| -> findings_engine::Result<Classification> {
//!         Ok(Classification::default())
//!     };
//!     let pipeline = IngestPipeline::new(store, Arc::new(classifier), config.reports);
//!
//!     let outcome = pipeline
//!         .ingest(IngestBatch {
//!             app_name: "support-bot".into(),
//!             run_id: "run-1".into(),
//!             loading_end: true,
//!             ..IngestBatch::default()
//!         })
//!         .await?;
//!     println!("{} findings", outcome.report.report_summary.counters.total_findings);
//!     Ok(())
//! }
//! ```

mod accumulator;
mod assembler;
mod classify;
mod config;
mod error;
mod evidence;
mod history;
mod model;
mod pipeline;
mod render;
mod stats;
mod summarizer;

pub use accumulator::{AggregationState, FindingsAccumulator};
pub use assembler::ReportAssembler;
pub use classify::{classify_document, Classifier};
pub use config::{
    DbKind, EngineConfig, LockConfig, LoggingConfig, ReportsConfig, StorageConfig, StorageKind,
    ENV_ANONYMIZE_SNIPPETS, ENV_LOAD_HISTORY_LIMIT, ENV_LOG_LEVEL, ENV_SNIPPET_LIMIT, ENV_STORAGE_LOCATION,
    ENV_STORAGE_TYPE, ENV_TOP_FINDINGS_LIMIT,
};
pub use error::{FindingsError, Result};
pub use evidence::LabelEvidenceStore;
pub use history::HistoryCompiler;
pub use model::{
    AppRecord, Classification, DataSourceRecord, DocumentFinding, FileFindings, FindingsType,
    FrameworkInfo, HistoryEntry, IngestBatch, InputDocument, InstanceDetails, LabelAggregate,
    LabelCounts, LabelDetail, LabelSummary, LoadHistory, LoaderDetails, LoaderState,
    PerFileAggregate, Report, ReportSummary, RunCounters, Snippet, TopFinding,
    DEFAULT_DATA_SOURCE, UNKNOWN,
};
pub use pipeline::{IngestOutcome, IngestPipeline};
pub use render::{JsonRenderer, ReportRenderer};
pub use stats::IngestStats;
pub use summarizer::{data_source_summaries, files_with_findings, report_summary, top_n};
