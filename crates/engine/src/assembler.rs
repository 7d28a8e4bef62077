use crate::accumulator::AggregationState;
use crate::config::ReportsConfig;
use crate::history::HistoryCompiler;
use crate::model::{AppRecord, Report, UNKNOWN};
use crate::summarizer::{data_source_summaries, report_summary, top_n};
use findings_store::RecordStore;

#[derive(Debug, Clone, Copy)]
pub struct ReportAssembler {
    top_findings_limit: usize,
    load_history_limit: usize,
}

impl ReportAssembler {
    pub fn new(config: &ReportsConfig) -> Self {
        Self {
            top_findings_limit: config.top_findings_limit,
            load_history_limit: config.load_history_limit,
        }
    }

    /// Builds the report for `run_id` from its state and the application's other runs.
    pub async fn assemble(
        &self,
        store: &dyn RecordStore,
        app: &AppRecord,
        run_id: &str,
        state: &AggregationState,
        now_unix_ms: u64,
    ) -> Report {
        let load_history = HistoryCompiler::new(store, self.load_history_limit)
            .compile(&app.name, &app.run_ids, run_id)
            .await;

        Report {
            name: app.name.clone(),
            description: app
                .description
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            framework: app.framework.clone(),
            instance_details: app.instance_details.clone(),
            report_summary: report_summary(state, &app.owner, now_unix_ms),
            top_findings: top_n(state.files(), self.top_findings_limit),
            data_sources: data_source_summaries(state),
            load_history,
        }
    }
}
