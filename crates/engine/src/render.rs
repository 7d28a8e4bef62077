use crate::error::{FindingsError, Result};
use crate::model::Report;

/// Turns a finished report into the artifact stored next to it.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, report: &Report) -> Result<String>;
}

/// Pretty-printed camelCase JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl ReportRenderer for JsonRenderer {
    fn render(&self, report: &Report) -> Result<String> {
        serde_json::to_string_pretty(report)
            .map_err(|err| FindingsError::RenderError(format!("encode report {}: {err}", report.name)))
    }
}
