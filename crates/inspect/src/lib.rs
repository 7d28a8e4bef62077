//! Read-only views over a findings store, used by the `findings` binary.

use anyhow::{anyhow, Context, Result};
use findings_engine::{AppRecord, HistoryCompiler, LoadHistory, Report};
use findings_store::{Filter, RecordKey, RecordKind, RecordStore};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppListing {
    pub name: String,
    pub owner: String,
    pub runs: usize,
    pub latest_run: Option<String>,
    pub location: String,
}

/// Applications in the store, optionally only those of one owner.
pub async fn list_apps(store: &dyn RecordStore, owner: Option<&str>) -> Result<Vec<AppListing>> {
    let filter = match owner {
        Some(owner) => Filter::new().eq("owner", owner),
        None => Filter::new(),
    };
    let records = store
        .list(RecordKind::App, None, &filter)
        .await
        .context("Failed to list applications")?;

    let mut apps = Vec::with_capacity(records.len());
    for record in records {
        let app: AppRecord = match serde_json::from_value(record.value) {
            Ok(app) => app,
            Err(err) => {
                log::warn!("Skipping malformed application record {}: {err}", record.key);
                continue;
            }
        };
        apps.push(AppListing {
            location: store.app_locator(&app.name),
            runs: app.run_ids.len(),
            latest_run: app.run_ids.last().cloned(),
            owner: app.owner,
            name: app.name,
        });
    }
    Ok(apps)
}

async fn load_app(store: &dyn RecordStore, app: &str) -> Result<AppRecord> {
    let value = store
        .get(&RecordKey::app(app))
        .await
        .with_context(|| format!("Failed to read application {app}"))?
        .ok_or_else(|| anyhow!("Unknown application {app}"))?;
    serde_json::from_value(value).with_context(|| format!("Malformed application record {app}"))
}

/// The report of `run`, or of the most recent finished run.
pub async fn show_report(store: &dyn RecordStore, app: &str, run: Option<&str>) -> Result<Report> {
    let record = load_app(store, app).await?;
    let candidates: Vec<&str> = match run {
        Some(run) => vec![run],
        None => record.run_ids.iter().rev().map(String::as_str).collect(),
    };
    for candidate in candidates {
        let key = RecordKey::report(app, candidate);
        let Some(value) = store
            .get(&key)
            .await
            .with_context(|| format!("Failed to read {key}"))?
        else {
            continue;
        };
        return serde_json::from_value(value).with_context(|| format!("Malformed report {key}"));
    }
    match run {
        Some(run) => Err(anyhow!("Run {run} of {app} has no finished report")),
        None => Err(anyhow!("Application {app} has no finished runs")),
    }
}

/// Finished runs of `app`, newest first.
pub async fn app_history(store: &dyn RecordStore, app: &str, limit: usize) -> Result<LoadHistory> {
    let record = load_app(store, app).await?;
    Ok(HistoryCompiler::new(store, limit)
        .compile(&record.name, &record.run_ids, "")
        .await)
}
