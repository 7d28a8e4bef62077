use std::path::{Path, PathBuf};

pub const DEFAULT_STORE_DIR_NAME: &str = ".findings";

pub(crate) const APP_METADATA_FILE_NAME: &str = "metadata.json";
pub(crate) const RUN_STATE_FILE_NAME: &str = "state.json";
pub(crate) const REPORT_FILE_NAME: &str = "report.json";
pub(crate) const ARTIFACT_FILE_NAME: &str = "report.rendered";
pub(crate) const APP_LOCK_FILE_NAME: &str = "app.lock";
pub(crate) const LOCKS_DIR_NAME: &str = "locks";

/// Expand a leading `~` to the user's home directory.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return match path.strip_prefix("~/") {
                Some(rest) if !rest.is_empty() => home.join(rest),
                _ => home,
            };
        }
    }
    PathBuf::from(path)
}

#[must_use]
pub fn default_store_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_STORE_DIR_NAME)
}

pub(crate) fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
