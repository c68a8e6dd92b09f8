//! Run state: output hashes and the last run summary, per domain.
//!
//! Persists a [`RunState`] JSON document at
//! `<home>/.roster/state/<domain>.json`, written with the same atomic `.tmp` +
//! rename pattern as the outputs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, SyncError};
use crate::report::SyncReport;

/// Output path string → SHA-256 hex digest of the content last written there.
pub type OutputHashes = BTreeMap<String, String>;

/// On-disk run state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunState {
    pub synced_at: DateTime<Utc>,
    #[serde(default)]
    pub files: OutputHashes,
    /// Report of the last completed (non dry-run) sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_report: Option<SyncReport>,
}

impl RunState {
    fn empty() -> Self {
        Self {
            synced_at: Utc::now(),
            files: OutputHashes::new(),
            last_report: None,
        }
    }
}

/// `<home>/.roster/state/<domain>.json`
pub fn state_path_at(home: &Path, domain: &str) -> PathBuf {
    home.join(".roster")
        .join("state")
        .join(format!("{}.json", file_stem(domain)))
}

/// Every domain with a saved state, sorted.
pub fn list_domains_at(home: &Path) -> Result<Vec<String>, SyncError> {
    let dir = home.join(".roster").join("state");
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut domains: Vec<String> = std::fs::read_dir(&dir)
        .map_err(|e| io_err(&dir, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|x| x.to_str()) == Some("json"))
        .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    domains.sort();
    Ok(domains)
}

/// Load the run state for `domain`.
///
/// Returns an empty state if the file does not yet exist.
pub fn load_at(home: &Path, domain: &str) -> Result<RunState, SyncError> {
    let path = state_path_at(home, domain);
    if !path.exists() {
        return Ok(RunState::empty());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

/// Save the run state for `domain` atomically.
pub fn save_at(home: &Path, domain: &str, state: &RunState) -> Result<(), SyncError> {
    let path = state_path_at(home, domain);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid state path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Compact age of `timestamp` relative to now: `42s`, `5m`, `3h`, `2d`.
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let age = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0) as u64;
    format_seconds(age)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

fn file_stem(domain: &str) -> String {
    domain
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}
