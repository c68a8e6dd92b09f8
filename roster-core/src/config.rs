//! YAML configuration for a roster sync.
//!
//! # Storage layout
//!
//! ```text
//! ~/.roster/
//!   config.yaml           (this file)
//!   cache/                (disk response cache, see roster-sync)
//!   state/<domain>.json   (last run state, see roster-sync)
//! ```
//!
//! # API pattern
//!
//! Every filesystem function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

/// Marker that hides a group when found in its description.
pub const DEFAULT_HIDDEN_MARKER: &str = "[hidden]";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Retry schedule for retryable remote failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per remote call, the first one included.
    pub max_attempts: u32,
    /// Wait before the first retry, in seconds.
    pub backoff_secs: u64,
    /// Upper bound on a single wait, in seconds.
    pub max_backoff_secs: u64,
    /// Growth factor between consecutive waits. `1.0` keeps the wait fixed.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_secs: 60,
            max_backoff_secs: 600,
            multiplier: 1.0,
        }
    }
}

/// Where cached remote responses live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    #[default]
    Disk,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Disk cache directory. Defaults to `~/.roster/cache`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Always fetch user profiles. Cached profiles are keyed by the member
    /// record's etag, which does not change on a profile-only edit such as a
    /// rename or a new photo.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skip_users: bool,
}

/// What a completed run reports when some entities could only be degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialFailurePolicy {
    /// Write the snapshot and report success; failures are only logged.
    #[default]
    Succeed,
    /// Write the snapshot, then report failure.
    Fail,
}

// ---------------------------------------------------------------------------
// RosterConfig
// ---------------------------------------------------------------------------

/// Root of `config.yaml`. Every field is optional on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// Target domain. Resolved through the directory when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Identity the credential context acts as.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impersonate: Option<String>,
    /// Group ids (or group emails) never included in the snapshot.
    pub ignore_groups: BTreeSet<String>,
    pub hidden_marker: String,
    pub retry: RetryConfig,
    /// Maximum in-flight fetches per fan-out level.
    pub concurrency: usize,
    pub cache: CacheConfig,
    pub output_dir: PathBuf,
    /// Page template overriding the embedded one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    pub partial_failure: PartialFailurePolicy,
    /// Deadline for a whole run, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            domain: None,
            impersonate: None,
            ignore_groups: BTreeSet::new(),
            hidden_marker: DEFAULT_HIDDEN_MARKER.to_string(),
            retry: RetryConfig::default(),
            concurrency: 8,
            cache: CacheConfig::default(),
            output_dir: PathBuf::from("public"),
            template: None,
            partial_failure: PartialFailurePolicy::default(),
            timeout_secs: None,
        }
    }
}

impl RosterConfig {
    /// Reject values that would make a run hang or do nothing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.retry.multiplier.is_finite() && self.retry.multiplier >= 1.0) {
            return Err(ConfigError::Invalid(
                "retry.multiplier must be a finite number >= 1.0".to_string(),
            ));
        }
        if self.retry.max_backoff_secs < self.retry.backoff_secs {
            return Err(ConfigError::Invalid(
                "retry.max_backoff_secs must be >= retry.backoff_secs".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Disk cache directory, falling back to `<home>/.roster/cache`.
    pub fn cache_dir_at(&self, home: &Path) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| roster_dir_at(home).join("cache"))
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.roster/`
pub fn roster_dir_at(home: &Path) -> PathBuf {
    home.join(".roster")
}

/// `<home>/.roster/config.yaml`
pub fn config_path_at(home: &Path) -> PathBuf {
    roster_dir_at(home).join("config.yaml")
}

/// Home directory from `dirs::home_dir()`.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load configuration from an explicit file. A missing file yields defaults.
pub fn load_from(path: &Path) -> Result<RosterConfig, ConfigError> {
    if !path.exists() {
        return Ok(RosterConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if contents.trim().is_empty() {
        return Ok(RosterConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load `<home>/.roster/config.yaml`.
pub fn load_at(home: &Path) -> Result<RosterConfig, ConfigError> {
    load_from(&config_path_at(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<RosterConfig, ConfigError> {
    load_at(&home()?)
}

/// Save `<home>/.roster/config.yaml` atomically (`.tmp` + rename).
pub fn save_at(home: &Path, config: &RosterConfig) -> Result<PathBuf, ConfigError> {
    let path = config_path_at(home);
    let dir = roster_dir_at(home);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
