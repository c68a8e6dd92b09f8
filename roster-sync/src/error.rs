//! Error types for roster-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use roster_core::ConfigError;
use roster_renderer::RenderError;

use crate::retry::RetryError;

/// Errors that end a sync run. Per-entity failures never show up here; they
/// are reported through [`crate::SyncReport`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The target domain could not be resolved.
    #[error("domain resolution failed: {0}")]
    DomainResolution(#[source] RetryError),

    /// The group listing could not be obtained.
    #[error("group listing failed: {0}")]
    GroupListing(#[source] RetryError),

    /// The run was cancelled before the snapshot was assembled.
    #[error("sync cancelled")]
    Cancelled,

    /// The run did not finish within its deadline.
    #[error("sync timed out after {0:?}")]
    Timeout(Duration),

    /// An error from the rendering engine.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// An error loading configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (snapshot, run state).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
