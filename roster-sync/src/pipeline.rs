//! Shared sync pipeline entrypoint used by `roster sync` and `roster diff`.
//!
//! orchestrate → render → (diff | hash-gated atomic write) → save run state.
//! Outputs are only touched after orchestration succeeded; a failed or
//! cancelled run leaves the previous outputs in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use roster_core::types::Snapshot;
use roster_core::{CacheBackend, DirectoryClient, RosterConfig};
use roster_renderer::Renderer;

use crate::cache::{DiskCache, MemoryCache, ResponseCache};
use crate::diff::{self, FileDiff};
use crate::error::SyncError;
use crate::orchestrator::{SyncOrchestrator, SyncRun};
use crate::report::SyncReport;
use crate::state;
use crate::writer::{self, WriteResult};

/// Snapshot file name inside the output directory.
pub const SNAPSHOT_FILE: &str = "groups.json";
/// Page file name inside the output directory.
pub const PAGE_FILE: &str = "index.html";

/// Result of [`Pipeline::sync`].
#[derive(Debug)]
pub struct RunOutcome {
    pub snapshot: Snapshot,
    pub report: SyncReport,
    pub writes: Vec<WriteResult>,
    /// Set when the partial-failure policy turns degraded entities into a
    /// failed run. The outputs were still written.
    pub failed: bool,
}

/// Result of [`Pipeline::diff`].
#[derive(Debug)]
pub struct DiffOutcome {
    pub report: SyncReport,
    pub diffs: Vec<FileDiff>,
}

/// Open the response cache `config` asks for.
pub fn open_cache(config: &RosterConfig, home: &Path) -> Arc<dyn ResponseCache> {
    match config.cache.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
        CacheBackend::Disk => Arc::new(DiskCache::new(config.cache_dir_at(home))),
    }
}

/// Serialize the snapshot and render the page, paired with their paths.
pub fn render_outputs(
    output_dir: &Path,
    snapshot: &Snapshot,
    renderer: &Renderer,
) -> Result<Vec<(PathBuf, String)>, SyncError> {
    let mut json = serde_json::to_string_pretty(snapshot)?;
    json.push('\n');
    let html = renderer.render(snapshot)?;
    Ok(vec![
        (output_dir.join(SNAPSHOT_FILE), json),
        (output_dir.join(PAGE_FILE), html),
    ])
}

/// One configured sync: orchestrator, renderer, and output settings.
pub struct Pipeline {
    home: PathBuf,
    config: RosterConfig,
    orchestrator: SyncOrchestrator,
    renderer: Renderer,
}

impl Pipeline {
    /// Validate `config` and wire the pipeline around the injected client and
    /// cache.
    pub fn new(
        home: &Path,
        config: RosterConfig,
        client: Arc<dyn DirectoryClient>,
        cache: Arc<dyn ResponseCache>,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let renderer = Renderer::with_template(config.template.as_deref())?;
        let orchestrator = SyncOrchestrator::from_config(client, cache, &config);
        Ok(Self {
            home: home.to_path_buf(),
            config,
            orchestrator,
            renderer,
        })
    }

    pub fn config(&self) -> &RosterConfig {
        &self.config
    }

    /// Run a full sync and write the outputs (unless `dry_run`).
    pub async fn sync(
        &self,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, SyncError> {
        let started_at = Utc::now();
        let SyncRun { snapshot, report } = self.orchestrate(cancel).await?;

        let outputs = render_outputs(&self.config.output_dir, &snapshot, &self.renderer)?;
        let mut run_state = state::load_at(&self.home, &report.domain)?;
        let writes = writer::write_all(&outputs, &mut run_state.files, dry_run)?;

        if !dry_run {
            run_state.synced_at = started_at;
            run_state.last_report = Some(report.clone());
            state::save_at(&self.home, &report.domain, &run_state)?;
        }

        let failed = report.fails_under(self.config.partial_failure);
        if failed {
            tracing::error!(
                failures = report.real_failures().count(),
                "sync completed with degraded entities"
            );
        } else if report.has_failures() {
            tracing::warn!(
                failures = report.real_failures().count(),
                "sync completed with degraded entities"
            );
        }

        Ok(RunOutcome {
            snapshot,
            report,
            writes,
            failed,
        })
    }

    /// Run the orchestration and diff the would-be outputs against disk.
    pub async fn diff(&self, cancel: &CancellationToken) -> Result<DiffOutcome, SyncError> {
        let SyncRun { snapshot, report } = self.orchestrate(cancel).await?;
        let outputs = render_outputs(&self.config.output_dir, &snapshot, &self.renderer)?;
        let diffs = diff::diff_outputs(&outputs, &self.config.output_dir)?;
        Ok(DiffOutcome { report, diffs })
    }

    async fn orchestrate(&self, cancel: &CancellationToken) -> Result<SyncRun, SyncError> {
        let run = self.orchestrator.run(cancel);
        let Some(limit) = self.config.timeout() else {
            return run.await;
        };
        match tokio::time::timeout(limit, run).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(?limit, "sync deadline reached");
                Err(SyncError::Timeout(limit))
            }
        }
    }
}
