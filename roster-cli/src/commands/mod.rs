pub mod diff;
pub mod init;
pub mod status;
pub mod sync;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use roster_core::{config, CacheBackend, DirectoryClient, RosterConfig, StaticDirectory};
use roster_sync::{open_cache, Pipeline};

use crate::credentials;
use crate::google::GoogleDirectory;

/// Where the directory comes from and how the run is shaped. Shared by
/// `sync` and `diff`; every flag overrides the matching config value.
#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// Config file to use instead of ~/.roster/config.yaml.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Target domain. Resolved from the credentials when omitted.
    #[arg(long)]
    pub domain: Option<String>,

    /// Identity the credentials act as; its domain part is the default domain.
    #[arg(long, value_name = "EMAIL")]
    pub impersonate: Option<String>,

    /// Group id or email to leave out. Repeatable.
    #[arg(long = "ignore", value_name = "GROUP")]
    pub ignore: Vec<String>,

    /// Output directory for groups.json and index.html.
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Page template replacing the built-in one.
    #[arg(long, value_name = "PATH")]
    pub template: Option<PathBuf>,

    /// Serve the directory from a JSON dump instead of the remote API.
    #[arg(long, value_name = "PATH")]
    pub fixture: Option<PathBuf>,

    /// Keep cached responses in memory for this run only.
    #[arg(long)]
    pub memory_cache: bool,

    /// Fetch every user profile instead of reusing cached ones.
    #[arg(long)]
    pub no_user_cache: bool,

    /// Give up on the whole run after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl SourceArgs {
    /// Load the config file and apply the flags on top.
    pub fn load_config(&self, home: &Path) -> Result<RosterConfig> {
        let mut cfg = match &self.config {
            Some(path) => config::load_from(path)
                .with_context(|| format!("failed to load config '{}'", path.display()))?,
            None => config::load_at(home).context("failed to load ~/.roster/config.yaml")?,
        };

        if let Some(domain) = &self.domain {
            cfg.domain = Some(domain.clone());
        }
        if let Some(identity) = &self.impersonate {
            cfg.impersonate = Some(identity.clone());
        }
        cfg.ignore_groups.extend(self.ignore.iter().cloned());
        if let Some(out) = &self.out {
            cfg.output_dir = out.clone();
        }
        if let Some(template) = &self.template {
            cfg.template = Some(template.clone());
        }
        if self.memory_cache {
            cfg.cache.backend = CacheBackend::Memory;
        }
        if self.no_user_cache {
            cfg.cache.skip_users = true;
        }
        if let Some(secs) = self.timeout {
            cfg.timeout_secs = Some(secs);
        }
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }

    fn client(&self) -> Result<Arc<dyn DirectoryClient>> {
        if let Some(path) = &self.fixture {
            let directory = StaticDirectory::from_path(path)
                .with_context(|| format!("failed to load fixture '{}'", path.display()))?;
            return Ok(Arc::new(directory));
        }
        let cwd = std::env::current_dir().context("could not determine working directory")?;
        let token = credentials::load_token(&cwd)?;
        Ok(Arc::new(GoogleDirectory::new(token)))
    }

    /// Build the configured pipeline.
    pub fn pipeline(&self, home: &Path) -> Result<Pipeline> {
        let cfg = self.load_config(home)?;
        let client = self.client()?;
        let cache = open_cache(&cfg, home);
        Pipeline::new(home, cfg, client, cache).context("failed to set up sync")
    }
}

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Drive `task` on a fresh runtime. Ctrl-C cancels the token handed to it.
pub fn block_on_cancellable<F, Fut, T>(task: F) -> Result<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let result = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling run");
                on_interrupt.cancel();
            }
        });
        task(cancel).await
    });
    // In-flight blocking HTTP calls are abandoned rather than awaited.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}
