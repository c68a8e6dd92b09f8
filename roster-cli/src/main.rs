//! Roster: directory snapshot CLI.
//!
//! # Usage
//!
//! ```text
//! roster init [--domain <domain>] [--impersonate <email>] [--cache memory|disk] [--force]
//! roster sync [--domain <domain>] [--ignore <group>]... [--fixture <dump.json>] [--dry-run] [--json] [--strict]
//! roster diff [--domain <domain>] [--fixture <dump.json>]
//! roster status [--json]
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides the default `info` filter.

mod commands;
mod credentials;
mod google;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{diff::DiffArgs, init::InitArgs, status::StatusArgs, sync::SyncArgs};
use roster_core::CacheBackend;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "roster",
    version,
    about = "Snapshot a directory's groups and members into a static page",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write ~/.roster/config.yaml.
    Init(InitArgs),

    /// Fetch the directory and write groups.json and index.html.
    Sync(SyncArgs),

    /// Show unified diff of what sync would write.
    Diff(DiffArgs),

    /// Show the last run per domain.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Shared CacheBackend argument
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `CacheBackend` from CLI args.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheBackendArg(pub CacheBackend);

impl FromStr for CacheBackendArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self(CacheBackend::Memory)),
            "disk" => Ok(Self(CacheBackend::Disk)),
            other => Err(format!(
                "unknown cache backend '{other}'; expected: memory, disk"
            )),
        }
    }
}

impl fmt::Display for CacheBackendArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            CacheBackend::Memory => f.write_str("memory"),
            CacheBackend::Disk => f.write_str("disk"),
        }
    }
}

impl From<CacheBackendArg> for CacheBackend {
    fn from(arg: CacheBackendArg) -> Self {
        arg.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
