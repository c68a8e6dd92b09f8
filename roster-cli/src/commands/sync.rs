//! `roster sync`: fetch the directory and write the snapshot and page.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use roster_core::PartialFailurePolicy;
use roster_sync::{RunOutcome, SyncReport, WriteResult};

use super::{block_on_cancellable, home_dir, SourceArgs};

/// Arguments for `roster sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Show what would be written without actually writing any files.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Exit non-zero when any entity had to be degraded.
    #[arg(long)]
    pub strict: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let pipeline = self.source.pipeline(&home)?;

        let dry_run = self.dry_run;
        let strict = self.strict;
        let outcome = block_on_cancellable(|cancel| {
            let pipeline = &pipeline;
            async move {
                pipeline
                    .sync(dry_run, &cancel)
                    .await
                    .context("sync failed")
            }
        })?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome.report)
                    .context("failed to serialize run report")?
            );
        } else {
            print_outcome(&outcome, dry_run);
        }

        let failed = outcome.failed
            || (strict && outcome.report.fails_under(PartialFailurePolicy::Fail));
        if failed {
            bail!(
                "{} entities could not be fetched",
                outcome.report.real_failures().count()
            );
        }
        Ok(())
    }
}

fn print_outcome(outcome: &RunOutcome, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    let report = &outcome.report;
    let written = outcome
        .writes
        .iter()
        .filter(|w| {
            matches!(
                w,
                WriteResult::Written { .. } | WriteResult::WouldWrite { .. }
            )
        })
        .count();
    let unchanged = outcome.writes.len() - written;

    println!(
        "{prefix}✓ '{}' synced ({} written, {} unchanged)",
        report.domain, written, unchanged
    );
    for w in &outcome.writes {
        match w {
            WriteResult::Written { path } => println!("  ✎  {}", path.display()),
            WriteResult::WouldWrite { path } => println!("  ~  {}", path.display()),
            WriteResult::Unchanged { path } => println!("  ·  {}", path.display()),
        }
    }
    print_summary(report);
}

fn print_summary(report: &SyncReport) {
    println!(
        "  {} groups ({} excluded), {} members ({} unresolved)",
        report.groups,
        report.groups_excluded,
        report.members,
        report.unresolved()
    );
    println!(
        "  {} remote calls, {} cache hits, {} cache misses",
        report.remote_calls, report.cache_hits, report.cache_misses
    );
    if report.cache_errors > 0 {
        println!(
            "  {}",
            format!("{} cache errors (see log)", report.cache_errors).yellow()
        );
    }
    for failure in report.real_failures() {
        println!("  {} {failure}", "!".yellow().bold());
    }
}
