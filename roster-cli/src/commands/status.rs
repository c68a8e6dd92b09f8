//! `roster status`: last run per synced domain.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use roster_sync::state::{self, format_datetime_age};

use super::home_dir;

/// Arguments for `roster status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let rows = build_rows(&home)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(rows);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
struct DomainStatus {
    domain: String,
    status: &'static str,
    last_sync_at: Option<String>,
    last_sync_age: String,
    groups: usize,
    members: usize,
    unresolved: usize,
    failures: usize,
    files: usize,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "domain")]
    domain: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
    #[tabled(rename = "groups")]
    groups: usize,
    #[tabled(rename = "members")]
    members: usize,
    #[tabled(rename = "unresolved")]
    unresolved: usize,
    #[tabled(rename = "failures")]
    failures: usize,
}

fn build_rows(home: &Path) -> Result<Vec<DomainStatus>> {
    let domains = state::list_domains_at(home).context("failed to list run state")?;
    let mut rows = Vec::with_capacity(domains.len());
    for domain in domains {
        let run = state::load_at(home, &domain)
            .with_context(|| format!("failed to load run state for '{domain}'"))?;
        let row = match &run.last_report {
            Some(report) => {
                let failures = report.real_failures().count();
                DomainStatus {
                    domain: report.domain.clone(),
                    status: if failures == 0 { "ok" } else { "degraded" },
                    last_sync_at: Some(run.synced_at.to_rfc3339()),
                    last_sync_age: format_datetime_age(run.synced_at),
                    groups: report.groups,
                    members: report.members,
                    unresolved: report.unresolved(),
                    failures,
                    files: run.files.len(),
                }
            }
            None => DomainStatus {
                domain,
                status: "never_synced",
                last_sync_at: None,
                last_sync_age: "never".to_string(),
                groups: 0,
                members: 0,
                unresolved: 0,
                failures: 0,
                files: run.files.len(),
            },
        };
        rows.push(row);
    }
    Ok(rows)
}

fn status_label(status: &str) -> String {
    match status {
        "ok" => "OK".green().bold().to_string(),
        "degraded" => "DEGRADED".yellow().bold().to_string(),
        _ => "NEVER SYNCED".bright_black().bold().to_string(),
    }
}

fn print_table(rows: Vec<DomainStatus>) {
    println!(
        "Roster v{} | {} domains",
        env!("CARGO_PKG_VERSION"),
        rows.len()
    );
    if rows.is_empty() {
        println!("No runs recorded. Run `roster sync` first.");
        return;
    }

    let degraded = rows.iter().filter(|r| r.failures > 0).count();
    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            status: status_label(row.status),
            domain: row.domain,
            last_sync: row.last_sync_age,
            groups: row.groups,
            members: row.members,
            unresolved: row.unresolved,
            failures: row.failures,
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if degraded > 0 {
        println!("Run 'roster sync' to retry degraded entities.");
    }
}
