//! `roster init [--domain ..] [--impersonate ..] [--cache memory|disk] [--eject-template]`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use roster_core::{config, RosterConfig};

use super::home_dir;
use crate::CacheBackendArg;

/// File name of the ejected page template under ~/.roster/.
const EJECTED_TEMPLATE: &str = "page.html.tera";

/// Write a starting ~/.roster/config.yaml.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Target domain (e.g. "example.com").
    #[arg(long)]
    pub domain: Option<String>,

    /// Identity the credentials act as.
    #[arg(long, value_name = "EMAIL")]
    pub impersonate: Option<String>,

    /// Group id or email to leave out. Repeatable.
    #[arg(long = "ignore", value_name = "GROUP")]
    pub ignore: Vec<String>,

    /// Output directory for groups.json and index.html.
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Response cache backend: memory | disk.
    #[arg(long, value_name = "BACKEND")]
    pub cache: Option<CacheBackendArg>,

    /// Copy the built-in page template to ~/.roster/ and point the config at it.
    #[arg(long)]
    pub eject_template: bool,

    /// Overwrite an existing config.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let path = config::config_path_at(&home);
        if path.exists() && !self.force {
            bail!(
                "{} already exists; pass --force to overwrite",
                path.display()
            );
        }

        let mut cfg = RosterConfig {
            domain: self.domain,
            impersonate: self.impersonate,
            ..RosterConfig::default()
        };
        cfg.ignore_groups.extend(self.ignore);
        if let Some(out) = self.out {
            cfg.output_dir = out;
        }
        if let Some(backend) = self.cache {
            cfg.cache.backend = backend.into();
        }

        if self.eject_template {
            let dir = config::roster_dir_at(&home);
            let template = dir.join(EJECTED_TEMPLATE);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("cannot create '{}'", dir.display()))?;
            std::fs::write(&template, roster_renderer::embedded_template())
                .with_context(|| format!("cannot write '{}'", template.display()))?;
            println!("✓ Template copied to {}", template.display());
            cfg.template = Some(template);
        }

        let saved = config::save_at(&home, &cfg).context("failed to write config")?;
        println!("✓ Wrote {}", saved.display());
        match &cfg.domain {
            Some(domain) => println!("  Domain: {domain}"),
            None => println!("  Domain: resolved from credentials at sync time"),
        }
        Ok(())
    }
}
