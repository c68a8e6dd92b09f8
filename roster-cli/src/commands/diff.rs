//! `roster diff`: show unified diffs for what sync would write.

use anyhow::{Context, Result};
use clap::Args;

use super::{block_on_cancellable, home_dir, SourceArgs};

/// Arguments for `roster diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let pipeline = self.source.pipeline(&home)?;

        let result = block_on_cancellable(|cancel| {
            let pipeline = &pipeline;
            async move { pipeline.diff(&cancel).await.context("diff failed") }
        })?;

        if result.diffs.is_empty() {
            println!("No differences for '{}'.", result.report.domain);
            return Ok(());
        }

        for diff in result.diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }

        Ok(())
    }
}
