//! Sync command - Copy missing files between backends
//!
//! Provides the `omnidrive sync` CLI command which:
//! 1. Builds the storage backends from configuration
//! 2. Lists both backends and computes the plan
//! 3. Transfers the selected set with the bounded worker pool
//! 4. Prints the per-file report
//!
//! Ctrl+C stops dispatching new transfers; in-flight ones finish and the
//! rest are reported as skipped.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use omnidrive_core::domain::{SyncDirection, SyncMode, SyncReport, TransferOutcome};
use tracing::info;

use crate::context::{cancel_on_ctrl_c, AppContext};
use crate::output::{human_bytes, plural, OutputFormatter, LIST_PREVIEW};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    /// Copy files only in the source into the target
    ToTarget,
    /// Copy files only in the target back into the source
    ToSource,
}

impl From<Direction> for SyncDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::ToTarget => SyncDirection::SourceToTarget,
            Direction::ToSource => SyncDirection::TargetToSource,
        }
    }
}

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Backend to copy from
    pub source: String,

    /// Backend to copy into
    pub target: String,

    /// Show what would be copied without transferring anything
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum records listed on the side copied from
    #[arg(long)]
    pub limit: Option<usize>,

    /// Which side's missing files to fill in
    #[arg(long, value_enum, default_value = "to-target")]
    pub direction: Direction,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let formatter = ctx.formatter();
        let sync = ctx.sync_service()?;
        let mode = SyncMode::from_dry_run(self.dry_run);

        let direction = SyncDirection::from(self.direction);
        let plan = sync
            .plan_sync(&self.source, &self.target, direction, self.limit)
            .await
            .with_context(|| {
                format!("Failed to plan sync from {} to {}", self.source, self.target)
            })?;

        let (from, to, selected) = plan.transfer_set(direction);
        info!(%from, %to, selected = selected.len(), %mode, "Plan ready");
        formatter.info(&format!(
            "{} to copy from {from} to {to}",
            plural(selected.len(), "file")
        ));
        if self.dry_run {
            formatter.info("Dry run mode - no changes will be made");
        }

        let cancel = cancel_on_ctrl_c();
        let report = sync
            .execute_plan(&plan, direction, mode, &cancel)
            .await
            .context("Sync failed")?;

        if ctx.format().is_json() {
            formatter.print_json(&serde_json::to_value(&report)?);
        } else {
            render(formatter.as_ref(), &report);
        }

        if report.status().is_failed() {
            anyhow::bail!("sync {}", report.summary());
        }
        Ok(())
    }
}

fn render(formatter: &dyn OutputFormatter, report: &SyncReport) {
    let totals = report.totals();
    let elapsed = report.completed_at() - report.started_at();

    if report.status().is_failed() {
        formatter.error(&format!("Sync {}", report.summary()));
    } else if totals.total == 0 {
        formatter.success("Already up to date");
    } else {
        formatter.success(&format!(
            "Sync {} in {:.1}s",
            report.summary(),
            elapsed.num_milliseconds() as f64 / 1000.0
        ));
    }

    if totals.succeeded > 0 {
        formatter.info(&format!(
            "Copied:  {} ({})",
            plural(totals.succeeded, "file"),
            human_bytes(totals.bytes_transferred)
        ));
    }
    if totals.skipped > 0 {
        formatter.info(&format!("Skipped: {}", plural(totals.skipped, "file")));
    }
    if report.was_cancelled() {
        formatter.warn("Cancelled before all transfers started");
    }

    let failed: Vec<_> = report.with_outcome(TransferOutcome::Failed).collect();
    if !failed.is_empty() {
        formatter.info(&format!("Failed:  {}", plural(failed.len(), "file")));
        for result in failed.iter().take(LIST_PREVIEW) {
            let reason = result
                .error()
                .map(ToString::to_string)
                .unwrap_or_default();
            formatter.info(&format!(
                "  \u{2717} {} ({}): {reason}",
                result.record().name(),
                plural(result.attempts() as usize, "attempt")
            ));
        }
        if failed.len() > LIST_PREVIEW {
            formatter.info(&format!("  ... and {} more", failed.len() - LIST_PREVIEW));
        }
    }
}
