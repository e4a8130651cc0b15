//! Compare command - Show how two backends differ
//!
//! `omnidrive compare SOURCE TARGET` lists both backends, matches records by
//! the configured key policy and prints the three sets. Nothing is written.

use anyhow::{Context, Result};
use clap::Args;
use omnidrive_core::domain::SyncPlan;
use tracing::info;

use crate::context::AppContext;
use crate::output::{plural, print_records, OutputFormatter};

#[derive(Debug, Args)]
pub struct CompareCommand {
    /// Backend treated as the source
    pub source: String,

    /// Backend treated as the target
    pub target: String,

    /// Folder id to compare instead of the backend root
    #[arg(long)]
    pub scope: Option<String>,

    /// Maximum records listed per backend
    #[arg(long)]
    pub limit: Option<usize>,
}

impl CompareCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let formatter = ctx.formatter();
        let sync = ctx.sync_service()?;

        info!(source = %self.source, target = %self.target, "Comparing backends");
        let plan = sync
            .compare(&self.source, &self.target, self.scope.as_deref(), self.limit)
            .await
            .with_context(|| format!("Failed to compare {} with {}", self.source, self.target))?;

        if ctx.format().is_json() {
            formatter.print_json(&serde_json::to_value(&plan)?);
        } else {
            render(formatter.as_ref(), &plan);
        }
        Ok(())
    }
}

fn render(formatter: &dyn OutputFormatter, plan: &SyncPlan) {
    let source = plan.source().as_str();
    let target = plan.target().as_str();

    if plan.is_in_sync() {
        formatter.success(&format!("{source} and {target} hold the same files"));
    } else {
        formatter.success(&format!(
            "Compared {source} with {target} ({} to copy)",
            plural(plan.only_in_source().len(), "file")
        ));
    }
    formatter.info(&format!("Key policy: {}", plan.key_policy()));

    if plan.is_incomplete() {
        formatter.warn("Listing was incomplete; results may be missing files");
        for error in plan.listing_errors() {
            formatter.info(&format!("  {error}"));
        }
    }
    if plan.is_truncated() {
        let backends: Vec<_> = plan
            .truncated_backends()
            .iter()
            .map(|b| b.as_str())
            .collect();
        formatter.warn(&format!(
            "Listing of {} stopped at the limit; \"only in\" sets may list files present on both",
            backends.join(" and ")
        ));
    }

    formatter.info("");
    print_records(
        formatter,
        &format!("Only in {source}"),
        plan.only_in_source().iter(),
    );
    print_records(
        formatter,
        &format!("Only in {target}"),
        plan.only_in_target().iter(),
    );
    print_records(
        formatter,
        "In both",
        plan.common().iter().map(|pair| &pair.source),
    );
}
