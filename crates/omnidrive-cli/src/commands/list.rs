//! List command - Show one backend's catalog
//!
//! `omnidrive list BACKEND` lists the backend root (or `--scope` folder) and
//! prints the normalized records. A listing that breaks part-way is still
//! shown, marked incomplete.

use anyhow::{Context, Result};
use clap::Args;
use omnidrive_core::domain::Catalog;
use tracing::info;

use crate::context::AppContext;
use crate::output::{human_bytes, plural, print_records, OutputFormatter};

#[derive(Debug, Args)]
pub struct ListCommand {
    /// Backend to list
    pub backend: String,

    /// Folder id to list instead of the backend root
    #[arg(long)]
    pub scope: Option<String>,

    /// Maximum records listed
    #[arg(long)]
    pub limit: Option<usize>,
}

impl ListCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let formatter = ctx.formatter();
        let sync = ctx.sync_service()?;

        info!(backend = %self.backend, "Listing backend");
        let catalog = sync
            .list_catalog(&self.backend, self.scope.as_deref(), self.limit)
            .await
            .with_context(|| format!("Failed to list {}", self.backend))?;

        if ctx.format().is_json() {
            formatter.print_json(&serde_json::to_value(&catalog)?);
        } else {
            render(formatter.as_ref(), &catalog);
        }
        Ok(())
    }
}

fn render(formatter: &dyn OutputFormatter, catalog: &Catalog) {
    let location = match catalog.scope() {
        Some(scope) => format!("{} ({scope})", catalog.backend()),
        None => catalog.backend().to_string(),
    };
    formatter.success(&format!(
        "{location}: {}, {}",
        plural(catalog.len(), "record"),
        human_bytes(catalog.total_bytes())
    ));

    if !catalog.is_complete() {
        formatter.warn("Listing failed part-way; showing the records gathered so far");
    }
    if catalog.is_truncated() {
        formatter.warn("Listing stopped at the limit; more records may exist");
    }

    print_records(formatter, "Records", catalog.records().iter());
}
