//! Session command - Save and resume named sessions
//!
//! A session is an arbitrary JSON document stored under a name, typically
//! the parameters of a sync or workflow to run again later.

use anyhow::{Context, Result};
use clap::Subcommand;
use omnidrive_core::domain::SessionRecord;
use omnidrive_core::usecases::SessionUseCase;
use serde_json::Value;

use crate::context::AppContext;
use crate::output::plural;

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Save a session, replacing any with the same name
    Save {
        /// Session name
        name: String,
        /// JSON document to store
        #[arg(long, default_value = "{}")]
        data: String,
    },
    /// Print a saved session
    Resume {
        /// Session name
        name: String,
    },
    /// List saved sessions, newest first
    List,
    /// Delete a saved session
    Delete {
        /// Session name
        name: String,
    },
}

impl SessionCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let sessions = SessionUseCase::new(ctx.session_store().await?);
        let formatter = ctx.formatter();
        let json = ctx.format().is_json();

        match self {
            SessionCommand::Save { name, data } => {
                let data: Value = serde_json::from_str(data)
                    .with_context(|| format!("--data for session '{name}' is not valid JSON"))?;
                let record = sessions.save(name, data).await?;
                if json {
                    formatter.print_json(&serde_json::to_value(&record)?);
                } else {
                    formatter.success(&format!("Session '{}' saved", record.name()));
                }
            }
            SessionCommand::Resume { name } => {
                let Some(record) = sessions.resume(name).await? else {
                    anyhow::bail!("no session named '{name}'");
                };
                if json {
                    formatter.print_json(&serde_json::to_value(&record)?);
                } else {
                    render_session(ctx, &record)?;
                }
            }
            SessionCommand::List => {
                let records = sessions.list().await?;
                if json {
                    formatter.print_json(&serde_json::to_value(&records)?);
                } else if records.is_empty() {
                    formatter.info("No saved sessions");
                } else {
                    formatter.success(&format!("{} saved", plural(records.len(), "session")));
                    for record in &records {
                        formatter.info(&format!(
                            "{:<24} {}",
                            record.name(),
                            record.saved_at().format("%Y-%m-%d %H:%M:%S")
                        ));
                    }
                }
            }
            SessionCommand::Delete { name } => {
                let deleted = sessions.delete(name).await?;
                if json {
                    formatter.print_json(&serde_json::json!({
                        "name": name,
                        "deleted": deleted,
                    }));
                } else if deleted {
                    formatter.success(&format!("Session '{name}' deleted"));
                } else {
                    formatter.warn(&format!("No session named '{name}'"));
                }
            }
        }
        Ok(())
    }
}

fn render_session(ctx: &AppContext, record: &SessionRecord) -> Result<()> {
    let formatter = ctx.formatter();
    formatter.success(&format!(
        "Session '{}' (saved {})",
        record.name(),
        record.saved_at().format("%Y-%m-%d %H:%M:%S")
    ));
    let pretty = serde_json::to_string_pretty(record.data())?;
    for line in pretty.lines() {
        formatter.info(line);
    }
    Ok(())
}
