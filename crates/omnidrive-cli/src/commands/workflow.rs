//! Workflow command - Run and inspect multi-step workflows
//!
//! - `omnidrive workflow list`
//! - `omnidrive workflow run NAME --source A --target B [--param k=v]...`
//! - `omnidrive workflow status NAME RUN_ID`
//! - `omnidrive workflow runs NAME`
//!
//! A run prints its id before the first step starts, so its progress can be
//! followed with `workflow status` from another terminal.

use anyhow::{Context, Result};
use clap::Subcommand;
use omnidrive_core::domain::{RunId, RunStatus, WorkflowRun};
use serde_json::{Map, Value};

use crate::context::{cancel_on_ctrl_c, AppContext};
use crate::output::{plural, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum WorkflowCommand {
    /// List available workflows
    List,
    /// Run a workflow to completion
    Run {
        /// Workflow name (see `workflow list`)
        name: String,
        /// Source backend
        #[arg(long)]
        source: Option<String>,
        /// Target backend
        #[arg(long)]
        target: Option<String>,
        /// Plan and report without transferring
        #[arg(long)]
        dry_run: bool,
        /// Maximum records listed per backend
        #[arg(long)]
        limit: Option<u64>,
        /// Extra parameter as key=value (value parsed as JSON when possible)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
    /// Show the latest state of a run
    Status {
        /// Workflow name
        name: String,
        /// Run id printed by `workflow run`
        run_id: RunId,
    },
    /// List stored runs of a workflow
    Runs {
        /// Workflow name
        name: String,
    },
}

impl WorkflowCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        match self {
            WorkflowCommand::List => self.execute_list(ctx).await,
            WorkflowCommand::Run {
                name,
                source,
                target,
                dry_run,
                limit,
                params,
            } => {
                let mut values = Map::new();
                if let Some(source) = source {
                    values.insert("source".into(), Value::from(source.as_str()));
                }
                if let Some(target) = target {
                    values.insert("target".into(), Value::from(target.as_str()));
                }
                if *dry_run {
                    values.insert("dry_run".into(), Value::Bool(true));
                }
                if let Some(limit) = limit {
                    values.insert("limit".into(), Value::from(*limit));
                }
                for param in params {
                    let (key, value) = parse_param(param)?;
                    values.insert(key, value);
                }
                self.execute_run(ctx, name, Value::Object(values)).await
            }
            WorkflowCommand::Status { name, run_id } => {
                self.execute_status(ctx, name, run_id).await
            }
            WorkflowCommand::Runs { name } => self.execute_runs(ctx, name).await,
        }
    }

    async fn execute_list(&self, ctx: &AppContext) -> Result<()> {
        let formatter = ctx.formatter();
        let engine = ctx.workflow_engine().await?;
        let workflows = engine.list_workflows();

        if ctx.format().is_json() {
            formatter.print_json(&serde_json::to_value(&workflows)?);
            return Ok(());
        }

        formatter.success(&format!("{} available", plural(workflows.len(), "workflow")));
        for workflow in &workflows {
            formatter.info(&format!(
                "{:<12} {} ({})",
                workflow.name,
                workflow.description,
                plural(workflow.step_count, "step")
            ));
        }
        Ok(())
    }

    async fn execute_run(&self, ctx: &AppContext, name: &str, params: Value) -> Result<()> {
        let formatter = ctx.formatter();
        let engine = ctx.workflow_engine().await?;

        let handle = engine
            .start(name, params, cancel_on_ctrl_c())
            .await
            .with_context(|| format!("Failed to start workflow '{name}'"))?;
        formatter.info(&format!("Run {} started", handle.run_id()));

        let run = handle.wait().await?;
        if ctx.format().is_json() {
            formatter.print_json(&serde_json::to_value(&run)?);
        } else {
            render_run(formatter.as_ref(), &run);
        }

        if run.status() == RunStatus::Failed {
            anyhow::bail!("workflow '{name}' failed");
        }
        Ok(())
    }

    async fn execute_status(&self, ctx: &AppContext, name: &str, run_id: &RunId) -> Result<()> {
        let formatter = ctx.formatter();
        let engine = ctx.workflow_engine().await?;
        let run = engine.get_status(name, run_id).await?;

        if ctx.format().is_json() {
            formatter.print_json(&serde_json::to_value(&run)?);
        } else {
            render_run(formatter.as_ref(), &run);
        }
        Ok(())
    }

    async fn execute_runs(&self, ctx: &AppContext, name: &str) -> Result<()> {
        let formatter = ctx.formatter();
        let engine = ctx.workflow_engine().await?;
        let runs = engine.list_runs(name).await?;

        if ctx.format().is_json() {
            formatter.print_json(&serde_json::to_value(&runs)?);
            return Ok(());
        }

        if runs.is_empty() {
            formatter.info(&format!("No runs of '{name}' yet"));
            return Ok(());
        }
        formatter.success(&format!("{} of '{name}'", plural(runs.len(), "run")));
        for run in &runs {
            formatter.info(&format!(
                "{}  {:<9}  step {}/{}  {}",
                run.run_id(),
                run.status().to_string(),
                run.current_step_index(),
                run.step_count(),
                run.started_at().format("%Y-%m-%d %H:%M:%S")
            ));
        }
        Ok(())
    }
}

/// Splits `key=value`; the value is JSON when it parses, a string otherwise
fn parse_param(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Invalid parameter '{raw}', expected KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Invalid parameter '{raw}', key is empty");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
    Ok((key.to_string(), value))
}

fn render_run(formatter: &dyn OutputFormatter, run: &WorkflowRun) {
    let headline = format!(
        "Workflow '{}' run {}: {}",
        run.workflow_name(),
        run.run_id(),
        run.status()
    );
    match run.status() {
        RunStatus::Failed => formatter.error(&headline),
        _ => formatter.success(&headline),
    }

    formatter.info(&format!(
        "Progress: step {}/{}",
        run.current_step_index(),
        run.step_count()
    ));
    for result in run.step_results() {
        let elapsed = result.completed_at - result.started_at;
        formatter.info(&format!(
            "  \u{2713} {} ({}ms)",
            result.step_name,
            elapsed.num_milliseconds()
        ));
    }
    if let Some(failure) = run.failure() {
        formatter.info(&format!(
            "  \u{2717} {} [{}]: {}",
            failure.step_name, failure.kind, failure.message
        ));
    }
    if let Some(summary) = run
        .step_results()
        .last()
        .and_then(|r| r.output.get("summary"))
        .and_then(Value::as_str)
    {
        formatter.info(&format!("Result: {summary}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_parse_json_values() {
        assert_eq!(
            parse_param("max_transfer_bytes=1024").unwrap(),
            ("max_transfer_bytes".to_string(), Value::from(1024))
        );
        assert_eq!(
            parse_param("dry_run=true").unwrap(),
            ("dry_run".to_string(), Value::Bool(true))
        );
    }

    #[test]
    fn params_fall_back_to_strings() {
        assert_eq!(
            parse_param("source=drive-a").unwrap(),
            ("source".to_string(), Value::from("drive-a"))
        );
        assert_eq!(
            parse_param("note=a=b").unwrap(),
            ("note".to_string(), Value::from("a=b"))
        );
    }

    #[test]
    fn params_need_a_key() {
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }
}
