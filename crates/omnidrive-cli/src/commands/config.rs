//! Config command - View and validate OmniDrive configuration
//!
//! `omnidrive config show` prints the effective configuration (defaults
//! filled in) and `omnidrive config validate` re-reads the file and reports
//! every problem found.

use anyhow::{Context, Result};
use clap::Subcommand;
use omnidrive_core::config::Config;
use tracing::info;

use crate::context::AppContext;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Validate => self.execute_validate(ctx),
        }
    }

    fn execute_show(&self, ctx: &AppContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config_path = ctx.config_path();
        info!(config_path = %config_path.display(), "Showing configuration");

        if ctx.format().is_json() {
            let json = serde_json::to_value(ctx.config())
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success(&format!("Configuration ({})", config_path.display()));
        if !config_path.exists() {
            formatter.info("File not found, showing defaults");
        }
        formatter.info("");
        let yaml = serde_yaml::to_string(ctx.config())
            .context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
        Ok(())
    }

    fn execute_validate(&self, ctx: &AppContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config_path = ctx.config_path();
        let path_display = config_path.display().to_string();

        if !config_path.exists() {
            if ctx.format().is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": path_display,
                    "errors": ["Configuration file not found. Using defaults."],
                }));
            } else {
                formatter.warn(&format!("Configuration file not found at {path_display}"));
                formatter.info("Using default configuration.");
            }
            return Ok(());
        }

        let config = match Config::load(config_path) {
            Ok(config) => config,
            Err(e) => {
                let message = format!("Failed to parse configuration: {e}");
                if ctx.format().is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": path_display,
                        "errors": [message],
                    }));
                } else {
                    formatter.error(&message);
                    formatter.info(&format!("File: {path_display}"));
                }
                anyhow::bail!("invalid configuration");
            }
        };

        info!(config_path = %path_display, "Validating configuration");
        let errors = config.validate();

        if ctx.format().is_json() {
            let error_strings: Vec<String> = errors.iter().map(ToString::to_string).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path_display,
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {path_display}"));
            formatter.info(&format!("Backends: {}", config.backends.len()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            for error in &errors {
                formatter.info(&format!("  - {error}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("invalid configuration")
        }
    }
}
