//! Per-invocation dependencies
//!
//! Every command receives an [`AppContext`] and asks it for the services it
//! needs. Nothing is global: the sync service, session store and workflow
//! engine are built from the loaded configuration on demand.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use omnidrive_cache::{DatabasePool, SqliteSessionStore};
use omnidrive_core::config::Config;
use omnidrive_core::ports::ISessionStore;
use omnidrive_sync::SyncService;
use omnidrive_workflow::{ActionRegistry, WorkflowEngine, WorkflowRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

pub struct AppContext {
    config_path: PathBuf,
    config: Config,
    format: OutputFormat,
    quiet: bool,
}

impl AppContext {
    pub fn new(config_path: PathBuf, config: Config, format: OutputFormat, quiet: bool) -> Self {
        Self {
            config_path,
            config,
            format,
            quiet,
        }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    pub fn sync_service(&self) -> Result<Arc<SyncService>> {
        let service = SyncService::from_config(&self.config)
            .context("Failed to set up storage backends")?;
        debug!(backends = service.registry().len(), "Sync service ready");
        Ok(Arc::new(service))
    }

    /// Opens the SQLite session store
    pub async fn session_store(&self) -> Result<Arc<dyn ISessionStore>> {
        let pool = DatabasePool::new(&self.config.session_store.database)
            .await
            .context("Failed to open session database")?;
        Ok(Arc::new(SqliteSessionStore::new(pool.pool().clone())))
    }

    pub async fn workflow_engine(&self) -> Result<WorkflowEngine> {
        let sync = self.sync_service()?;
        let store = self.session_store().await?;
        Ok(WorkflowEngine::new(
            Arc::new(WorkflowRegistry::builtin()),
            Arc::new(ActionRegistry::builtin(sync)),
            store,
        ))
    }
}

/// A token cancelled when the user presses Ctrl+C
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping after in-flight work");
            trigger.cancel();
        }
    });
    token
}
