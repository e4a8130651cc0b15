//! Fixed workflow registry
//!
//! Workflows are registered once at process start and never change
//! afterwards; the engine holds the registry behind an `Arc`.

use std::collections::BTreeMap;

use omnidrive_core::domain::{StepDefinition, Workflow};
use serde::{Deserialize, Serialize};

use crate::actions::names;
use crate::error::WorkflowError;

pub const SMART_SYNC: &str = "smart-sync";
pub const BACKUP: &str = "backup";

/// Listing entry for one workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub description: String,
    pub step_count: usize,
}

/// Named workflows, sorted by name
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: BTreeMap<String, Workflow>,
}

impl WorkflowRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The predefined workflows
    pub fn builtin() -> Self {
        Self::new().with(smart_sync()).with(backup())
    }

    /// Adds a workflow, replacing one with the same name
    #[must_use]
    pub fn with(mut self, workflow: Workflow) -> Self {
        self.workflows.insert(workflow.name().to_string(), workflow);
        self
    }

    pub fn get(&self, name: &str) -> Result<&Workflow, WorkflowError> {
        self.workflows
            .get(name)
            .ok_or_else(|| WorkflowError::UnknownWorkflow {
                name: name.to_string(),
                available: self.workflows.keys().cloned().collect(),
            })
    }

    pub fn list(&self) -> Vec<WorkflowSummary> {
        self.workflows
            .values()
            .map(|w| WorkflowSummary {
                name: w.name().to_string(),
                description: w.description().to_string(),
                step_count: w.step_count(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

/// detect-new-files → validate-capacity → transfer → report
fn smart_sync() -> Workflow {
    Workflow::new(
        SMART_SYNC,
        "Copy files found only in the source to the target after checking target capacity",
        vec![
            StepDefinition::new(names::DETECT_NEW_FILES),
            StepDefinition::new(names::VALIDATE_CAPACITY),
            StepDefinition::new(names::TRANSFER),
            StepDefinition::new(names::REPORT),
        ],
    )
}

/// snapshot-catalog → transfer-all → report
fn backup() -> Workflow {
    Workflow::new(
        BACKUP,
        "Snapshot the source catalog and copy everything missing on the target",
        vec![
            StepDefinition::new(names::SNAPSHOT_CATALOG),
            StepDefinition::new(names::TRANSFER_ALL),
            StepDefinition::new(names::REPORT),
        ],
    )
}
