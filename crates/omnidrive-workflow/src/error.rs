//! Workflow error types

use std::error::Error as StdError;

use chrono::Utc;
use omnidrive_core::domain::{DomainError, RunId, StepFailure};
use thiserror::Error;

/// Boxed error raised by a step action
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors returned by the engine itself
///
/// A step that fails does not produce a `WorkflowError`: the run is
/// returned with status `failed` and the step error recorded in it.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("unknown workflow '{name}' (available: {})", .available.join(", "))]
    UnknownWorkflow { name: String, available: Vec<String> },

    #[error("no run {run_id} for workflow '{workflow}'")]
    RunNotFound { workflow: String, run_id: RunId },

    /// Run parameters must be a JSON object
    #[error("invalid workflow parameters: {0}")]
    InvalidParams(String),

    #[error("session store error: {0:#}")]
    Store(anyhow::Error),

    #[error("stored workflow run is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The task running a detached workflow panicked or was aborted
    #[error("workflow task aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Why a step stopped the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepErrorKind {
    /// The action returned an error
    ActionFailed,
    /// No action is registered under the step's action name
    UnknownAction,
    /// The cancellation signal fired before the step started
    Cancelled,
}

impl StepErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepErrorKind::ActionFailed => "action_failed",
            StepErrorKind::UnknownAction => "unknown_action",
            StepErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for StepErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step failure with the step it happened in
#[derive(Debug, Error)]
#[error("step {step_index} '{step_name}' ({action}) {kind}: {source}")]
pub struct WorkflowStepError {
    pub step_index: usize,
    pub step_name: String,
    pub action: String,
    pub kind: StepErrorKind,
    #[source]
    pub source: BoxError,
}

impl WorkflowStepError {
    /// Wraps an action error
    pub fn action_failed(
        step_index: usize,
        step_name: &str,
        action: &str,
        error: anyhow::Error,
    ) -> Self {
        Self {
            step_index,
            step_name: step_name.to_string(),
            action: action.to_string(),
            kind: StepErrorKind::ActionFailed,
            source: error.into(),
        }
    }

    pub fn new(
        step_index: usize,
        step_name: &str,
        action: &str,
        kind: StepErrorKind,
        message: impl Into<String>,
    ) -> Self {
        let message: String = message.into();
        Self {
            step_index,
            step_name: step_name.to_string(),
            action: action.to_string(),
            kind,
            source: message.into(),
        }
    }

    /// Full cause chain, outermost first, joined with `: `
    pub fn message(&self) -> String {
        let mut message = self.source.to_string();
        let mut cause = self.source.source();
        while let Some(err) = cause {
            message.push_str(": ");
            message.push_str(&err.to_string());
            cause = err.source();
        }
        message
    }

    /// The record stored in the run
    pub fn to_failure(&self) -> StepFailure {
        StepFailure {
            step_index: self.step_index,
            step_name: self.step_name.clone(),
            action: self.action.clone(),
            kind: self.kind.as_str().to_string(),
            message: self.message(),
            failed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn message_includes_cause_chain() {
        let inner: anyhow::Result<()> = Err(anyhow::anyhow!("quota exceeded"));
        let err = inner.context("upload failed").unwrap_err();
        let step = WorkflowStepError::action_failed(2, "transfer", "transfer", err);

        assert_eq!(step.message(), "upload failed: quota exceeded");
        let failure = step.to_failure();
        assert_eq!(failure.kind, "action_failed");
        assert_eq!(failure.step_index, 2);
    }

    #[test]
    fn display_names_the_step() {
        let step = WorkflowStepError::new(
            0,
            "detect",
            "detect-new-files",
            StepErrorKind::UnknownAction,
            "no such action",
        );
        assert_eq!(
            step.to_string(),
            "step 0 'detect' (detect-new-files) unknown_action: no such action"
        );
    }

    #[test]
    fn unknown_workflow_lists_available() {
        let err = WorkflowError::UnknownWorkflow {
            name: "nightly".into(),
            available: vec!["backup".into(), "smart-sync".into()],
        };
        assert_eq!(
            err.to_string(),
            "unknown workflow 'nightly' (available: backup, smart-sync)"
        );
    }
}
