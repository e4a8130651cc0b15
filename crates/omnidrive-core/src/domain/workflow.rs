//! Workflow definitions and the WorkflowRun state machine
//!
//! A `Workflow` is an immutable, named sequence of steps registered at
//! process start. A `WorkflowRun` is one execution of it:
//!
//! ```text
//! pending -> running -> completed
//!                   \-> failed
//! ```
//!
//! While running, `current_step_index` only moves forward. A run that
//! failed is never resumed; it is re-invoked from step 0 as a new run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::DomainError;
use super::newtypes::RunId;

// ============================================================================
// Workflow definition
// ============================================================================

/// One step of a workflow: a symbolic action name plus a parameter bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    name: String,
    action: String,
    #[serde(default)]
    params: Map<String, Value>,
}

impl StepDefinition {
    /// Creates a step whose name is the action name
    pub fn new(action: impl Into<String>) -> Self {
        let action = action.into();
        Self {
            name: action.clone(),
            action,
            params: Map::new(),
        }
    }

    /// Overrides the display name of the step
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a step-level parameter
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }
}

/// Named, ordered sequence of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    name: String,
    description: String,
    steps: Vec<StepDefinition>,
}

impl Workflow {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<StepDefinition>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

// ============================================================================
// Run status
// ============================================================================

/// Lifecycle state of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Returns true once the run reached `completed` or `failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

// ============================================================================
// Step results
// ============================================================================

/// Output of one successfully completed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub step_name: String,
    pub action: String,
    #[serde(default)]
    pub output: Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// The error that stopped a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step_index: usize,
    pub step_name: String,
    pub action: String,
    /// Error category: `action_failed`, `unknown_action`, `cancelled`
    pub kind: String,
    pub message: String,
    pub failed_at: DateTime<Utc>,
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "step {} '{}' ({}) {}: {}",
            self.step_index, self.step_name, self.action, self.kind, self.message
        )
    }
}

// ============================================================================
// WorkflowRun
// ============================================================================

/// Mutable execution instance of a workflow
///
/// Owned by the engine while it executes; once terminal it is a historical
/// record and the transition methods reject further changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    run_id: RunId,
    workflow_name: String,
    status: RunStatus,
    current_step_index: usize,
    #[serde(default)]
    step_count: usize,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    step_results: Vec<StepResult>,
    #[serde(default)]
    failure: Option<StepFailure>,
    started_at: DateTime<Utc>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// Creates a pending run for `workflow` with the caller's parameters
    pub fn new(workflow: &Workflow, params: Value) -> Self {
        Self {
            run_id: RunId::new(),
            workflow_name: workflow.name().to_string(),
            status: RunStatus::Pending,
            current_step_index: 0,
            step_count: workflow.step_count(),
            params,
            step_results: Vec::new(),
            failure: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    // --- Getters ---

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Index of the step being (or last) executed
    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Results of the steps that completed, in execution order
    pub fn step_results(&self) -> &[StepResult] {
        &self.step_results
    }

    pub fn failure(&self) -> Option<&StepFailure> {
        self.failure.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    // --- Transitions ---

    /// `pending -> running`
    pub fn start(&mut self) -> Result<(), DomainError> {
        self.expect_status(RunStatus::Pending, RunStatus::Running)?;
        self.status = RunStatus::Running;
        self.started_at = Utc::now();
        Ok(())
    }

    /// Records a successful step and advances to the next index
    pub fn record_step(&mut self, result: StepResult) -> Result<(), DomainError> {
        self.expect_status(RunStatus::Running, RunStatus::Running)?;
        if result.step_index != self.current_step_index {
            return Err(DomainError::ValidationFailed(format!(
                "step result for index {} while at index {}",
                result.step_index, self.current_step_index
            )));
        }
        self.step_results.push(result);
        self.current_step_index += 1;
        Ok(())
    }

    /// `running -> completed`
    pub fn complete(&mut self) -> Result<(), DomainError> {
        self.expect_status(RunStatus::Running, RunStatus::Completed)?;
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `running -> failed`; the index stays on the failing step
    pub fn fail(&mut self, failure: StepFailure) -> Result<(), DomainError> {
        self.expect_status(RunStatus::Running, RunStatus::Failed)?;
        self.status = RunStatus::Failed;
        self.completed_at = Some(failure.failed_at);
        self.failure = Some(failure);
        Ok(())
    }

    fn expect_status(&self, expected: RunStatus, to: RunStatus) -> Result<(), DomainError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: to.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn workflow() -> Workflow {
        Workflow::new(
            "abc",
            "three steps",
            vec![
                StepDefinition::new("a"),
                StepDefinition::new("b").with_param("x", 1),
                StepDefinition::new("c").named("third"),
            ],
        )
    }

    fn result(index: usize, action: &str) -> StepResult {
        StepResult {
            step_index: index,
            step_name: action.into(),
            action: action.into(),
            output: json!({}),
            started_at: Utc::now(),
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn step_definition_builder() {
        let wf = workflow();
        assert_eq!(wf.step_count(), 3);
        assert_eq!(wf.steps()[1].params().get("x"), Some(&json!(1)));
        assert_eq!(wf.steps()[2].name(), "third");
        assert_eq!(wf.steps()[2].action(), "c");
    }

    #[test]
    fn happy_path_transitions() {
        let wf = workflow();
        let mut run = WorkflowRun::new(&wf, json!({}));
        assert_eq!(run.status(), RunStatus::Pending);

        run.start().unwrap();
        for (i, step) in wf.steps().iter().enumerate() {
            run.record_step(result(i, step.action())).unwrap();
        }
        run.complete().unwrap();

        assert_eq!(run.status(), RunStatus::Completed);
        assert_eq!(run.current_step_index(), 3);
        assert_eq!(run.step_results().len(), 3);
        assert!(run.completed_at().is_some());
    }

    #[test]
    fn failure_keeps_index_on_failing_step() {
        let wf = workflow();
        let mut run = WorkflowRun::new(&wf, json!({}));
        run.start().unwrap();
        run.record_step(result(0, "a")).unwrap();
        run.fail(StepFailure {
            step_index: 1,
            step_name: "b".into(),
            action: "b".into(),
            kind: "action_failed".into(),
            message: "boom".into(),
            failed_at: Utc::now(),
        })
        .unwrap();

        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.current_step_index(), 1);
        assert_eq!(run.step_results().len(), 1);
        assert_eq!(run.failure().map(|f| f.message.as_str()), Some("boom"));
    }

    #[test]
    fn terminal_runs_reject_transitions() {
        let wf = workflow();
        let mut run = WorkflowRun::new(&wf, Value::Null);
        assert!(run.complete().is_err());

        run.start().unwrap();
        run.complete().unwrap();
        assert!(run.start().is_err());
        assert!(run.record_step(result(0, "a")).is_err());
    }

    #[test]
    fn out_of_order_step_result_is_rejected() {
        let wf = workflow();
        let mut run = WorkflowRun::new(&wf, Value::Null);
        run.start().unwrap();
        assert!(run.record_step(result(2, "c")).is_err());
    }

    #[test]
    fn run_deserializes_with_unknown_fields() {
        let wf = workflow();
        let run = WorkflowRun::new(&wf, json!({"k": "v"}));
        let mut value = serde_json::to_value(&run).unwrap();
        value["added_later"] = json!(true);
        let back: WorkflowRun = serde_json::from_value(value).unwrap();
        assert_eq!(back, run);
    }
}
