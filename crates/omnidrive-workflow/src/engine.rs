//! Workflow engine
//!
//! Executes one [`WorkflowRun`] at a time per call:
//!
//! 1. the run is created `pending`, moved to `running` and persisted;
//! 2. steps execute strictly in order, each with the accumulated context;
//! 3. after every step the run snapshot is written to the session store
//!    under `workflow-run/{workflow}/{run_id}`;
//! 4. the first failing step marks the run `failed` and nothing after it
//!    runs; otherwise the run ends `completed`.
//!
//! The cancellation token is checked before every step. A cancelled run is
//! `failed` with failure kind `cancelled`.
//!
//! ## Context
//!
//! The context starts as the run parameters (a JSON object). After a step
//! succeeds, its output is stored under the step name and, when the output
//! is an object, each of its keys is also merged in at the top level. A
//! step's own parameters override context keys for that step only.

use std::sync::Arc;

use chrono::Utc;
use omnidrive_core::domain::{RunId, StepDefinition, StepResult, Workflow, WorkflowRun};
use omnidrive_core::ports::{ISessionStore, Namespace};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::actions::{ActionRegistry, StepContext};
use crate::error::{StepErrorKind, WorkflowError, WorkflowStepError};
use crate::registry::{WorkflowRegistry, WorkflowSummary};

/// Session store key of one run
fn run_key(workflow: &str, run_id: &RunId) -> String {
    format!("{workflow}/{run_id}")
}

/// A workflow running on a spawned task
pub struct RunHandle {
    run_id: RunId,
    task: JoinHandle<Result<WorkflowRun, WorkflowError>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Waits for the run to reach a terminal state
    pub async fn wait(self) -> Result<WorkflowRun, WorkflowError> {
        self.task
            .await
            .map_err(|e| WorkflowError::Aborted(e.to_string()))?
    }
}

/// Runs workflows from a fixed registry and checkpoints them
#[derive(Clone)]
pub struct WorkflowEngine {
    workflows: Arc<WorkflowRegistry>,
    actions: Arc<ActionRegistry>,
    store: Arc<dyn ISessionStore>,
}

impl WorkflowEngine {
    pub fn new(
        workflows: Arc<WorkflowRegistry>,
        actions: Arc<ActionRegistry>,
        store: Arc<dyn ISessionStore>,
    ) -> Self {
        Self {
            workflows,
            actions,
            store,
        }
    }

    pub fn list_workflows(&self) -> Vec<WorkflowSummary> {
        self.workflows.list()
    }

    /// Runs `name` to completion
    pub async fn run(&self, name: &str, params: Value) -> Result<WorkflowRun, WorkflowError> {
        self.run_with_cancel(name, params, &CancellationToken::new())
            .await
    }

    /// Runs `name` to completion, stopping between steps once `cancel` fires
    pub async fn run_with_cancel(
        &self,
        name: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<WorkflowRun, WorkflowError> {
        let (workflow, run) = self.prepare(name, params).await?;
        self.execute(&workflow, run, cancel).await
    }

    /// Starts `name` on a spawned task and returns once the run is persisted
    ///
    /// The run is visible through [`get_status`](Self::get_status) as soon
    /// as this returns.
    pub async fn start(
        &self,
        name: &str,
        params: Value,
        cancel: CancellationToken,
    ) -> Result<RunHandle, WorkflowError> {
        let (workflow, run) = self.prepare(name, params).await?;
        let run_id = *run.run_id();
        let engine = self.clone();
        let task = tokio::spawn(async move { engine.execute(&workflow, run, &cancel).await });
        Ok(RunHandle { run_id, task })
    }

    /// Latest stored snapshot of a run
    pub async fn get_status(
        &self,
        name: &str,
        run_id: &RunId,
    ) -> Result<WorkflowRun, WorkflowError> {
        self.workflows.get(name)?;
        let record = self
            .store
            .get(Namespace::WorkflowRun, &run_key(name, run_id))
            .await
            .map_err(WorkflowError::Store)?
            .ok_or_else(|| WorkflowError::RunNotFound {
                workflow: name.to_string(),
                run_id: *run_id,
            })?;
        Ok(serde_json::from_value(record.value)?)
    }

    /// Stored runs of `name`, most recently updated first
    pub async fn list_runs(&self, name: &str) -> Result<Vec<WorkflowRun>, WorkflowError> {
        self.workflows.get(name)?;
        let prefix = format!("{name}/");
        let records = self
            .store
            .list(Namespace::WorkflowRun)
            .await
            .map_err(WorkflowError::Store)?;

        Ok(records
            .into_iter()
            .filter(|r| r.key.starts_with(&prefix))
            .filter_map(|r| match serde_json::from_value::<WorkflowRun>(r.value) {
                Ok(run) => Some(run),
                Err(e) => {
                    warn!(key = %r.key, error = %e, "Skipping unreadable workflow run");
                    None
                }
            })
            .collect())
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn prepare(
        &self,
        name: &str,
        params: Value,
    ) -> Result<(Workflow, WorkflowRun), WorkflowError> {
        let workflow = self.workflows.get(name)?.clone();
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            Value::Object(map) => Value::Object(map),
            other => {
                return Err(WorkflowError::InvalidParams(format!(
                    "expected a JSON object, got {other}"
                )))
            }
        };
        let run = WorkflowRun::new(&workflow, params);
        self.persist(&run).await?;
        Ok((workflow, run))
    }

    async fn persist(&self, run: &WorkflowRun) -> Result<(), WorkflowError> {
        let value = serde_json::to_value(run)?;
        self.store
            .put(
                Namespace::WorkflowRun,
                &run_key(run.workflow_name(), run.run_id()),
                &value,
            )
            .await
            .map_err(WorkflowError::Store)
    }

    #[instrument(skip_all, fields(workflow = %workflow.name(), run_id = %run.run_id()))]
    async fn execute(
        &self,
        workflow: &Workflow,
        mut run: WorkflowRun,
        cancel: &CancellationToken,
    ) -> Result<WorkflowRun, WorkflowError> {
        run.start()?;
        self.persist(&run).await?;
        info!(steps = workflow.step_count(), "Workflow started");

        let mut context = match run.params() {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };

        for (index, step) in workflow.steps().iter().enumerate() {
            if cancel.is_cancelled() {
                let err = WorkflowStepError::new(
                    index,
                    step.name(),
                    step.action(),
                    StepErrorKind::Cancelled,
                    "workflow cancelled before this step",
                );
                return self.finish_failed(run, err).await;
            }

            let started_at = Utc::now();
            debug!(step = index, name = %step.name(), action = %step.action(), "Step started");

            let outcome = match self.actions.get(step.action()) {
                Some(action) => {
                    let ctx = StepContext::new(
                        *run.run_id(),
                        workflow.name(),
                        index,
                        step_values(&context, step),
                        cancel.clone(),
                    );
                    action.execute(&ctx).await.map_err(|e| {
                        WorkflowStepError::action_failed(index, step.name(), step.action(), e)
                    })
                }
                None => Err(WorkflowStepError::new(
                    index,
                    step.name(),
                    step.action(),
                    StepErrorKind::UnknownAction,
                    format!("no action registered as '{}'", step.action()),
                )),
            };

            let output = match outcome {
                Ok(output) => output,
                Err(err) => return self.finish_failed(run, err).await,
            };

            merge_output(&mut context, step.name(), &output);
            run.record_step(StepResult {
                step_index: index,
                step_name: step.name().to_string(),
                action: step.action().to_string(),
                output,
                started_at,
                completed_at: Utc::now(),
            })?;
            self.persist(&run).await?;
            debug!(step = index, "Step completed");
        }

        run.complete()?;
        self.persist(&run).await?;
        info!("Workflow completed");
        Ok(run)
    }

    async fn finish_failed(
        &self,
        mut run: WorkflowRun,
        err: WorkflowStepError,
    ) -> Result<WorkflowRun, WorkflowError> {
        warn!(error = %err, "Workflow failed");
        run.fail(err.to_failure())?;
        self.persist(&run).await?;
        Ok(run)
    }
}

/// Context passed to `step`: the run context overlaid with the step's params
fn step_values(context: &Map<String, Value>, step: &StepDefinition) -> Map<String, Value> {
    let mut values = context.clone();
    for (key, value) in step.params() {
        values.insert(key.clone(), value.clone());
    }
    values
}

/// Folds a step output into the run context
fn merge_output(context: &mut Map<String, Value>, step_name: &str, output: &Value) {
    if let Value::Object(fields) = output {
        for (key, value) in fields {
            context.insert(key.clone(), value.clone());
        }
    }
    context.insert(step_name.to_string(), output.clone());
}
