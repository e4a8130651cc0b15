//! OmniDrive Workflow - Sequenced multi-step automations
//!
//! A workflow is a fixed list of named steps, each bound to an action. The
//! [`WorkflowEngine`] runs the steps of one [`WorkflowRun`] strictly in
//! order, feeds each action the accumulated context, and writes a snapshot
//! of the run to the session store after every step so that observers can
//! poll progress.
//!
//! ## Modules
//!
//! - [`engine`] - Run loop, detached runs and status lookups
//! - [`registry`] - The fixed workflow registry (`smart-sync`, `backup`)
//! - [`actions`] - The `StepAction` trait, its registry and the built-in actions
//! - [`error`] - `WorkflowError` and `WorkflowStepError`
//!
//! [`WorkflowRun`]: omnidrive_core::domain::WorkflowRun

pub mod actions;
pub mod engine;
pub mod error;
pub mod registry;

pub use actions::{ActionRegistry, StepAction, StepContext};
pub use engine::{RunHandle, WorkflowEngine};
pub use error::{StepErrorKind, WorkflowError, WorkflowStepError};
pub use registry::{WorkflowRegistry, WorkflowSummary};
