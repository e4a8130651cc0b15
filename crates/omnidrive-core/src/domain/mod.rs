//! Domain entities and value objects

pub mod errors;
pub mod file_record;
pub mod newtypes;
pub mod session;
pub mod sync_plan;
pub mod transfer;
pub mod workflow;

pub use errors::DomainError;
pub use file_record::{Catalog, FileRecord, FOLDER_MIME_TYPE};
pub use newtypes::{BackendName, RunId};
pub use session::SessionRecord;
pub use sync_plan::{KeyPolicy, MatchedPair, RecordKey, SyncDirection, SyncMode, SyncPlan};
pub use transfer::{
    SyncReport, SyncStatus, SyncTotals, TransferFailure, TransferOutcome, TransferResult,
};
pub use workflow::{RunStatus, StepDefinition, StepFailure, StepResult, Workflow, WorkflowRun};
