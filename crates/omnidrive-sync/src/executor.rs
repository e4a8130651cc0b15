//! Sync executor
//!
//! Executes the transfer set of a [`SyncPlan`]: every selected record is
//! downloaded from the sending backend into a scratch directory and uploaded
//! to the receiving backend's root. Folders are recreated with
//! `create_folder` instead. Records whose name is not a single file name
//! (empty, `.`, `..`, or containing a path separator) are skipped with note
//! `unsupported name`.
//!
//! ## Concurrency
//!
//! Units run on a pool bounded by a [`Semaphore`] of `max_workers` permits.
//! Each unit reports its input index and the final report is reassembled in
//! input order. One failed unit never affects another.
//!
//! ## Retries
//!
//! A unit (download plus upload) is retried as a whole on transient errors;
//! `attempts` in the result counts whole-unit attempts. Every adapter call
//! runs under the per-call timeout.
//!
//! ## Cancellation
//!
//! Cancelling the token stops dispatch. Units already running finish;
//! units never started are reported as skipped with note `cancelled`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use omnidrive_core::config::SyncConfig;
use omnidrive_core::domain::{
    FileRecord, SyncDirection, SyncMode, SyncPlan, SyncReport, TransferFailure, TransferResult,
};
use omnidrive_core::ports::{AdapterError, IStorageAdapter};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::SyncExecutionError;
use crate::normalizer::normalize_entry;
use crate::registry::BackendRegistry;
use crate::retry::{with_retry, with_timeout, RetryPolicy, Transient};

/// Note attached to units skipped in dry-run mode
pub const NOTE_DRY_RUN: &str = "dry run";
/// Note attached to units never started because the run was cancelled
pub const NOTE_CANCELLED: &str = "cancelled";
/// Note attached to trashed records
pub const NOTE_TRASHED: &str = "trashed";
/// Note attached to records whose name cannot be stored as a file
pub const NOTE_UNSUPPORTED_NAME: &str = "unsupported name";

/// Executor tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Maximum number of units in flight
    pub max_workers: usize,
    pub retry: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_workers: config.max_workers.max(1),
            retry: RetryPolicy::from_config(config),
        }
    }
}

// ============================================================================
// Transfer unit
// ============================================================================

/// Half of a unit that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Download,
    Upload,
    CreateFolder,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Upload => "upload",
            Stage::CreateFolder => "create_folder",
        }
    }
}

#[derive(Debug)]
struct StageError {
    stage: Stage,
    error: AdapterError,
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage.as_str(), self.error)
    }
}

impl Transient for StageError {
    fn is_transient(&self) -> bool {
        self.error.is_transient()
    }
}

impl StageError {
    fn at(stage: Stage) -> impl Fn(AdapterError) -> StageError {
        move |error| StageError { stage, error }
    }

    fn into_failure(self) -> TransferFailure {
        TransferFailure {
            kind: self.error.kind().as_str().to_string(),
            stage: self.stage.as_str().to_string(),
            message: self.error.message().to_string(),
        }
    }
}

/// One record moving from one backend to the other
struct TransferUnit {
    index: usize,
    record: FileRecord,
    from: Arc<dyn IStorageAdapter>,
    to: Arc<dyn IStorageAdapter>,
    scratch: PathBuf,
    retry: RetryPolicy,
}

impl TransferUnit {
    async fn run(self) -> (usize, TransferResult) {
        let (outcome, attempts) = with_retry(&self.retry, "transfer", || self.attempt()).await;

        let result = match outcome {
            Ok(created) => {
                debug!(name = %self.record.name(), attempts, "Transfer succeeded");
                TransferResult::succeeded(self.record.clone(), attempts, Some(created))
            }
            Err(err) => {
                warn!(name = %self.record.name(), attempts, error = %err, "Transfer failed");
                TransferResult::failed(self.record.clone(), attempts, err.into_failure())
            }
        };
        let _ = tokio::fs::remove_dir_all(&self.scratch).await;
        (self.index, result)
    }

    async fn attempt(&self) -> Result<FileRecord, StageError> {
        let timeout = self.retry.call_timeout;

        if self.record.is_folder() {
            let entry = with_timeout(
                timeout,
                "create_folder",
                self.to.create_folder(self.record.name(), None),
            )
            .await
            .map_err(StageError::at(Stage::CreateFolder))?;
            return Ok(normalize_entry(entry));
        }

        tokio::fs::create_dir_all(&self.scratch)
            .await
            .map_err(|e| StageError::at(Stage::Download)(e.into()))?;
        let local = self.scratch.join(self.record.name());

        let downloaded = with_timeout(
            timeout,
            "download_file",
            self.from.download_file(self.record.id(), &local),
        )
        .await
        .map_err(StageError::at(Stage::Download))?;

        let uploaded = with_timeout(timeout, "upload_file", self.to.upload_file(&downloaded, None))
            .await
            .map_err(StageError::at(Stage::Upload))?;

        let _ = tokio::fs::remove_file(&downloaded).await;
        Ok(normalize_entry(uploaded))
    }
}

/// Returns true if `name` can be used unchanged as a single file name
///
/// Uploads take their name from the scratch copy, so a name that would have
/// to be rewritten could never match on the next comparison.
pub fn is_storable_name(name: &str) -> bool {
    !matches!(name, "" | "." | "..") && !name.contains(['/', '\\', '\0'])
}

/// Result for a record that must not be transferred at all
fn precheck(record: &FileRecord) -> Option<TransferResult> {
    if record.is_trashed() {
        return Some(TransferResult::skipped(record.clone(), NOTE_TRASHED));
    }
    if !is_storable_name(record.name()) {
        warn!(name = %record.name(), "Name cannot be stored as a file, skipping");
        return Some(TransferResult::skipped(record.clone(), NOTE_UNSUPPORTED_NAME));
    }
    None
}

// ============================================================================
// SyncExecutor
// ============================================================================

/// Runs transfer sets against adapters from a [`BackendRegistry`]
#[derive(Clone)]
pub struct SyncExecutor {
    registry: Arc<BackendRegistry>,
    config: ExecutorConfig,
}

impl SyncExecutor {
    pub fn new(registry: Arc<BackendRegistry>, config: ExecutorConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Executes the plan's transfer set for `direction`
    pub async fn execute(
        &self,
        plan: &SyncPlan,
        direction: SyncDirection,
        mode: SyncMode,
    ) -> Result<SyncReport, SyncExecutionError> {
        self.execute_with_cancel(plan, direction, mode, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), stopping dispatch once `cancel` fires
    #[instrument(skip_all, fields(source = %plan.source(), target = %plan.target(), mode = ?mode))]
    pub async fn execute_with_cancel(
        &self,
        plan: &SyncPlan,
        direction: SyncDirection,
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncExecutionError> {
        if plan.source() == plan.target() {
            return Err(SyncExecutionError::SelfSync(plan.source().clone()));
        }
        if plan.is_incomplete() {
            return Err(SyncExecutionError::IncompletePlan {
                errors: plan.listing_errors().to_vec(),
            });
        }
        if plan.is_destination_truncated(direction) {
            let (_, to, _) = plan.transfer_set(direction);
            return Err(SyncExecutionError::TruncatedDestination(to.clone()));
        }

        let (from, to, records) = plan.transfer_set(direction);
        let from_adapter = self.registry.get(from)?;
        let to_adapter = self.registry.get(to)?;
        let started_at = Utc::now();

        if mode.is_dry_run() {
            let results = records
                .iter()
                .map(|r| match precheck(r) {
                    Some(skipped) => skipped,
                    None => TransferResult::skipped(r.clone(), NOTE_DRY_RUN),
                })
                .collect();
            let report = SyncReport::from_results(
                from.clone(),
                to.clone(),
                direction,
                mode,
                started_at,
                results,
                false,
            );
            info!(total = report.totals().total, "Dry run planned");
            return Ok(report);
        }

        let workspace = tempfile::Builder::new().prefix("omnidrive-sync-").tempdir()?;
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut slots: Vec<Option<TransferResult>> = vec![None; records.len()];
        let mut dispatched = vec![false; records.len()];
        let mut cancelled = false;

        info!(
            total = records.len(),
            workers = self.config.max_workers,
            "Starting transfers"
        );

        for (index, record) in records.iter().enumerate() {
            if let Some(skipped) = precheck(record) {
                slots[index] = Some(skipped);
                continue;
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        cancelled = true;
                        break;
                    }
                },
            };

            let unit = TransferUnit {
                index,
                record: record.clone(),
                from: Arc::clone(&from_adapter),
                to: Arc::clone(&to_adapter),
                scratch: workspace.path().join(index.to_string()),
                retry: self.config.retry,
            };
            dispatched[index] = true;
            tasks.spawn(async move {
                let _permit = permit;
                unit.run().await
            });
        }

        if cancelled {
            warn!("Sync cancelled, remaining transfers skipped");
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!(error = %e, "Transfer task aborted"),
            }
        }

        let results: Vec<TransferResult> = slots
            .into_iter()
            .zip(records)
            .zip(dispatched)
            .map(|((slot, record), was_dispatched)| match slot {
                Some(result) => result,
                None if was_dispatched => TransferResult::failed(
                    record.clone(),
                    1,
                    TransferFailure {
                        kind: "internal".to_string(),
                        stage: "transfer".to_string(),
                        message: "transfer task aborted".to_string(),
                    },
                ),
                None => TransferResult::skipped(record.clone(), NOTE_CANCELLED),
            })
            .collect();

        let report = SyncReport::from_results(
            from.clone(),
            to.clone(),
            direction,
            mode,
            started_at,
            results,
            cancelled,
        );
        info!(
            succeeded = report.totals().succeeded,
            failed = report.totals().failed,
            skipped = report.totals().skipped,
            status = %report.status(),
            "Transfers finished"
        );
        Ok(report)
    }
}
