//! Transfer outcomes and the aggregated SyncReport
//!
//! A `SyncReport` is the user-facing artifact of one sync run. Its results
//! are ordered exactly like the input record set, regardless of the order in
//! which concurrent transfers finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::file_record::FileRecord;
use super::newtypes::BackendName;
use super::sync_plan::{SyncDirection, SyncMode};

/// Outcome of one transfer unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferOutcome {
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferOutcome::Succeeded => write!(f, "succeeded"),
            TransferOutcome::Failed => write!(f, "failed"),
            TransferOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// Structured description of why a transfer failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFailure {
    /// Error category (e.g. `not_found`, `timeout`)
    pub kind: String,
    /// Which half of the unit failed: `download`, `upload`, `create_folder`
    pub stage: String,
    pub message: String,
}

impl std::fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed ({}): {}", self.stage, self.kind, self.message)
    }
}

// ============================================================================
// TransferResult
// ============================================================================

/// One outcome per record in the selected set
///
/// `error` is present if and only if `outcome` is `Failed`; the constructors
/// are the only way to build a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    record: FileRecord,
    outcome: TransferOutcome,
    #[serde(default)]
    error: Option<TransferFailure>,
    attempts: u32,
    /// Why the record was skipped (dry run, cancelled, trashed)
    #[serde(default)]
    note: Option<String>,
    /// Record created on the receiving backend
    #[serde(default)]
    created: Option<FileRecord>,
}

impl TransferResult {
    pub fn succeeded(record: FileRecord, attempts: u32, created: Option<FileRecord>) -> Self {
        Self {
            record,
            outcome: TransferOutcome::Succeeded,
            error: None,
            attempts,
            note: None,
            created,
        }
    }

    pub fn failed(record: FileRecord, attempts: u32, error: TransferFailure) -> Self {
        Self {
            record,
            outcome: TransferOutcome::Failed,
            error: Some(error),
            attempts,
            note: None,
            created: None,
        }
    }

    pub fn skipped(record: FileRecord, note: impl Into<String>) -> Self {
        Self {
            record,
            outcome: TransferOutcome::Skipped,
            error: None,
            attempts: 0,
            note: Some(note.into()),
            created: None,
        }
    }

    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    pub fn outcome(&self) -> TransferOutcome {
        self.outcome
    }

    pub fn error(&self) -> Option<&TransferFailure> {
        self.error.as_ref()
    }

    /// Number of unit attempts consumed (0 when skipped)
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn created(&self) -> Option<&FileRecord> {
        self.created.as_ref()
    }
}

// ============================================================================
// SyncReport
// ============================================================================

/// Overall verdict of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// At least one transfer succeeded, or nothing was attempted
    Completed,
    /// Transfers were attempted and none succeeded
    Failed,
}

impl SyncStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, SyncStatus::Failed)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Completed => write!(f, "completed"),
            SyncStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Counts per outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTotals {
    pub total: usize,
    /// Results that were not skipped
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Bytes moved by succeeded transfers
    pub bytes_transferred: u64,
}

/// Aggregated, ordered result of one sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    source: BackendName,
    target: BackendName,
    direction: SyncDirection,
    mode: SyncMode,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    results: Vec<TransferResult>,
    totals: SyncTotals,
    status: SyncStatus,
    #[serde(default)]
    cancelled: bool,
}

impl SyncReport {
    /// Builds a report from results already in input order
    ///
    /// `source`/`target` are the sending and receiving backends of this run.
    pub fn from_results(
        source: BackendName,
        target: BackendName,
        direction: SyncDirection,
        mode: SyncMode,
        started_at: DateTime<Utc>,
        results: Vec<TransferResult>,
        cancelled: bool,
    ) -> Self {
        let mut totals = SyncTotals {
            total: results.len(),
            ..SyncTotals::default()
        };
        for result in &results {
            match result.outcome() {
                TransferOutcome::Succeeded => {
                    totals.succeeded += 1;
                    totals.bytes_transferred += result.record().size();
                }
                TransferOutcome::Failed => totals.failed += 1,
                TransferOutcome::Skipped => totals.skipped += 1,
            }
        }
        totals.attempted = totals.succeeded + totals.failed;

        let status = if totals.attempted > 0 && totals.succeeded == 0 {
            SyncStatus::Failed
        } else {
            SyncStatus::Completed
        };

        Self {
            source,
            target,
            direction,
            mode,
            started_at,
            completed_at: Utc::now(),
            results,
            totals,
            status,
            cancelled,
        }
    }

    pub fn source(&self) -> &BackendName {
        &self.source
    }

    pub fn target(&self) -> &BackendName {
        &self.target
    }

    pub fn direction(&self) -> SyncDirection {
        self.direction
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    pub fn results(&self) -> &[TransferResult] {
        &self.results
    }

    pub fn totals(&self) -> &SyncTotals {
        &self.totals
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Results with the given outcome, in report order
    pub fn with_outcome(&self, outcome: TransferOutcome) -> impl Iterator<Item = &TransferResult> {
        self.results.iter().filter(move |r| r.outcome() == outcome)
    }

    /// One-line verdict, e.g. "completed with 2 failures"
    pub fn summary(&self) -> String {
        match (self.status, self.totals.failed) {
            (SyncStatus::Failed, _) => format!(
                "failed ({} of {} transfers failed)",
                self.totals.failed, self.totals.attempted
            ),
            (SyncStatus::Completed, 0) => "completed".to_string(),
            (SyncStatus::Completed, 1) => "completed with 1 failure".to_string(),
            (SyncStatus::Completed, n) => format!("completed with {n} failures"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> TransferFailure {
        TransferFailure {
            kind: "not_found".into(),
            stage: "download".into(),
            message: "gone".into(),
        }
    }

    fn report(results: Vec<TransferResult>) -> SyncReport {
        SyncReport::from_results(
            BackendName::new("a").unwrap(),
            BackendName::new("b").unwrap(),
            SyncDirection::SourceToTarget,
            SyncMode::Live,
            Utc::now(),
            results,
            false,
        )
    }

    #[test]
    fn error_present_only_when_failed() {
        let ok = TransferResult::succeeded(FileRecord::file("1", "a", 1), 1, None);
        let bad = TransferResult::failed(FileRecord::file("2", "b", 1), 3, failure());
        let skip = TransferResult::skipped(FileRecord::file("3", "c", 1), "dry run");

        assert!(ok.error().is_none());
        assert!(bad.error().is_some());
        assert!(skip.error().is_none());
        assert_eq!(skip.attempts(), 0);
        assert_eq!(skip.note(), Some("dry run"));
    }

    #[test]
    fn partial_failure_is_completed() {
        let report = report(vec![
            TransferResult::succeeded(FileRecord::file("1", "a", 10), 1, None),
            TransferResult::failed(FileRecord::file("2", "b", 20), 1, failure()),
            TransferResult::succeeded(FileRecord::file("3", "c", 30), 2, None),
        ]);

        assert_eq!(report.status(), SyncStatus::Completed);
        assert_eq!(report.totals().succeeded, 2);
        assert_eq!(report.totals().failed, 1);
        assert_eq!(report.totals().attempted, 3);
        assert_eq!(report.totals().bytes_transferred, 40);
        assert_eq!(report.summary(), "completed with 1 failure");
    }

    #[test]
    fn all_failed_is_failed() {
        let report = report(vec![TransferResult::failed(
            FileRecord::file("1", "a", 1),
            3,
            failure(),
        )]);
        assert_eq!(report.status(), SyncStatus::Failed);
        assert!(report.summary().starts_with("failed"));
    }

    #[test]
    fn nothing_attempted_is_completed() {
        let empty = report(vec![]);
        assert_eq!(empty.status(), SyncStatus::Completed);

        let skipped = report(vec![TransferResult::skipped(
            FileRecord::file("1", "a", 1),
            "dry run",
        )]);
        assert_eq!(skipped.status(), SyncStatus::Completed);
        assert_eq!(skipped.totals().attempted, 0);
        assert_eq!(skipped.totals().skipped, 1);
    }
}
