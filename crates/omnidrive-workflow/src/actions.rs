//! Step actions
//!
//! An action is the code behind a step's symbolic action name. It receives
//! a [`StepContext`] (run parameters merged with the outputs of earlier
//! steps) and returns a JSON output that is merged back into the context
//! for the steps after it.
//!
//! Built-in actions and the context keys they read and write:
//!
//! | Action | Reads | Writes |
//! |--------|-------|--------|
//! | `detect-new-files` | `source`, `target`, `limit` | `plan`, `new_files`, `new_bytes` |
//! | `snapshot-catalog` | `source`, `target`, `limit` | `snapshot`, `plan`, `new_files` |
//! | `validate-capacity` | `plan`, `max_transfer_bytes` | `required_bytes`, `free_bytes` |
//! | `transfer`, `transfer-all` | `plan`, `dry_run` | `report`, `summary` |
//! | `report` | `report` | `status`, `summary`, `totals` |

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use omnidrive_core::domain::{
    FileRecord, RunId, SyncDirection, SyncMode, SyncPlan, SyncReport,
};
use omnidrive_core::ports::StorageQuota;
use omnidrive_sync::SyncService;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Built-in action names
pub mod names {
    pub const DETECT_NEW_FILES: &str = "detect-new-files";
    pub const VALIDATE_CAPACITY: &str = "validate-capacity";
    pub const TRANSFER: &str = "transfer";
    pub const SNAPSHOT_CATALOG: &str = "snapshot-catalog";
    pub const TRANSFER_ALL: &str = "transfer-all";
    pub const REPORT: &str = "report";
}

// ============================================================================
// StepContext
// ============================================================================

/// What an action sees when it runs
#[derive(Debug, Clone)]
pub struct StepContext {
    run_id: RunId,
    workflow: String,
    step_index: usize,
    values: Map<String, Value>,
    cancel: CancellationToken,
}

impl StepContext {
    pub fn new(
        run_id: RunId,
        workflow: impl Into<String>,
        step_index: usize,
        values: Map<String, Value>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            workflow: workflow.into(),
            step_index,
            values,
            cancel,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Cancellation signal of the run; long actions pass it down
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// A string parameter that must be present
    pub fn require_str(&self, key: &str) -> anyhow::Result<&str> {
        match self.get(key) {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(other) => bail!("parameter '{key}' must be a string, got {other}"),
            None => bail!("missing parameter '{key}'"),
        }
    }

    pub fn u64(&self, key: &str) -> anyhow::Result<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v.as_u64().map(Some).with_context(|| {
                format!("parameter '{key}' must be a non-negative integer, got {v}")
            }),
        }
    }

    pub fn bool(&self, key: &str) -> anyhow::Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_bool()
                .map(Some)
                .with_context(|| format!("parameter '{key}' must be a boolean, got {v}")),
        }
    }

    /// Deserializes a context value written by an earlier step
    pub fn decode<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<T> {
        let value = self
            .get(key)
            .with_context(|| format!("'{key}' is not in the workflow context"))?;
        serde_json::from_value(value.clone())
            .with_context(|| format!("'{key}' has an unexpected shape"))
    }
}

// ============================================================================
// StepAction / ActionRegistry
// ============================================================================

/// Code run by a workflow step
#[async_trait::async_trait]
pub trait StepAction: Send + Sync {
    async fn execute(&self, ctx: &StepContext) -> anyhow::Result<Value>;
}

/// Actions by name
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn StepAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in actions, all backed by `sync`
    pub fn builtin(sync: Arc<SyncService>) -> Self {
        let transfer: Arc<dyn StepAction> = Arc::new(Transfer {
            sync: Arc::clone(&sync),
        });
        Self::new()
            .with(
                names::DETECT_NEW_FILES,
                Arc::new(DetectNewFiles {
                    sync: Arc::clone(&sync),
                }),
            )
            .with(
                names::SNAPSHOT_CATALOG,
                Arc::new(SnapshotCatalog {
                    sync: Arc::clone(&sync),
                }),
            )
            .with(
                names::VALIDATE_CAPACITY,
                Arc::new(ValidateCapacity {
                    sync: Arc::clone(&sync),
                }),
            )
            .with(names::TRANSFER, Arc::clone(&transfer))
            .with(names::TRANSFER_ALL, transfer)
            .with(names::REPORT, Arc::new(Report))
    }

    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn StepAction>) {
        self.actions.insert(name.into(), action);
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, action: Arc<dyn StepAction>) -> Self {
        self.register(name, action);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StepAction>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// ============================================================================
// Built-in actions
// ============================================================================

fn backends(ctx: &StepContext) -> anyhow::Result<(&str, &str)> {
    Ok((ctx.require_str("source")?, ctx.require_str("target")?))
}

fn limit(ctx: &StepContext) -> anyhow::Result<Option<usize>> {
    Ok(ctx.u64("limit")?.map(|n| n as usize))
}

/// Bytes that a transfer of `records` would move
fn transfer_bytes(records: &[FileRecord]) -> u64 {
    records
        .iter()
        .filter(|r| !r.is_folder() && !r.is_trashed())
        .map(FileRecord::size)
        .sum()
}

/// Computes the plan of records only in the source
struct DetectNewFiles {
    sync: Arc<SyncService>,
}

#[async_trait::async_trait]
impl StepAction for DetectNewFiles {
    async fn execute(&self, ctx: &StepContext) -> anyhow::Result<Value> {
        let (source, target) = backends(ctx)?;
        let plan = self
            .sync
            .plan_sync(source, target, SyncDirection::SourceToTarget, limit(ctx)?)
            .await
            .with_context(|| format!("detecting new files from {source} to {target}"))?;

        let new_files = plan.only_in_source();
        info!(
            run_id = %ctx.run_id(),
            new_files = new_files.len(),
            "New files detected"
        );
        Ok(json!({
            "plan": serde_json::to_value(&plan)?,
            "new_files": new_files.len(),
            "new_bytes": transfer_bytes(new_files),
            "already_present": plan.common().len(),
        }))
    }
}

/// Captures the source catalog and plans a full backup onto the target
struct SnapshotCatalog {
    sync: Arc<SyncService>,
}

#[async_trait::async_trait]
impl StepAction for SnapshotCatalog {
    async fn execute(&self, ctx: &StepContext) -> anyhow::Result<Value> {
        let (source, target) = backends(ctx)?;
        if source == target {
            bail!("refusing to back up {source} onto itself");
        }
        let limit = limit(ctx)?;

        let source_catalog = self
            .sync
            .capture_catalog(source, None, limit)
            .await
            .with_context(|| format!("capturing catalog of {source}"))?;
        let target_catalog = self
            .sync
            .capture_bounded(target, None, None)
            .await
            .with_context(|| format!("capturing catalog of {target}"))?;
        let plan = self.sync.comparator().compare(&source_catalog, &target_catalog)?;

        info!(
            run_id = %ctx.run_id(),
            records = source_catalog.len(),
            missing = plan.only_in_source().len(),
            "Catalog snapshot taken"
        );
        Ok(json!({
            "snapshot": {
                "backend": source_catalog.backend().as_str(),
                "captured_at": source_catalog.captured_at(),
                "records": source_catalog.len(),
                "total_bytes": source_catalog.total_bytes(),
                "truncated": source_catalog.is_truncated(),
            },
            "plan": serde_json::to_value(&plan)?,
            "new_files": plan.only_in_source().len(),
        }))
    }
}

/// Fails when the planned bytes do not fit the target or the caller's cap
struct ValidateCapacity {
    sync: Arc<SyncService>,
}

#[async_trait::async_trait]
impl StepAction for ValidateCapacity {
    async fn execute(&self, ctx: &StepContext) -> anyhow::Result<Value> {
        let plan: SyncPlan = ctx.decode("plan")?;
        let required = transfer_bytes(plan.only_in_source());

        let cap = ctx.u64("max_transfer_bytes")?;
        if let Some(cap) = cap {
            if required > cap {
                bail!("{required} bytes to transfer exceed max_transfer_bytes ({cap})");
            }
        }

        let target = plan.target().as_str();
        let quota = self.sync.storage_quota(target).await?;
        let free = quota.as_ref().and_then(StorageQuota::free_bytes);
        if let Some(free) = free {
            if required > free {
                bail!("{required} bytes to transfer but {target} has only {free} bytes free");
            }
        }

        Ok(json!({
            "required_bytes": required,
            "free_bytes": free,
            "max_transfer_bytes": cap,
        }))
    }
}

/// Executes the plan in the context
struct Transfer {
    sync: Arc<SyncService>,
}

#[async_trait::async_trait]
impl StepAction for Transfer {
    async fn execute(&self, ctx: &StepContext) -> anyhow::Result<Value> {
        let plan: SyncPlan = ctx.decode("plan")?;
        let mode = SyncMode::from_dry_run(ctx.bool("dry_run")?.unwrap_or(false));

        let report = self
            .sync
            .execute_plan(&plan, SyncDirection::SourceToTarget, mode, ctx.cancel_token())
            .await?;

        Ok(json!({
            "report": serde_json::to_value(&report)?,
            "summary": report.summary(),
        }))
    }
}

/// Summarizes the sync report; fails when every attempted transfer failed
struct Report;

#[async_trait::async_trait]
impl StepAction for Report {
    async fn execute(&self, ctx: &StepContext) -> anyhow::Result<Value> {
        let report: SyncReport = ctx.decode("report")?;
        if report.status().is_failed() {
            bail!("sync {}", report.summary());
        }
        Ok(json!({
            "status": report.status(),
            "summary": report.summary(),
            "totals": report.totals(),
            "cancelled": report.was_cancelled(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use omnidrive_core::domain::{BackendName, KeyPolicy};

    use super::*;

    fn ctx(values: Value) -> StepContext {
        let values = match values {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        StepContext::new(RunId::new(), "test", 0, values, CancellationToken::new())
    }

    #[test]
    fn context_accessors_check_types() {
        let ctx = ctx(json!({
            "source": "a",
            "limit": 5,
            "dry_run": true,
            "bad": "x",
            "gone": null,
        }));
        assert_eq!(ctx.require_str("source").unwrap(), "a");
        assert_eq!(ctx.u64("limit").unwrap(), Some(5));
        assert_eq!(ctx.bool("dry_run").unwrap(), Some(true));
        assert!(ctx.u64("bad").is_err());
        assert!(ctx.require_str("gone").is_err());
        assert_eq!(ctx.u64("missing").unwrap(), None);
    }

    #[test]
    fn decode_reports_missing_keys() {
        let err = ctx(json!({})).decode::<SyncPlan>("plan").unwrap_err();
        assert!(err.to_string().contains("'plan' is not in the workflow context"));
    }

    #[test]
    fn transfer_bytes_ignores_folders_and_trash() {
        let records = vec![
            FileRecord::file("1", "a", 10),
            FileRecord::folder("2", "dir"),
            FileRecord::file("3", "b", 5).with_trashed(true),
        ];
        assert_eq!(transfer_bytes(&records), 10);
    }

    #[tokio::test]
    async fn report_fails_when_nothing_succeeded() {
        let plan_record = FileRecord::file("1", "a", 1);
        let report = SyncReport::from_results(
            BackendName::new("a").unwrap(),
            BackendName::new("b").unwrap(),
            SyncDirection::SourceToTarget,
            SyncMode::Live,
            chrono::Utc::now(),
            vec![omnidrive_core::domain::TransferResult::failed(
                plan_record,
                1,
                omnidrive_core::domain::TransferFailure {
                    kind: "not_found".into(),
                    stage: "download".into(),
                    message: "gone".into(),
                },
            )],
            false,
        );
        let ctx = ctx(json!({ "report": serde_json::to_value(&report).unwrap() }));
        let err = Report.execute(&ctx).await.unwrap_err();
        assert!(err.to_string().starts_with("sync failed"));
    }

    #[test]
    fn builtin_registry_has_every_action() {
        let service = SyncService::new(
            Arc::new(omnidrive_sync::BackendRegistry::new()),
            omnidrive_sync::SyncSettings {
                key_policy: KeyPolicy::NameAndSize,
                ..omnidrive_sync::SyncSettings::default()
            },
        );
        let registry = ActionRegistry::builtin(Arc::new(service));
        assert_eq!(
            registry.names(),
            [
                "detect-new-files",
                "report",
                "snapshot-catalog",
                "transfer",
                "transfer-all",
                "validate-capacity",
            ]
        );
    }
}
