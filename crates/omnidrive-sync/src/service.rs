//! Compare / sync surface
//!
//! [`SyncService`] is the entry point used by the CLI and the workflow
//! actions. It resolves backend names through the [`BackendRegistry`],
//! captures catalogs, compares them and hands plans to the executor.
//!
//! - `compare` is read-only. A listing that fails part-way still yields a
//!   plan, flagged incomplete, built from the records gathered so far.
//! - `sync` fails closed: any listing error aborts before a single transfer.
//!   The listing limit bounds the side copied from; the side written to is
//!   listed in full.

use std::sync::Arc;

use omnidrive_core::config::{Config, SyncConfig};
use omnidrive_core::domain::{
    BackendName, Catalog, KeyPolicy, SyncDirection, SyncMode, SyncPlan, SyncReport,
};
use omnidrive_core::ports::{IStorageAdapter, StorageQuota};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::comparator::Comparator;
use crate::error::{SyncError, SyncExecutionError};
use crate::executor::{ExecutorConfig, SyncExecutor};
use crate::normalizer::{CatalogNormalizer, ListingOptions};
use crate::registry::BackendRegistry;
use crate::retry::{with_retry, with_timeout};

/// Service-wide defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Listing limit applied when the caller passes none
    pub default_limit: Option<usize>,
    pub include_trashed: bool,
    pub key_policy: KeyPolicy,
    pub executor: ExecutorConfig,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            default_limit: Some(100),
            include_trashed: false,
            key_policy: KeyPolicy::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            default_limit: Some(config.default_limit),
            include_trashed: config.include_trashed,
            key_policy: KeyPolicy::from_config_str(&config.key_policy).unwrap_or_default(),
            executor: ExecutorConfig::from_config(config),
        }
    }
}

/// Compare and sync across registered backends
#[derive(Clone)]
pub struct SyncService {
    registry: Arc<BackendRegistry>,
    normalizer: CatalogNormalizer,
    comparator: Comparator,
    executor: SyncExecutor,
    settings: SyncSettings,
}

impl SyncService {
    pub fn new(registry: Arc<BackendRegistry>, settings: SyncSettings) -> Self {
        Self {
            normalizer: CatalogNormalizer::new(settings.executor.retry),
            comparator: Comparator::new(settings.key_policy),
            executor: SyncExecutor::new(Arc::clone(&registry), settings.executor),
            registry,
            settings,
        }
    }

    /// Builds the registry and settings from configuration
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let registry = BackendRegistry::from_config(config)?;
        Ok(Self::new(
            Arc::new(registry),
            SyncSettings::from_config(&config.sync),
        ))
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn comparator(&self) -> &Comparator {
        &self.comparator
    }

    pub fn executor(&self) -> &SyncExecutor {
        &self.executor
    }

    fn effective_limit(&self, limit: Option<usize>) -> Option<usize> {
        limit.or(self.settings.default_limit)
    }

    fn listing_options(&self, scope: Option<&str>, limit: Option<usize>) -> ListingOptions {
        ListingOptions {
            scope: scope.map(str::to_string),
            limit,
            include_trashed: self.settings.include_trashed,
        }
    }

    async fn authenticate(
        &self,
        name: &BackendName,
        adapter: &dyn IStorageAdapter,
    ) -> Result<(), SyncError> {
        let retry = self.settings.executor.retry;
        let (result, _) = with_retry(&retry, "authenticate", || {
            with_timeout(retry.call_timeout, "authenticate", adapter.authenticate())
        })
        .await;
        result.map(|_| ()).map_err(|error| SyncError::Authentication {
            backend: name.clone(),
            error,
        })
    }

    /// Authenticates and captures one backend's catalog
    ///
    /// `limit` falls back to the configured default. Fails with
    /// [`SyncError::Catalog`] when the listing breaks part-way.
    pub async fn capture_catalog(
        &self,
        backend: &str,
        scope: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Catalog, SyncError> {
        self.capture_bounded(backend, scope, self.effective_limit(limit))
            .await
    }

    /// Captures `backend` with exactly `limit`; `None` lists everything
    pub async fn capture_bounded(
        &self,
        backend: &str,
        scope: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Catalog, SyncError> {
        let (name, adapter) = self.registry.resolve(backend)?;
        self.authenticate(&name, adapter.as_ref()).await?;
        let options = self.listing_options(scope, limit);
        Ok(self.normalizer.capture(&name, adapter.as_ref(), &options).await?)
    }

    /// Read-only capture of one backend
    ///
    /// Like [`capture_catalog`](Self::capture_catalog), but a listing that
    /// breaks part-way yields the records gathered so far, marked incomplete.
    pub async fn list_catalog(
        &self,
        backend: &str,
        scope: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Catalog, SyncError> {
        match self.capture_catalog(backend, scope, limit).await {
            Err(SyncError::Catalog(err)) => {
                warn!(backend = %err.backend, error = %err.error, "Using partial catalog");
                Ok(err.into_partial())
            }
            other => other,
        }
    }

    /// Read-only comparison of two backends
    #[instrument(skip(self))]
    pub async fn compare(
        &self,
        source: &str,
        target: &str,
        scope: Option<&str>,
        limit: Option<usize>,
    ) -> Result<SyncPlan, SyncError> {
        let source_catalog = self.list_catalog(source, scope, limit).await?;
        let target_catalog = self.list_catalog(target, scope, limit).await?;
        let plan = self.comparator.compare(&source_catalog, &target_catalog)?;

        info!(
            only_in_source = plan.only_in_source().len(),
            only_in_target = plan.only_in_target().len(),
            common = plan.common().len(),
            incomplete = plan.is_incomplete(),
            truncated = plan.is_truncated(),
            "Comparison complete"
        );
        Ok(plan)
    }

    /// Captures both catalogs strictly and compares them
    ///
    /// Rejects `source == target` before any adapter call. `limit` bounds
    /// only the side copied from in `direction`; the side written to is
    /// always listed in full so that files already there are recognized.
    pub async fn plan_sync(
        &self,
        source: &str,
        target: &str,
        direction: SyncDirection,
        limit: Option<usize>,
    ) -> Result<SyncPlan, SyncError> {
        let source_name = BackendName::new(source)?;
        let target_name = BackendName::new(target)?;
        if source_name == target_name {
            return Err(SyncExecutionError::SelfSync(source_name).into());
        }

        let (source_limit, target_limit) = match direction {
            SyncDirection::SourceToTarget => (self.effective_limit(limit), None),
            SyncDirection::TargetToSource => (None, self.effective_limit(limit)),
        };
        let source_catalog = self.capture_bounded(source, None, source_limit).await?;
        let target_catalog = self.capture_bounded(target, None, target_limit).await?;
        Ok(self.comparator.compare(&source_catalog, &target_catalog)?)
    }

    /// Transfers everything only in `source` to `target`
    pub async fn sync(
        &self,
        source: &str,
        target: &str,
        dry_run: bool,
        limit: Option<usize>,
    ) -> Result<SyncReport, SyncError> {
        self.sync_with_cancel(
            source,
            target,
            SyncMode::from_dry_run(dry_run),
            limit,
            &CancellationToken::new(),
        )
        .await
    }

    /// [`sync`](Self::sync) with a cancellation signal checked between units
    #[instrument(skip(self, cancel))]
    pub async fn sync_with_cancel(
        &self,
        source: &str,
        target: &str,
        mode: SyncMode,
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let direction = SyncDirection::SourceToTarget;
        let plan = self.plan_sync(source, target, direction, limit).await?;
        self.execute_plan(&plan, direction, mode, cancel).await
    }

    /// Executes a plan computed earlier
    pub async fn execute_plan(
        &self,
        plan: &SyncPlan,
        direction: SyncDirection,
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let report = self
            .executor
            .execute_with_cancel(plan, direction, mode, cancel)
            .await?;
        info!(summary = %report.summary(), "Sync finished");
        Ok(report)
    }

    /// Capacity of `backend`, when the backend can tell
    pub async fn storage_quota(&self, backend: &str) -> Result<Option<StorageQuota>, SyncError> {
        let (name, adapter) = self.registry.resolve(backend)?;
        let retry = self.settings.executor.retry;
        let (result, _) = with_retry(&retry, "storage_quota", || {
            with_timeout(retry.call_timeout, "storage_quota", adapter.storage_quota())
        })
        .await;
        result.map_err(|error| SyncError::Backend {
            backend: name,
            operation: "storage_quota",
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use omnidrive_core::config::ConfigBuilder;

    use super::*;

    #[test]
    fn settings_follow_config() {
        let config = ConfigBuilder::new()
            .sync_default_limit(25)
            .sync_key_policy("name_only")
            .sync_max_workers(2)
            .sync_include_trashed(true)
            .build();
        let settings = SyncSettings::from_config(&config.sync);
        assert_eq!(settings.default_limit, Some(25));
        assert_eq!(settings.key_policy, KeyPolicy::NameOnly);
        assert_eq!(settings.executor.max_workers, 2);
        assert!(settings.include_trashed);
    }

    #[tokio::test]
    async fn unknown_backend_fails_compare() {
        let service = SyncService::new(Arc::new(BackendRegistry::new()), SyncSettings::default());
        let err = service.compare("a", "b", None, None).await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownBackend(_)));
    }

    #[tokio::test]
    async fn self_sync_is_rejected_before_lookup() {
        let service = SyncService::new(Arc::new(BackendRegistry::new()), SyncSettings::default());
        let err = service.sync("x", "x", false, None).await.unwrap_err();
        assert!(err.is_self_sync());
    }
}
