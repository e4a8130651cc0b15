//! Named storage adapters
//!
//! The registry is built once (usually from configuration) and handed to
//! the executor and the service by reference. Engines look adapters up by
//! backend name and never know the concrete adapter type.

use std::collections::BTreeMap;
use std::sync::Arc;

use omnidrive_core::config::{BackendConfig, Config};
use omnidrive_core::domain::BackendName;
use omnidrive_core::ports::IStorageAdapter;
use tracing::debug;

use crate::error::{SyncError, UnknownBackendError};
use crate::filesystem::LocalFolderAdapter;
use crate::memory::InMemoryAdapter;

/// Map of backend name to adapter
#[derive(Default, Clone)]
pub struct BackendRegistry {
    adapters: BTreeMap<BackendName, Arc<dyn IStorageAdapter>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one adapter per configured backend
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let mut registry = Self::new();
        for (name, backend) in &config.backends {
            let backend_name = BackendName::new(name.as_str())?;
            let adapter = build_adapter(name, backend)?;
            debug!(backend = %backend_name, kind = %backend.kind, "Backend registered");
            registry.register(backend_name, adapter);
        }
        Ok(registry)
    }

    /// Adds or replaces the adapter for `name`
    pub fn register(&mut self, name: BackendName, adapter: Arc<dyn IStorageAdapter>) {
        self.adapters.insert(name, adapter);
    }

    /// Builder-style [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, name: BackendName, adapter: Arc<dyn IStorageAdapter>) -> Self {
        self.register(name, adapter);
        self
    }

    /// Looks up the adapter for `name`
    pub fn get(&self, name: &BackendName) -> Result<Arc<dyn IStorageAdapter>, UnknownBackendError> {
        self.adapters
            .get(name)
            .cloned()
            .ok_or_else(|| UnknownBackendError {
                name: name.to_string(),
                available: self.names().map(|n| n.to_string()).collect(),
            })
    }

    /// Parses `name` and looks it up
    pub fn resolve(
        &self,
        name: &str,
    ) -> Result<(BackendName, Arc<dyn IStorageAdapter>), SyncError> {
        let name = BackendName::new(name)?;
        let adapter = self.get(&name)?;
        Ok((name, adapter))
    }

    pub fn contains(&self, name: &BackendName) -> bool {
        self.adapters.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &BackendName> {
        self.adapters.keys()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

fn build_adapter(
    name: &str,
    backend: &BackendConfig,
) -> Result<Arc<dyn IStorageAdapter>, SyncError> {
    match backend.kind.as_str() {
        "local" => {
            let root = backend.root.clone().ok_or_else(|| SyncError::InvalidBackend {
                name: name.to_string(),
                reason: "local backends need a root directory".to_string(),
            })?;
            let mut adapter = LocalFolderAdapter::new(root);
            if let Some(quota) = backend.quota_bytes {
                adapter = adapter.with_quota(quota);
            }
            if let Some(page_size) = backend.page_size {
                adapter = adapter.with_page_size(page_size);
            }
            Ok(Arc::new(adapter))
        }
        "memory" => {
            let mut adapter = InMemoryAdapter::new();
            if let Some(quota) = backend.quota_bytes {
                adapter = adapter.with_quota(quota);
            }
            if let Some(page_size) = backend.page_size {
                adapter = adapter.with_page_size(page_size);
            }
            Ok(Arc::new(adapter))
        }
        other => Err(SyncError::InvalidBackend {
            name: name.to_string(),
            reason: format!("unsupported kind '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use omnidrive_core::config::ConfigBuilder;

    use super::*;

    #[test]
    fn builds_adapters_from_config() {
        let config = ConfigBuilder::new()
            .local_backend("drive-a", PathBuf::from("/tmp/does-not-matter"))
            .memory_backend("drive-b")
            .build();

        let registry = BackendRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 2);
        let names: Vec<&str> = registry.names().map(BackendName::as_str).collect();
        assert_eq!(names, ["drive-a", "drive-b"]);
    }

    #[test]
    fn unknown_backend_lists_configured_names() {
        let registry = BackendRegistry::new().with(
            BackendName::new("a").unwrap(),
            Arc::new(InMemoryAdapter::new()),
        );
        let err = registry.get(&BackendName::new("z").unwrap()).err().unwrap();
        assert_eq!(err.name, "z");
        assert_eq!(err.available, vec!["a".to_string()]);
    }

    #[test]
    fn resolve_validates_name() {
        let registry = BackendRegistry::new();
        assert!(matches!(registry.resolve("bad name"), Err(SyncError::Domain(_))));
        assert!(matches!(registry.resolve("good"), Err(SyncError::UnknownBackend(_))));
    }

    #[test]
    fn rejects_unsupported_kind() {
        let config = ConfigBuilder::new()
            .backend(
                "ftp",
                BackendConfig {
                    kind: "ftp".into(),
                    root: None,
                    quota_bytes: None,
                    page_size: None,
                },
            )
            .build();
        assert!(matches!(
            BackendRegistry::from_config(&config),
            Err(SyncError::InvalidBackend { .. })
        ));
    }
}
