//! Error taxonomy of the sync pipeline
//!
//! Transient `AdapterError`s are retried inside the normalizer and the
//! executor. Everything here is what remains once retries are exhausted or
//! the failure was permanent.

use omnidrive_core::domain::{BackendName, Catalog, DomainError};
use omnidrive_core::ports::AdapterError;
use thiserror::Error;

/// A backend name that is not in the registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown backend '{name}' (configured: {})", .available.join(", "))]
pub struct UnknownBackendError {
    pub name: String,
    pub available: Vec<String>,
}

/// A listing that failed part-way through pagination
///
/// Carries the records gathered before the failure so that read-only
/// callers can still show them, clearly marked incomplete.
#[derive(Debug, Error)]
#[error("listing {backend} failed after {} records: {error}", .partial.len())]
pub struct CatalogError {
    pub backend: BackendName,
    pub partial: Catalog,
    #[source]
    pub error: AdapterError,
}

impl CatalogError {
    /// Consumes the error and returns the partial catalog
    pub fn into_partial(self) -> Catalog {
        self.partial
    }
}

/// Catalogs that cannot be compared
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComparisonError {
    /// The same record id appears twice in one catalog
    #[error("catalog {backend} lists id '{id}' more than once")]
    DuplicateId { backend: BackendName, id: String },

    /// A record without a name cannot be keyed
    #[error("catalog {backend} has a record with an empty name (id '{id}')")]
    EmptyName { backend: BackendName, id: String },
}

/// The executor refused to start
///
/// A report with failed transfers is a successful call; this error means
/// no transfer was even attempted.
#[derive(Debug, Error)]
pub enum SyncExecutionError {
    /// Source and target name the same backend
    #[error("refusing to sync {0} onto itself")]
    SelfSync(BackendName),

    /// The plan was computed from a partial listing
    #[error("plan is incomplete and cannot be executed: {}", .errors.join("; "))]
    IncompletePlan { errors: Vec<String> },

    /// The backend being written to was listed only up to a limit
    #[error("catalog of {0} stopped at the listing limit; refusing to write into it")]
    TruncatedDestination(BackendName),

    #[error(transparent)]
    UnknownBackend(#[from] UnknownBackendError),

    /// The scratch directory for downloads could not be created
    #[error("failed to prepare transfer workspace: {0}")]
    Workspace(#[from] std::io::Error),
}

/// Errors surfaced by the compare/sync service
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Comparison(#[from] ComparisonError),

    #[error(transparent)]
    Execution(#[from] SyncExecutionError),

    #[error(transparent)]
    UnknownBackend(#[from] UnknownBackendError),

    /// Authentication with a backend failed
    #[error("authentication with {backend} failed: {error}")]
    Authentication {
        backend: BackendName,
        #[source]
        error: AdapterError,
    },

    /// A backend call outside listing and transfers failed
    #[error("{operation} on {backend} failed: {error}")]
    Backend {
        backend: BackendName,
        operation: &'static str,
        #[source]
        error: AdapterError,
    },

    /// A backend definition could not be turned into an adapter
    #[error("invalid backend '{name}': {reason}")]
    InvalidBackend { name: String, reason: String },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl SyncError {
    /// Returns true for the self-sync guard
    pub fn is_self_sync(&self) -> bool {
        matches!(self, SyncError::Execution(SyncExecutionError::SelfSync(_)))
    }
}

#[cfg(test)]
mod tests {
    use omnidrive_core::domain::FileRecord;

    use super::*;

    fn name(s: &str) -> BackendName {
        BackendName::new(s).unwrap()
    }

    #[test]
    fn unknown_backend_lists_available() {
        let err = UnknownBackendError {
            name: "drive-c".into(),
            available: vec!["drive-a".into(), "drive-b".into()],
        };
        assert_eq!(
            err.to_string(),
            "unknown backend 'drive-c' (configured: drive-a, drive-b)"
        );
    }

    #[test]
    fn catalog_error_keeps_partial_records() {
        let partial = Catalog::partial(name("a"), None, vec![FileRecord::file("1", "x", 1)]);
        let err = CatalogError {
            backend: name("a"),
            partial,
            error: AdapterError::not_found("folder vanished"),
        };
        assert!(err.to_string().contains("after 1 records"));
        let partial = err.into_partial();
        assert!(!partial.is_complete());
        assert_eq!(partial.len(), 1);
    }

    #[test]
    fn self_sync_is_detectable() {
        let err: SyncError = SyncExecutionError::SelfSync(name("x")).into();
        assert!(err.is_self_sync());
        assert_eq!(err.to_string(), "refusing to sync x onto itself");
    }
}
