//! Storage adapter port (driven/secondary port)
//!
//! The capability interface every storage backend implements. The
//! normalizer, comparator and executor are polymorphic over this trait only
//! and never see a concrete backend type.
//!
//! ## Design Notes
//!
//! - Errors are a typed `AdapterError` rather than `anyhow::Error`: the
//!   executor's retry policy keys on the `transient` flag, so it has to
//!   survive the port boundary.
//! - Listing returns port-level `RemoteEntry` DTOs in the backend's own
//!   vocabulary; mapping them to `FileRecord` is the normalizer's job.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// AdapterError
// ============================================================================

/// Category of an adapter failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    /// HTTP 429 or provider-specific throttling
    RateLimited,
    /// HTTP 5xx
    Server,
    /// Connection reset, DNS failure, broken pipe
    Network,
    /// The call exceeded its deadline
    Timeout,
    Authentication,
    NotFound,
    PermissionDenied,
    /// An object with the same name already exists
    Conflict,
    InvalidRequest,
    /// Not enough space on the backend
    QuotaExceeded,
    Other,
}

impl AdapterErrorKind {
    /// Whether errors of this kind are retried when the adapter does not say otherwise
    pub fn is_transient_by_default(&self) -> bool {
        matches!(
            self,
            AdapterErrorKind::RateLimited
                | AdapterErrorKind::Server
                | AdapterErrorKind::Network
                | AdapterErrorKind::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterErrorKind::RateLimited => "rate_limited",
            AdapterErrorKind::Server => "server",
            AdapterErrorKind::Network => "network",
            AdapterErrorKind::Timeout => "timeout",
            AdapterErrorKind::Authentication => "authentication",
            AdapterErrorKind::NotFound => "not_found",
            AdapterErrorKind::PermissionDenied => "permission_denied",
            AdapterErrorKind::Conflict => "conflict",
            AdapterErrorKind::InvalidRequest => "invalid_request",
            AdapterErrorKind::QuotaExceeded => "quota_exceeded",
            AdapterErrorKind::Other => "other",
        }
    }
}

impl std::fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by any storage adapter call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct AdapterError {
    kind: AdapterErrorKind,
    message: String,
    transient: bool,
}

impl AdapterError {
    /// Creates an error whose transient flag follows the kind's default
    pub fn new(kind: AdapterErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            transient: kind.is_transient_by_default(),
        }
    }

    /// Overrides the transient flag
    #[must_use]
    pub fn with_transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Timeout, message)
    }

    pub fn kind(&self) -> AdapterErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let kind = match err.kind() {
            ErrorKind::NotFound => AdapterErrorKind::NotFound,
            ErrorKind::PermissionDenied => AdapterErrorKind::PermissionDenied,
            ErrorKind::AlreadyExists => AdapterErrorKind::Conflict,
            ErrorKind::TimedOut => AdapterErrorKind::Timeout,
            ErrorKind::Interrupted | ErrorKind::WouldBlock => AdapterErrorKind::Network,
            ErrorKind::InvalidInput | ErrorKind::InvalidData => AdapterErrorKind::InvalidRequest,
            _ => AdapterErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

// ============================================================================
// DTOs
// ============================================================================

/// Credential returned by `authenticate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// One object as reported by a backend, before normalization
///
/// Backends disagree on folder markers, size encoding and MIME spelling;
/// every field except `id` and `name` is therefore optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    /// Set by backends that mark folders with a type flag instead of a MIME type
    pub is_folder: bool,
    pub parent_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub trashed: bool,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<RemoteEntry>,
    /// Token for the next page; `None` when this was the last page
    pub next_page_token: Option<String>,
}

/// Capacity information, when the backend can report it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageQuota {
    pub used_bytes: u64,
    /// `None` for unlimited storage
    pub total_bytes: Option<u64>,
}

impl StorageQuota {
    /// Remaining bytes, or `None` when unlimited
    pub fn free_bytes(&self) -> Option<u64> {
        self.total_bytes
            .map(|total| total.saturating_sub(self.used_bytes))
    }
}

// ============================================================================
// IStorageAdapter trait
// ============================================================================

/// Port trait for a storage backend
///
/// Implementations must be `Send + Sync`; the executor shares one adapter
/// across its worker pool.
#[async_trait::async_trait]
pub trait IStorageAdapter: Send + Sync {
    /// Establishes (or refreshes) credentials with the backend
    async fn authenticate(&self) -> Result<AuthToken, AdapterError>;

    /// Lists one page of the folder `folder_id` (root when `None`)
    async fn list_files(
        &self,
        folder_id: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ListPage, AdapterError>;

    /// Uploads a local file into `parent_id` (root when `None`)
    async fn upload_file(
        &self,
        local_path: &Path,
        parent_id: Option<&str>,
    ) -> Result<RemoteEntry, AdapterError>;

    /// Downloads object `id` to `dest_path` and returns the written path
    async fn download_file(&self, id: &str, dest_path: &Path) -> Result<PathBuf, AdapterError>;

    /// Deletes object `id`; non-permanent deletes move it to the backend's trash
    async fn delete_file(&self, id: &str, permanent: bool) -> Result<(), AdapterError>;

    /// Creates a folder named `name` inside `parent_id` (root when `None`)
    async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteEntry, AdapterError>;

    /// Reports storage usage; `None` when the backend cannot tell
    async fn storage_quota(&self) -> Result<Option<StorageQuota>, AdapterError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_defaults_follow_kind() {
        assert!(AdapterError::new(AdapterErrorKind::RateLimited, "429").is_transient());
        assert!(AdapterError::new(AdapterErrorKind::Server, "503").is_transient());
        assert!(AdapterError::timeout("slow").is_transient());
        assert!(!AdapterError::not_found("gone").is_transient());
        assert!(!AdapterError::new(AdapterErrorKind::Authentication, "401").is_transient());
    }

    #[test]
    fn transient_flag_can_be_overridden() {
        let err = AdapterError::new(AdapterErrorKind::Other, "flaky").with_transient(true);
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "other: flaky");
    }

    #[test]
    fn io_errors_map_to_kinds() {
        let err: AdapterError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert_eq!(err.kind(), AdapterErrorKind::NotFound);
        assert!(!err.is_transient());

        let err: AdapterError = std::io::Error::from(std::io::ErrorKind::AlreadyExists).into();
        assert_eq!(err.kind(), AdapterErrorKind::Conflict);
    }

    #[test]
    fn quota_free_bytes() {
        let quota = StorageQuota {
            used_bytes: 30,
            total_bytes: Some(100),
        };
        assert_eq!(quota.free_bytes(), Some(70));

        let unlimited = StorageQuota {
            used_bytes: 30,
            total_bytes: None,
        };
        assert_eq!(unlimited.free_bytes(), None);
    }
}
