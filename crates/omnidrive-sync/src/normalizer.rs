//! File catalog normalizer
//!
//! Turns a backend's paginated listing into an immutable [`Catalog`].
//! Pages are fetched until the backend reports no further page or the
//! caller's limit is reached. A page that still fails after retries ends the
//! capture with a [`CatalogError`] carrying everything gathered so far.
//!
//! Normalization rules:
//! - folder markers (`is_folder`, `folder`, provider folder MIME types)
//!   become the `"folder"` sentinel, and folders get size 0
//! - MIME types are lowercased and stripped of parameters; a missing type
//!   becomes `application/octet-stream`
//! - trashed entries are dropped unless `include_trashed` is set

use omnidrive_core::domain::{BackendName, Catalog, FileRecord, FOLDER_MIME_TYPE};
use omnidrive_core::ports::{AdapterError, AdapterErrorKind, IStorageAdapter, RemoteEntry};
use tracing::{debug, instrument, warn};

use crate::error::CatalogError;
use crate::retry::{with_retry, with_timeout, RetryPolicy};

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// MIME types that providers use to mark folders
const FOLDER_MIME_ALIASES: &[&str] = &[
    FOLDER_MIME_TYPE,
    "application/vnd.google-apps.folder",
    "inode/directory",
    "httpd/unix-directory",
    "text/directory",
];

/// Scope and bounds of one catalog capture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingOptions {
    /// Folder to list; the backend root when `None`
    pub scope: Option<String>,
    /// Stop after this many records
    pub limit: Option<usize>,
    pub include_trashed: bool,
}

impl ListingOptions {
    pub fn new(scope: Option<String>, limit: Option<usize>) -> Self {
        Self {
            scope,
            limit,
            include_trashed: false,
        }
    }
}

/// Captures catalogs from storage adapters
#[derive(Debug, Clone, Default)]
pub struct CatalogNormalizer {
    retry: RetryPolicy,
}

impl CatalogNormalizer {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Lists `adapter` page by page and returns the normalized catalog
    #[instrument(skip(self, adapter, backend), fields(backend = %backend))]
    pub async fn capture(
        &self,
        backend: &BackendName,
        adapter: &dyn IStorageAdapter,
        options: &ListingOptions,
    ) -> Result<Catalog, CatalogError> {
        let scope = options.scope.clone();
        let mut records: Vec<FileRecord> = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        if options.limit == Some(0) {
            return Ok(Catalog::new(backend.clone(), scope, records).with_truncated(true));
        }

        loop {
            let (result, attempts) = with_retry(&self.retry, "list_files", || {
                let folder = scope.as_deref();
                let token = page_token.as_deref();
                with_timeout(
                    self.retry.call_timeout,
                    "list_files",
                    adapter.list_files(folder, token),
                )
            })
            .await;

            let page = match result {
                Ok(page) => page,
                Err(error) => {
                    warn!(
                        pages,
                        records = records.len(),
                        attempts,
                        error = %error,
                        "Listing failed, returning partial catalog"
                    );
                    return Err(CatalogError {
                        backend: backend.clone(),
                        partial: Catalog::partial(backend.clone(), scope, records),
                        error,
                    });
                }
            };
            pages += 1;

            for entry in page.entries {
                if entry.trashed && !options.include_trashed {
                    continue;
                }
                records.push(normalize_entry(entry));
                if options.limit.is_some_and(|limit| records.len() >= limit) {
                    debug!(pages, records = records.len(), "Listing limit reached");
                    return Ok(Catalog::new(backend.clone(), scope, records).with_truncated(true));
                }
            }

            match page.next_page_token {
                Some(next) if page_token.as_deref() == Some(next.as_str()) => {
                    let error = AdapterError::new(
                        AdapterErrorKind::InvalidRequest,
                        format!("pagination token '{next}' did not advance"),
                    );
                    return Err(CatalogError {
                        backend: backend.clone(),
                        partial: Catalog::partial(backend.clone(), scope, records),
                        error,
                    });
                }
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(pages, records = records.len(), "Catalog captured");
        Ok(Catalog::new(backend.clone(), scope, records))
    }
}

/// Maps one raw listing entry to a normalized record
pub fn normalize_entry(entry: RemoteEntry) -> FileRecord {
    let mime_type = normalize_mime(entry.mime_type.as_deref(), entry.is_folder);
    let record = if mime_type == FOLDER_MIME_TYPE {
        FileRecord::folder(entry.id, entry.name)
    } else {
        FileRecord::file(entry.id, entry.name, entry.size.unwrap_or(0)).with_mime_type(mime_type)
    };

    let record = match entry.parent_id {
        Some(parent) if !parent.is_empty() => record.with_parent(parent),
        _ => record,
    };

    record
        .with_timestamps(entry.created_at, entry.modified_at)
        .with_trashed(entry.trashed)
}

/// Normalizes a provider MIME type; folders collapse to the `"folder"` sentinel
pub fn normalize_mime(raw: Option<&str>, is_folder: bool) -> String {
    if is_folder {
        return FOLDER_MIME_TYPE.to_string();
    }
    let essence = raw
        .and_then(|m| m.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if essence.is_empty() {
        DEFAULT_MIME_TYPE.to_string()
    } else if FOLDER_MIME_ALIASES.contains(&essence.as_str()) {
        FOLDER_MIME_TYPE.to_string()
    } else {
        essence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_markers_collapse_to_sentinel() {
        assert_eq!(normalize_mime(None, true), "folder");
        assert_eq!(normalize_mime(Some("application/vnd.google-apps.folder"), false), "folder");
        assert_eq!(normalize_mime(Some("inode/directory"), false), "folder");
        assert_eq!(normalize_mime(Some("folder"), false), "folder");
    }

    #[test]
    fn mime_is_lowercased_and_stripped() {
        assert_eq!(normalize_mime(Some("Text/Plain; charset=UTF-8"), false), "text/plain");
        assert_eq!(normalize_mime(Some(""), false), "application/octet-stream");
        assert_eq!(normalize_mime(None, false), "application/octet-stream");
    }

    #[test]
    fn folder_entries_get_zero_size() {
        let record = normalize_entry(RemoteEntry {
            id: "f".into(),
            name: "Docs".into(),
            size: Some(4096),
            mime_type: Some("application/vnd.google-apps.folder".into()),
            ..RemoteEntry::default()
        });
        assert!(record.is_folder());
        assert_eq!(record.size(), 0);
    }

    #[test]
    fn file_entries_keep_metadata() {
        let now = chrono::Utc::now();
        let record = normalize_entry(RemoteEntry {
            id: "1".into(),
            name: "a.pdf".into(),
            size: None,
            mime_type: Some("application/PDF".into()),
            parent_id: Some("root".into()),
            modified_at: Some(now),
            ..RemoteEntry::default()
        });
        assert_eq!(record.size(), 0);
        assert_eq!(record.mime_type(), "application/pdf");
        assert_eq!(record.parent_id(), Some("root"));
        assert_eq!(record.modified_at(), Some(now));
        assert!(record.created_at().is_none());
    }

    #[test]
    fn empty_parent_is_dropped() {
        let record = normalize_entry(RemoteEntry {
            id: "1".into(),
            name: "a".into(),
            parent_id: Some(String::new()),
            ..RemoteEntry::default()
        });
        assert!(record.parent_id().is_none());
    }
}
