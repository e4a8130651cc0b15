//! FileRecord and Catalog domain entities
//!
//! A `FileRecord` is the normalized, backend-independent view of one remote
//! object. A `Catalog` is an immutable snapshot of the records listed from
//! one backend at one point in time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::BackendName;

/// MIME sentinel that marks a record as a folder
pub const FOLDER_MIME_TYPE: &str = "folder";

// ============================================================================
// FileRecord
// ============================================================================

/// Normalized representation of one remote object
///
/// `id` is opaque and scoped to the backend the record was listed from.
/// There is no identifier shared across backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    id: String,
    name: String,
    size: u64,
    mime_type: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    trashed: bool,
}

impl FileRecord {
    /// Creates a regular file record with the generic binary MIME type
    pub fn file(id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
            mime_type: "application/octet-stream".to_string(),
            parent_id: None,
            created_at: None,
            modified_at: None,
            trashed: false,
        }
    }

    /// Creates a folder record (size is always 0)
    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size: 0,
            mime_type: FOLDER_MIME_TYPE.to_string(),
            parent_id: None,
            created_at: None,
            modified_at: None,
            trashed: false,
        }
    }

    /// Sets the MIME type; the folder sentinel also forces size to 0
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        if self.is_folder() {
            self.size = 0;
        }
        self
    }

    /// Sets the containing folder id
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets backend-supplied creation and modification timestamps
    #[must_use]
    pub fn with_timestamps(
        mut self,
        created_at: Option<DateTime<Utc>>,
        modified_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_at = created_at;
        self.modified_at = modified_at;
        self
    }

    /// Sets the soft-delete flag
    #[must_use]
    pub fn with_trashed(mut self, trashed: bool) -> Self {
        self.trashed = trashed;
        self
    }

    // --- Getters ---

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// Creation time as reported by the backend (not authoritative across backends)
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Modification time as reported by the backend (not authoritative across backends)
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }

    pub fn is_trashed(&self) -> bool {
        self.trashed
    }

    /// Returns true if the record carries the folder MIME sentinel
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Point-in-time snapshot of one backend's listing
///
/// Catalogs are never mutated after construction. A catalog built from an
/// interrupted listing is marked incomplete; sync operations refuse it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    backend: BackendName,
    #[serde(default)]
    scope: Option<String>,
    captured_at: DateTime<Utc>,
    records: Vec<FileRecord>,
    complete: bool,
    #[serde(default)]
    truncated: bool,
}

impl Catalog {
    /// Creates a complete catalog captured now
    pub fn new(backend: BackendName, scope: Option<String>, records: Vec<FileRecord>) -> Self {
        Self {
            backend,
            scope,
            captured_at: Utc::now(),
            records,
            complete: true,
            truncated: false,
        }
    }

    /// Creates a catalog from a listing that stopped before the last page
    pub fn partial(backend: BackendName, scope: Option<String>, records: Vec<FileRecord>) -> Self {
        Self {
            complete: false,
            ..Self::new(backend, scope, records)
        }
    }

    /// Marks the catalog as cut short by a caller-supplied limit
    #[must_use]
    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    /// Overrides the capture time (for reconstitution and tests)
    #[must_use]
    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn backend(&self) -> &BackendName {
        &self.backend
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    /// Returns true if every page of the listing was consumed (or the limit was reached)
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Returns true if the listing stopped at the caller's limit
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of file sizes in the catalog
    pub fn total_bytes(&self) -> u64 {
        self.records.iter().map(FileRecord::size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> BackendName {
        BackendName::new("drive-a").unwrap()
    }

    #[test]
    fn folder_has_zero_size_and_sentinel() {
        let folder = FileRecord::folder("f1", "Photos");
        assert!(folder.is_folder());
        assert_eq!(folder.size(), 0);
        assert_eq!(folder.mime_type(), FOLDER_MIME_TYPE);
    }

    #[test]
    fn folder_mime_resets_size() {
        let record = FileRecord::file("x", "dir", 42).with_mime_type(FOLDER_MIME_TYPE);
        assert!(record.is_folder());
        assert_eq!(record.size(), 0);
    }

    #[test]
    fn file_builder_sets_optional_fields() {
        let now = Utc::now();
        let record = FileRecord::file("1", "a.txt", 10)
            .with_mime_type("text/plain")
            .with_parent("root")
            .with_timestamps(Some(now), Some(now))
            .with_trashed(true);

        assert_eq!(record.parent_id(), Some("root"));
        assert_eq!(record.created_at(), Some(now));
        assert!(record.is_trashed());
        assert!(!record.is_folder());
    }

    #[test]
    fn record_deserializes_with_unknown_and_missing_fields() {
        let json = r#"{"id":"1","name":"a","size":3,"mime_type":"text/plain","checksum":"abc"}"#;
        let record: FileRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.name(), "a");
        assert!(record.parent_id().is_none());
        assert!(!record.is_trashed());
    }

    #[test]
    fn catalog_flags() {
        let records = vec![FileRecord::file("1", "a", 5), FileRecord::file("2", "b", 7)];
        let complete = Catalog::new(backend(), None, records.clone());
        assert!(complete.is_complete());
        assert!(!complete.is_truncated());
        assert_eq!(complete.total_bytes(), 12);

        let partial =
            Catalog::partial(backend(), Some("root".into()), records).with_truncated(true);
        assert!(!partial.is_complete());
        assert!(partial.is_truncated());
        assert_eq!(partial.scope(), Some("root"));
        assert_eq!(partial.len(), 2);
    }
}
