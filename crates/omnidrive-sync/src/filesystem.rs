//! Local folder storage adapter
//!
//! Exposes a directory tree through [`IStorageAdapter`] so a plain folder can
//! act as a backend (the `local` backend kind).
//!
//! - Object ids are paths relative to the root, `/`-separated; the root
//!   folder itself is `None`.
//! - Listings are sorted by name and paginated with an offset token.
//! - Uploads are written to a hidden `.{name}.part` file and renamed into
//!   place; those temporary files never appear in listings. An upload onto
//!   an existing name fails with `Conflict`.
//! - Soft deletes move the object into the hidden `.trash` folder at the
//!   root, which never appears in listings.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use omnidrive_core::ports::{
    AdapterError, AdapterErrorKind, AuthToken, IStorageAdapter, ListPage, RemoteEntry,
    StorageQuota,
};
use tracing::{debug, instrument};

/// Folder at the root holding soft-deleted objects
pub const TRASH_DIR: &str = ".trash";

const DEFAULT_PAGE_SIZE: usize = 100;

/// Suffix of the hidden temporary file an upload writes before renaming
const PARTIAL_SUFFIX: &str = ".part";

// ============================================================================
// LocalFolderAdapter
// ============================================================================

/// Storage adapter over a local directory
#[derive(Debug, Clone)]
pub struct LocalFolderAdapter {
    root: PathBuf,
    quota: Option<u64>,
    page_size: usize,
}

impl LocalFolderAdapter {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            quota: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Capacity reported by `storage_quota` and enforced on upload
    #[must_use]
    pub fn with_quota(mut self, bytes: u64) -> Self {
        self.quota = Some(bytes);
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an object id onto a path under the root
    fn resolve(&self, id: &str) -> Result<PathBuf, AdapterError> {
        let relative = Path::new(id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        let first = relative.components().next();
        if id.is_empty() || escapes || first == Some(Component::Normal(TRASH_DIR.as_ref())) {
            return Err(AdapterError::new(
                AdapterErrorKind::InvalidRequest,
                format!("invalid object id '{id}'"),
            ));
        }
        Ok(self.root.join(relative))
    }

    fn folder_path(&self, folder_id: Option<&str>) -> Result<PathBuf, AdapterError> {
        match folder_id {
            None => Ok(self.root.clone()),
            Some(id) => self.resolve(id),
        }
    }

    async fn used_bytes(&self) -> Result<u64, AdapterError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || tree_size(&root, true))
            .await
            .map_err(|e| AdapterError::new(AdapterErrorKind::Other, e.to_string()))?
            .map_err(AdapterError::from)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn child_id(parent_id: Option<&str>, name: &str) -> String {
    match parent_id {
        Some(parent) => format!("{parent}/{name}"),
        None => name.to_string(),
    }
}

fn entry_for(
    id: String,
    name: String,
    parent_id: Option<&str>,
    metadata: &std::fs::Metadata,
) -> RemoteEntry {
    let is_folder = metadata.is_dir();
    RemoteEntry {
        id,
        size: (!is_folder).then(|| metadata.len()),
        mime_type: (!is_folder).then(|| mime_from_extension(Path::new(&name)).to_string()),
        is_folder,
        parent_id: parent_id.map(str::to_string),
        created_at: metadata.created().ok().map(DateTime::<Utc>::from),
        modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        trashed: false,
        name,
    }
}

/// Returns true for an upload's `.{name}.part` temporary file
fn is_partial_upload(name: &str) -> bool {
    name.strip_prefix('.')
        .and_then(|rest| rest.strip_suffix(PARTIAL_SUFFIX))
        .is_some_and(|base| !base.is_empty())
}

/// Sums file sizes under `dir`, skipping the trash at the top level
fn tree_size(dir: &Path, skip_trash: bool) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if skip_trash && entry.file_name() == TRASH_DIR {
            continue;
        }
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            total += tree_size(&entry.path(), false)?;
        } else {
            total += metadata.len();
        }
    }
    Ok(total)
}

fn invalid_name(name: &str) -> bool {
    matches!(name, "" | "." | ".." | TRASH_DIR) || name.contains(['/', '\\'])
}

/// Guesses a MIME type from the file extension
pub fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        _ => "application/octet-stream",
    }
}

// ============================================================================
// IStorageAdapter implementation
// ============================================================================

#[async_trait::async_trait]
impl IStorageAdapter for LocalFolderAdapter {
    async fn authenticate(&self) -> Result<AuthToken, AdapterError> {
        let metadata = tokio::fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(AdapterError::new(
                AdapterErrorKind::InvalidRequest,
                format!("{} is not a directory", self.root.display()),
            ));
        }
        Ok(AuthToken {
            access_token: "local".to_string(),
            expires_at: None,
        })
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn list_files(
        &self,
        folder_id: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ListPage, AdapterError> {
        let dir = self.folder_path(folder_id)?;
        let offset = match page_token {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| {
                AdapterError::new(
                    AdapterErrorKind::InvalidRequest,
                    format!("bad page token '{token}'"),
                )
            })?,
        };

        let mut names = Vec::new();
        let mut reader = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                debug!(path = ?entry.path(), "Skipping non UTF-8 name");
                continue;
            };
            if (folder_id.is_none() && name == TRASH_DIR) || is_partial_upload(&name) {
                continue;
            }
            names.push(name);
        }
        names.sort();

        let mut entries = Vec::new();
        for name in names.iter().skip(offset).take(self.page_size) {
            let metadata = tokio::fs::metadata(dir.join(name)).await?;
            entries.push(entry_for(child_id(folder_id, name), name.clone(), folder_id, &metadata));
        }

        let next = offset + entries.len();
        let next_page_token = (next < names.len()).then(|| next.to_string());
        debug!(entries = entries.len(), offset, "Listed folder");

        Ok(ListPage {
            entries,
            next_page_token,
        })
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn upload_file(
        &self,
        local_path: &Path,
        parent_id: Option<&str>,
    ) -> Result<RemoteEntry, AdapterError> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !invalid_name(n))
            .ok_or_else(|| {
                AdapterError::new(
                    AdapterErrorKind::InvalidRequest,
                    format!("cannot upload {}", local_path.display()),
                )
            })?
            .to_string();

        let dir = self.folder_path(parent_id)?;
        let target = dir.join(&name);
        if tokio::fs::try_exists(&target).await? {
            return Err(AdapterError::new(
                AdapterErrorKind::Conflict,
                format!("'{name}' already exists"),
            ));
        }

        let size = tokio::fs::metadata(local_path).await?.len();
        if let Some(quota) = self.quota {
            if self.used_bytes().await? + size > quota {
                return Err(AdapterError::new(
                    AdapterErrorKind::QuotaExceeded,
                    format!("{name} does not fit in {quota} bytes"),
                ));
            }
        }

        // Same directory so the rename stays on one filesystem
        let tmp_path = dir.join(format!(".{name}{PARTIAL_SUFFIX}"));
        tokio::fs::copy(local_path, &tmp_path).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &target).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        let metadata = tokio::fs::metadata(&target).await?;
        debug!(name = %name, bytes = size, "Upload complete");
        Ok(entry_for(child_id(parent_id, &name), name, parent_id, &metadata))
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn download_file(&self, id: &str, dest_path: &Path) -> Result<PathBuf, AdapterError> {
        let source = self.resolve(id)?;
        let metadata = tokio::fs::metadata(&source).await?;
        if metadata.is_dir() {
            return Err(AdapterError::new(
                AdapterErrorKind::InvalidRequest,
                format!("'{id}' is a folder"),
            ));
        }
        if let Some(parent) = dest_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(&source, dest_path).await?;
        debug!(bytes, "Download complete");
        Ok(dest_path.to_path_buf())
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn delete_file(&self, id: &str, permanent: bool) -> Result<(), AdapterError> {
        let path = self.resolve(id)?;
        let metadata = tokio::fs::metadata(&path).await?;

        if permanent {
            if metadata.is_dir() {
                tokio::fs::remove_dir_all(&path).await?;
            } else {
                tokio::fs::remove_file(&path).await?;
            }
            return Ok(());
        }

        let trash = self.root.join(TRASH_DIR);
        tokio::fs::create_dir_all(&trash).await?;
        let base = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("item")
            .to_string();
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6f");
        tokio::fs::rename(&path, trash.join(format!("{base}.{stamp}"))).await?;
        debug!(id, "Moved to trash");
        Ok(())
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteEntry, AdapterError> {
        if invalid_name(name) {
            return Err(AdapterError::new(
                AdapterErrorKind::InvalidRequest,
                format!("invalid folder name '{name}'"),
            ));
        }
        let path = self.folder_path(parent_id)?.join(name);
        tokio::fs::create_dir(&path).await?;
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(entry_for(child_id(parent_id, name), name.to_string(), parent_id, &metadata))
    }

    async fn storage_quota(&self) -> Result<Option<StorageQuota>, AdapterError> {
        Ok(Some(StorageQuota {
            used_bytes: self.used_bytes().await?,
            total_bytes: self.quota,
        }))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn adapter_with(files: &[(&str, &str)]) -> (TempDir, LocalFolderAdapter) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        let adapter = LocalFolderAdapter::new(dir.path());
        (dir, adapter)
    }

    #[tokio::test]
    async fn lists_sorted_with_pagination() {
        let (_dir, adapter) = adapter_with(&[("c.txt", "c"), ("a.txt", "a"), ("b.md", "bb")]);
        let adapter = adapter.with_page_size(2);

        let first = adapter.list_files(None, None).await.unwrap();
        let names: Vec<_> = first.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.md"]);
        assert_eq!(first.entries[1].size, Some(2));
        assert_eq!(first.entries[1].mime_type.as_deref(), Some("text/markdown"));

        let second = adapter
            .list_files(None, first.next_page_token.as_deref())
            .await
            .unwrap();
        assert_eq!(second.entries.len(), 1);
        assert_eq!(second.entries[0].id, "c.txt");
        assert!(second.next_page_token.is_none());
    }

    #[tokio::test]
    async fn in_progress_uploads_are_not_listed() {
        let (_dir, adapter) =
            adapter_with(&[(".big.iso.part", "half"), ("done.txt", "d"), (".profile", "p")]);

        let listed = adapter.list_files(None, None).await.unwrap();
        let names: Vec<_> = listed.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, [".profile", "done.txt"]);
        assert!(!is_partial_upload(".part"));
        assert!(is_partial_upload(".a.part"));
    }

    #[tokio::test]
    async fn nested_ids_are_relative_paths() {
        let (_dir, adapter) = adapter_with(&[("docs/notes.txt", "n")]);

        let root = adapter.list_files(None, None).await.unwrap();
        assert_eq!(root.entries.len(), 1);
        assert!(root.entries[0].is_folder);
        assert_eq!(root.entries[0].size, None);

        let docs = adapter.list_files(Some("docs"), None).await.unwrap();
        assert_eq!(docs.entries[0].id, "docs/notes.txt");
        assert_eq!(docs.entries[0].parent_id.as_deref(), Some("docs"));
    }

    #[tokio::test]
    async fn upload_refuses_existing_name() {
        let (_dir, adapter) = adapter_with(&[("report.pdf", "old")]);
        let staging = TempDir::new().unwrap();
        let local = staging.path().join("report.pdf");
        std::fs::write(&local, "new").unwrap();

        let err = adapter.upload_file(&local, None).await.unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::Conflict);
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn upload_then_download_roundtrips_bytes() {
        let (_dir, adapter) = adapter_with(&[]);
        let staging = TempDir::new().unwrap();
        let local = staging.path().join("photo.jpg");
        std::fs::write(&local, b"jpeg-bytes").unwrap();

        let entry = adapter.upload_file(&local, None).await.unwrap();
        assert_eq!(entry.id, "photo.jpg");
        assert_eq!(entry.mime_type.as_deref(), Some("image/jpeg"));

        let out = staging.path().join("out/photo.jpg");
        adapter.download_file(&entry.id, &out).await.unwrap();
        assert_eq!(std::fs::read(out).unwrap(), b"jpeg-bytes");
    }

    #[tokio::test]
    async fn soft_delete_hides_object() {
        let (dir, adapter) = adapter_with(&[("old.txt", "x"), ("keep.txt", "y")]);

        adapter.delete_file("old.txt", false).await.unwrap();
        let listed = adapter.list_files(None, None).await.unwrap();
        let names: Vec<_> = listed.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["keep.txt"]);
        assert!(dir.path().join(TRASH_DIR).is_dir());

        let quota = adapter.storage_quota().await.unwrap().unwrap();
        assert_eq!(quota.used_bytes, 1);
    }

    #[tokio::test]
    async fn rejects_ids_escaping_root() {
        let (_dir, adapter) = adapter_with(&[]);
        let err = adapter.list_files(Some("../etc"), None).await.unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::InvalidRequest);
        let err = adapter.delete_file(".trash/x", true).await.unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (dir, adapter) = adapter_with(&[]);
        let err = adapter
            .download_file("nope.txt", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::NotFound);
    }

    #[tokio::test]
    async fn create_folder_twice_conflicts() {
        let (_dir, adapter) = adapter_with(&[]);
        let folder = adapter.create_folder("Photos", None).await.unwrap();
        assert!(folder.is_folder);
        let err = adapter.create_folder("Photos", None).await.unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::Conflict);
    }

    #[tokio::test]
    async fn quota_blocks_oversized_upload() {
        let (_dir, adapter) = adapter_with(&[("a.bin", "1234")]);
        let adapter = adapter.with_quota(6);
        let staging = TempDir::new().unwrap();
        let local = staging.path().join("b.bin");
        std::fs::write(&local, "123").unwrap();

        let err = adapter.upload_file(&local, None).await.unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::QuotaExceeded);
    }

    #[test]
    fn mime_guess_is_case_insensitive() {
        assert_eq!(mime_from_extension(Path::new("A.PNG")), "image/png");
        assert_eq!(mime_from_extension(Path::new("noext")), "application/octet-stream");
    }
}
