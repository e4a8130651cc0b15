//! In-memory storage adapter
//!
//! Holds objects and their bytes in process memory. Used as the `memory`
//! backend kind and as the test double for the sync and workflow engines:
//! every call is counted per operation, failures can be scripted per
//! operation (optionally per object and for a limited number of calls),
//! an artificial latency can be added, and the peak number of concurrent
//! calls is recorded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use omnidrive_core::ports::{
    AdapterError, AdapterErrorKind, AuthToken, IStorageAdapter, ListPage, RemoteEntry,
    StorageQuota,
};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Adapter operations, for call counting and failure scripting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Authenticate,
    List,
    Upload,
    Download,
    Delete,
    CreateFolder,
}

/// A scripted failure
#[derive(Debug, Clone)]
struct FailureRule {
    operation: Operation,
    /// Object id or name the rule applies to; `None` matches every call
    target: Option<String>,
    /// Matching calls let through before the rule starts failing
    pass: u32,
    /// Remaining failures; `None` fails forever
    remaining: Option<u32>,
    error: AdapterError,
}

#[derive(Debug, Clone)]
struct StoredObject {
    entry: RemoteEntry,
    content: Vec<u8>,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: Vec<StoredObject>,
    next_id: u64,
    calls: HashMap<Operation, u32>,
    failures: Vec<FailureRule>,
}

/// Storage adapter over an in-process object list
#[derive(Debug)]
pub struct InMemoryAdapter {
    state: Mutex<MemoryState>,
    page_size: usize,
    quota: Option<u64>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for InMemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight gauge when a call finishes
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            page_size: DEFAULT_PAGE_SIZE,
            quota: None,
            latency: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Total capacity reported by `storage_quota` and enforced on upload
    #[must_use]
    pub fn with_quota(mut self, bytes: u64) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Sleeps this long inside every call
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    // --- Seeding ---

    /// Adds a file at the root
    pub fn insert_file(&self, name: &str, content: impl Into<Vec<u8>>) -> RemoteEntry {
        self.insert_object(name, None, false, content.into())
    }

    /// Adds a file inside folder `parent_id`
    pub fn insert_file_in(
        &self,
        parent_id: &str,
        name: &str,
        content: impl Into<Vec<u8>>,
    ) -> RemoteEntry {
        self.insert_object(name, Some(parent_id.to_string()), false, content.into())
    }

    /// Adds a folder at the root
    pub fn insert_folder(&self, name: &str) -> RemoteEntry {
        self.insert_object(name, None, true, Vec::new())
    }

    /// Adds a file that is already in the trash
    pub fn insert_trashed_file(&self, name: &str, content: impl Into<Vec<u8>>) -> RemoteEntry {
        let entry = self.insert_object(name, None, false, content.into());
        let mut state = self.state();
        if let Some(obj) = state.objects.iter_mut().find(|o| o.entry.id == entry.id) {
            obj.entry.trashed = true;
        }
        RemoteEntry {
            trashed: true,
            ..entry
        }
    }

    fn insert_object(
        &self,
        name: &str,
        parent_id: Option<String>,
        is_folder: bool,
        content: Vec<u8>,
    ) -> RemoteEntry {
        let mut state = self.state();
        state.next_id += 1;
        let now = Utc::now();
        let entry = RemoteEntry {
            id: format!("mem-{}", state.next_id),
            name: name.to_string(),
            size: if is_folder { None } else { Some(content.len() as u64) },
            mime_type: if is_folder { None } else { Some(guess_mime(name).to_string()) },
            is_folder,
            parent_id,
            created_at: Some(now),
            modified_at: Some(now),
            trashed: false,
        };
        state.objects.push(StoredObject {
            entry: entry.clone(),
            content,
        });
        entry
    }

    // --- Failure scripting ---

    /// Makes every call of `operation` fail with `error`
    pub fn fail(&self, operation: Operation, error: AdapterError) {
        self.push_rule(operation, None, 0, None, error);
    }

    /// Lets the first `succeed` calls of `operation` through, then fails every call
    pub fn fail_after(&self, operation: Operation, succeed: u32, error: AdapterError) {
        self.push_rule(operation, None, succeed, None, error);
    }

    /// Makes the next `times` calls of `operation` fail with `error`
    pub fn fail_times(&self, operation: Operation, times: u32, error: AdapterError) {
        self.push_rule(operation, None, 0, Some(times), error);
    }

    /// Makes calls of `operation` on the object with this id or name fail
    pub fn fail_for(&self, operation: Operation, id_or_name: &str, error: AdapterError) {
        self.push_rule(operation, Some(id_or_name.to_string()), 0, None, error);
    }

    /// Like [`fail_for`](Self::fail_for), limited to `times` calls
    pub fn fail_for_times(
        &self,
        operation: Operation,
        id_or_name: &str,
        times: u32,
        error: AdapterError,
    ) {
        self.push_rule(operation, Some(id_or_name.to_string()), 0, Some(times), error);
    }

    fn push_rule(
        &self,
        operation: Operation,
        target: Option<String>,
        pass: u32,
        remaining: Option<u32>,
        error: AdapterError,
    ) {
        self.state().failures.push(FailureRule {
            operation,
            target,
            pass,
            remaining,
            error,
        });
    }

    // --- Inspection ---

    /// Number of calls made to `operation`
    pub fn calls(&self, operation: Operation) -> u32 {
        self.state().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Upload plus download calls
    pub fn transfer_calls(&self) -> u32 {
        self.calls(Operation::Upload) + self.calls(Operation::Download)
    }

    /// Calls across every operation
    pub fn total_calls(&self) -> u32 {
        self.state().calls.values().sum()
    }

    /// Highest number of calls that were in progress at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Names of the objects that are not trashed, in insertion order
    pub fn names(&self) -> Vec<String> {
        self.state()
            .objects
            .iter()
            .filter(|o| !o.entry.trashed)
            .map(|o| o.entry.name.clone())
            .collect()
    }

    /// Bytes of the first live object called `name`
    pub fn content_of(&self, name: &str) -> Option<Vec<u8>> {
        self.state()
            .objects
            .iter()
            .find(|o| o.entry.name == name && !o.entry.trashed)
            .map(|o| o.content.clone())
    }

    pub fn used_bytes(&self) -> u64 {
        self.state()
            .objects
            .iter()
            .filter(|o| !o.entry.trashed)
            .map(|o| o.content.len() as u64)
            .sum()
    }

    // --- Internals ---

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts the call, applies latency and returns a scripted failure, if any
    async fn enter(
        &self,
        operation: Operation,
        target: Option<&str>,
    ) -> Result<InFlight<'_>, AdapterError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        let scripted = {
            let mut state = self.state();
            *state.calls.entry(operation).or_insert(0) += 1;
            let name = target.and_then(|t| {
                state
                    .objects
                    .iter()
                    .find(|o| o.entry.id == t)
                    .map(|o| o.entry.name.clone())
            });
            take_failure(&mut state.failures, operation, target, name.as_deref())
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match scripted {
            Some(error) => Err(error),
            None => Ok(guard),
        }
    }

    fn find(&self, id: &str) -> Result<StoredObject, AdapterError> {
        self.state()
            .objects
            .iter()
            .find(|o| o.entry.id == id && !o.entry.trashed)
            .cloned()
            .ok_or_else(|| AdapterError::not_found(format!("no object with id '{id}'")))
    }
}

fn take_failure(
    rules: &mut [FailureRule],
    operation: Operation,
    id: Option<&str>,
    name: Option<&str>,
) -> Option<AdapterError> {
    let rule = rules.iter_mut().find(|r| {
        r.operation == operation
            && r.remaining != Some(0)
            && match r.target.as_deref() {
                None => true,
                Some(t) => Some(t) == id || Some(t) == name,
            }
    })?;
    if rule.pass > 0 {
        rule.pass -= 1;
        return None;
    }
    if let Some(remaining) = rule.remaining.as_mut() {
        *remaining -= 1;
    }
    Some(rule.error.clone())
}

fn guess_mime(name: &str) -> &'static str {
    crate::filesystem::mime_from_extension(Path::new(name))
}

#[async_trait::async_trait]
impl IStorageAdapter for InMemoryAdapter {
    async fn authenticate(&self) -> Result<AuthToken, AdapterError> {
        let _call = self.enter(Operation::Authenticate, None).await?;
        Ok(AuthToken {
            access_token: "memory".to_string(),
            expires_at: None,
        })
    }

    async fn list_files(
        &self,
        folder_id: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ListPage, AdapterError> {
        let _call = self.enter(Operation::List, folder_id).await?;

        let offset = match page_token {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| {
                AdapterError::new(
                    AdapterErrorKind::InvalidRequest,
                    format!("bad page token '{token}'"),
                )
            })?,
        };

        let state = self.state();
        let children: Vec<&StoredObject> = state
            .objects
            .iter()
            .filter(|o| o.entry.parent_id.as_deref() == folder_id)
            .collect();
        let entries: Vec<RemoteEntry> = children
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|o| o.entry.clone())
            .collect();
        let next = offset + entries.len();
        let next_page_token = (next < children.len()).then(|| next.to_string());

        Ok(ListPage {
            entries,
            next_page_token,
        })
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        parent_id: Option<&str>,
    ) -> Result<RemoteEntry, AdapterError> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                AdapterError::new(
                    AdapterErrorKind::InvalidRequest,
                    format!("no file name in {}", local_path.display()),
                )
            })?
            .to_string();
        let _call = self.enter(Operation::Upload, Some(&name)).await?;

        let content = tokio::fs::read(local_path).await?;

        if let Some(quota) = self.quota {
            if self.used_bytes() + content.len() as u64 > quota {
                return Err(AdapterError::new(
                    AdapterErrorKind::QuotaExceeded,
                    format!("{name} does not fit in {quota} bytes"),
                ));
            }
        }

        Ok(self.insert_object(&name, parent_id.map(str::to_string), false, content))
    }

    async fn download_file(&self, id: &str, dest_path: &Path) -> Result<PathBuf, AdapterError> {
        let _call = self.enter(Operation::Download, Some(id)).await?;

        let object = self.find(id)?;
        if object.entry.is_folder {
            return Err(AdapterError::new(
                AdapterErrorKind::InvalidRequest,
                format!("'{}' is a folder", object.entry.name),
            ));
        }
        tokio::fs::write(dest_path, &object.content).await?;
        Ok(dest_path.to_path_buf())
    }

    async fn delete_file(&self, id: &str, permanent: bool) -> Result<(), AdapterError> {
        let _call = self.enter(Operation::Delete, Some(id)).await?;

        let mut state = self.state();
        let index = state
            .objects
            .iter()
            .position(|o| o.entry.id == id)
            .ok_or_else(|| AdapterError::not_found(format!("no object with id '{id}'")))?;
        if permanent {
            state.objects.remove(index);
        } else {
            state.objects[index].entry.trashed = true;
        }
        Ok(())
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteEntry, AdapterError> {
        let _call = self.enter(Operation::CreateFolder, Some(name)).await?;
        Ok(self.insert_object(name, parent_id.map(str::to_string), true, Vec::new()))
    }

    async fn storage_quota(&self) -> Result<Option<StorageQuota>, AdapterError> {
        Ok(Some(StorageQuota {
            used_bytes: self.used_bytes(),
            total_bytes: self.quota,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_in_pages() {
        let adapter = InMemoryAdapter::new().with_page_size(2);
        for name in ["a", "b", "c"] {
            adapter.insert_file(name, name.as_bytes().to_vec());
        }

        let first = adapter.list_files(None, None).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        let token = first.next_page_token.unwrap();

        let second = adapter.list_files(None, Some(&token)).await.unwrap();
        assert_eq!(second.entries.len(), 1);
        assert_eq!(second.entries[0].name, "c");
        assert!(second.next_page_token.is_none());
        assert_eq!(adapter.calls(Operation::List), 2);
    }

    #[tokio::test]
    async fn lists_only_direct_children() {
        let adapter = InMemoryAdapter::new();
        let folder = adapter.insert_folder("docs");
        adapter.insert_file_in(&folder.id, "inner.txt", "x");
        adapter.insert_file("outer.txt", "y");

        let root = adapter.list_files(None, None).await.unwrap();
        let names: Vec<_> = root.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["docs", "outer.txt"]);

        let inner = adapter.list_files(Some(&folder.id), None).await.unwrap();
        assert_eq!(inner.entries.len(), 1);
        assert_eq!(inner.entries[0].name, "inner.txt");
    }

    #[tokio::test]
    async fn download_then_upload_copies_bytes() {
        let source = InMemoryAdapter::new();
        let target = InMemoryAdapter::new();
        let entry = source.insert_file("report.pdf", b"%PDF".to_vec());
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("report.pdf");

        source.download_file(&entry.id, &local).await.unwrap();
        let uploaded = target.upload_file(&local, None).await.unwrap();

        assert_eq!(uploaded.name, "report.pdf");
        assert_eq!(uploaded.size, Some(4));
        assert_eq!(uploaded.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(target.content_of("report.pdf"), Some(b"%PDF".to_vec()));
        assert_eq!(source.transfer_calls(), 1);
        assert_eq!(target.transfer_calls(), 1);
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed() {
        let adapter = InMemoryAdapter::new();
        adapter.fail_times(
            Operation::Authenticate,
            1,
            AdapterError::new(AdapterErrorKind::Server, "503"),
        );

        assert!(adapter.authenticate().await.is_err());
        assert!(adapter.authenticate().await.is_ok());
        assert_eq!(adapter.calls(Operation::Authenticate), 2);
    }

    #[tokio::test]
    async fn failures_can_target_one_object_by_name() {
        let adapter = InMemoryAdapter::new();
        let a = adapter.insert_file("a.txt", "a");
        let b = adapter.insert_file("b.txt", "b");
        adapter.fail_for(Operation::Download, "b.txt", AdapterError::not_found("gone"));
        let dir = tempfile::tempdir().unwrap();

        assert!(adapter.download_file(&a.id, &dir.path().join("a")).await.is_ok());
        let err = adapter
            .download_file(&b.id, &dir.path().join("b"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::NotFound);
    }

    #[tokio::test]
    async fn soft_delete_marks_trashed() {
        let adapter = InMemoryAdapter::new();
        let entry = adapter.insert_file("old.txt", "x");

        adapter.delete_file(&entry.id, false).await.unwrap();
        assert!(adapter.names().is_empty());
        let listed = adapter.list_files(None, None).await.unwrap();
        assert!(listed.entries[0].trashed);

        adapter.delete_file(&entry.id, true).await.unwrap();
        let listed = adapter.list_files(None, None).await.unwrap();
        assert!(listed.entries.is_empty());
    }

    #[tokio::test]
    async fn upload_respects_quota() {
        let adapter = InMemoryAdapter::new().with_quota(3);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        tokio::fs::write(&path, b"12345").await.unwrap();

        let err = adapter.upload_file(&path, None).await.unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::QuotaExceeded);
        assert!(!err.is_transient());

        let quota = adapter.storage_quota().await.unwrap().unwrap();
        assert_eq!(quota.free_bytes(), Some(3));
    }
}
