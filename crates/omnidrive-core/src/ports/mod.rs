//! Port definitions (hexagonal architecture)
//!
//! Driven ports implemented by adapter crates:
//! - `IStorageAdapter` - one storage backend
//! - `ISessionStore` - durable key-value records for sessions and workflow runs

pub mod session_store;
pub mod storage_adapter;

pub use session_store::{ISessionStore, Namespace, StoredRecord};
pub use storage_adapter::{
    AdapterError, AdapterErrorKind, AuthToken, IStorageAdapter, ListPage, RemoteEntry,
    StorageQuota,
};
