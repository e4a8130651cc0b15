//! OmniDrive Sync - Catalog comparison and cross-backend transfers
//!
//! Pipeline: storage adapter → [`normalizer`] → [`comparator`] → [`executor`].
//!
//! ## Modules
//!
//! - [`normalizer`] - Paginates a backend listing into an immutable `Catalog`
//! - [`comparator`] - Computes the `SyncPlan` between two catalogs
//! - [`executor`] - Runs download-then-upload transfers with a bounded worker pool
//! - [`retry`] - Exponential backoff and per-call timeouts
//! - [`registry`] - Named storage adapters built from configuration
//! - [`service`] - The `compare` / `sync` surface used by the CLI and workflows
//! - [`filesystem`] - Storage adapter over a local directory tree
//! - [`memory`] - In-memory storage adapter with call counters

pub mod comparator;
pub mod error;
pub mod executor;
pub mod filesystem;
pub mod memory;
pub mod normalizer;
pub mod registry;
pub mod retry;
pub mod service;

pub use comparator::Comparator;
pub use error::{
    CatalogError, ComparisonError, SyncError, SyncExecutionError, UnknownBackendError,
};
pub use executor::{ExecutorConfig, SyncExecutor};
pub use filesystem::LocalFolderAdapter;
pub use memory::InMemoryAdapter;
pub use normalizer::{CatalogNormalizer, ListingOptions};
pub use registry::BackendRegistry;
pub use retry::RetryPolicy;
pub use service::{SyncService, SyncSettings};
