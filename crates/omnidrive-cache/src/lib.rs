//! OmniDrive Cache - SQLite session store
//!
//! One `records` table keyed by `(namespace, key)` holds two kinds of JSON
//! documents: saved user sessions (`session`) and workflow run snapshots
//! (`workflow-run`). [`SqliteSessionStore`] is the `ISessionStore` port
//! implementation; [`DatabasePool`] opens the file and applies the schema.
//!
//! ```no_run
//! use std::path::Path;
//! use omnidrive_cache::{DatabasePool, SqliteSessionStore};
//!
//! # async fn open() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/var/lib/omnidrive/omnidrive.db")).await?;
//! let store = SqliteSessionStore::new(pool.pool().clone());
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteSessionStore;

/// Session store failures
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The database file could not be created or opened
    #[error("cannot open session store: {0}")]
    Open(String),

    #[error("session store query failed: {0}")]
    Query(String),

    /// The embedded schema could not be applied
    #[error("session store schema migration failed: {0}")]
    Migration(String),

    /// A stored row holds a value or timestamp that does not decode
    #[error("corrupt session store record: {0}")]
    CorruptRecord(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        CacheError::Query(err.to_string())
    }
}
