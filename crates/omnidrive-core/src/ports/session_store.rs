//! Session store port (driven/secondary port)
//!
//! Durable key-value records keyed by `(namespace, key)`. Values are opaque
//! JSON blobs; readers deserialize them leniently so that fields added by a
//! newer writer do not break older readers.
//!
//! Writes are last-writer-wins. Two processes writing the same key race
//! without any guard.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Logical partition of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// `SessionRecord` blobs keyed by session name
    Session,
    /// `WorkflowRun` snapshots keyed by run id
    WorkflowRun,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Session => "session",
            Namespace::WorkflowRun => "workflow-run",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(Namespace::Session),
            "workflow-run" => Ok(Namespace::WorkflowRun),
            other => Err(format!("unknown namespace: {other}")),
        }
    }
}

/// A record as stored, with bookkeeping timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub namespace: Namespace,
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Port trait for the session store
///
/// Uses `anyhow::Result` because storage errors are adapter-specific.
#[async_trait::async_trait]
pub trait ISessionStore: Send + Sync {
    /// Inserts or replaces the record at `(namespace, key)`
    async fn put(&self, namespace: Namespace, key: &str, value: &Value) -> anyhow::Result<()>;

    /// Reads the record at `(namespace, key)`
    async fn get(&self, namespace: Namespace, key: &str) -> anyhow::Result<Option<StoredRecord>>;

    /// Lists every record in `namespace`, most recently updated first
    async fn list(&self, namespace: Namespace) -> anyhow::Result<Vec<StoredRecord>>;

    /// Removes the record; returns false if it did not exist
    async fn delete(&self, namespace: Namespace, key: &str) -> anyhow::Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_strings_are_stable() {
        assert_eq!(Namespace::Session.as_str(), "session");
        assert_eq!(Namespace::WorkflowRun.as_str(), "workflow-run");
        assert_eq!("workflow-run".parse::<Namespace>(), Ok(Namespace::WorkflowRun));
        assert!("runs".parse::<Namespace>().is_err());
    }
}
