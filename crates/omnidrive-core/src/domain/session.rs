//! SessionRecord domain entity
//!
//! A named, timestamped JSON blob saved and resumed by the user. Sessions
//! share the session store with workflow runs but live in their own
//! namespace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::DomainError;

/// A saved user session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    name: String,
    #[serde(default)]
    data: Value,
    saved_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Creates a session record stamped with the current time
    pub fn new(name: impl Into<String>, data: Value) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "session name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name,
            data,
            saved_at: Utc::now(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn saved_at(&self) -> DateTime<Utc> {
        self.saved_at
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rejects_blank_name() {
        assert!(SessionRecord::new("  ", Value::Null).is_err());
    }

    #[test]
    fn tolerates_unknown_fields() {
        let json = json!({
            "name": "work",
            "data": {"last": "drive-a"},
            "saved_at": "2026-01-02T03:04:05Z",
            "schema": 2
        });
        let record: SessionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.name(), "work");
        assert_eq!(record.data()["last"], "drive-a");
    }
}
