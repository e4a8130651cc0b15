//! SQLite implementation of ISessionStore
//!
//! ## Storage layout
//!
//! | Column     | SQL Type | Content                                        |
//! |------------|----------|------------------------------------------------|
//! | namespace  | TEXT     | `session` or `workflow-run`                    |
//! | key        | TEXT     | session name or run id                         |
//! | value      | TEXT     | JSON blob                                      |
//! | created_at | TEXT     | RFC 3339, microsecond precision, UTC           |
//! | updated_at | TEXT     | RFC 3339, microsecond precision, UTC           |
//! | write_seq  | INTEGER  | store-wide write counter, used for list order  |
//!
//! Writes are upserts: the last writer wins and `created_at` survives.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use omnidrive_core::ports::{ISessionStore, Namespace, StoredRecord};

use crate::CacheError;

/// SQLite-based implementation of the session store port
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of records in `namespace`
    pub async fn count(&self, namespace: Namespace) -> Result<u64, CacheError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE namespace = ?")
            .bind(namespace.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::CorruptRecord(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn record_from_row(row: &SqliteRow) -> Result<StoredRecord, CacheError> {
    let namespace: String = row.get("namespace");
    let namespace = namespace
        .parse::<Namespace>()
        .map_err(CacheError::CorruptRecord)?;
    let key: String = row.get("key");
    let raw: String = row.get("value");
    let value: Value = serde_json::from_str(&raw).map_err(|e| {
        CacheError::CorruptRecord(format!("Invalid JSON stored under '{}': {}", key, e))
    })?;
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(StoredRecord {
        namespace,
        key,
        value,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

// ============================================================================
// ISessionStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ISessionStore for SqliteSessionStore {
    async fn put(&self, namespace: Namespace, key: &str, value: &Value) -> anyhow::Result<()> {
        let now = format_datetime(Utc::now());
        let raw = serde_json::to_string(value)
            .map_err(|e| CacheError::CorruptRecord(e.to_string()))?;

        sqlx::query(
            "INSERT INTO records (namespace, key, value, created_at, updated_at, write_seq) \
             VALUES (?, ?, ?, ?, ?, (SELECT COALESCE(MAX(write_seq), 0) + 1 FROM records)) \
             ON CONFLICT (namespace, key) DO UPDATE SET \
               value = excluded.value, \
               updated_at = excluded.updated_at, \
               write_seq = excluded.write_seq",
        )
        .bind(namespace.as_str())
        .bind(key)
        .bind(&raw)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        tracing::trace!(namespace = %namespace, key, "Record written");
        Ok(())
    }

    async fn get(&self, namespace: Namespace, key: &str) -> anyhow::Result<Option<StoredRecord>> {
        let row = sqlx::query("SELECT * FROM records WHERE namespace = ? AND key = ?")
            .bind(namespace.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(CacheError::from)?;

        match row {
            Some(ref r) => Ok(Some(record_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, namespace: Namespace) -> anyhow::Result<Vec<StoredRecord>> {
        let rows = sqlx::query("SELECT * FROM records WHERE namespace = ? ORDER BY write_seq DESC")
            .bind(namespace.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(CacheError::from)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match record_from_row(row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        namespace = %namespace,
                        error = %e,
                        "Skipping unreadable record"
                    );
                }
            }
        }
        Ok(records)
    }

    async fn delete(&self, namespace: Namespace, key: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM records WHERE namespace = ? AND key = ?")
            .bind(namespace.as_str())
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(CacheError::from)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_format_is_fixed_width() {
        let a = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let b = DateTime::parse_from_rfc3339("2026-01-01T00:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(format_datetime(a).len(), format_datetime(b).len());
        assert_eq!(parse_datetime(&format_datetime(b)).unwrap(), b);
    }

    #[test]
    fn parse_datetime_rejects_garbage() {
        assert!(matches!(
            parse_datetime("yesterday"),
            Err(CacheError::CorruptRecord(_))
        ));
    }
}
