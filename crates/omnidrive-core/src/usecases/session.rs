//! Session save/resume use case
//!
//! Typed access to the `session` namespace of the session store. Session
//! records are independent of workflow runs; they only share the store.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::{
    domain::SessionRecord,
    ports::{ISessionStore, Namespace},
};

/// Use case for saving, resuming and listing named sessions
pub struct SessionUseCase {
    store: Arc<dyn ISessionStore>,
}

impl SessionUseCase {
    pub fn new(store: Arc<dyn ISessionStore>) -> Self {
        Self { store }
    }

    /// Saves `data` under `name`, replacing any previous session of that name
    pub async fn save(&self, name: &str, data: Value) -> Result<SessionRecord> {
        let record = SessionRecord::new(name, data)?;
        let value = serde_json::to_value(&record).context("Failed to serialize session")?;
        self.store
            .put(Namespace::Session, record.name(), &value)
            .await
            .with_context(|| format!("Failed to save session '{name}'"))?;
        Ok(record)
    }

    /// Loads the session saved under `name`
    pub async fn resume(&self, name: &str) -> Result<Option<SessionRecord>> {
        let Some(stored) = self.store.get(Namespace::Session, name).await? else {
            return Ok(None);
        };
        let record = serde_json::from_value(stored.value)
            .with_context(|| format!("Session '{name}' is not a valid session record"))?;
        Ok(Some(record))
    }

    /// Lists saved sessions, most recent first
    ///
    /// Records that no longer deserialize are skipped and left in the store.
    pub async fn list(&self) -> Result<Vec<SessionRecord>> {
        let stored = self.store.list(Namespace::Session).await?;
        Ok(stored
            .into_iter()
            .filter_map(|r| serde_json::from_value(r.value).ok())
            .collect())
    }

    /// Deletes the session; returns false if none was saved under `name`
    pub async fn delete(&self, name: &str) -> Result<bool> {
        self.store.delete(Namespace::Session, name).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::ports::StoredRecord;

    /// In-memory store keyed by (namespace, key); list order is insertion order reversed
    struct MockStore {
        records: Mutex<HashMap<(Namespace, String), StoredRecord>>,
        order: Mutex<Vec<(Namespace, String)>>,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
                order: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ISessionStore for MockStore {
        async fn put(&self, namespace: Namespace, key: &str, value: &Value) -> anyhow::Result<()> {
            let now = Utc::now();
            let id = (namespace, key.to_string());
            self.records.lock().unwrap().insert(
                id.clone(),
                StoredRecord {
                    namespace,
                    key: key.to_string(),
                    value: value.clone(),
                    created_at: now,
                    updated_at: now,
                },
            );
            let mut order = self.order.lock().unwrap();
            order.retain(|k| k != &id);
            order.push(id);
            Ok(())
        }

        async fn get(
            &self,
            namespace: Namespace,
            key: &str,
        ) -> anyhow::Result<Option<StoredRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(&(namespace, key.to_string()))
                .cloned())
        }

        async fn list(&self, namespace: Namespace) -> anyhow::Result<Vec<StoredRecord>> {
            let records = self.records.lock().unwrap();
            Ok(self
                .order
                .lock()
                .unwrap()
                .iter()
                .rev()
                .filter(|(ns, _)| *ns == namespace)
                .filter_map(|k| records.get(k).cloned())
                .collect())
        }

        async fn delete(&self, namespace: Namespace, key: &str) -> anyhow::Result<bool> {
            let id = (namespace, key.to_string());
            self.order.lock().unwrap().retain(|k| k != &id);
            Ok(self.records.lock().unwrap().remove(&id).is_some())
        }
    }

    fn use_case() -> (SessionUseCase, Arc<MockStore>) {
        let store = Arc::new(MockStore::new());
        (SessionUseCase::new(store.clone()), store)
    }

    #[tokio::test]
    async fn save_then_resume() {
        let (sessions, _) = use_case();
        sessions.save("work", json!({"source": "drive-a"})).await.unwrap();

        let record = sessions.resume("work").await.unwrap().unwrap();
        assert_eq!(record.name(), "work");
        assert_eq!(record.data()["source"], "drive-a");
    }

    #[tokio::test]
    async fn resume_missing_returns_none() {
        let (sessions, _) = use_case();
        assert!(sessions.resume("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_same_name() {
        let (sessions, _) = use_case();
        sessions.save("work", json!(1)).await.unwrap();
        sessions.save("work", json!(2)).await.unwrap();

        let all = sessions.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].data(), &json!(2));
    }

    #[tokio::test]
    async fn sessions_do_not_see_workflow_runs() {
        let (sessions, store) = use_case();
        store
            .put(Namespace::WorkflowRun, "work", &json!({"status": "running"}))
            .await
            .unwrap();

        assert!(sessions.resume("work").await.unwrap().is_none());
        assert!(sessions.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_skips_unreadable_records() {
        let (sessions, store) = use_case();
        sessions.save("good", json!({})).await.unwrap();
        store
            .put(Namespace::Session, "bad", &json!("just a string"))
            .await
            .unwrap();

        let all = sessions.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name(), "good");
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let (sessions, _) = use_case();
        sessions.save("tmp", json!(null)).await.unwrap();
        assert!(sessions.delete("tmp").await.unwrap());
        assert!(!sessions.delete("tmp").await.unwrap());
    }
}
