use crate::database::record_store::RecordStore;
use crate::error::app_error::FetchError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Process-local record store, used by default and in tests.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<(String, String), Value>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, FetchError> {
        let records = self.records.read().await;
        Ok(records.get(&(collection.to_string(), id.to_string())).cloned())
    }

    async fn upsert(&self, collection: &str, id: &str, record: Value) -> Result<(), FetchError> {
        let mut records = self.records.write().await;
        records.insert((collection.to_string(), id.to_string()), record);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, FetchError> {
        let mut records = self.records.write().await;
        Ok(records.remove(&(collection.to_string(), id.to_string())).is_some())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, FetchError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, id), value)| (id.clone(), value.clone()))
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
