use crate::error::app_error::FetchError;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

const LOCK_STRIPES: usize = 64;

pub mod collections {
    pub const USERS: &str = "users";
    pub const COMPANIES: &str = "companies";
    pub const DEVIATIONS: &str = "deviations";
    pub const DOCUMENTS: &str = "documents";
    pub const ACCOUNTS: &str = "accounts";
    pub const PASSWORD_RESETS: &str = "password_resets";
}

/// Document-oriented record store addressed by `(collection, id)`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, FetchError>;

    async fn upsert(&self, collection: &str, id: &str, record: Value) -> Result<(), FetchError>;

    /// Returns whether a record was removed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, FetchError>;

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, FetchError>;

    fn backend_name(&self) -> &'static str;
}

/// Fetches and decodes a record, treating absence as `FetchError::NotFound`.
pub async fn fetch_record<T: DeserializeOwned>(store: &dyn RecordStore, collection: &str, id: &str) -> Result<T, FetchError> {
    fetch_optional_record(store, collection, id)
        .await?
        .ok_or_else(|| FetchError::not_found(collection, id))
}

pub async fn fetch_optional_record<T: DeserializeOwned>(store: &dyn RecordStore, collection: &str, id: &str) -> Result<Option<T>, FetchError> {
    match store.fetch_by_id(collection, id).await? {
        Some(value) => serde_json::from_value(value).map(Some).map_err(|e| FetchError::decode(collection, id, e)),
        None => Ok(None),
    }
}

pub async fn put_record<T: Serialize>(store: &dyn RecordStore, collection: &str, id: &str, record: &T) -> Result<(), FetchError> {
    let value = serde_json::to_value(record).map_err(|e| FetchError::decode(collection, id, e))?;
    store.upsert(collection, id, value).await
}

/// Lists and decodes a collection. Records that fail to decode are skipped.
pub async fn list_records<T: DeserializeOwned>(store: &dyn RecordStore, collection: &str) -> Result<Vec<T>, FetchError> {
    let rows = store.list(collection).await?;
    let mut records = Vec::with_capacity(rows.len());
    for (id, value) in rows {
        match serde_json::from_value(value) {
            Ok(record) => records.push(record),
            Err(e) => warn!(collection = %collection, id = %id, error = %e, "skipping undecodable record"),
        }
    }
    Ok(records)
}

/// Serializes read-modify-write cycles on single records within the daemon.
///
/// Records hash onto a fixed set of stripes, so unrelated records may share a
/// lock. Hold at most one guard at a time.
pub struct RecordLocks {
    stripes: Vec<Mutex<()>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self {
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub async fn lock(&self, collection: &str, id: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        (collection, id).hash(&mut hasher);
        let stripe = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[stripe].lock().await
    }
}

impl Default for RecordLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryRecordStore;
    use crate::models::company::CompanyProfile;
    use serde_json::json;

    #[tokio::test]
    async fn typed_fetch_reports_missing_records() {
        let store = MemoryRecordStore::new();
        let err = fetch_record::<CompanyProfile>(&store, collections::COMPANIES, "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn typed_fetch_reports_decode_failures() {
        let store = MemoryRecordStore::new();
        store.upsert(collections::COMPANIES, "c1", json!({"id": "c1"})).await.unwrap();
        let err = fetch_record::<CompanyProfile>(&store, collections::COMPANIES, "c1").await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[tokio::test]
    async fn list_skips_records_that_do_not_decode() {
        let store = MemoryRecordStore::new();
        put_record(&store, collections::COMPANIES, "c1", &CompanyProfile::new("c1", "Acme")).await.unwrap();
        store.upsert(collections::COMPANIES, "broken", json!({"name": 42})).await.unwrap();

        let companies: Vec<CompanyProfile> = list_records(&store, collections::COMPANIES).await.unwrap();
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0].name, "Acme");
    }

    #[tokio::test]
    async fn same_record_waits_for_the_held_lock() {
        let locks = RecordLocks::new();
        let guard = locks.lock(collections::DOCUMENTS, "d1").await;

        let waiting = tokio::time::timeout(std::time::Duration::from_millis(20), locks.lock(collections::DOCUMENTS, "d1")).await;
        assert!(waiting.is_err());

        drop(guard);
        let _again = locks.lock(collections::DOCUMENTS, "d1").await;
    }
}
