//! In-memory record store

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{RecordStore, StoreError, validate_oid};

#[derive(Debug, Clone)]
struct Entry {
    record_type: String,
    record: Value,
}

/// Record store backed by an in-process map
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<String, Entry>>,
}

impl MemoryRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record under a known id
    pub fn with_record(self, oid: impl Into<String>, record_type: impl Into<String>, record: Value) -> Self {
        self.insert(oid, record_type, record);
        self
    }

    /// Insert or replace a record under a known id
    pub fn insert(&self, oid: impl Into<String>, record_type: impl Into<String>, record: Value) {
        self.lock().insert(
            oid.into(),
            Entry {
                record_type: record_type.into(),
                record,
            },
        );
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of a stored record
    pub fn snapshot(&self, oid: &str) -> Option<Value> {
        self.lock().get(oid).map(|e| e.record.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Entry>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait(?Send)]
impl RecordStore for MemoryRecordStore {
    async fn list(&self, record_type: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()
            .iter()
            .filter(|(_, e)| e.record_type == record_type)
            .map(|(oid, _)| oid.clone())
            .collect())
    }

    async fn get_record(&self, oid: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.snapshot(oid))
    }

    async fn create_record(
        &self,
        record: &Value,
        record_type: &str,
    ) -> Result<String, StoreError> {
        let oid = Uuid::new_v4().simple().to_string();
        self.insert(oid.clone(), record_type, record.clone());
        Ok(oid)
    }

    async fn update_record_metadata(
        &self,
        oid: &str,
        record: &Value,
    ) -> Result<Value, StoreError> {
        validate_oid(oid)?;
        let mut records = self.lock();
        let entry = records
            .get_mut(oid)
            .ok_or_else(|| StoreError::RecordNotFound(oid.to_string()))?;
        entry.record = record.clone();
        Ok(entry.record.clone())
    }
}
