//! Record store abstraction
//!
//! Defines the RecordStore trait the migration runner and lookup handlers
//! talk to, and implementations for different record stores:
//! - MemoryRecordStore: in-process map (tests, dry runs)
//! - FileSystemRecordStore: one JSON file per record (exported legacy records)
//! - ApiRecordStore: the destination repository's REST API

use async_trait::async_trait;
use serde_json::Value;

/// Error type for record store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    RecordNotFound(String),
    #[error("Invalid record id: {0}")]
    InvalidId(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Store backend error: {0}")]
    BackendError(String),
}

/// Trait for record stores
///
/// Records are plain JSON values; the store owns id assignment on create.
#[async_trait(?Send)]
pub trait RecordStore: Send + Sync {
    /// List the ids of all records of a type
    async fn list(&self, record_type: &str) -> Result<Vec<String>, StoreError>;

    /// Fetch a record, `None` if it does not exist
    async fn get_record(&self, oid: &str) -> Result<Option<Value>, StoreError>;

    /// Create a record and return its new id
    async fn create_record(&self, record: &Value, record_type: &str)
    -> Result<String, StoreError>;

    /// Replace a record's metadata and return the stored result
    async fn update_record_metadata(&self, oid: &str, record: &Value)
    -> Result<Value, StoreError>;
}

/// Reject ids that could escape a store's namespace
pub(crate) fn validate_oid(oid: &str) -> Result<(), StoreError> {
    if oid.is_empty() {
        return Err(StoreError::InvalidId("empty id".to_string()));
    }
    if oid.contains("..") || oid.contains('/') || oid.contains('\\') {
        return Err(StoreError::InvalidId(oid.to_string()));
    }
    Ok(())
}

pub mod memory;

#[cfg(feature = "native-fs")]
pub mod filesystem;

#[cfg(feature = "api-backend")]
pub mod api;

pub use memory::MemoryRecordStore;

#[cfg(feature = "native-fs")]
pub use filesystem::FileSystemRecordStore;

#[cfg(feature = "api-backend")]
pub use api::ApiRecordStore;
