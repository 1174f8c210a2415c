//! File system record store
//!
//! Stores one pretty-printed JSON file per record at
//! `<base>/<record_type>/<oid>.json`. Used to replay records exported from
//! the legacy repository and to capture migrated output without a live
//! destination server.
//!
//! ## Security
//!
//! Record ids and types are validated so that every resolved path stays
//! inside the base directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use super::{RecordStore, StoreError, validate_oid};

/// File system record store
pub struct FileSystemRecordStore {
    base_path: PathBuf,
}

impl FileSystemRecordStore {
    /// Create a store rooted at `base_path`
    ///
    /// # Example
    ///
    /// ```rust
    /// use crosswalk_core::store::FileSystemRecordStore;
    ///
    /// let store = FileSystemRecordStore::new("/data/export/redbox1");
    /// assert!(store.base_path().ends_with("redbox1"));
    /// ```
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Root directory of the store
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn type_dir(&self, record_type: &str) -> Result<PathBuf, StoreError> {
        validate_oid(record_type)?;
        Ok(self.base_path.join(record_type))
    }

    /// Find the file holding a record, whatever its type directory
    async fn locate(&self, oid: &str) -> Result<Option<PathBuf>, StoreError> {
        validate_oid(oid)?;
        let file_name = format!("{oid}.json");
        let mut dirs = match fs::read_dir(&self.base_path).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::IoError(e.to_string())),
        };
        let mut candidates = Vec::new();
        while let Some(entry) = dirs
            .next_entry()
            .await
            .map_err(|e| StoreError::IoError(e.to_string()))?
        {
            let candidate = entry.path().join(&file_name);
            if fs::try_exists(&candidate).await.unwrap_or(false) {
                candidates.push(candidate);
            }
        }
        // Directory iteration order is platform-dependent
        candidates.sort();
        Ok(candidates.into_iter().next())
    }

    async fn write(&self, path: &Path, record: &Value) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::IoError(e.to_string()))?;
        }
        let content = serde_json::to_vec_pretty(record)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        fs::write(path, content)
            .await
            .map_err(|e| StoreError::IoError(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait(?Send)]
impl RecordStore for FileSystemRecordStore {
    async fn list(&self, record_type: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.type_dir(record_type)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::IoError(e.to_string())),
        };
        let mut oids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::IoError(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                oids.push(stem.to_string());
            }
        }
        oids.sort();
        debug!(record_type, count = oids.len(), "Listed records");
        Ok(oids)
    }

    async fn get_record(&self, oid: &str) -> Result<Option<Value>, StoreError> {
        let Some(path) = self.locate(oid).await? else {
            return Ok(None);
        };
        let content = fs::read(&path)
            .await
            .map_err(|e| StoreError::IoError(format!("{}: {}", path.display(), e)))?;
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| StoreError::SerializationError(format!("{}: {}", path.display(), e)))
    }

    async fn create_record(
        &self,
        record: &Value,
        record_type: &str,
    ) -> Result<String, StoreError> {
        let oid = Uuid::new_v4().simple().to_string();
        let path = self.type_dir(record_type)?.join(format!("{oid}.json"));
        self.write(&path, record).await?;
        Ok(oid)
    }

    async fn update_record_metadata(
        &self,
        oid: &str,
        record: &Value,
    ) -> Result<Value, StoreError> {
        let path = self
            .locate(oid)
            .await?
            .ok_or_else(|| StoreError::RecordNotFound(oid.to_string()))?;
        self.write(&path, record).await?;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip_on_disk() {
        let temp = TempDir::new().unwrap();
        let store = FileSystemRecordStore::new(temp.path());

        let oid = store
            .create_record(&json!({"title": "A"}), "rdmp")
            .await
            .unwrap();
        assert!(temp.path().join("rdmp").join(format!("{oid}.json")).exists());
        assert_eq!(store.list("rdmp").await.unwrap(), vec![oid.clone()]);
        assert_eq!(
            store.get_record(&oid).await.unwrap(),
            Some(json!({"title": "A"}))
        );

        store
            .update_record_metadata(&oid, &json!({"title": "B"}))
            .await
            .unwrap();
        assert_eq!(store.get_record(&oid).await.unwrap().unwrap()["title"], json!("B"));
    }

    #[tokio::test]
    async fn test_missing_directory_lists_nothing() {
        let temp = TempDir::new().unwrap();
        let store = FileSystemRecordStore::new(temp.path().join("absent"));
        assert!(store.list("dmpt").await.unwrap().is_empty());
        assert!(store.get_record("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let store = FileSystemRecordStore::new(temp.path());
        assert!(matches!(
            store.get_record("../secret").await,
            Err(StoreError::InvalidId(_))
        ));
        assert!(store.list("..").await.is_err());
    }
}
