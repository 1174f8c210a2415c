//! Migration run configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CrosswalkError, CrosswalkResult};
use crate::store::{MemoryRecordStore, RecordStore};
use crate::validate::{DEFAULT_CI_FIELD, DEFAULT_DATA_MANAGER_FIELD, Validator};

/// Main migration configuration, read from TOML
///
/// ```toml
/// crosswalk_dir = "crosswalks"
/// crosswalks = ["dmpt_rdmp"]
/// report_dir = "reports"
///
/// [source]
/// kind = "filesystem"
/// path = "export/redbox1"
///
/// [dest]
/// kind = "api"
/// base_url = "https://redbox.example.edu.au"
/// api_key = "..."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Name of the migration run
    pub name: Option<String>,
    /// Directory holding mapping spec files
    pub crosswalk_dir: PathBuf,
    /// Mapping specs to run, by file stem, in order
    pub crosswalks: Vec<String>,
    /// Store the legacy records are read from
    pub source: StoreConfig,
    /// Store migrated records are written to
    pub dest: StoreConfig,
    /// Directory for audit and summary reports
    pub report_dir: PathBuf,
    /// Maximum number of records per crosswalk
    pub limit: Option<usize>,
    /// Crosswalk and validate without writing to the destination
    pub dry_run: bool,
    /// Fields checked by the validator
    pub validation: ValidationConfig,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            name: None,
            crosswalk_dir: PathBuf::from("crosswalks"),
            crosswalks: Vec::new(),
            source: StoreConfig::Memory,
            dest: StoreConfig::Memory,
            report_dir: PathBuf::from("reports"),
            limit: None,
            dry_run: false,
            validation: ValidationConfig::default(),
        }
    }
}

impl MigrationConfig {
    /// Create a new migration config
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a migration config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> CrosswalkResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CrosswalkError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a migration config from TOML text
    pub fn from_toml_str(content: &str) -> CrosswalkResult<Self> {
        toml::from_str(content).map_err(|e| CrosswalkError::Parse(e.to_string()))
    }

    /// Set the crosswalk directory
    pub fn with_crosswalk_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.crosswalk_dir = path.into();
        self
    }

    /// Add a crosswalk to run
    pub fn with_crosswalk(mut self, name: impl Into<String>) -> Self {
        self.crosswalks.push(name.into());
        self
    }

    /// Set the source store
    pub fn with_source(mut self, source: StoreConfig) -> Self {
        self.source = source;
        self
    }

    /// Set the destination store
    pub fn with_dest(mut self, dest: StoreConfig) -> Self {
        self.dest = dest;
        self
    }

    /// Set the report directory
    pub fn with_report_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_dir = path.into();
        self
    }

    /// Limit the number of records per crosswalk
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Enable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Path of a crosswalk's mapping spec
    ///
    /// A `.json` file is preferred over `.yaml`/`.yml` when several exist.
    pub fn crosswalk_path(&self, name: &str) -> PathBuf {
        ["json", "yaml", "yml"]
            .iter()
            .map(|ext| self.crosswalk_dir.join(format!("{name}.{ext}")))
            .find(|path| path.exists())
            .unwrap_or_else(|| self.crosswalk_dir.join(format!("{name}.json")))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.crosswalks.is_empty() {
            return Err("At least one crosswalk must be named".to_string());
        }
        if self.limit == Some(0) {
            return Err("Limit must be greater than zero".to_string());
        }
        self.source.validate().map_err(|e| format!("source: {e}"))?;
        self.dest.validate().map_err(|e| format!("dest: {e}"))?;
        Ok(())
    }
}

/// Record store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process store, empty at start
    Memory,
    /// One JSON file per record under a directory
    Filesystem { path: PathBuf },
    /// Repository REST API
    Api {
        base_url: String,
        #[serde(default = "default_branding")]
        branding: String,
        #[serde(default = "default_portal")]
        portal: String,
        #[serde(default)]
        api_key: Option<String>,
    },
}

fn default_branding() -> String {
    "default".to_string()
}

fn default_portal() -> String {
    "rdmp".to_string()
}

impl StoreConfig {
    /// Check the settings without opening the store
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StoreConfig::Memory => Ok(()),
            StoreConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("filesystem store needs a path".to_string())
            }
            StoreConfig::Filesystem { .. } => Ok(()),
            StoreConfig::Api { base_url, .. } if base_url.trim().is_empty() => {
                Err("api store needs a base_url".to_string())
            }
            StoreConfig::Api { .. } => Ok(()),
        }
    }

    /// Open the configured store
    pub fn open(&self) -> CrosswalkResult<Arc<dyn RecordStore>> {
        match self {
            StoreConfig::Memory => Ok(Arc::new(MemoryRecordStore::new())),
            StoreConfig::Filesystem { path } => {
                Ok(Arc::new(crate::store::FileSystemRecordStore::new(path)))
            }
            #[cfg(feature = "api-backend")]
            StoreConfig::Api {
                base_url,
                branding,
                portal,
                api_key,
            } => Ok(Arc::new(crate::store::ApiRecordStore::new(
                base_url.as_str(),
                branding,
                portal,
                api_key.clone(),
            ))),
            #[cfg(not(feature = "api-backend"))]
            StoreConfig::Api { .. } => Err(CrosswalkError::Config(
                "api store requires the api-backend feature".to_string(),
            )),
        }
    }
}

/// Fields the validator checks; an empty name disables that check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub ci_field: String,
    pub data_manager_field: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            ci_field: DEFAULT_CI_FIELD.to_string(),
            data_manager_field: DEFAULT_DATA_MANAGER_FIELD.to_string(),
        }
    }
}

impl ValidationConfig {
    /// Build the validator these settings describe
    pub fn to_validator(&self) -> Validator {
        let mut validator = Validator::new();
        validator = if self.ci_field.is_empty() {
            validator.without_ci_check()
        } else {
            validator.with_ci_field(&self.ci_field)
        };
        if self.data_manager_field.is_empty() {
            validator.without_data_manager_check()
        } else {
            validator.with_data_manager_field(&self.data_manager_field)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let config = MigrationConfig::from_toml_str(
            r#"
crosswalks = ["dmpt_rdmp"]
limit = 5

[source]
kind = "filesystem"
path = "export"

[dest]
kind = "api"
base_url = "https://redbox.example.edu.au"

[validation]
ci_field = ""
"#,
        )
        .unwrap();
        assert_eq!(config.crosswalks, vec!["dmpt_rdmp"]);
        assert_eq!(config.limit, Some(5));
        assert_eq!(config.source, StoreConfig::Filesystem { path: "export".into() });
        assert!(matches!(&config.dest, StoreConfig::Api { portal, .. } if portal == "rdmp"));
        assert_eq!(config.validation.data_manager_field, DEFAULT_DATA_MANAGER_FIELD);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(MigrationConfig::new().validate().is_err());
        let config = MigrationConfig::new().with_crosswalk("a").with_limit(Some(0));
        assert!(config.validate().is_err());
        let config = MigrationConfig::new()
            .with_crosswalk("a")
            .with_source(StoreConfig::Api {
                base_url: " ".to_string(),
                branding: default_branding(),
                portal: default_portal(),
                api_key: None,
            });
        assert!(config.validate().unwrap_err().starts_with("source"));
    }

    #[test]
    fn test_crosswalk_path_prefers_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), "").unwrap();
        let config = MigrationConfig::new().with_crosswalk_dir(dir.path());
        assert_eq!(config.crosswalk_path("b"), dir.path().join("b.yaml"));
        assert_eq!(config.crosswalk_path("a"), dir.path().join("a.json"));
    }

    #[test]
    fn test_open_memory_store() {
        assert!(StoreConfig::Memory.open().is_ok());
    }
}
