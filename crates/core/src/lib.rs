//! Crosswalk Core - engine for migrating flattened legacy records
//!
//! Provides:
//! - Flattened key parsing and record unflattening
//! - A declarative mapping spec interpreter with pluggable field handlers
//! - Destination record validation
//! - Post-processing of stored records
//! - Record store backends and a migration runner

pub mod crosswalk;
pub mod error;
pub mod handlers;
pub mod log;
#[cfg(feature = "migrate")]
pub mod migrate;
pub mod postwalk;
pub mod spec;
pub mod store;
pub mod unflatten;
pub mod validate;
pub mod value;

// Re-export commonly used types
pub use crosswalk::{CrosswalkInterpreter, crosswalk};
pub use error::{CrosswalkError, CrosswalkResult};
pub use handlers::{Handler, HandlerContext, HandlerRegistry, builtin_registry};
pub use log::{AuditLog, LogEvent, LogSink, NullSink, RecordSink};
pub use postwalk::{PostTask, postwalk};
pub use spec::{Destination, FieldRule, MappingSpec, RecordRule};
pub use unflatten::{FlatKey, parse_flat_key, unflatten};
pub use validate::{Validator, checkdots, validate};
pub use value::Record;

// Re-export store types
#[cfg(feature = "api-backend")]
pub use store::ApiRecordStore;
#[cfg(feature = "native-fs")]
pub use store::FileSystemRecordStore;
pub use store::{MemoryRecordStore, RecordStore, StoreError};

#[cfg(feature = "migrate")]
pub use migrate::{MigrationConfig, MigrationReport, Migrator, RecordOutcome};
