//! Migration runner
//!
//! Drives one mapping spec over every record of its source type: fetch,
//! crosswalk, validate, check for residual dots, create in the destination
//! store, then apply the spec's post tasks to the stored record. A failure
//! in one record is reported in its [`RecordOutcome`] and the run moves on.

pub mod config;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::crosswalk::CrosswalkInterpreter;
use crate::error::{CrosswalkError, CrosswalkResult};
use crate::log::{AuditLog, LogEvent, LogSink, RecordSink, stage};
use crate::postwalk::postwalk;
use crate::spec::MappingSpec;
use crate::store::RecordStore;
use crate::validate::{Validator, dotted_keys};
use crate::value::{Record, as_str};

pub use config::{MigrationConfig, StoreConfig, ValidationConfig};

/// What happened to one source record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum RecordOutcome {
    /// Created in the destination store (no id in a dry run)
    Migrated(Option<String>),
    /// Rejected by validation
    Invalid(Vec<String>),
    /// Not migrated, for a reason that is not a store failure
    Skipped(String),
    /// A store call failed
    Failed(String),
}

impl RecordOutcome {
    /// Short status name used in reports
    pub fn status(&self) -> &'static str {
        match self {
            RecordOutcome::Migrated(_) => "migrated",
            RecordOutcome::Invalid(_) => "invalid",
            RecordOutcome::Skipped(_) => "skipped",
            RecordOutcome::Failed(_) => "failed",
        }
    }
}

/// Outcome for one source record id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordResult {
    pub oid: String,
    pub outcome: RecordOutcome,
}

/// Report from one crosswalk run
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Run ID
    pub run_id: String,
    /// Crosswalk name
    pub crosswalk: String,
    /// SHA-256 of the mapping spec
    pub spec_fingerprint: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Per-record outcomes in processing order
    pub results: Vec<RecordResult>,
    /// Audit trail, tagged with source record ids
    pub events: Vec<LogEvent>,
    /// Why the crosswalk stopped before processing its records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationReport {
    /// Number of records with the given status
    pub fn count(&self, status: &str) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome.status() == status)
            .count()
    }

    /// Whether the crosswalk ran and no record hit a store failure
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.count("failed") == 0
    }

    /// Counts and message totals, without the per-record detail
    pub fn summary(&self) -> MigrationSummary {
        let mut messages = BTreeMap::new();
        for event in &self.events {
            *messages.entry(event.message.clone()).or_insert(0) += 1;
        }
        MigrationSummary {
            run_id: self.run_id.clone(),
            crosswalk: self.crosswalk.clone(),
            spec_fingerprint: self.spec_fingerprint.clone(),
            dry_run: self.dry_run,
            started_at: self.started_at,
            duration_ms: self.duration_ms,
            total: self.results.len(),
            migrated: self.count("migrated"),
            invalid: self.count("invalid"),
            skipped: self.count("skipped"),
            failed: self.count("failed"),
            error: self.error.clone(),
            messages,
        }
    }
}

/// Summary of a crosswalk run, written next to the audit trail
#[derive(Debug, Clone, Serialize)]
pub struct MigrationSummary {
    pub run_id: String,
    pub crosswalk: String,
    pub spec_fingerprint: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total: usize,
    pub migrated: usize,
    pub invalid: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Audit event counts keyed by message
    pub messages: BTreeMap<String, usize>,
}

/// Runs one mapping spec from a source store into a destination store
pub struct Migrator {
    name: String,
    spec: MappingSpec,
    source: Arc<dyn RecordStore>,
    dest: Arc<dyn RecordStore>,
    validator: Validator,
    limit: Option<usize>,
    dry_run: bool,
}

impl Migrator {
    /// Create a migrator; lookup handlers resolve ids against the source store
    pub fn new(
        name: impl Into<String>,
        spec: MappingSpec,
        source: Arc<dyn RecordStore>,
        dest: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            name: name.into(),
            spec,
            source,
            dest,
            validator: Validator::default(),
            limit: None,
            dry_run: false,
        }
    }

    /// Set the validator
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Limit the number of records processed
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Enable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The mapping spec being run
    pub fn spec(&self) -> &MappingSpec {
        &self.spec
    }

    /// Hex SHA-256 of the mapping spec as loaded
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&self.spec).unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }

    /// Migrate every record of the spec's source type
    ///
    /// Only a failure to list the source records aborts the run.
    pub async fn run(&self) -> CrosswalkResult<MigrationReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "migration_run",
            run_id = %run_id,
            crosswalk = %self.name,
            dry_run = self.dry_run
        );
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: String) -> CrosswalkResult<MigrationReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        let mut oids = self.source.list(&self.spec.source_type).await?;
        if let Some(limit) = self.limit {
            oids.truncate(limit);
        }
        info!(
            source_type = %self.spec.source_type,
            dest_type = %self.spec.dest_type,
            records = oids.len(),
            "Starting migration"
        );

        let audit = AuditLog::new();
        let mut results = Vec::with_capacity(oids.len());
        for oid in oids {
            let sink = RecordSink::new(oid.as_str(), &audit);
            let outcome = self
                .migrate_record(&oid, &sink)
                .instrument(info_span!("migrate_record", oid = %oid))
                .await;
            match &outcome {
                RecordOutcome::Migrated(new_oid) => {
                    debug!(oid = %oid, new_oid = ?new_oid, "Record migrated")
                }
                RecordOutcome::Invalid(errors) => {
                    warn!(oid = %oid, errors = ?errors, "Record failed validation")
                }
                RecordOutcome::Skipped(reason) => warn!(oid = %oid, reason = %reason, "Record skipped"),
                RecordOutcome::Failed(reason) => error!(oid = %oid, reason = %reason, "Record failed"),
            }
            results.push(RecordResult { oid, outcome });
        }

        let report = MigrationReport {
            run_id,
            crosswalk: self.name.clone(),
            spec_fingerprint: self.fingerprint(),
            dry_run: self.dry_run,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            results,
            events: audit.drain(),
            error: None,
        };
        info!(
            total = report.results.len(),
            migrated = report.count("migrated"),
            invalid = report.count("invalid"),
            failed = report.count("failed"),
            duration_ms = report.duration_ms,
            "Migration completed"
        );
        Ok(report)
    }

    /// Report for a crosswalk that stopped before processing any record
    pub fn aborted(&self, error: impl Into<String>) -> MigrationReport {
        MigrationReport {
            run_id: Uuid::new_v4().to_string(),
            crosswalk: self.name.clone(),
            spec_fingerprint: self.fingerprint(),
            dry_run: self.dry_run,
            started_at: Utc::now(),
            duration_ms: 0,
            results: Vec::new(),
            events: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Migrate a single source record
    pub async fn migrate_record(&self, oid: &str, log: &dyn LogSink) -> RecordOutcome {
        let raw = match self.source.get_record(oid).await {
            Ok(Some(Value::Object(raw))) => raw,
            Ok(Some(other)) => {
                log.emit(stage::MIGRATE, "", "", "not an object", other);
                return RecordOutcome::Skipped("source record is not an object".to_string());
            }
            Ok(None) => {
                log.emit(stage::MIGRATE, "", "", "not found", json!(oid));
                return RecordOutcome::Skipped("source record not found".to_string());
            }
            Err(e) => {
                log.emit(stage::MIGRATE, "", "", "get failed", json!(e.to_string()));
                return RecordOutcome::Failed(e.to_string());
            }
        };

        let (_, dest) = CrosswalkInterpreter::new(&self.spec)
            .with_store(self.source.clone())
            .crosswalk(&raw, log)
            .await;

        let owner = as_str(raw.get(&self.spec.ownerfield));
        let errors = self.validator.validate(owner, &self.spec.required, &dest, log);
        if !errors.is_empty() {
            log.emit(stage::MIGRATE, "", "", "invalid", json!(errors));
            return RecordOutcome::Invalid(errors);
        }

        let dotted = dotted_keys(&dest);
        if !dotted.is_empty() {
            log.emit(stage::MIGRATE, "", "", "residual dots", json!(dotted));
            return RecordOutcome::Skipped(CrosswalkError::ResidualDots(dotted).to_string());
        }

        if self.dry_run {
            let finished = postwalk(&self.spec.post_tasks, dest, log);
            log.emit(stage::MIGRATE, "", "", "dry run", Value::Object(finished));
            return RecordOutcome::Migrated(None);
        }

        match self.store(dest, log).await {
            Ok(new_oid) => RecordOutcome::Migrated(Some(new_oid)),
            Err(e) => RecordOutcome::Failed(e.to_string()),
        }
    }

    /// Create the record downstream and apply post tasks to what was stored
    async fn store(&self, dest: Record, log: &dyn LogSink) -> CrosswalkResult<String> {
        let new_oid = self
            .dest
            .create_record(&Value::Object(dest), &self.spec.dest_type)
            .await
            .inspect_err(|e| log.emit(stage::MIGRATE, "", "", "create failed", json!(e.to_string())))?;
        log.emit(stage::MIGRATE, "", "", "created", json!(new_oid));

        if self.spec.post_tasks.is_empty() {
            return Ok(new_oid);
        }

        let stored = match self.dest.get_record(&new_oid).await? {
            Some(Value::Object(stored)) => stored,
            _ => {
                log.emit(stage::MIGRATE, "", "", "not found", json!(new_oid));
                return Err(CrosswalkError::Store(crate::store::StoreError::RecordNotFound(
                    new_oid,
                )));
            }
        };
        let updated = postwalk(&self.spec.post_tasks, stored, log);
        self.dest
            .update_record_metadata(&new_oid, &Value::Object(updated))
            .await
            .inspect_err(|e| log.emit(stage::MIGRATE, "", "", "update failed", json!(e.to_string())))?;
        log.emit(stage::MIGRATE, "", "", "updated", json!(new_oid));
        Ok(new_oid)
    }
}

/// Run every crosswalk named in a migration config
///
/// Configuration problems and unloadable mapping specs abort before any
/// record is touched. A crosswalk whose records cannot be listed gets an
/// aborted report and the remaining crosswalks still run.
pub async fn run_config(config: &MigrationConfig) -> CrosswalkResult<Vec<MigrationReport>> {
    config.validate().map_err(CrosswalkError::Config)?;

    let mut migrators = Vec::with_capacity(config.crosswalks.len());
    for name in &config.crosswalks {
        let spec = MappingSpec::load(config.crosswalk_path(name))?;
        migrators.push((name, spec));
    }

    let source = config.source.open()?;
    let dest = config.dest.open()?;
    let validator = config.validation.to_validator();

    let mut reports = Vec::with_capacity(migrators.len());
    for (name, spec) in migrators {
        let migrator = Migrator::new(name.as_str(), spec, source.clone(), dest.clone())
            .with_validator(validator.clone())
            .with_limit(config.limit)
            .with_dry_run(config.dry_run);
        let report = match migrator.run().await {
            Ok(report) => report,
            Err(e) => {
                error!(crosswalk = %name, error = %e, "Crosswalk aborted");
                migrator.aborted(e.to_string())
            }
        };
        reports.push(report);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;

    fn spec() -> MappingSpec {
        MappingSpec::from_value(json!({
            "idfield": "id",
            "source_type": "dmpt",
            "dest_type": "rdmp",
            "permissions": {},
            "required": ["title"],
            "fields": {
                "dc:title": "title",
                "contributor_ci": {
                    "type": "record",
                    "name": "contributor_ci",
                    "fields": {"givenname": "givenname", "familyname": "familyname", "email": "email"},
                    "handler": "Person",
                    "handlerConfig": {"role": "Chief Investigator"}
                }
            }
        }))
        .unwrap()
    }

    fn source() -> MemoryRecordStore {
        MemoryRecordStore::new()
            .with_record(
                "good",
                "dmpt",
                json!({
                    "id": "good",
                    "dc:title": "Soil",
                    "contributor_ci.givenname": "Jane",
                    "contributor_ci.familyname": "Doe",
                    "contributor_ci.email": "jane@doe.org"
                }),
            )
            .with_record("untitled", "dmpt", json!({"id": "untitled"}))
            .with_record("other", "dataset", json!({"id": "other"}))
    }

    #[tokio::test]
    async fn test_run_reports_each_record() {
        let dest = Arc::new(MemoryRecordStore::new());
        let migrator = Migrator::new("dmpt", spec(), Arc::new(source()), dest.clone());
        let report = migrator.run().await.unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.count("migrated"), 1);
        assert_eq!(report.count("invalid"), 1);
        assert!(report.is_success());
        assert_eq!(dest.len(), 1);
        assert!(report.events.iter().all(|e| e.oid.is_some()));
        assert_eq!(report.spec_fingerprint.len(), 64);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let dest = Arc::new(MemoryRecordStore::new());
        let migrator = Migrator::new("dmpt", spec(), Arc::new(source()), dest.clone())
            .with_dry_run(true)
            .with_limit(Some(1));
        let report = migrator.run().await.unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].outcome, RecordOutcome::Migrated(None));
        assert!(dest.is_empty());
    }

    #[tokio::test]
    async fn test_missing_record_is_skipped() {
        let migrator = Migrator::new(
            "dmpt",
            spec(),
            Arc::new(MemoryRecordStore::new()),
            Arc::new(MemoryRecordStore::new()),
        );
        let log = AuditLog::new();
        let outcome = migrator.migrate_record("nope", &log).await;
        assert!(matches!(outcome, RecordOutcome::Skipped(_)));
        assert_eq!(log.with_message("not found").len(), 1);
    }

    #[test]
    fn test_summary_counts() {
        let report = MigrationReport {
            run_id: "r".to_string(),
            crosswalk: "dmpt".to_string(),
            spec_fingerprint: String::new(),
            dry_run: false,
            started_at: Utc::now(),
            duration_ms: 0,
            results: vec![
                RecordResult {
                    oid: "a".to_string(),
                    outcome: RecordOutcome::Failed("down".to_string()),
                },
                RecordResult {
                    oid: "b".to_string(),
                    outcome: RecordOutcome::Migrated(Some("n".to_string())),
                },
            ],
            events: vec![LogEvent::new("crosswalk", "a", "a", "copied", Value::Null)],
            error: None,
        };
        let summary = report.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.messages.get("copied"), Some(&1));
        assert!(!report.is_success());
    }

    #[test]
    fn test_aborted_report_is_not_a_success() {
        let migrator = Migrator::new(
            "dmpt",
            spec(),
            Arc::new(MemoryRecordStore::new()),
            Arc::new(MemoryRecordStore::new()),
        );
        let report = migrator.aborted("IO error: not a directory");
        assert!(report.results.is_empty());
        assert!(!report.is_success());
        assert_eq!(report.spec_fingerprint, migrator.fingerprint());
        assert_eq!(report.summary().error.as_deref(), Some("IO error: not a directory"));
    }
}
