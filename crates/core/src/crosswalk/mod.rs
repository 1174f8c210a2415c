//! Mapping spec interpreter
//!
//! Walks the field rules of a [`MappingSpec`] in declaration order against an
//! unflattened source record and builds the destination record. Every
//! decision is reported to the caller's [`LogSink`].
//!
//! # Example
//!
//! ```rust
//! use crosswalk_core::crosswalk::CrosswalkInterpreter;
//! use crosswalk_core::log::AuditLog;
//! use crosswalk_core::spec::MappingSpec;
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let spec = MappingSpec::from_value(json!({
//!     "idfield": "id",
//!     "source_type": "dmpt",
//!     "dest_type": "rdmp",
//!     "permissions": {},
//!     "required": [],
//!     "fields": {"dc:title": "title"}
//! })).unwrap();
//! let raw = json!({"id": "r1", "dc:title": "Soil survey"});
//!
//! let log = AuditLog::new();
//! let (_, dest) = CrosswalkInterpreter::new(&spec)
//!     .crosswalk(raw.as_object().unwrap(), &log)
//!     .await;
//! assert_eq!(dest["title"], json!("Soil survey"));
//! assert_eq!(log.with_message("unmatched").len(), 1);
//! # });
//! ```

mod fanout;

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::handlers::{HandlerContext, HandlerRegistry, builtin_registry};
use crate::log::{LogSink, stage};
use crate::spec::{FieldRule, MappingSpec, RecordRule, ValueMapRule};
use crate::store::RecordStore;
use crate::unflatten::unflatten;
use crate::value::{Record, nest};

use fanout::Handled;

/// Interpreter for one mapping spec
pub struct CrosswalkInterpreter<'a> {
    spec: &'a MappingSpec,
    registry: &'a HandlerRegistry,
    store: Option<Arc<dyn RecordStore>>,
}

impl<'a> CrosswalkInterpreter<'a> {
    /// Create an interpreter using the built-in handlers
    pub fn new(spec: &'a MappingSpec) -> Self {
        Self {
            spec,
            registry: builtin_registry(),
            store: None,
        }
    }

    /// Use a different handler registry
    pub fn with_registry(mut self, registry: &'a HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Give lookup handlers a record store
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The mapping spec being interpreted
    pub fn spec(&self) -> &MappingSpec {
        self.spec
    }

    /// Crosswalk one raw source record
    ///
    /// Returns the unflattened source record and the destination record.
    pub async fn crosswalk(&self, raw: &Record, log: &dyn LogSink) -> (Record, Record) {
        let unflattened = unflatten(self.spec, raw, log);
        let mut dest = Record::new();
        let mut consumed: HashSet<&str> = HashSet::new();

        for (source, rule) in &self.spec.fields {
            let dest_field = rule.destination(source);
            let Some(value) = unflattened.get(source) else {
                self.absent(source, &dest_field, rule, &mut dest, log);
                continue;
            };
            consumed.insert(source.as_str());
            match rule {
                FieldRule::Copy(_) => self.copy(source, &dest_field, value, &mut dest, log),
                FieldRule::ValueMap(map) => value_map(source, &dest_field, map, value, &mut dest, log),
                FieldRule::Record(record) => {
                    self.apply_record(source, &dest_field, record, value, &unflattened, &mut dest, log)
                        .await
                }
            }
        }

        for (key, value) in &unflattened {
            if consumed.contains(key.as_str()) {
                continue;
            }
            let message = if self.spec.is_ignored(key) { "ignored" } else { "unmatched" };
            log.emit(stage::CROSSWALK, key, "", message, value.clone());
        }

        debug!(
            source_type = %self.spec.source_type,
            dest_type = %self.spec.dest_type,
            fields = dest.len(),
            "Crosswalked record"
        );
        (unflattened, dest)
    }

    fn absent(&self, source: &str, dest_field: &str, rule: &FieldRule, dest: &mut Record, log: &dyn LogSink) {
        if self.spec.is_required(dest_field) {
            log.emit(stage::CROSSWALK, source, dest_field, "required", Value::Null);
        } else if let Some(default) = rule.default_value() {
            dest.insert(dest_field.to_string(), default.clone());
            log.emit(stage::CROSSWALK, source, dest_field, "default", default.clone());
        } else {
            log.emit(stage::CROSSWALK, source, dest_field, "missing", Value::Null);
        }
    }

    fn copy(&self, source: &str, dest_field: &str, value: &Value, dest: &mut Record, log: &dyn LogSink) {
        if is_empty_text(value) {
            dest.insert(dest_field.to_string(), Value::Null);
            let message = if self.spec.is_required(dest_field) { "blank" } else { "copied" };
            log.emit(stage::CROSSWALK, source, dest_field, message, Value::Null);
        } else {
            dest.insert(dest_field.to_string(), value.clone());
            log.emit(stage::CROSSWALK, source, dest_field, "copied", value.clone());
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_record(
        &self,
        source: &str,
        dest_field: &str,
        rule: &RecordRule,
        value: &Value,
        context: &Record,
        dest: &mut Record,
        log: &dyn LogSink,
    ) {
        let Some(handler_name) = rule.handler.as_deref() else {
            log.emit(stage::CROSSWALK, source, dest_field, "assuming processed", value.clone());
            fanout::write_field(dest, dest_field, nest(&rule.nested_names, value.clone()), rule, source, log);
            return;
        };

        let handler_context =
            HandlerContext::new(rule.handler_config.clone()).with_store(self.store.clone());
        let handler = match self.registry.create(handler_name, handler_context) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(field = source, handler = handler_name, error = %e, "Unknown handler");
                log.emit(stage::CROSSWALK, source, dest_field, "unknown handler", json!(handler_name));
                fanout::write_field(dest, dest_field, empty_output(rule), rule, source, log);
                return;
            }
        };

        let inputs = if rule.repeatable && !rule.handle_all {
            match value {
                Value::Array(items) => items.clone(),
                other => {
                    log.emit(stage::CROSSWALK, source, dest_field, "not an array", other.clone());
                    vec![other.clone()]
                }
            }
        } else {
            vec![value.clone()]
        };

        let mut handled = Vec::with_capacity(inputs.len());
        for input in inputs {
            let output = handler.crosswalk(&input, context, log).await;
            if output.is_none() {
                log.emit(stage::CROSSWALK, source, dest_field, "no output", input.clone());
            }
            handled.push(Handled { input, output });
        }

        let destinations = if rule.destinations.is_empty() {
            handler.destinations()
        } else {
            rule.destinations.clone()
        };
        if handler.spreads_output() {
            fanout::spread(source, rule, &handled, dest, log);
        } else if !destinations.is_empty() {
            fanout::fan_out(source, dest_field, rule, &destinations, &handled, dest, log);
        } else {
            let result = if rule.repeatable && !rule.handle_all {
                Value::Array(handled.into_iter().filter_map(|h| h.output).collect())
            } else {
                handled
                    .into_iter()
                    .next()
                    .and_then(|h| h.output)
                    .unwrap_or_else(|| empty_output(rule))
            };
            log.emit(stage::CROSSWALK, source, dest_field, "handled", result.clone());
            fanout::write_field(dest, dest_field, nest(&rule.nested_names, result), rule, source, log);
        }
    }
}

/// Crosswalk one raw record with the built-in handlers and no record store
pub async fn crosswalk(spec: &MappingSpec, raw: &Record, log: &dyn LogSink) -> (Record, Record) {
    CrosswalkInterpreter::new(spec).crosswalk(raw, log).await
}

fn value_map(source: &str, dest_field: &str, rule: &ValueMapRule, value: &Value, dest: &mut Record, log: &dyn LogSink) {
    match rule.lookup(value) {
        Some(mapped) => {
            dest.insert(dest_field.to_string(), mapped.clone());
            log.emit(stage::CROSSWALK, source, dest_field, "mapped", mapped.clone());
        }
        None => {
            let fallback = rule.default.clone().unwrap_or_else(|| json!(""));
            dest.insert(dest_field.to_string(), fallback);
            log.emit(stage::CROSSWALK, source, dest_field, "unmapped", value.clone());
        }
    }
}

/// Output written when a handler produces nothing
fn empty_output(rule: &RecordRule) -> Value {
    if rule.repeatable { json!([]) } else { json!({}) }
}

/// Null, or a string with no content
fn is_empty_text(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let s = s.trim();
            s.is_empty() || s == "null"
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::Handler;
    use crate::log::AuditLog;
    use async_trait::async_trait;

    fn spec(required: Value, fields: Value) -> MappingSpec {
        MappingSpec::from_value(json!({
            "idfield": "id",
            "source_type": "dmpt",
            "dest_type": "rdmp",
            "permissions": {},
            "required": required,
            "ignore": ["metaList"],
            "fields": fields
        }))
        .unwrap()
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_copy_rules() {
        let spec = spec(
            json!(["title"]),
            json!({"dc:title": "title", "dc:subject.vivo": "_", "note": "note"}),
        );
        let log = AuditLog::new();
        let (_, dest) = crosswalk(
            &spec,
            &record(json!({"dc:title": "", "dc:subject.vivo": "Soil", "note": "null"})),
            &log,
        )
        .await;
        assert_eq!(dest["title"], Value::Null);
        assert_eq!(dest["dc:subject_vivo"], json!("Soil"));
        assert_eq!(dest["note"], Value::Null);
        assert_eq!(log.with_message("blank").len(), 1);
        assert_eq!(log.with_message("copied").len(), 2);
    }

    #[tokio::test]
    async fn test_missing_default_and_required() {
        let spec = spec(
            json!(["title"]),
            json!({
                "dc:title": "title",
                "access": {"name": "access", "default": "open"},
                "other": "other"
            }),
        );
        let log = AuditLog::new();
        let (_, dest) = crosswalk(&spec, &Record::new(), &log).await;
        assert_eq!(dest.get("title"), None);
        assert_eq!(dest["access"], json!("open"));
        assert_eq!(log.with_message("required").len(), 1);
        assert_eq!(log.with_message("default").len(), 1);
        assert_eq!(log.with_message("missing").len(), 1);
    }

    #[tokio::test]
    async fn test_value_map() {
        let spec = spec(
            json!([]),
            json!({"dc:type": {"type": "valuemap", "name": "type", "map": {"A": "Alpha"}, "default": "Unknown"}}),
        );
        let log = AuditLog::new();
        let (_, dest) = crosswalk(&spec, &record(json!({"dc:type": "Z"})), &log).await;
        assert_eq!(dest["type"], json!("Unknown"));
        let unmapped = log.with_message("unmapped");
        assert_eq!(unmapped.len(), 1);
        assert_eq!(unmapped[0].value, json!("Z"));

        let (_, dest) = crosswalk(&spec, &record(json!({"dc:type": "A"})), &log).await;
        assert_eq!(dest["type"], json!("Alpha"));
    }

    #[tokio::test]
    async fn test_unmatched_and_ignored() {
        let spec = spec(json!([]), json!({"a": "a"}));
        let log = AuditLog::new();
        let (unflat, _) = crosswalk(&spec, &record(json!({"a": 1, "b": 2, "metaList": []})), &log).await;
        assert_eq!(unflat.len(), 3);
        assert_eq!(log.with_message("unmatched")[0].source_field, "b");
        assert_eq!(log.with_message("ignored")[0].source_field, "metaList");
    }

    #[tokio::test]
    async fn test_record_without_handler_passes_through() {
        let spec = spec(
            json!([]),
            json!({"tag": {"type": "record", "name": "keywords", "repeatable": true}}),
        );
        let log = AuditLog::new();
        let (_, dest) = crosswalk(&spec, &record(json!({"tag.1.": "a", "tag.2.": "b"})), &log).await;
        assert_eq!(dest["keywords"], json!(["a", "b"]));
        assert_eq!(log.with_message("assuming processed").len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_handler_yields_empty_output() {
        let spec = spec(
            json!([]),
            json!({
                "one": {"type": "record", "name": "one", "fields": {"x": "x"}, "handler": "Nope"},
                "many": {"type": "record", "name": "many", "repeatable": true, "handler": "Nope"}
            }),
        );
        let log = AuditLog::new();
        let (_, dest) = crosswalk(&spec, &record(json!({"one.x": "1", "many.1.": "2"})), &log).await;
        assert_eq!(dest["one"], json!({}));
        assert_eq!(dest["many"], json!([]));
        assert_eq!(log.with_message("unknown handler").len(), 2);
    }

    #[tokio::test]
    async fn test_repeatable_handler_coerces_scalar() {
        let spec = spec(
            json!([]),
            json!({"subject": {"type": "record", "name": "subjects", "repeatable": true, "handler": "HTMLLessDescription"}}),
        );
        let log = AuditLog::new();
        let (_, dest) = crosswalk(&spec, &record(json!({"subject": "<b>soil</b>"})), &log).await;
        assert_eq!(dest["subjects"], json!(["soil"]));
        assert_eq!(log.with_message("not an array").len(), 1);
    }

    #[tokio::test]
    async fn test_additive_rules_accumulate_in_order() {
        let spec = spec(
            json!([]),
            json!({
                "kw": {"type": "record", "name": "keywords", "repeatable": true, "additive": true},
                "anzsrc": {"type": "record", "name": "keywords", "repeatable": true, "additive": true}
            }),
        );
        let log = AuditLog::new();
        let (_, dest) = crosswalk(
            &spec,
            &record(json!({"anzsrc.1.": "c", "kw.1.": "a", "kw.2.": "b"})),
            &log,
        )
        .await;
        assert_eq!(dest["keywords"], json!(["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_first_rule_wins_without_overwrite() {
        let spec = spec(
            json!([]),
            json!({
                "first": {"type": "record", "name": "who", "fields": {"n": "n"}},
                "second": {"type": "record", "name": "who", "fields": {"n": "n"}},
                "third": {"type": "record", "name": "who", "fields": {"n": "n"}, "overwrite": true}
            }),
        );
        let log = AuditLog::new();
        let (_, dest) = crosswalk(
            &spec,
            &record(json!({"second.n": "2", "first.n": "1", "third.n": "3"})),
            &log,
        )
        .await;
        assert_eq!(dest["who"], json!({"n": "3"}));
        assert_eq!(log.with_message("already set").len(), 1);
        assert_eq!(log.with_message("already set")[0].source_field, "second");
    }

    #[tokio::test]
    async fn test_nested_names_wrap_innermost_first() {
        let spec = spec(
            json!([]),
            json!({"grp": {"type": "record", "name": "out", "fields": {"v": "v"}, "nestedNames": ["a", "b"]}}),
        );
        let log = AuditLog::new();
        let (_, dest) = crosswalk(&spec, &record(json!({"grp.v": 1})), &log).await;
        assert_eq!(dest["out"], json!({"a": {"b": {"v": 1}}}));
    }

    #[tokio::test]
    async fn test_destination_fan_out_by_discriminator() {
        let spec = spec(
            json!([]),
            json!({
                "people": {
                    "type": "record",
                    "name": "contributors",
                    "repeatable": true,
                    "fields": {"givenname": "givenname", "familyname": "familyname", "role": "role"},
                    "handler": "Person",
                    "handlerConfig": {"defaultField": "contributors", "defaultRole": "Contributor"},
                    "destinations": [
                        {"to": "contributor_ci", "from": "role", "value": "CI",
                         "role": "Chief Investigator", "singleUse": true}
                    ]
                }
            }),
        );
        let log = AuditLog::new();
        let (_, dest) = crosswalk(
            &spec,
            &record(json!({
                "people.1.givenname": "Jane", "people.1.familyname": "Doe", "people.1.role": "CI",
                "people.2.givenname": "Sam", "people.2.familyname": "Roe", "people.2.role": "Student",
                "people.3.givenname": "Ann", "people.3.familyname": "Poe", "people.3.role": "CI"
            })),
            &log,
        )
        .await;
        assert_eq!(dest["contributor_ci"]["family_name"], json!("Doe"));
        assert_eq!(dest["contributor_ci"]["role"], json!("Chief Investigator"));
        let contributors = dest["contributors"].as_array().unwrap();
        assert_eq!(contributors.len(), 1);
        assert_eq!(contributors[0]["family_name"], json!("Roe"));
        assert_eq!(contributors[0]["role"], json!("Contributor"));
        assert_eq!(log.with_message("single use").len(), 1);
    }

    #[tokio::test]
    async fn test_spreading_handler() {
        let spec = spec(
            json!([]),
            json!({
                "dc:title": {
                    "type": "record",
                    "name": "title",
                    "handler": "SharedTitle",
                    "handlerConfig": {"destinations": [{"to": "title"}, {"to": "dc:title"}]}
                }
            }),
        );
        let log = AuditLog::new();
        let (_, dest) = crosswalk(&spec, &record(json!({"dc:title": "T"})), &log).await;
        assert_eq!(dest["title"], json!("T"));
        assert_eq!(dest["dc:title"], json!("T"));
        assert_eq!(log.with_message("handler destination").len(), 2);
    }

    /// Reports each call and the length of an array input
    struct Tally;

    #[async_trait(?Send)]
    impl Handler for Tally {
        async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
            log.emit(stage::HANDLER, "Tally", "", "called", input.clone());
            Some(json!({"count": input.as_array().map_or(0, Vec::len)}))
        }
    }

    fn tally(_context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Tally)
    }

    #[tokio::test]
    async fn test_handle_all_passes_whole_group_once() {
        let registry = HandlerRegistry::new().with("Tally", tally);
        let spec = spec(
            json!([]),
            json!({
                "kw": {"type": "record", "name": "keywords", "repeatable": true,
                       "handleAll": true, "handler": "Tally"},
                "tag": {"type": "record", "name": "tags", "repeatable": true, "handler": "Tally"}
            }),
        );
        let log = AuditLog::new();
        let (_, dest) = CrosswalkInterpreter::new(&spec)
            .with_registry(&registry)
            .crosswalk(
                &record(json!({"kw.1.": "a", "kw.2.": "b", "kw.3.": "c", "tag.1.": "x", "tag.2.": "y"})),
                &log,
            )
            .await;

        assert_eq!(dest["keywords"], json!({"count": 3}));
        assert_eq!(dest["tags"], json!([{"count": 0}, {"count": 0}]));
        let calls = log.with_message("called");
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].value, json!(["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_access_person_routes_once_per_field() {
        let spec = spec(
            json!([]),
            json!({
                "people": {
                    "type": "record",
                    "name": "contributors",
                    "repeatable": true,
                    "fields": {"givenname": "givenname", "familyname": "familyname", "role": "role"},
                    "handler": "AccessPerson",
                    "handlerConfig": {
                        "defaultField": "contributors",
                        "defaultRole": "Contributor",
                        "destinations": [
                            {"to": "contributor_ci", "from": "role", "value": "CI"},
                            {"to": "contributor_data_manager", "from": "role", "value": "DM"}
                        ]
                    }
                }
            }),
        );
        let log = AuditLog::new();
        let (_, dest) = crosswalk(
            &spec,
            &record(json!({
                "people.1.givenname": "Sam", "people.1.familyname": "Roe", "people.1.role": "Student"
            })),
            &log,
        )
        .await;

        let contributors = dest["contributors"].as_array().unwrap();
        assert_eq!(contributors.len(), 1);
        assert_eq!(contributors[0]["text_full_name"], json!("Sam Roe"));
        assert_eq!(contributors[0]["role"], json!("Contributor"));
        assert_eq!(dest["contributor_ci"], json!({}));
        assert_eq!(dest["contributor_data_manager"], json!({}));
    }

    #[tokio::test]
    async fn test_creator_spreads_to_routed_field() {
        let spec = spec(
            json!([]),
            json!({
                "creator": {
                    "type": "record",
                    "name": "creators",
                    "repeatable": true,
                    "fields": {"givenname": "givenname", "familyname": "familyname", "role": "role"},
                    "handler": "Creator",
                    "handlerConfig": {
                        "changeDestination": true,
                        "defaultField": "contributors",
                        "destinations": [{"to": "contributor_ci", "from": "role", "value": "CI"}]
                    }
                }
            }),
        );
        let log = AuditLog::new();
        let (_, dest) = crosswalk(
            &spec,
            &record(json!({
                "creator.1.givenname": "Jane", "creator.1.familyname": "Doe", "creator.1.role": "CI",
                "creator.2.givenname": "Sam", "creator.2.familyname": "Roe"
            })),
            &log,
        )
        .await;

        assert_eq!(dest["contributor_ci"][0]["family_name"], json!("Doe"));
        assert_eq!(dest["contributors"][0]["family_name"], json!("Roe"));
        assert!(dest.get("creators").is_none());
    }
}
