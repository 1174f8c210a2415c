//! Reconstruction of grouped and repeated fields from flattened keys
//!
//! Only fields declared as `record` rules in the mapping spec are
//! unflattened; every other key is carried over untouched. The output is a
//! new record: each record field appears where its first flattened key
//! appeared in the source, so the result is stable for a fixed input.

mod keys;

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::log::{LogSink, stage};
use crate::spec::{MappingSpec, RecordRule};
use crate::value::{Record, is_blank};

pub use keys::{FlatKey, parse_flat_key};

/// Unflatten a raw source record against the mapping's record rules
pub fn unflatten(spec: &MappingSpec, raw: &Record, log: &dyn LogSink) -> Record {
    let mut groups: Vec<Group<'_>> = Vec::new();
    // flattened key -> index into `groups`
    let mut owner: HashMap<&str, usize> = HashMap::new();

    for (base, rule) in spec.record_rules() {
        let mut group = Group::new(base, rule);
        for (key, value) in raw {
            if owner.contains_key(key.as_str()) {
                continue;
            }
            let Some(flat) = parse_flat_key(key, base) else {
                continue;
            };
            owner.insert(key.as_str(), groups.len());
            group.accept(key, &flat, value, log);
        }
        groups.push(group);
    }

    let mut output = Map::new();
    let mut placed = vec![false; groups.len()];
    for (key, value) in raw {
        if let Some(&gi) = owner.get(key.as_str()) {
            if !placed[gi] {
                placed[gi] = true;
                let group = &groups[gi];
                if group.accepted > 0 {
                    if raw.contains_key(group.base) {
                        log.emit(
                            stage::UNFLATTEN,
                            group.base,
                            group.base,
                            "replaced",
                            raw[group.base].clone(),
                        );
                    }
                    output.insert(group.base.to_string(), group.to_value());
                }
            }
            continue;
        }
        // an existing value under a base field is superseded by the group
        if groups.iter().any(|g| g.base == key && g.accepted > 0) {
            continue;
        }
        output.insert(key.clone(), value.clone());
    }

    drop_blank_entries(&mut output);

    for group in groups.iter().filter(|g| g.accepted > 0) {
        debug!(field = group.base, keys = group.accepted, "Unflattened record field");
        log.emit(
            stage::UNFLATTEN,
            group.base,
            group.base,
            "unflattened",
            json!(group.accepted),
        );
    }

    output
}

/// Remove blank entries from every array-valued field
///
/// Sparse repeat indices leave gaps; blank strings and the literal `"null"`
/// are dropped along with them.
pub fn drop_blank_entries(record: &mut Record) {
    for value in record.values_mut() {
        if let Value::Array(items) = value {
            items.retain(|item| !is_blank(item));
        }
    }
}

/// Accumulator for one record field while scanning the raw keys
struct Group<'a> {
    base: &'a str,
    rule: &'a RecordRule,
    single: Option<Value>,
    repeated: BTreeMap<usize, Value>,
    accepted: usize,
}

impl<'a> Group<'a> {
    fn new(base: &'a str, rule: &'a RecordRule) -> Self {
        Self {
            base,
            rule,
            single: None,
            repeated: BTreeMap::new(),
            accepted: 0,
        }
    }

    fn accept(&mut self, key: &str, flat: &FlatKey<'_>, value: &Value, log: &dyn LogSink) {
        let slot = if self.rule.repeatable {
            if !flat.is_indexed() {
                log.emit(stage::UNFLATTEN, key, self.base, "should be repeatable", value.clone());
                Some(0)
            } else {
                match flat.index() {
                    Some(index) => Some(index),
                    None => {
                        log.emit(stage::UNFLATTEN, key, self.base, "invalid index", value.clone());
                        return;
                    }
                }
            }
        } else {
            if flat.is_indexed() {
                log.emit(stage::UNFLATTEN, key, self.base, "not repeatable", value.clone());
            }
            None
        };

        if self.rule.has_subfields() {
            let Some(dest_sub) = self.rule.subfield(flat.subfield) else {
                log.emit(stage::UNFLATTEN, key, self.base, "unknown subfield", value.clone());
                return;
            };
            let target = match slot {
                Some(index) => self
                    .repeated
                    .entry(index)
                    .or_insert_with(|| Value::Object(Map::new())),
                None => self.single.get_or_insert_with(|| Value::Object(Map::new())),
            };
            let Value::Object(map) = target else {
                return;
            };
            if map.contains_key(dest_sub) {
                log.emit(stage::UNFLATTEN, key, self.base, "multiple values", value.clone());
                return;
            }
            map.insert(dest_sub.to_string(), value.clone());
        } else {
            let occupied = match slot {
                Some(index) => self.repeated.contains_key(&index),
                None => self.single.is_some(),
            };
            if occupied {
                log.emit(stage::UNFLATTEN, key, self.base, "multiple values", value.clone());
                return;
            }
            match slot {
                Some(index) => {
                    self.repeated.insert(index, value.clone());
                }
                None => self.single = Some(value.clone()),
            }
        }
        self.accepted += 1;
    }

    fn to_value(&self) -> Value {
        if self.rule.repeatable {
            Value::Array(self.repeated.values().cloned().collect())
        } else {
            self.single.clone().unwrap_or(Value::Null)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::AuditLog;

    fn spec(fields: Value) -> MappingSpec {
        MappingSpec::from_value(json!({
            "idfield": "id",
            "source_type": "a",
            "dest_type": "b",
            "permissions": {},
            "required": [],
            "fields": fields
        }))
        .unwrap()
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_non_repeatable_group() {
        let spec = spec(json!({
            "person": {"type": "record", "name": "person",
                       "fields": {"given": "given_name", "family": "family_name"}}
        }));
        let log = AuditLog::new();
        let out = unflatten(
            &spec,
            &record(json!({"person.given": "A", "person.family": "B"})),
            &log,
        );
        assert_eq!(
            Value::Object(out),
            json!({"person": {"given_name": "A", "family_name": "B"}})
        );
    }

    #[test]
    fn test_repeatable_scalar_gaps_dropped() {
        let spec = spec(json!({"tag": {"type": "record", "name": "tags", "repeatable": true}}));
        let log = AuditLog::new();
        let out = unflatten(&spec, &record(json!({"tag.1.": "x", "tag.3.": "y"})), &log);
        assert_eq!(Value::Object(out), json!({"tag": ["x", "y"]}));
    }

    #[test]
    fn test_repeatable_subfields() {
        let spec = spec(json!({
            "contributor": {"type": "record", "name": "contributors", "repeatable": true,
                            "fields": {"name": "name", "email": "email"}}
        }));
        let log = AuditLog::new();
        let out = unflatten(
            &spec,
            &record(json!({
                "title": "T",
                "contributor.2.name": "Second",
                "contributor.1.name": "First",
                "contributor.1.email": "first@x.org",
                "contributor.1.phone": "555"
            })),
            &log,
        );
        assert_eq!(
            Value::Object(out),
            json!({
                "title": "T",
                "contributor": [
                    {"name": "First", "email": "first@x.org"},
                    {"name": "Second"}
                ]
            })
        );
        let unknown = log.with_message("unknown subfield");
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].source_field, "contributor.1.phone");
    }

    #[test]
    fn test_repeatability_mismatches_are_permissive() {
        let spec = spec(json!({
            "ci": {"type": "record", "name": "ci", "fields": {"givenname": "givenname"}},
            "kw": {"type": "record", "name": "kw", "repeatable": true}
        }));
        let log = AuditLog::new();
        let out = unflatten(
            &spec,
            &record(json!({"ci.1.givenname": "Jane", "kw.x": "solo"})),
            &log,
        );
        assert_eq!(out["ci"], json!({"givenname": "Jane"}));
        assert_eq!(out["kw"], json!(["solo"]));
        assert_eq!(log.with_message("not repeatable").len(), 1);
        assert_eq!(log.with_message("should be repeatable").len(), 1);
    }

    #[test]
    fn test_non_record_keys_untouched() {
        let spec = spec(json!({"dc:title": "title"}));
        let log = AuditLog::new();
        let raw = record(json!({"dc:title": "T", "odd.1.key": "v", "list": ["a", "", "null"]}));
        let out = unflatten(&spec, &raw, &log);
        assert_eq!(out["odd.1.key"], json!("v"));
        assert_eq!(out["list"], json!(["a"]));
    }

    #[test]
    fn test_unflatten_is_idempotent() {
        let spec = spec(json!({
            "person": {"type": "record", "name": "person", "fields": {"given": "given"}},
            "tag": {"type": "record", "name": "tag", "repeatable": true}
        }));
        let log = AuditLog::new();
        let once = unflatten(
            &spec,
            &record(json!({"id": "1", "person.given": "A", "tag.1.": "x", "tag.2.": "y"})),
            &log,
        );
        let twice = unflatten(&spec, &once, &log);
        assert_eq!(once, twice);
        assert_eq!(
            serde_json::to_string(&once).unwrap(),
            serde_json::to_string(&twice).unwrap()
        );
    }

    #[test]
    fn test_first_value_wins_on_collision() {
        let spec = spec(json!({"tag": {"type": "record", "name": "tag", "repeatable": true}}));
        let log = AuditLog::new();
        let out = unflatten(&spec, &record(json!({"tag.1.": "a", "tag.1": "b"})), &log);
        assert_eq!(out["tag"], json!(["a"]));
        assert_eq!(log.with_message("multiple values").len(), 1);
    }

    #[test]
    fn test_group_placed_at_first_key_position() {
        let spec = spec(json!({"tag": {"type": "record", "name": "tag", "repeatable": true}}));
        let log = AuditLog::new();
        let out = unflatten(
            &spec,
            &record(json!({"a": 1, "tag.1.": "x", "b": 2, "tag.2.": "y"})),
            &log,
        );
        let keys: Vec<&str> = out.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "tag", "b"]);
    }
}
