//! Placement of handler output in the destination record

use serde_json::{Value, json};

use crate::log::{LogSink, stage};
use crate::spec::{Destination, RecordRule};
use crate::value::{Record, brief, cast_array, is_blank, nest};

/// One handler invocation
pub(crate) struct Handled {
    pub input: Value,
    pub output: Option<Value>,
}

/// Whether a destination field already holds a value
fn is_set(dest: &Record, field: &str) -> bool {
    dest.get(field).is_some_and(|v| !is_blank(v))
}

/// Append to an array field, creating or promoting it as needed
pub(crate) fn append(dest: &mut Record, field: &str, value: Value) {
    let slot = dest
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        let previous = std::mem::take(slot);
        *slot = Value::Array(if is_blank(&previous) { Vec::new() } else { vec![previous] });
    }
    if let Value::Array(items) = slot
        && !is_blank(&value)
    {
        items.extend(cast_array(value));
    }
}

/// Write a rule's whole result to its destination field
///
/// Additive rules accumulate into an array; other rules keep the first
/// non-blank value unless `overwrite` is set.
pub(crate) fn write_field(
    dest: &mut Record,
    field: &str,
    value: Value,
    rule: &RecordRule,
    source: &str,
    log: &dyn LogSink,
) {
    if rule.additive {
        log.emit(stage::CROSSWALK, source, field, "appended", value.clone());
        append(dest, field, value);
    } else if is_set(dest, field) && !rule.overwrite {
        log.emit(stage::CROSSWALK, source, field, "already set", value);
    } else {
        dest.insert(field.to_string(), value);
    }
}

/// Merge output of a handler that names its own destination fields
pub(crate) fn spread(
    source: &str,
    rule: &RecordRule,
    handled: &[Handled],
    dest: &mut Record,
    log: &dyn LogSink,
) {
    let accumulate = rule.repeatable || rule.additive;
    for output in handled.iter().filter_map(|h| h.output.as_ref()) {
        let Value::Object(fields) = output else {
            log.emit(stage::CROSSWALK, source, "", "not an object", output.clone());
            continue;
        };
        for (field, value) in fields {
            log.emit(stage::CROSSWALK, source, field, "handler destination", value.clone());
            if accumulate {
                append(dest, field, value.clone());
            } else if is_set(dest, field) && !rule.overwrite {
                log.emit(stage::CROSSWALK, source, field, "already set", value.clone());
            } else {
                dest.insert(field.clone(), value.clone());
            }
        }
    }
}

/// One routed copy of a handler output
struct Route<'a> {
    index: usize,
    to: &'a str,
    mismatch: bool,
    repeatable: bool,
    single_use: bool,
    value: Value,
}

/// Route handler outputs across the given destinations
///
/// Every output is offered to every destination. A destination whose
/// discriminator (`from`) is present in the source group but differs from
/// its guard `value` sends the output to the handler's `defaultField` with
/// its `defaultRole` instead. An output lands at most once per destination
/// field; a later route to the same field replaces an earlier one.
pub(crate) fn fan_out(
    source: &str,
    dest_field: &str,
    rule: &RecordRule,
    destinations: &[Destination],
    handled: &[Handled],
    dest: &mut Record,
    log: &dyn LogSink,
) {
    let default_field = rule
        .handler_config
        .get("defaultField")
        .and_then(Value::as_str)
        .filter(|f| !f.is_empty())
        .unwrap_or(dest_field);
    let default_role = rule.handler_config.get("defaultRole").cloned();
    let mut spent = vec![false; destinations.len()];

    for item in handled {
        let Some(output) = &item.output else {
            continue;
        };
        let mut routes: Vec<Route> = Vec::with_capacity(destinations.len());
        for (index, target) in destinations.iter().enumerate() {
            let discriminator = target
                .from
                .as_deref()
                .and_then(|from| item.input.get(from))
                .filter(|v| !is_blank(v));
            let mismatch = matches!(
                (discriminator, &target.value),
                (Some(found), Some(guard)) if brief(found) != brief(guard)
            );
            let (to, role, repeatable) = if mismatch {
                (default_field, default_role.clone(), target.repeatable || rule.repeatable)
            } else {
                (
                    target.to.as_deref().unwrap_or(default_field),
                    target.role.clone().map(Value::String).or_else(|| default_role.clone()),
                    target.repeatable,
                )
            };

            let mut shaped = output.clone();
            if let Value::Object(map) = &mut shaped {
                if let Some(role) = role {
                    map.insert("role".to_string(), role);
                }
                for (key, value) in &target.additional_keys {
                    map.insert(key.clone(), value.clone());
                }
            }
            let route = Route {
                index,
                to,
                mismatch,
                repeatable,
                single_use: target.single_use,
                value: nest(&target.nested_names, shaped),
            };
            match routes.iter_mut().find(|r| r.to == to) {
                Some(existing) => *existing = route,
                None => routes.push(route),
            }
        }

        for route in routes {
            let Route { index, to, mismatch, repeatable, single_use, value } = route;
            if single_use && !mismatch && spent[index] {
                log.emit(stage::CROSSWALK, source, to, "single use", value);
            } else if repeatable {
                log.emit(stage::CROSSWALK, source, to, "routed", value.clone());
                append(dest, to, value);
                spent[index] |= !mismatch;
            } else if is_set(dest, to) && !rule.overwrite {
                log.emit(stage::CROSSWALK, source, to, "already set", value);
            } else {
                log.emit(stage::CROSSWALK, source, to, "routed", value.clone());
                dest.insert(to.to_string(), value);
                spent[index] |= !mismatch;
            }
        }
    }

    // Destinations that received nothing still appear, empty
    for target in destinations {
        let to = target.to.as_deref().unwrap_or(default_field);
        if !dest.contains_key(to) {
            let empty = if target.repeatable { json!([]) } else { json!({}) };
            dest.insert(to.to_string(), empty);
        }
    }
}
