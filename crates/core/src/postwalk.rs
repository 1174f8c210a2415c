//! Rewrites applied to a destination record after it has been stored
//!
//! Post-walk tasks run against the representation returned by the
//! destination store, strictly in list order, each task's output feeding the
//! next. Field names are literal top-level keys; a dot is part of the name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::log::{LogSink, stage};
use crate::value::{Record, brief};

/// Named post-walk operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PostTaskKind {
    /// Mirror a field under a second key
    Complement,
    /// Drop a duplicate entry from a sibling list
    RemoveIfRepeated,
}

impl std::fmt::Display for PostTaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostTaskKind::Complement => write!(f, "complement"),
            PostTaskKind::RemoveIfRepeated => write!(f, "removeIfRepeated"),
        }
    }
}

/// One post-walk task with its field operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostTask {
    pub name: PostTaskKind,
    #[serde(default)]
    pub fields: Vec<FieldOp>,
}

/// Field operation parameters
///
/// `complement` uses `name` and `update_to`; `removeIfRepeated` uses `name`,
/// `remove_from` and `compare`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOp {
    pub name: String,
    #[serde(default)]
    pub update_to: Option<String>,
    #[serde(default)]
    pub remove_from: Option<String>,
    #[serde(default)]
    pub compare: Option<String>,
}

/// Apply post-walk tasks to a stored record
pub fn postwalk(tasks: &[PostTask], mut record: Record, log: &dyn LogSink) -> Record {
    for task in tasks {
        let kind = task.name.to_string();
        log.emit(stage::POSTWALK, "", "", "running", Value::String(kind));
        record = match task.name {
            PostTaskKind::Complement => complement(&task.fields, record, log),
            PostTaskKind::RemoveIfRepeated => remove_if_repeated(&task.fields, record, log),
        };
    }
    record
}

fn complement(fields: &[FieldOp], mut record: Record, log: &dyn LogSink) -> Record {
    for op in fields {
        let Some(target) = op.update_to.as_deref() else {
            log.emit(stage::POSTWALK, &op.name, "", "no updateTo", Value::Null);
            continue;
        };
        match record.get(&op.name).cloned() {
            Some(value) => {
                log.emit(stage::POSTWALK, &op.name, target, "complemented", value.clone());
                record.insert(target.to_string(), value);
            }
            None => log.emit(stage::POSTWALK, &op.name, target, "missing", Value::Null),
        }
    }
    record
}

fn remove_if_repeated(fields: &[FieldOp], mut record: Record, log: &dyn LogSink) -> Record {
    for op in fields {
        let (Some(list_field), Some(compare)) = (op.remove_from.as_deref(), op.compare.as_deref())
        else {
            log.emit(stage::POSTWALK, &op.name, "", "no removeFrom/compare", Value::Null);
            continue;
        };

        let Some(needle) = record
            .get(&op.name)
            .and_then(|v| v.get(compare))
            .cloned()
        else {
            log.emit(stage::POSTWALK, &op.name, list_field, "missing", Value::Null);
            continue;
        };

        let Some(Value::Array(entries)) = record.get_mut(list_field) else {
            log.emit(stage::POSTWALK, &op.name, list_field, "not a list", Value::Null);
            continue;
        };

        match entries.iter().position(|entry| entry.get(compare) == Some(&needle)) {
            Some(index) => {
                entries.remove(index);
                log.emit(
                    stage::POSTWALK,
                    &op.name,
                    list_field,
                    "removed repeat",
                    Value::String(brief(&needle)),
                );
            }
            None => log.emit(stage::POSTWALK, &op.name, list_field, "not repeated", needle),
        }
    }
    record
}
