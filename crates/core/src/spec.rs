//! Mapping specification for a crosswalk
//!
//! A mapping spec is loaded once per migration run and is read-only after
//! that. Field rules keep their declaration order: it decides processing
//! order in the interpreter and therefore which rule wins when several rules
//! target the same non-repeatable destination.
//!
//! # Example
//!
//! ```rust
//! use crosswalk_core::spec::{FieldRule, MappingSpec};
//!
//! let spec = MappingSpec::from_json_str(r#"{
//!     "idfield": "id",
//!     "source_type": "dmpt",
//!     "dest_type": "rdmp",
//!     "permissions": {},
//!     "required": ["title"],
//!     "fields": {
//!         "dc:title": "title",
//!         "dc:type": {"type": "valuemap", "name": "type", "map": {"A": "Alpha"}, "default": "Unknown"}
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(spec.fields[0].0, "dc:title");
//! assert!(matches!(spec.fields[1].1, FieldRule::ValueMap(_)));
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CrosswalkError, CrosswalkResult};
use crate::postwalk::PostTask;

/// Sections every mapping spec file must carry
pub const MANDATORY_SECTIONS: [&str; 6] = [
    "idfield",
    "source_type",
    "dest_type",
    "permissions",
    "required",
    "fields",
];

/// Parsed mapping specification
#[derive(Debug, Clone, Serialize)]
pub struct MappingSpec {
    /// Source field holding the record id
    pub idfield: String,
    /// Record type in the source store
    pub source_type: String,
    /// Record type in the destination store
    pub dest_type: String,
    /// Permission settings, consumed by the store collaborator
    pub permissions: Value,
    /// Destination fields that must carry a value
    pub required: Vec<String>,
    /// Source fields that are expected to stay unmatched
    pub ignore: Vec<String>,
    /// Workflow step to create destination records in
    pub workflow_step: Option<String>,
    /// Source field holding the record owner
    pub ownerfield: String,
    /// Rewrites applied to the stored destination record
    pub post_tasks: Vec<PostTask>,
    /// Field rules in declaration order
    pub fields: Vec<(String, FieldRule)>,
}

/// Shape of the file on disk, before rule interpretation
#[derive(Debug, Deserialize)]
struct SpecFile {
    idfield: String,
    source_type: String,
    dest_type: String,
    permissions: Value,
    required: Vec<String>,
    #[serde(default)]
    ignore: Vec<String>,
    #[serde(default)]
    workflow_step: Option<String>,
    #[serde(default = "default_ownerfield")]
    ownerfield: String,
    #[serde(default, rename = "postTasks")]
    post_tasks: Vec<PostTask>,
    fields: Map<String, Value>,
}

fn default_ownerfield() -> String {
    "owner".to_string()
}

impl MappingSpec {
    /// Load a mapping spec from a JSON or YAML file
    ///
    /// Files ending in `.yaml` or `.yml` are read as YAML, anything else as
    /// JSON.
    pub fn load(path: impl AsRef<Path>) -> CrosswalkResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CrosswalkError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    /// Parse a mapping spec from JSON text
    pub fn from_json_str(content: &str) -> CrosswalkResult<Self> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| CrosswalkError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Parse a mapping spec from YAML text
    pub fn from_yaml_str(content: &str) -> CrosswalkResult<Self> {
        let value: Value = serde_yaml::from_str(content)?;
        Self::from_value(value)
    }

    /// Build a mapping spec from an already-parsed document
    pub fn from_value(mut value: Value) -> CrosswalkResult<Self> {
        let doc = value
            .as_object_mut()
            .ok_or_else(|| CrosswalkError::Parse("mapping spec must be an object".to_string()))?;

        // Older crosswalk files name the field table "crosswalk"
        if !doc.contains_key("fields") {
            if let Some(table) = doc.remove("crosswalk") {
                doc.insert("fields".to_string(), table);
            }
        }

        for section in MANDATORY_SECTIONS {
            if !doc.contains_key(section) {
                return Err(CrosswalkError::MissingSection(section.to_string()));
            }
        }

        let file: SpecFile =
            serde_json::from_value(value).map_err(|e| CrosswalkError::Parse(e.to_string()))?;

        let mut fields = Vec::with_capacity(file.fields.len());
        for (source, rule) in &file.fields {
            fields.push((source.clone(), FieldRule::from_value(source, rule)?));
        }

        Ok(Self {
            idfield: file.idfield,
            source_type: file.source_type,
            dest_type: file.dest_type,
            permissions: file.permissions,
            required: file.required,
            ignore: file.ignore,
            workflow_step: file.workflow_step,
            ownerfield: file.ownerfield,
            post_tasks: file.post_tasks,
            fields,
        })
    }

    /// Look up the rule for a source field
    pub fn rule(&self, source: &str) -> Option<&FieldRule> {
        self.fields
            .iter()
            .find(|(name, _)| name == source)
            .map(|(_, rule)| rule)
    }

    /// Record rules keyed by their source base field, in declaration order
    pub fn record_rules(&self) -> impl Iterator<Item = (&str, &RecordRule)> {
        self.fields.iter().filter_map(|(name, rule)| match rule {
            FieldRule::Record(record) => Some((name.as_str(), record)),
            _ => None,
        })
    }

    /// Whether a destination field is required
    pub fn is_required(&self, dest: &str) -> bool {
        self.required.iter().any(|r| r == dest)
    }

    /// Whether a source field is on the ignore list
    pub fn is_ignored(&self, source: &str) -> bool {
        self.ignore.iter().any(|i| i == source)
    }
}

/// How one source field is carried into the destination record
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FieldRule {
    /// Copy the value, optionally under a new name
    Copy(CopyRule),
    /// Translate an enumerated value
    ValueMap(ValueMapRule),
    /// Grouped or repeated field, optionally shaped by a handler
    Record(RecordRule),
}

impl FieldRule {
    /// Interpret one entry of the field table
    pub fn from_value(field: &str, value: &Value) -> CrosswalkResult<Self> {
        match value {
            Value::String(name) => Ok(FieldRule::Copy(CopyRule {
                name: Some(name.clone()),
                default: None,
            })),
            Value::Object(obj) => {
                let parsed = match obj.get("type").and_then(Value::as_str) {
                    Some("valuemap") => {
                        if !obj.contains_key("map") {
                            return Err(CrosswalkError::invalid_rule(
                                field,
                                "valuemap rule has no map",
                            ));
                        }
                        serde_json::from_value(value.clone()).map(FieldRule::ValueMap)
                    }
                    Some("record") => serde_json::from_value(value.clone()).map(FieldRule::Record),
                    None | Some("copy") => {
                        serde_json::from_value(value.clone()).map(FieldRule::Copy)
                    }
                    Some(other) => {
                        return Err(CrosswalkError::invalid_rule(
                            field,
                            format!("unknown rule type '{other}'"),
                        ));
                    }
                };
                parsed.map_err(|e| CrosswalkError::invalid_rule(field, e.to_string()))
            }
            other => Err(CrosswalkError::invalid_rule(
                field,
                format!("expected a string or an object, found {other}"),
            )),
        }
    }

    /// Destination field name for a source field under this rule
    pub fn destination(&self, source: &str) -> String {
        let name = match self {
            FieldRule::Copy(rule) => rule.name.as_deref(),
            FieldRule::ValueMap(rule) => rule.name.as_deref(),
            FieldRule::Record(rule) => Some(rule.name.as_str()),
        };
        destination_name(name, source)
    }

    /// Default value to use when the source field is absent
    pub fn default_value(&self) -> Option<&Value> {
        match self {
            FieldRule::Copy(rule) => rule.default.as_ref(),
            FieldRule::ValueMap(rule) => rule.default.as_ref(),
            FieldRule::Record(rule) => rule.default.as_ref(),
        }
    }
}

/// Resolve a rule's destination name
///
/// `"_"` derives the name from the source field with dots replaced by
/// underscores; no name keeps the source field name.
pub fn destination_name(name: Option<&str>, source: &str) -> String {
    match name {
        Some("_") => source.replace('.', "_"),
        Some(name) => name.to_string(),
        None => source.to_string(),
    }
}

/// Plain copy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
}

/// Enumerated value translation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueMapRule {
    #[serde(default)]
    pub name: Option<String>,
    pub map: BTreeMap<String, Value>,
    #[serde(default)]
    pub default: Option<Value>,
}

impl ValueMapRule {
    /// Translate a source value, `None` on a miss
    pub fn lookup(&self, source: &Value) -> Option<&Value> {
        let key = match source {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.map.get(&key)
    }
}

/// Grouped or repeated source field
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRule {
    /// Destination field name (`"_"` derives it from the source name)
    pub name: String,
    /// Whether the flattened keys carry a repeat index
    #[serde(default)]
    pub repeatable: bool,
    /// Declared sub-fields, source sub-field to destination sub-field
    #[serde(default)]
    pub fields: Option<BTreeMap<String, String>>,
    /// Handler that shapes the grouped value
    #[serde(default)]
    pub handler: Option<String>,
    /// Configuration handed to the handler
    #[serde(default, alias = "handler_config")]
    pub handler_config: Map<String, Value>,
    /// Fan-out targets for handler output
    #[serde(default)]
    pub destinations: Vec<Destination>,
    /// Accumulate into a destination array across rules
    #[serde(default)]
    pub additive: bool,
    /// Wrap the output in single-key objects, innermost-first
    #[serde(default)]
    pub nested_names: Vec<String>,
    /// Hand the whole group to the handler in one call
    #[serde(default)]
    pub handle_all: bool,
    /// Allow later outputs to replace a non-repeatable destination
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl RecordRule {
    /// Destination sub-field for a source sub-field path
    pub fn subfield(&self, path: &str) -> Option<&str> {
        self.fields
            .as_ref()
            .and_then(|fields| fields.get(path))
            .map(String::as_str)
    }

    /// Whether the rule declares sub-fields at all
    pub fn has_subfields(&self) -> bool {
        self.fields.is_some()
    }
}

/// Fan-out target for one logical source group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Destination field; falls back to the handler's `defaultField`
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub repeatable: bool,
    /// Role stamped on object outputs
    #[serde(default)]
    pub role: Option<String>,
    /// Discriminator field in the source group
    #[serde(default)]
    pub from: Option<String>,
    /// Guard value the discriminator must equal
    #[serde(default)]
    pub value: Option<Value>,
    /// Accept at most one output per record
    #[serde(default)]
    pub single_use: bool,
    #[serde(default)]
    pub nested_names: Vec<String>,
    /// Extra keys merged into object outputs
    #[serde(default)]
    pub additional_keys: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal(fields: Value) -> Value {
        json!({
            "idfield": "id",
            "source_type": "dmpt",
            "dest_type": "rdmp",
            "permissions": {"view": [], "edit": []},
            "required": [],
            "fields": fields
        })
    }

    #[test]
    fn test_missing_section() {
        let mut doc = minimal(json!({}));
        doc.as_object_mut().unwrap().remove("permissions");
        let err = MappingSpec::from_value(doc).unwrap_err();
        assert!(matches!(err, CrosswalkError::MissingSection(s) if s == "permissions"));
    }

    #[test]
    fn test_crosswalk_alias() {
        let mut doc = minimal(json!({}));
        let obj = doc.as_object_mut().unwrap();
        obj.remove("fields");
        obj.insert("crosswalk".to_string(), json!({"a": "b"}));
        let spec = MappingSpec::from_value(doc).unwrap();
        assert_eq!(spec.fields.len(), 1);
    }

    #[test]
    fn test_declaration_order_preserved() {
        let spec = MappingSpec::from_value(minimal(json!({
            "zeta": "z",
            "alpha": "a",
            "mid": {"type": "record", "name": "m"}
        })))
        .unwrap();
        let names: Vec<&str> = spec.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(spec.record_rules().count(), 1);
    }

    #[test]
    fn test_record_rule_fields() {
        let spec = MappingSpec::from_value(minimal(json!({
            "contributor": {
                "type": "record",
                "name": "contributors",
                "repeatable": true,
                "fields": {"givenname": "given_name"},
                "handler": "Person",
                "handlerConfig": {"role": "Contributor"},
                "destinations": [{"to": "contributor_ci", "from": "role", "value": "CI", "singleUse": true}],
                "nestedNames": ["people"],
                "handleAll": false
            }
        })))
        .unwrap();
        let FieldRule::Record(rule) = &spec.fields[0].1 else {
            panic!("expected record rule");
        };
        assert!(rule.repeatable);
        assert_eq!(rule.subfield("givenname"), Some("given_name"));
        assert_eq!(rule.handler.as_deref(), Some("Person"));
        assert_eq!(rule.handler_config["role"], json!("Contributor"));
        assert!(rule.destinations[0].single_use);
        assert_eq!(rule.nested_names, vec!["people".to_string()]);
    }

    #[test]
    fn test_invalid_rules() {
        let err = MappingSpec::from_value(minimal(json!({"a": {"type": "valuemap"}}))).unwrap_err();
        assert!(matches!(err, CrosswalkError::InvalidRule { .. }));

        let err = MappingSpec::from_value(minimal(json!({"a": {"type": "record"}}))).unwrap_err();
        assert!(err.to_string().contains("name"));

        let err = MappingSpec::from_value(minimal(json!({"a": 3}))).unwrap_err();
        assert!(matches!(err, CrosswalkError::InvalidRule { .. }));
    }

    #[test]
    fn test_destination_name() {
        assert_eq!(destination_name(Some("_"), "dc:subject.vivo"), "dc:subject_vivo");
        assert_eq!(destination_name(Some("_"), "a.b.c"), "a_b_c");
        assert_eq!(destination_name(Some("title"), "dc:title"), "title");
        assert_eq!(destination_name(None, "same"), "same");
    }

    #[test]
    fn test_yaml_spec() {
        let yaml = r#"
idfield: id
source_type: dmpt
dest_type: rdmp
permissions: {}
required: [title]
ignore: [metaList]
fields:
  dc:title: title
  dc:description: _
"#;
        let spec = MappingSpec::from_yaml_str(yaml).unwrap();
        assert!(spec.is_required("title"));
        assert!(spec.is_ignored("metaList"));
        assert_eq!(spec.rule("dc:description").unwrap().destination("dc:description"), "dc:description");
    }
}
