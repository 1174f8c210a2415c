//! Pluggable field handlers
//!
//! A handler shapes the value of one `record` field rule into its
//! destination form. Handlers are looked up by name in a [`HandlerRegistry`]
//! and built fresh for each field rule from a [`HandlerContext`] carrying the
//! rule's `handlerConfig`. They keep no state beyond that configuration.
//!
//! # Example
//!
//! ```rust
//! use crosswalk_core::handlers::{HandlerContext, builtin_registry};
//!
//! let handler = builtin_registry()
//!     .create("FlatKeywords", HandlerContext::default())
//!     .unwrap();
//! assert!(!handler.spreads_output());
//! ```

pub mod activity;
pub mod dates;
pub mod description;
pub mod location;
pub mod lookup;
pub mod person;
pub mod shared;
pub mod vocab;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};

use crate::error::{CrosswalkError, CrosswalkResult};
use crate::log::LogSink;
use crate::spec::Destination;
use crate::store::RecordStore;
use crate::value::Record;

/// Transformation unit for one record field rule
#[async_trait(?Send)]
pub trait Handler {
    /// Shape one input value
    ///
    /// `context` is the whole unflattened source record. `None` means the
    /// handler produces nothing for this input; it is not an error.
    async fn crosswalk(&self, input: &Value, context: &Record, log: &dyn LogSink)
    -> Option<Value>;

    /// Whether the output is an object keyed by destination field names
    ///
    /// Spreading handlers choose their own destination fields; each key of
    /// their output is written to the destination record directly.
    fn spreads_output(&self) -> bool {
        false
    }

    /// Fan-out targets carried in the handler's own config
    ///
    /// Used only when the rule declares no `destinations` of its own.
    fn destinations(&self) -> Vec<Destination> {
        Vec::new()
    }
}

/// Declarative configuration of one handler instance
#[derive(Debug, Clone, Default)]
pub struct HandlerConfig {
    values: Map<String, Value>,
}

impl HandlerConfig {
    /// Wrap a rule's `handlerConfig` object
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Raw configuration value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Non-empty string setting
    pub fn str(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Boolean setting, false when absent
    pub fn flag(&self, key: &str) -> bool {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Role stamped on person-like outputs
    pub fn role(&self) -> Value {
        self.values.get("role").cloned().unwrap_or(Value::Null)
    }

    /// Destination list carried inside the handler config
    ///
    /// Entries that do not parse as destinations are skipped.
    pub fn destinations(&self) -> Vec<Destination> {
        self.values
            .get("destinations")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl From<Map<String, Value>> for HandlerConfig {
    fn from(values: Map<String, Value>) -> Self {
        Self::new(values)
    }
}

/// Everything a handler factory receives
#[derive(Clone, Default)]
pub struct HandlerContext {
    pub config: HandlerConfig,
    /// Store used by lookup-style handlers
    pub store: Option<Arc<dyn RecordStore>>,
}

impl HandlerContext {
    /// Create a context from a handler configuration
    pub fn new(config: impl Into<HandlerConfig>) -> Self {
        Self {
            config: config.into(),
            store: None,
        }
    }

    /// Attach a record store
    pub fn with_store(mut self, store: Option<Arc<dyn RecordStore>>) -> Self {
        self.store = store;
        self
    }
}

/// Constructor for a named handler
pub type HandlerFactory = fn(HandlerContext) -> Box<dyn Handler>;

/// Name-to-constructor table of handlers
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: HashMap<&'static str, HandlerFactory>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in handler
    pub fn builtin() -> Self {
        Self::new()
            .with("Person", person::Person::create)
            .with("AccessPerson", person::Person::create_access)
            .with("Creator", person::Person::create_creator)
            .with("AffiliatedPerson", person::Person::create_affiliated)
            .with("SingleTextFieldPerson", person::Person::create_single_text)
            .with("SingleTextFieldFromPerson", person::Person::create_from_person)
            .with("LookupPerson", lookup::LookupPerson::create)
            .with("DummyLookupPerson", lookup::LookupPerson::create_dummy)
            .with("ForSeo", vocab::ForSeo::create)
            .with("Country", vocab::Country::create)
            .with("ResearchThemes", vocab::ResearchThemes::create)
            .with("FundingBody", activity::FundingBody::create)
            .with("GrantBody", activity::GrantBody::create)
            .with("DataLocations", location::DataLocations::create)
            .with("URLDataLocations", location::DataLocations::create_url)
            .with("PhysicalDataLocations", location::DataLocations::create_physical)
            .with("AttachmentDataLocations", location::DataLocations::create_attachment)
            .with("GeoLocation", location::GeoLocation::create)
            .with("HTMLLessDescription", description::HtmlLessDescription::create)
            .with(
                "HTMLLessFirstFullDescription",
                description::HtmlLessFirstFullDescription::create,
            )
            .with("HTMLMultiDescription", description::HtmlMultiDescription::create)
            .with("DateTime", dates::DateTime::create)
            .with("CitationSimpleDate", dates::CitationSimpleDate::create)
            .with(
                "CitationSimplePublicationDate",
                dates::CitationSimpleDate::create_publication,
            )
            .with("FlatKeywords", shared::FirstValue::create)
            .with("ProtectiveMarking", shared::FirstValue::create)
            .with("SharedTitle", shared::Replicate::create_shared_title)
            .with("Custodian", shared::Replicate::create_custodian)
            .with("ApplicationCustodian", shared::Replicate::create_application_custodian)
            .with("RequestIdentifier", shared::RequestIdentifier::create)
            .with("KnowledgeBase", shared::KnowledgeBase::create)
    }

    /// Add a handler, builder style
    pub fn with(mut self, name: &'static str, factory: HandlerFactory) -> Self {
        self.register(name, factory);
        self
    }

    /// Add or replace a handler
    pub fn register(&mut self, name: &'static str, factory: HandlerFactory) {
        self.factories.insert(name, factory);
    }

    /// Whether a handler is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Build the handler registered under `name`
    pub fn create(&self, name: &str, context: HandlerContext) -> CrosswalkResult<Box<dyn Handler>> {
        self.factories
            .get(name)
            .map(|factory| factory(context))
            .ok_or_else(|| CrosswalkError::UnknownHandler(name.to_string()))
    }
}

static BUILTIN: Lazy<HandlerRegistry> = Lazy::new(HandlerRegistry::builtin);

/// Shared registry of built-in handlers
pub fn builtin_registry() -> &'static HandlerRegistry {
    &BUILTIN
}

/// String content of a field of an object input, empty when absent
pub(crate) fn text<'a>(input: &'a Value, key: &str) -> &'a str {
    crate::value::as_str(input.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NullSink;
    use serde_json::json;

    struct Echo;

    #[async_trait(?Send)]
    impl Handler for Echo {
        async fn crosswalk(
            &self,
            input: &Value,
            _context: &Record,
            _log: &dyn LogSink,
        ) -> Option<Value> {
            Some(input.clone())
        }
    }

    fn echo(_: HandlerContext) -> Box<dyn Handler> {
        Box::new(Echo)
    }

    #[test]
    fn test_unknown_handler_is_an_error_value() {
        let result = builtin_registry().create("NoSuchHandler", HandlerContext::default());
        assert!(matches!(result, Err(CrosswalkError::UnknownHandler(n)) if n == "NoSuchHandler"));
    }

    #[test]
    fn test_builtin_names() {
        let registry = builtin_registry();
        for name in [
            "Person",
            "AccessPerson",
            "Creator",
            "LookupPerson",
            "ForSeo",
            "GeoLocation",
            "DateTime",
            "URLDataLocations",
            "HTMLLessDescription",
        ] {
            assert!(registry.contains(name), "{name} should be registered");
        }
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn test_custom_registration() {
        let registry = HandlerRegistry::new().with("Echo", echo);
        let handler = registry.create("Echo", HandlerContext::default()).unwrap();
        let out = handler
            .crosswalk(&json!({"a": 1}), &Record::new(), &NullSink)
            .await;
        assert_eq!(out, Some(json!({"a": 1})));
        assert!(!registry.contains("Person"));
    }

    #[test]
    fn test_config_accessors() {
        let config = HandlerConfig::new(
            json!({
                "role": "Chief Investigator",
                "array": true,
                "name": "",
                "destinations": [{"to": "a"}, 3]
            })
            .as_object()
            .cloned()
            .unwrap(),
        );
        assert_eq!(config.role(), json!("Chief Investigator"));
        assert!(config.flag("array"));
        assert!(!config.flag("missing"));
        assert_eq!(config.str("name"), None);
        assert_eq!(config.destinations().len(), 1);
    }
}
