//! Small reshaping handlers
//!
//! Most of these write to destination fields named in their own config
//! (`destinations`, `name`) and so spread their output.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{Handler, HandlerConfig, HandlerContext, text};
use crate::log::{LogSink, stage};
use crate::value::Record;

/// Workflow keys dropped from knowledge-base entries
const KNOWLEDGE_BASE_DROPPED: [&str; 4] = ["source", "name", "pathway", "nextStep"];

/// First value of a grouped map
pub struct FirstValue;

impl FirstValue {
    pub fn create(_context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self)
    }
}

#[async_trait(?Send)]
impl Handler for FirstValue {
    async fn crosswalk(&self, input: &Value, _context: &Record, _log: &dyn LogSink) -> Option<Value> {
        match input {
            Value::Object(map) => map.values().next().cloned(),
            other => Some(other.clone()),
        }
    }
}

/// Where replicated copies are placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Directly under each destination name
    TopLevel,
    /// Under each destination name inside a wrapper field
    Wrapped(&'static str),
}

/// Replicates the input under each configured destination name
pub struct Replicate {
    config: HandlerConfig,
    placement: Placement,
}

impl Replicate {
    fn with_placement(context: HandlerContext, placement: Placement) -> Box<dyn Handler> {
        Box::new(Self {
            config: context.config,
            placement,
        })
    }

    pub fn create_shared_title(context: HandlerContext) -> Box<dyn Handler> {
        Self::with_placement(context, Placement::TopLevel)
    }

    pub fn create_custodian(context: HandlerContext) -> Box<dyn Handler> {
        Self::with_placement(context, Placement::Wrapped("Custodian"))
    }

    pub fn create_application_custodian(context: HandlerContext) -> Box<dyn Handler> {
        Self::with_placement(context, Placement::Wrapped("ApplicationCustodian"))
    }
}

#[async_trait(?Send)]
impl Handler for Replicate {
    async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
        let mut copies = Map::new();
        for dest in self.config.destinations() {
            if let Some(to) = dest.to {
                copies.insert(to, input.clone());
            }
        }
        if copies.is_empty() {
            log.emit(stage::HANDLER, "Replicate", "", "no destinations", input.clone());
        }
        match self.placement {
            Placement::TopLevel => Some(Value::Object(copies)),
            Placement::Wrapped(wrapper) => {
                let mut wrapped = Map::new();
                wrapped.insert(wrapper.to_string(), Value::Object(copies));
                Some(Value::Object(wrapped))
            }
        }
    }

    fn spreads_output(&self) -> bool {
        true
    }
}

/// Marks a record as a request under the config `name`
pub struct RequestIdentifier {
    config: HandlerConfig,
}

impl RequestIdentifier {
    pub fn create(context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self {
            config: context.config,
        })
    }
}

#[async_trait(?Send)]
impl Handler for RequestIdentifier {
    async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
        let Some(name) = self.config.str("name") else {
            log.emit(stage::HANDLER, "RequestIdentifier", "", "no name configured", input.clone());
            return None;
        };
        let mut output = Map::new();
        output.insert(name.to_string(), json!(["request"]));
        Some(Value::Object(output))
    }

    fn spreads_output(&self) -> bool {
        true
    }
}

/// Copies knowledge-base entries into each configured destination
///
/// Entries from other sources yield an empty object per destination.
pub struct KnowledgeBase {
    config: HandlerConfig,
}

impl KnowledgeBase {
    pub fn create(context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self {
            config: context.config,
        })
    }
}

/// Whether a source label names the knowledge base, in any casing or spacing
fn is_knowledge_base(source: &str) -> bool {
    let normalised: String = source
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    normalised == "knowledgebase"
}

#[async_trait(?Send)]
impl Handler for KnowledgeBase {
    async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
        let entry = if is_knowledge_base(text(input, "source")) {
            input
                .as_object()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|(key, _)| !KNOWLEDGE_BASE_DROPPED.contains(&key.as_str()))
                .collect()
        } else {
            log.emit(stage::HANDLER, "KnowledgeBase", "", "not from knowledge base", input.clone());
            Map::new()
        };
        let mut output = Map::new();
        for dest in self.config.destinations() {
            if let Some(to) = dest.to {
                output.insert(to, Value::Object(entry.clone()));
            }
        }
        Some(Value::Object(output))
    }

    fn spreads_output(&self) -> bool {
        true
    }
}
