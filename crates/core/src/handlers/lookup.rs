//! Person lookup handlers
//!
//! Resolve a person identifier through the record store and build a person
//! record from the looked-up record's title. Lookups are awaited one at a
//! time, so a record with many people never fans out concurrent requests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::warn;
use url::Url;

use super::{Handler, HandlerConfig, HandlerContext};
use crate::log::{LogSink, stage};
use crate::store::RecordStore;
use crate::value::{Record, as_str, brief, is_blank};

/// Salutations recognised at the start of a name
const SALUTATIONS: [&str; 10] = [
    "dr", "prof", "professor", "assoc", "a/prof", "mr", "mrs", "ms", "miss", "sir",
];

/// Public suffixes that take two labels
const TWO_LEVEL_SUFFIXES: [&str; 10] = [
    "edu.au", "com.au", "org.au", "gov.au", "net.au", "ac.uk", "co.uk", "org.uk", "ac.nz", "co.nz",
];

/// Domain used for placeholder emails
const PLACEHOLDER_DOMAIN: &str = "redboxresearchdata.com.au";

/// Parts of a free-text personal name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameParts {
    pub salutation: String,
    pub first: String,
    pub last: String,
}

/// Split a display name into salutation, first and last name
///
/// Handles both `Dr Jane Q Doe` and `Doe, Jane` orderings.
pub fn parse_name(name: &str) -> NameParts {
    let (family_first, rest) = match name.split_once(',') {
        Some((last, first)) => (Some(last.trim()), first.trim()),
        None => (None, name.trim()),
    };
    let mut tokens: Vec<&str> = rest.split_whitespace().collect();

    let mut parts = NameParts::default();
    if let Some(first) = tokens.first()
        && SALUTATIONS.contains(&first.trim_end_matches('.').to_lowercase().as_str())
    {
        parts.salutation = first.to_string();
        tokens.remove(0);
    }
    match family_first {
        Some(last) => {
            parts.last = last.to_string();
            parts.first = tokens.first().map(|t| t.to_string()).unwrap_or_default();
        }
        None => {
            if tokens.len() > 1 {
                parts.first = tokens[0].to_string();
                parts.last = tokens[tokens.len() - 1].to_string();
            } else if let Some(only) = tokens.first() {
                parts.last = only.to_string();
            }
        }
    }
    parts
}

/// Registrable domain of a URL or bare host name
///
/// `https://research.uni.edu.au/data` yields `uni.edu.au`.
pub fn registrable_domain(source: &str) -> Option<String> {
    let url = Url::parse(source).or_else(|_| Url::parse(&format!("http://{}", source))).ok()?;
    let host = url.host_str()?.trim_start_matches("www.");
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() < 2 || labels.iter().all(|l| l.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }
    let suffix = labels[labels.len() - 2..].join(".");
    let keep = if labels.len() >= 3 && TWO_LEVEL_SUFFIXES.contains(&suffix.as_str()) {
        3
    } else {
        2
    };
    Some(labels[labels.len() - keep..].join("."))
}

/// Looks people up by identifier in the record store
pub struct LookupPerson {
    config: HandlerConfig,
    store: Option<Arc<dyn RecordStore>>,
    fill_placeholders: bool,
}

impl LookupPerson {
    pub fn create(context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self {
            config: context.config,
            store: context.store,
            fill_placeholders: false,
        })
    }

    /// Lookup that fills unknown names and emails with placeholders
    pub fn create_dummy(context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self {
            config: context.config,
            store: context.store,
            fill_placeholders: true,
        })
    }

    async fn lookup(&self, id: &Value, context: &Record, log: &dyn LogSink) -> Value {
        let role = self.config.role();
        let role_name = brief(&role);
        let mut output = Map::new();
        output.insert("role".to_string(), role);
        output.insert("username".to_string(), json!(""));
        output.insert("email".to_string(), json!(""));

        let Some(store) = &self.store else {
            log.emit(stage::HANDLER, "LookupPerson", &role_name, "no store", id.clone());
            return Value::Object(output);
        };

        let found = match store.get_record(&brief(id)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(id = %brief(id), error = %e, "Person lookup failed");
                log.emit(stage::HANDLER, "LookupPerson", &role_name, "lookup failed", json!(e.to_string()));
                None
            }
        };
        let Some(found) = found.filter(|f| !is_blank(f)) else {
            log.emit(stage::HANDLER, "Person", &role_name, "missing", id.clone());
            return Value::Object(output);
        };

        let full_name = as_str(found.get("title")).trim().to_string();
        let parts = parse_name(&full_name);
        output.insert("full_name_honorific".to_string(), json!(full_name));
        output.insert("text_full_name".to_string(), json!(full_name));
        output.insert("given_name".to_string(), json!(parts.first));
        output.insert("family_name".to_string(), json!(parts.last));
        output.insert("honorific".to_string(), json!(parts.salutation));
        output.insert(
            "full_name_family_name_first".to_string(),
            json!(format!("{}, {}", parts.last, parts.first)),
        );
        if let Some(domain) = registrable_domain(as_str(context.get("data_source_key"))) {
            output.insert(
                "email".to_string(),
                json!(format!("{}.{}@{}", parts.first, parts.last, domain)),
            );
        }
        Value::Object(output)
    }

    fn insert_placeholders(person: &mut Value) {
        let Value::Object(map) = person else {
            return;
        };
        if as_str(map.get("given_name")).is_empty() {
            map.insert("given_name".to_string(), json!("John"));
            map.insert("family_name".to_string(), json!("Doe"));
            map.insert("text_full_name".to_string(), json!("John Doe"));
            map.insert("full_name_honorific".to_string(), json!("John Doe"));
            map.insert("full_name_family_name_first".to_string(), json!("Doe, John"));
        }
        if as_str(map.get("email")).is_empty() {
            let email = format!(
                "{}.{}@{}",
                as_str(map.get("given_name")),
                as_str(map.get("family_name")),
                PLACEHOLDER_DOMAIN
            );
            map.insert("email".to_string(), json!(email));
        }
    }
}

#[async_trait(?Send)]
impl Handler for LookupPerson {
    async fn crosswalk(&self, input: &Value, context: &Record, log: &dyn LogSink) -> Option<Value> {
        let mut output = match input {
            Value::Array(ids) if self.config.flag("array") => {
                let mut people = Vec::with_capacity(ids.len());
                for id in ids {
                    people.push(self.lookup(id, context, log).await);
                }
                Value::Array(people)
            }
            Value::Array(ids) => self.lookup(ids.first()?, context, log).await,
            id => self.lookup(id, context, log).await,
        };
        if self.fill_placeholders {
            match &mut output {
                Value::Array(people) => people.iter_mut().for_each(Self::insert_placeholders),
                person => Self::insert_placeholders(person),
            }
        }
        Some(output)
    }
}
