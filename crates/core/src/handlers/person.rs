//! Person handlers
//!
//! Source person groups carry some of `givenname`/`given_name`,
//! `familyname`/`family_name`, `honorific`, `email`, `dc:identifier` and
//! `fullname`; use the rule's `fields` map to rename legacy sub-fields to
//! these keys during unflattening.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};

use super::{Handler, HandlerConfig, HandlerContext, text};
use crate::log::{LogSink, stage};
use crate::spec::Destination;
use crate::value::{Record, brief};

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

/// Longest address accepted as an email
const MAX_EMAIL_LENGTH: usize = 254;

/// Undo the HTML entity some legacy records use for `@`
pub fn decode_email(email: &str) -> String {
    email.replacen("&#64;", "@", 1)
}

/// Whether a string looks like a usable email address
pub fn is_email_valid(email: &str) -> bool {
    !email.is_empty() && email.len() <= MAX_EMAIL_LENGTH && EMAIL_REGEX.is_match(email)
}

/// Which shape of person record to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PersonStyle {
    /// Full name parts, email and identifier
    Full,
    /// Full record plus affiliations
    Affiliated,
    /// Name taken from a single free-text field
    SingleText,
    /// Full record reduced to the display name
    FromPerson,
    /// Full record fanned out by the destinations in its config
    Access,
    /// Full record routed to the first destination whose guard matches
    Creator,
}

/// Builds person records from grouped source fields
pub struct Person {
    config: HandlerConfig,
    style: PersonStyle,
}

impl Person {
    fn with_style(context: HandlerContext, style: PersonStyle) -> Box<dyn Handler> {
        Box::new(Self {
            config: context.config,
            style,
        })
    }

    pub fn create(context: HandlerContext) -> Box<dyn Handler> {
        Self::with_style(context, PersonStyle::Full)
    }

    pub fn create_affiliated(context: HandlerContext) -> Box<dyn Handler> {
        Self::with_style(context, PersonStyle::Affiliated)
    }

    pub fn create_single_text(context: HandlerContext) -> Box<dyn Handler> {
        Self::with_style(context, PersonStyle::SingleText)
    }

    pub fn create_from_person(context: HandlerContext) -> Box<dyn Handler> {
        Self::with_style(context, PersonStyle::FromPerson)
    }

    pub fn create_access(context: HandlerContext) -> Box<dyn Handler> {
        Self::with_style(context, PersonStyle::Access)
    }

    pub fn create_creator(context: HandlerContext) -> Box<dyn Handler> {
        Self::with_style(context, PersonStyle::Creator)
    }

    /// Stamp the role of the first matching config destination and return
    /// its field, else the `defaultRole` and `defaultField`
    fn change_destination(&self, input: &Value, person: &mut Map<String, Value>) -> Option<String> {
        let default_role = self.config.get("defaultRole").cloned().unwrap_or(Value::Null);
        let matched = self.config.destinations().into_iter().find(|dest| {
            match (dest.from.as_deref().and_then(|from| input.get(from)), &dest.value) {
                (Some(found), Some(guard)) => brief(found) == brief(guard),
                _ => false,
            }
        });
        let (to, role) = match matched {
            Some(dest) => (dest.to, dest.role.map(Value::String).unwrap_or(default_role)),
            None => (self.config.str("defaultField").map(str::to_string), default_role),
        };
        person.insert("role".to_string(), role);
        to.filter(|to| !to.is_empty())
    }

    /// Name parts, email and identifier; `None` when there is no name at all
    fn identity(&self, input: &Value) -> Option<Map<String, Value>> {
        let given = first_present(input, &["givenname", "given_name"]);
        let family = first_present(input, &["familyname", "family_name"]);
        let mut full_name = format!("{} {}", given, family).trim().to_string();
        if full_name.is_empty() {
            full_name = text(input, "fullname").trim().to_string();
        }
        if full_name.is_empty() {
            return None;
        }

        let honorific = text(input, "honorific").trim();
        let honorific_name = if honorific.is_empty() {
            full_name.clone()
        } else {
            format!("{} {}", honorific, full_name)
        };
        let family_first = match (family.is_empty(), given.is_empty()) {
            (false, false) => format!("{}, {}", family, given),
            (false, true) => family.to_string(),
            _ => full_name.clone(),
        };
        let email = decode_email(text(input, "email").trim());
        let email = if is_email_valid(&email) { email } else { String::new() };

        let mut output = Map::new();
        if let Some(identifier) = input.get("dc:identifier") {
            output.insert("dc:identifier".to_string(), identifier.clone());
        }
        output.insert("text_full_name".to_string(), json!(full_name));
        output.insert("full_name_honorific".to_string(), json!(honorific_name));
        output.insert("full_name_family_name_first".to_string(), json!(family_first));
        output.insert("given_name".to_string(), json!(given));
        output.insert("family_name".to_string(), json!(family));
        output.insert("email".to_string(), json!(email));
        output.insert("username".to_string(), json!(""));
        output.insert("role".to_string(), self.config.role());
        Some(output)
    }

    /// Report on a built record, dropping it when there is no family name
    fn feedback(&self, output: Map<String, Value>, log: &dyn LogSink) -> Option<Value> {
        let role = crate::value::brief(&self.config.role());
        let family = output.get("family_name").and_then(Value::as_str).unwrap_or("");
        if family.is_empty() {
            log.emit(stage::HANDLER, "Person", &role, "missing", Value::Object(output));
            return None;
        }
        if output.get("dc:identifier").is_none_or(crate::value::is_blank) {
            let name = output.get("text_full_name").cloned().unwrap_or(Value::Null);
            log.emit(stage::HANDLER, "Person", &role, "warning", name);
        }
        let output = Value::Object(output);
        log.emit(stage::HANDLER, "Person", &role, "succeeded", output.clone());
        Some(output)
    }
}

/// First non-blank string among `keys`
fn first_present<'a>(input: &'a Value, keys: &[&str]) -> &'a str {
    keys.iter()
        .map(|key| text(input, key).trim())
        .find(|value| !value.is_empty())
        .unwrap_or("")
}

#[async_trait(?Send)]
impl Handler for Person {
    async fn crosswalk(
        &self,
        input: &Value,
        _context: &Record,
        log: &dyn LogSink,
    ) -> Option<Value> {
        if !input.is_object() {
            log.emit(stage::HANDLER, "Person", "", "not an object", input.clone());
            return None;
        }
        match self.style {
            PersonStyle::Full | PersonStyle::Access => self.feedback(self.identity(input)?, log),
            PersonStyle::Creator => {
                let mut output = self.identity(input)?;
                if !self.spreads_output() {
                    return self.feedback(output, log);
                }
                let to = self.change_destination(input, &mut output);
                let person = self.feedback(output, log)?;
                let Some(to) = to else {
                    log.emit(stage::HANDLER, "Creator", "", "no destination", person);
                    return None;
                };
                let mut routed = Map::new();
                routed.insert(to, person);
                Some(Value::Object(routed))
            }
            PersonStyle::Affiliated => {
                let mut output = self.identity(input)?;
                let parties: Vec<Value> = ["affiliationA", "affiliationB", "affiliationC"]
                    .iter()
                    .filter_map(|key| input.get(*key))
                    .filter(|value| !crate::value::is_blank(value))
                    .cloned()
                    .collect();
                output.insert("parties".to_string(), Value::Array(parties));
                output.insert(
                    "relationshipType".to_string(),
                    input.get("relationshipType").cloned().unwrap_or(Value::Null),
                );
                self.feedback(output, log)
            }
            PersonStyle::SingleText => {
                let full_name = text(input, "fullname").trim();
                if full_name.is_empty() {
                    log.emit(stage::HANDLER, "Person", "", "missing", input.clone());
                    return None;
                }
                let output = json!({
                    "text_full_name": full_name,
                    "username": "",
                    "role": self.config.role(),
                });
                let role = crate::value::brief(&self.config.role());
                log.emit(stage::HANDLER, "Person", &role, "succeeded", output.clone());
                Some(output)
            }
            PersonStyle::FromPerson => {
                let output = self.identity(input)?;
                let name = output.get("text_full_name").cloned().unwrap_or(Value::Null);
                log.emit(stage::HANDLER, "Person", "", "succeeded", name.clone());
                Some(json!({ "text_full_name": name }))
            }
        }
    }

    fn spreads_output(&self) -> bool {
        self.style == PersonStyle::Creator && self.config.flag("changeDestination")
    }

    fn destinations(&self) -> Vec<Destination> {
        match self.style {
            PersonStyle::Access => self.config.destinations(),
            _ => Vec::new(),
        }
    }
}
