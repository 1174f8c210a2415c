//! Controlled vocabulary handlers

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};

use super::{Handler, HandlerConfig, HandlerContext, text};
use crate::log::{LogSink, stage};
use crate::value::{Record, brief};

/// ANZSRC 2008 Fields of Research and Socio-Economic Objective codes
static FOR_SEO_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^http://purl\.org/asc/1297\.0/2008/(seo|for)/(\d+)$").unwrap()
});

const FOR_SEO_DELIMITER: &str = " - ";

/// Ancestor codes of a FOR/SEO code: `"112233"` yields `["11", "1122"]`
pub fn genealogy(code: &str) -> Vec<String> {
    (2..code.len())
        .step_by(2)
        .filter_map(|end| code.get(..end))
        .map(str::to_string)
        .collect()
}

/// FOR/SEO vocabulary references
pub struct ForSeo;

impl ForSeo {
    pub fn create(_context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self)
    }
}

#[async_trait(?Send)]
impl Handler for ForSeo {
    async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
        let url = text(input, "rdf:resource");
        let name = text(input, "skos:prefLabel");
        if url.is_empty() {
            log.emit(stage::HANDLER, "for_seo", "", "Empty rdf:resource", input.clone());
            return Some(json!({}));
        }
        if name.is_empty() {
            log.emit(stage::HANDLER, "for_seo", "", "Empty skos:prefLabel", input.clone());
            return Some(json!({}));
        }
        let Some(caps) = FOR_SEO_REGEX.captures(url) else {
            log.emit(stage::HANDLER, "for_seo", "", "unrecognised vocabulary", json!(url));
            return Some(json!({"label": "crosswalk error"}));
        };
        let notation = &caps[2];
        let label = name.split(FOR_SEO_DELIMITER).nth(1).unwrap_or(name);
        let output = json!({
            "rdf:resource": url,
            "type": &caps[1],
            "name": name,
            "label": label,
            "notation": notation,
            "genealogy": genealogy(notation),
        });
        log.emit(stage::HANDLER, "for_seo", "", "succeeded", output.clone());
        Some(output)
    }
}

/// Country code to country name, from the config's `countries` table
pub struct Country {
    config: HandlerConfig,
}

impl Country {
    pub fn create(context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self {
            config: context.config,
        })
    }
}

#[async_trait(?Send)]
impl Handler for Country {
    async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
        let code = match input {
            Value::Object(_) => text(input, "country").to_string(),
            other => brief(other),
        };
        let name = self
            .config
            .get("countries")
            .and_then(|table| table.get(code.trim()))
            .cloned();
        match name {
            Some(name) => Some(name),
            None => {
                log.emit(stage::HANDLER, "Country", "", "unknown country", json!(code));
                Some(json!(""))
            }
        }
    }
}

/// Checkbox flag to a single research theme
pub struct ResearchThemes {
    config: HandlerConfig,
}

impl ResearchThemes {
    pub fn create(context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self {
            config: context.config,
        })
    }
}

fn is_checked(value: &Value) -> bool {
    match value {
        Value::String(s) => s == "on" || s == "true",
        Value::Bool(b) => *b,
        Value::Array(items) => items.iter().any(is_checked),
        _ => false,
    }
}

#[async_trait(?Send)]
impl Handler for ResearchThemes {
    async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
        if !is_checked(input) {
            return Some(json!([]));
        }
        match self.config.get("theme") {
            Some(theme) => Some(json!([theme])),
            None => {
                log.emit(stage::HANDLER, "ResearchThemes", "", "no theme configured", input.clone());
                Some(json!([]))
            }
        }
    }
}
