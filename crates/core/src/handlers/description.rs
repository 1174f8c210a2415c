//! Description handlers

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value, json};

use super::{Handler, HandlerConfig, HandlerContext, text};
use crate::log::{LogSink, stage};
use crate::value::{Record, brief, cast_array};

/// Opening or closing tag, capturing the tag name
static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?\s*([a-zA-Z][a-zA-Z0-9]*)[^>]*>").unwrap());

/// Remove HTML tags, keeping `allowed` tags and putting `replacement` in place
/// of the others
pub fn strip_tags(html: &str, allowed: &[&str], replacement: &str) -> String {
    TAG_REGEX
        .replace_all(html, |caps: &Captures<'_>| {
            let name = caps[1].to_lowercase();
            if allowed.contains(&name.as_str()) {
                caps[0].to_string()
            } else {
                replacement.to_string()
            }
        })
        .into_owned()
}

/// Plain text of a description value
pub struct HtmlLessDescription;

impl HtmlLessDescription {
    pub fn create(_context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self)
    }
}

#[async_trait(?Send)]
impl Handler for HtmlLessDescription {
    async fn crosswalk(&self, input: &Value, _context: &Record, _log: &dyn LogSink) -> Option<Value> {
        Some(json!(strip_tags(&brief(input), &[], "")))
    }
}

/// First `full` description, else the first `brief` one, as plain text
pub struct HtmlLessFirstFullDescription;

impl HtmlLessFirstFullDescription {
    pub fn create(_context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self)
    }
}

#[async_trait(?Send)]
impl Handler for HtmlLessFirstFullDescription {
    async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
        let descriptions = cast_array(input.clone());
        let of_type = |kind: &str| {
            descriptions
                .iter()
                .find(|d| text(d, "type") == kind && !text(d, "text").is_empty())
        };
        let Some(chosen) = of_type("full").or_else(|| of_type("brief")) else {
            log.emit(stage::HANDLER, "HTMLLessFirstFullDescription", "", "missing", input.clone());
            return None;
        };
        Some(json!(strip_tags(text(chosen, "text"), &["a"], "\n")))
    }
}

/// First description under the config `name`, the rest under each
/// configured destination
pub struct HtmlMultiDescription {
    config: HandlerConfig,
}

impl HtmlMultiDescription {
    pub fn create(context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self {
            config: context.config,
        })
    }
}

#[async_trait(?Send)]
impl Handler for HtmlMultiDescription {
    async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
        let mut descriptions = cast_array(input.clone());
        if descriptions.is_empty() {
            return None;
        }
        let first = descriptions.remove(0);
        let mut output = Map::new();
        match self.config.str("name") {
            Some(name) => {
                output.insert(name.to_string(), first.get("text").cloned().unwrap_or(Value::Null));
            }
            None => log.emit(stage::HANDLER, "HTMLMultiDescription", "", "no name configured", first),
        }
        for dest in self.config.destinations() {
            if let Some(to) = dest.to {
                output.insert(to, Value::Array(descriptions.clone()));
            }
        }
        Some(Value::Object(output))
    }

    fn spreads_output(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::AuditLog;

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<p>Hello <b>world</b></p>", &[], ""), "Hello world");
        assert_eq!(
            strip_tags("<p>See <a href=\"x\">this</a></p>", &["a"], "\n"),
            "\nSee <a href=\"x\">this</a>\n"
        );
    }

    #[tokio::test]
    async fn test_html_less_description() {
        let out = HtmlLessDescription
            .crosswalk(&json!("<p>Soil <em>samples</em></p>"), &Record::new(), &AuditLog::new())
            .await;
        assert_eq!(out, Some(json!("Soil samples")));
    }

    #[tokio::test]
    async fn test_first_full_description() {
        let log = AuditLog::new();
        let input = json!([
            {"type": "brief", "text": "<p>short</p>"},
            {"type": "full", "text": "<p>long</p>"}
        ]);
        let out = HtmlLessFirstFullDescription.crosswalk(&input, &Record::new(), &log).await;
        assert_eq!(out, Some(json!("\nlong\n")));

        let out = HtmlLessFirstFullDescription
            .crosswalk(&json!({"type": "brief", "text": "b"}), &Record::new(), &log)
            .await;
        assert_eq!(out, Some(json!("b")));

        let out = HtmlLessFirstFullDescription
            .crosswalk(&json!([{"type": "note", "text": "n"}]), &Record::new(), &log)
            .await;
        assert!(out.is_none());
        assert_eq!(log.with_message("missing").len(), 1);
    }

    #[tokio::test]
    async fn test_multi_description() {
        let config = json!({"name": "description", "destinations": [{"to": "otherDescriptions"}]});
        let handler = HtmlMultiDescription::create(HandlerContext::new(config.as_object().cloned().unwrap()));
        assert!(handler.spreads_output());
        let out = handler
            .crosswalk(
                &json!([{"text": "first"}, {"text": "second"}, {"text": "third"}]),
                &Record::new(),
                &AuditLog::new(),
            )
            .await
            .unwrap();
        assert_eq!(out["description"], json!("first"));
        assert_eq!(out["otherDescriptions"], json!([{"text": "second"}, {"text": "third"}]));
    }
}
