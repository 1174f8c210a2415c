//! Date handlers

use async_trait::async_trait;
use chrono::{DateTime as ChronoDateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value, json};

use super::{Handler, HandlerConfig, HandlerContext, text};
use crate::log::{LogSink, stage};
use crate::value::{Record, brief, cast_array};

const DEFAULT_OUTPUT_FORMAT: &str = "%Y-%m-%d";

/// Parse a date or date-time
///
/// With a format the value must match it (as a date-time, or as a date at
/// midnight); without one RFC 3339 and ISO dates are accepted.
pub fn parse_date(value: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    let value = value.trim();
    match format {
        Some(format) => NaiveDateTime::parse_from_str(value, format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(value, format)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            }),
        None => ChronoDateTime::parse_from_rfc3339(value)
            .map(|dt| dt.naive_local())
            .ok()
            .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok())
            .or_else(|| {
                NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            }),
    }
}

/// Reformats a date between `fromFormat` and `toFormat` (strftime syntax)
pub struct DateTime {
    config: HandlerConfig,
}

impl DateTime {
    pub fn create(context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self {
            config: context.config,
        })
    }
}

#[async_trait(?Send)]
impl Handler for DateTime {
    async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
        let raw = brief(input);
        let Some(parsed) = parse_date(&raw, self.config.str("fromFormat")) else {
            log.emit(stage::HANDLER, "DateTime", "", "unparseable date", input.clone());
            return None;
        };
        let format = self.config.str("toFormat").unwrap_or(DEFAULT_OUTPUT_FORMAT);
        Some(json!(parsed.format(format).to_string()))
    }
}

/// Picks the first date by type priority
///
/// Config: `priorities` (date types, most preferred first) and
/// `attributeName` (destination field of the chosen date).
pub struct CitationSimpleDate {
    priorities: Vec<String>,
    attribute: String,
}

impl CitationSimpleDate {
    pub fn create(context: HandlerContext) -> Box<dyn Handler> {
        let priorities = context
            .config
            .get("priorities")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(brief).collect())
            .unwrap_or_default();
        let attribute = context
            .config
            .str("attributeName")
            .unwrap_or("citation_date")
            .to_string();
        Box::new(Self {
            priorities,
            attribute,
        })
    }

    /// Publication date of a citation
    pub fn create_publication(_context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self {
            priorities: vec![
                "publicationDate".to_string(),
                "endPublicationDate".to_string(),
                "startPublicationDate".to_string(),
            ],
            attribute: "citation_publication_date".to_string(),
        })
    }
}

#[async_trait(?Send)]
impl Handler for CitationSimpleDate {
    async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
        let dates = cast_array(input.clone());
        for priority in &self.priorities {
            let chosen = dates
                .iter()
                .find(|d| text(d, "type") == priority.as_str() && !text(d, "date").is_empty());
            if let Some(chosen) = chosen {
                let mut output = Map::new();
                output.insert(self.attribute.clone(), json!(text(chosen, "date")));
                return Some(Value::Object(output));
            }
        }
        log.emit(stage::HANDLER, "CitationSimpleDate", &self.attribute, "missing", input.clone());
        None
    }

    fn spreads_output(&self) -> bool {
        true
    }
}
