//! Funding body and research activity handlers

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Handler, HandlerContext};
use crate::log::{LogSink, stage};
use crate::value::{Record, cast_array};

fn field(input: &Value, key: &str) -> Value {
    input.get(key).cloned().unwrap_or(Value::Null)
}

/// Reshapes a funding body reference
pub struct FundingBody;

impl FundingBody {
    pub fn create(_context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self)
    }
}

#[async_trait(?Send)]
impl Handler for FundingBody {
    async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
        let output = json!({
            "dc_title": field(input, "dc_title"),
            "dc_identifier": cast_array(field(input, "dc_identifier")),
            "ID": field(input, "dc_title"),
            "repository_name": ["Funding Bodies"],
        });
        log.emit(stage::HANDLER, "FundingBody", "", "succeeded", output.clone());
        Some(output)
    }
}

/// Reshapes a grant into a research activity reference
pub struct GrantBody;

impl GrantBody {
    pub fn create(_context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self)
    }
}

#[async_trait(?Send)]
impl Handler for GrantBody {
    async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
        let output = json!({
            "dc_title": field(input, "dc_title"),
            "dc_identifier": cast_array(field(input, "dc_identifier")),
            "grant_number": field(input, "grant_number"),
            "repository_name": ["Research Activities"],
        });
        log.emit(stage::HANDLER, "GrantBody", "", "succeeded", output.clone());
        Some(output)
    }
}
