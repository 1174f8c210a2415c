//! Data location and geospatial handlers

use async_trait::async_trait;
use serde_json::{Map, Number, Value, json};

use super::{Handler, HandlerContext, text};
use crate::log::{LogSink, stage};
use crate::spec::Destination;
use crate::value::{Record, nest};

/// Location type forced onto every input, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocationKind {
    Detect,
    Url,
    Physical,
    Attachment,
}

/// Data location records (`location`, `type`, `notes`)
pub struct DataLocations {
    kind: LocationKind,
}

impl DataLocations {
    fn with_kind(kind: LocationKind) -> Box<dyn Handler> {
        Box::new(Self { kind })
    }

    pub fn create(_context: HandlerContext) -> Box<dyn Handler> {
        Self::with_kind(LocationKind::Detect)
    }

    pub fn create_url(_context: HandlerContext) -> Box<dyn Handler> {
        Self::with_kind(LocationKind::Url)
    }

    pub fn create_physical(_context: HandlerContext) -> Box<dyn Handler> {
        Self::with_kind(LocationKind::Physical)
    }

    pub fn create_attachment(_context: HandlerContext) -> Box<dyn Handler> {
        Self::with_kind(LocationKind::Attachment)
    }
}

#[async_trait(?Send)]
impl Handler for DataLocations {
    async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
        let forced = match self.kind {
            LocationKind::Detect => None,
            LocationKind::Url => Some("url"),
            LocationKind::Physical => Some("physical"),
            LocationKind::Attachment => Some("attachment"),
        };
        if let Some(kind) = forced {
            let mut output = input.as_object().cloned().unwrap_or_default();
            output.insert("type".to_string(), json!(kind));
            return Some(Value::Object(output));
        }

        let kind = match text(input, "type") {
            kind @ ("url" | "physical" | "file") => kind,
            "" => "",
            "attachment" => {
                log.emit(stage::HANDLER, "DataLocations", "", "warning", json!("No attachment step to do"));
                ""
            }
            other => {
                log.emit(stage::HANDLER, "DataLocations", "", "warning", json!(format!("Unknown location type {other}")));
                ""
            }
        };
        Some(json!({
            "location": input.get("location").cloned().unwrap_or(Value::Null),
            "type": kind,
            "notes": input.get("notes").cloned().unwrap_or(Value::Null),
        }))
    }
}

/// WKT keywords and their GeoJSON geometry types, in match priority
const WKT_TYPES: [(&str, &str); 3] = [
    ("POLYGON", "Polygon"),
    ("LINESTRING", "LineString"),
    ("POINT", "Point"),
];

fn coordinate(raw: &str) -> Value {
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| json!(raw))
}

/// Convert a WKT drawing into a GeoJSON geometry
///
/// Coordinates are emitted as numbers where they parse.
pub fn wkt_geometry(wkt: &str) -> Value {
    let Some((keyword, kind)) = WKT_TYPES.iter().find(|(keyword, _)| wkt.contains(keyword)) else {
        return json!({"coordinates": []});
    };
    let body = wkt
        .replacen(keyword, "", 1)
        .trim()
        .trim_matches(|c| c == '(' || c == ')')
        .to_string();
    let pairs: Vec<Value> = body
        .split(',')
        .map(|pair| {
            let parts: Vec<Value> = pair.split_whitespace().take(2).map(coordinate).collect();
            Value::Array(parts)
        })
        .collect();
    let coordinates = match *kind {
        "Point" => pairs.into_iter().next().unwrap_or_else(|| json!([])),
        "Polygon" => json!([pairs]),
        _ => Value::Array(pairs),
    };
    json!({"type": kind, "coordinates": coordinates})
}

/// Points and drawn geometries
///
/// With `destinations` in its config the handler routes drawn geometries
/// to a `geospatial` destination and named points to `geolocations`.
pub struct GeoLocation {
    destinations: Vec<Destination>,
}

impl GeoLocation {
    pub fn create(context: HandlerContext) -> Box<dyn Handler> {
        Box::new(Self {
            destinations: context.config.destinations(),
        })
    }

    fn shape(input: &Value) -> Map<String, Value> {
        let field = |key: &str| input.get(key).cloned().unwrap_or(Value::Null);
        let mut output = Map::new();
        if input.get("geo:lat").is_some() {
            output.insert("lat".to_string(), field("lat"));
            output.insert("long".to_string(), field("long"));
            output.insert("identifier".to_string(), field("identifier"));
            output.insert("basic_name".to_string(), field("basic_name"));
        } else if let Some(wkt) = input.get("redbox:wktRaw").and_then(Value::as_str) {
            output.insert("geometry".to_string(), wkt_geometry(wkt));
            output.insert("type".to_string(), json!("Feature"));
            output.insert("redbox:Fid".to_string(), field("redbox:Fid"));
        } else {
            output.insert("basic_name".to_string(), field("basic_name"));
        }
        output
    }
}

#[async_trait(?Send)]
impl Handler for GeoLocation {
    async fn crosswalk(&self, input: &Value, _context: &Record, log: &dyn LogSink) -> Option<Value> {
        let output = Self::shape(input);
        if self.destinations.is_empty() {
            return Some(Value::Object(output));
        }
        let has_geometry = output.contains_key("geometry");
        let mut routed = Map::new();
        for dest in &self.destinations {
            let Some(to) = dest.to.as_deref() else {
                continue;
            };
            let selected = (to == "geospatial" && has_geometry) || (to == "geolocations" && !has_geometry);
            if !selected {
                continue;
            }
            let mut shaped = output.clone();
            for (key, value) in &dest.additional_keys {
                shaped.insert(key.clone(), value.clone());
            }
            routed.insert(to.to_string(), nest(&dest.nested_names, Value::Object(shaped)));
        }
        if routed.is_empty() {
            log.emit(stage::HANDLER, "GeoLocation", "", "no destination", Value::Object(output));
        }
        Some(Value::Object(routed))
    }

    fn spreads_output(&self) -> bool {
        !self.destinations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::AuditLog;

    #[tokio::test]
    async fn test_location_type_normalised() {
        let log = AuditLog::new();
        let handler = DataLocations::create(HandlerContext::default());
        let out = handler
            .crosswalk(&json!({"location": "http://x", "type": "url", "extra": 1}), &Record::new(), &log)
            .await;
        assert_eq!(out, Some(json!({"location": "http://x", "type": "url", "notes": null})));

        let out = handler
            .crosswalk(&json!({"location": "shelf", "type": "attachment"}), &Record::new(), &log)
            .await
            .unwrap();
        assert_eq!(out["type"], json!(""));
        assert_eq!(log.with_message("warning").len(), 1);
    }

    #[tokio::test]
    async fn test_forced_location_type() {
        let handler = DataLocations::create_physical(HandlerContext::default());
        let out = handler
            .crosswalk(&json!({"location": "shelf 3", "type": "url"}), &Record::new(), &AuditLog::new())
            .await;
        assert_eq!(out, Some(json!({"location": "shelf 3", "type": "physical"})));
    }

    #[test]
    fn test_wkt_geometry() {
        assert_eq!(
            wkt_geometry("POINT(153.02 -27.47)"),
            json!({"type": "Point", "coordinates": [153.02, -27.47]})
        );
        assert_eq!(
            wkt_geometry("POLYGON((1 2, 3 4, 1 2))"),
            json!({"type": "Polygon", "coordinates": [[[1.0, 2.0], [3.0, 4.0], [1.0, 2.0]]]})
        );
        assert_eq!(
            wkt_geometry("LINESTRING(1 2,3 4)")["coordinates"],
            json!([[1.0, 2.0], [3.0, 4.0]])
        );
    }

    #[tokio::test]
    async fn test_geolocation_routing() {
        let config = json!({
            "destinations": [
                {"to": "geospatial", "nestedNames": ["features"]},
                {"to": "geolocations", "additionalKeys": {"source": "rb1"}}
            ]
        });
        let handler = GeoLocation::create(HandlerContext::new(config.as_object().cloned().unwrap()));
        assert!(handler.spreads_output());
        let log = AuditLog::new();

        let out = handler
            .crosswalk(&json!({"redbox:wktRaw": "POINT(1 2)", "redbox:Fid": "f1"}), &Record::new(), &log)
            .await
            .unwrap();
        assert_eq!(out["geospatial"]["features"]["type"], json!("Feature"));
        assert!(out.get("geolocations").is_none());

        let out = handler
            .crosswalk(&json!({"basic_name": "Brisbane"}), &Record::new(), &log)
            .await
            .unwrap();
        assert_eq!(out, json!({"geolocations": {"basic_name": "Brisbane", "source": "rb1"}}));
    }
}
