//! Endpoint catalog descriptors
//!
//! An [`EndpointDescriptor`] tells the poller where a service's health and
//! listing endpoints live on the emulated-cloud backend and how to read
//! their responses. Response shapes differ per service, so interpretation
//! is a closed set of variants ([`LivenessCheck`], [`ResourceParser`]) that
//! report failure as a value instead of panicking.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Health states reported by the backend that count as alive
const LIVE_SERVICE_STATES: &[&str] = &["available", "running"];

/// Values of a `status` field that count as alive
const LIVE_STATUS_VALUES: &[&str] = &["ok", "healthy", "running", "available", "up"];

/// Static description of one polled service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Unique logical service name (catalog key)
    pub service_name: String,
    /// Backend path of the health endpoint
    pub health_path: String,
    /// How a successful health body is judged
    #[serde(default)]
    pub liveness: LivenessCheck,
    /// Request that lists the service's resources, if it has any
    #[serde(default)]
    pub listing: Option<ListingRequest>,
    /// How the listing body is turned into a resource count
    #[serde(default)]
    pub parser: ResourceParser,
}

impl EndpointDescriptor {
    /// Create a descriptor with only a health endpoint
    pub fn new(service_name: impl Into<String>, health_path: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            health_path: health_path.into(),
            liveness: LivenessCheck::AnySuccess,
            listing: None,
            parser: ResourceParser::None,
        }
    }

    /// Set the liveness predicate
    pub fn with_liveness(mut self, liveness: LivenessCheck) -> Self {
        self.liveness = liveness;
        self
    }

    /// Attach a listing request and its parser
    pub fn with_listing(mut self, listing: ListingRequest, parser: ResourceParser) -> Self {
        self.listing = Some(listing);
        self.parser = parser;
        self
    }
}

/// Backend request used to list a service's resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRequest {
    /// HTTP method
    #[serde(default = "default_listing_method")]
    pub method: String,
    /// Path and query on the backend
    pub path: String,
    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body
    #[serde(default)]
    pub body: Option<String>,
}

impl ListingRequest {
    /// A plain `GET` listing request
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: default_listing_method(),
            path: path.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// A `POST` listing request with a body
    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            path: path.into(),
            headers: BTreeMap::new(),
            body: Some(body.into()),
        }
    }

    /// Add a request header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

fn default_listing_method() -> String {
    "GET".to_string()
}

// ============================================================================
// Liveness
// ============================================================================

/// Minimal predicate a 2xx health body must satisfy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LivenessCheck {
    /// Any 2xx response is alive
    #[default]
    AnySuccess,
    /// Body is a service map (`{"services": {"s3": "running"}}`) and `key` is live
    ServiceMap { key: String },
    /// Body carries a top-level `status` field with a live value
    StatusField,
}

impl LivenessCheck {
    /// Judge a health body. `Err` carries the reason the service is unhealthy.
    pub fn evaluate(&self, body: &[u8]) -> Result<(), String> {
        match self {
            Self::AnySuccess => Ok(()),
            Self::ServiceMap { key } => {
                let doc = parse_json(body)?;
                let state = doc
                    .get("services")
                    .and_then(|services| services.get(key))
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("service {key} not listed by backend health"))?;
                if LIVE_SERVICE_STATES.contains(&state) {
                    Ok(())
                } else {
                    Err(format!("service {key} reported {state}"))
                }
            }
            Self::StatusField => {
                let doc = parse_json(body)?;
                let status = doc
                    .get("status")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "health body has no status field".to_string())?;
                if LIVE_STATUS_VALUES.contains(&status.to_ascii_lowercase().as_str()) {
                    Ok(())
                } else {
                    Err(format!("backend reported status {status}"))
                }
            }
        }
    }
}

fn parse_json(body: &[u8]) -> Result<Value, String> {
    serde_json::from_slice(body).map_err(|e| format!("health body is not JSON: {e}"))
}

// ============================================================================
// Resource parsing
// ============================================================================

/// Result of interpreting a listing body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Number of resources found
    Count(u64),
    /// The parser has no listing semantics
    NotApplicable,
    /// The body did not have the expected shape
    Unparseable(String),
}

/// Closed set of listing parsers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceParser {
    /// No listing semantics
    #[default]
    None,
    /// Length of the JSON array at `field` (`/`-separated for nesting)
    JsonArray { field: String },
    /// Number of `<element>` opening tags in an XML body
    XmlElements { element: String },
}

impl ResourceParser {
    /// Short label used in catalog listings
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::JsonArray { .. } => "json_array",
            Self::XmlElements { .. } => "xml_elements",
        }
    }

    /// Interpret a listing body
    pub fn parse(&self, body: &[u8]) -> ParseOutcome {
        match self {
            Self::None => ParseOutcome::NotApplicable,
            Self::JsonArray { field } => count_json_array(body, field),
            Self::XmlElements { element } => count_xml_elements(body, element),
        }
    }
}

fn count_json_array(body: &[u8], field: &str) -> ParseOutcome {
    let doc: Value = match serde_json::from_slice(body) {
        Ok(doc) => doc,
        Err(e) => return ParseOutcome::Unparseable(format!("listing is not JSON: {e}")),
    };
    let pointer = format!("/{}", field.trim_start_matches('/'));
    match doc.pointer(&pointer) {
        Some(Value::Array(items)) => ParseOutcome::Count(items.len() as u64),
        Some(other) => ParseOutcome::Unparseable(format!(
            "field {field} is {}, expected array",
            json_kind(other)
        )),
        None => ParseOutcome::Unparseable(format!("field {field} missing from listing")),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn count_xml_elements(body: &[u8], element: &str) -> ParseOutcome {
    let decoded = String::from_utf8_lossy(body);
    let text: &str = &decoded;
    if !text.trim_start().starts_with('<') {
        return ParseOutcome::Unparseable("listing is not an XML document".to_string());
    }

    let open = format!("<{element}");
    let count = text
        .match_indices(&open)
        .filter(|(idx, _)| {
            // `<Bucket>` and `<Bucket attr=..>` count, `<Buckets>` does not
            text[idx + open.len()..]
                .chars()
                .next()
                .is_some_and(|c| c == '>' || c == '/' || c.is_whitespace())
        })
        .count();

    ParseOutcome::Count(count as u64)
}
