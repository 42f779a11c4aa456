//! Endpoint catalog
//!
//! Loaded once at start-up and never mutated afterwards.

use std::collections::HashSet;

use axum::http::{HeaderName, HeaderValue, Method};
use thiserror::Error;

use stackscope_types::{EndpointDescriptor, ListingRequest, LivenessCheck, ResourceParser};

/// LocalStack's aggregated health endpoint
pub const LOCALSTACK_HEALTH_PATH: &str = "/_localstack/health";

/// Catalog validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog has no services")]
    Empty,

    #[error("duplicate service name: {0}")]
    DuplicateService(String),

    #[error("service name must not be empty")]
    EmptyServiceName,

    #[error("{service}: path {path} must start with '/'")]
    InvalidPath { service: String, path: String },

    #[error("{service}: invalid listing method {method}")]
    InvalidMethod { service: String, method: String },

    #[error("{service}: invalid listing header {header}")]
    InvalidHeader { service: String, header: String },
}

/// Ordered, validated set of polled services
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<EndpointDescriptor>,
}

impl Catalog {
    /// Validate descriptors and keep them in the given order
    pub fn new(entries: Vec<EndpointDescriptor>) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            validate(entry)?;
            if !seen.insert(entry.service_name.as_str()) {
                return Err(CatalogError::DuplicateService(entry.service_name.clone()));
            }
        }

        Ok(Self { entries })
    }

    /// LocalStack services checked when no catalog is configured
    pub fn localstack() -> Self {
        Self {
            entries: localstack_descriptors(),
        }
    }

    /// Descriptors in configured order
    pub fn list(&self) -> &[EndpointDescriptor] {
        &self.entries
    }

    pub fn get(&self, service_name: &str) -> Option<&EndpointDescriptor> {
        self.entries.iter().find(|e| e.service_name == service_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::localstack()
    }
}

fn validate(entry: &EndpointDescriptor) -> Result<(), CatalogError> {
    let service = &entry.service_name;
    if service.trim().is_empty() {
        return Err(CatalogError::EmptyServiceName);
    }
    check_path(service, &entry.health_path)?;

    if let Some(listing) = &entry.listing {
        check_path(service, &listing.path)?;
        Method::from_bytes(listing.method.as_bytes()).map_err(|_| CatalogError::InvalidMethod {
            service: service.clone(),
            method: listing.method.clone(),
        })?;
        for (name, value) in &listing.headers {
            let valid = HeaderName::from_bytes(name.as_bytes()).is_ok()
                && HeaderValue::from_str(value).is_ok();
            if !valid {
                return Err(CatalogError::InvalidHeader {
                    service: service.clone(),
                    header: name.clone(),
                });
            }
        }
    }
    Ok(())
}

fn check_path(service: &str, path: &str) -> Result<(), CatalogError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(CatalogError::InvalidPath {
            service: service.to_string(),
            path: path.to_string(),
        })
    }
}

fn localstack_service(name: &str) -> EndpointDescriptor {
    EndpointDescriptor::new(name, LOCALSTACK_HEALTH_PATH).with_liveness(LivenessCheck::ServiceMap {
        key: name.to_string(),
    })
}

fn xml(element: &str) -> ResourceParser {
    ResourceParser::XmlElements {
        element: element.to_string(),
    }
}

fn json(field: &str) -> ResourceParser {
    ResourceParser::JsonArray {
        field: field.to_string(),
    }
}

fn localstack_descriptors() -> Vec<EndpointDescriptor> {
    vec![
        localstack_service("s3").with_listing(ListingRequest::get("/"), xml("Bucket")),
        localstack_service("sqs").with_listing(
            ListingRequest::get("/?Action=ListQueues&Version=2012-11-05"),
            xml("QueueUrl"),
        ),
        localstack_service("dynamodb").with_listing(
            ListingRequest::post("/", "{}")
                .header("X-Amz-Target", "DynamoDB_20120810.ListTables")
                .header("Content-Type", "application/x-amz-json-1.0"),
            json("TableNames"),
        ),
        localstack_service("sns").with_listing(
            ListingRequest::get("/?Action=ListTopics&Version=2010-03-31"),
            xml("TopicArn"),
        ),
        localstack_service("lambda")
            .with_listing(ListingRequest::get("/2015-03-31/functions/"), json("Functions")),
        localstack_service("apigateway").with_listing(ListingRequest::get("/restapis"), json("item")),
    ]
}
