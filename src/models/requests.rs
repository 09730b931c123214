//! Request DTOs for the gateway API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::FetchOptions;

/// Request body for POST /query
///
/// # Fields
/// - `endpoint`: marketplace API path, e.g. `/api/projects`
/// - `filters`: JSON filter object sent upstream and folded into the key
/// - `options`: fetch options (gateway defaults if not specified)
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub endpoint: String,
    #[serde(default)]
    pub filters: Value,
    #[serde(default)]
    pub options: Option<FetchOptions>,
}

impl QueryRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.endpoint.is_empty() {
            return Some("Endpoint cannot be empty".to_string());
        }
        if !self.endpoint.starts_with('/') {
            return Some("Endpoint must start with '/'".to_string());
        }
        self.options.as_ref().and_then(FetchOptions::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_minimal() {
        let json = r#"{"endpoint": "/api/projects"}"#;
        let req: QueryRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.endpoint, "/api/projects");
        assert!(req.filters.is_null());
        assert!(req.options.is_none());
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_query_request_partial_options() {
        let json = r#"{
            "endpoint": "/api/credits/individual",
            "filters": {"project_id": 7},
            "options": {"critical": true}
        }"#;
        let req: QueryRequest = serde_json::from_str(json).unwrap();
        let options = req.options.unwrap();
        assert!(options.critical);
        assert_eq!(options.cache_duration_ms, 30_000);
        assert!(options.retry_on_error);
    }

    #[test]
    fn test_validate_endpoint() {
        let mut req: QueryRequest = serde_json::from_str(r#"{"endpoint": ""}"#).unwrap();
        assert!(req.validate().is_some());

        req.endpoint = "api/projects".to_string();
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_zero_duration() {
        let json = r#"{"endpoint": "/api/projects", "options": {"cache_duration_ms": 0}}"#;
        let req: QueryRequest = serde_json::from_str(json).unwrap();
        assert!(req.validate().is_some());
    }
}
