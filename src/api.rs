//! HTTP contract of the report application behind the cache.
//!
//! The cache manager never interprets these payloads; the types exist so the
//! proxy and tools can recognise the endpoints and decode their envelopes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Multipart PDF upload.
pub const UPLOAD_PATH: &str = "/upload";

/// Manual patient and metabolic data entry (JSON).
pub const SUBMIT_MANUAL_PATH: &str = "/submit_manual";

/// Report generation request (JSON).
pub const GENERATE_PATH: &str = "/generate";

/// Every application endpoint.
pub const ENDPOINTS: &[&str] = &[UPLOAD_PATH, SUBMIT_MANUAL_PATH, GENERATE_PATH];

/// Returns true if `path` is one of the application's API endpoints.
#[must_use]
pub fn is_api_endpoint(path: &str) -> bool {
    ENDPOINTS.contains(&path)
}

/// Envelope returned by every application endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Endpoint-specific fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiResponse {
    /// Decodes an envelope from a response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a JSON envelope.
    pub fn from_body(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }

    /// Returns the error message of a failed call.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            Some(self.error.as_deref().unwrap_or("unknown error"))
        }
    }
}
