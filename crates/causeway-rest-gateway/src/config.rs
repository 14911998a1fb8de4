//! Gateway and document configuration

use serde::{Deserialize, Serialize};

/// Default maximum request body size (1 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Runtime behavior of the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Reject request bodies larger than this many bytes; `None` disables the limit
    pub max_body_size: Option<usize>,
    /// Coerce string wire values into number/integer/boolean fields before validation
    pub coerce_input: bool,
    /// Send messages of unexpected failures to clients instead of a generic one
    pub expose_internal_errors: bool,
    /// Serve the generated document at this path when mounted as a router
    pub openapi_path: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_body_size: Some(DEFAULT_MAX_BODY_SIZE),
            coerce_input: true,
            expose_internal_errors: false,
            openapi_path: None,
        }
    }
}

/// Document-level OpenAPI metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentInfo {
    pub title: String,
    pub description: Option<String>,
    pub version: String,
    /// Emitted as the single server entry
    pub base_url: String,
    /// Emitted as `externalDocs` when present
    pub docs_url: Option<String>,
    pub tags: Vec<String>,
}

impl Default for DocumentInfo {
    fn default() -> Self {
        Self {
            title: "Causeway API".to_string(),
            description: None,
            version: "1.0.0".to_string(),
            base_url: "/".to_string(),
            docs_url: None,
            tags: Vec::new(),
        }
    }
}

impl DocumentInfo {
    pub fn new(title: impl Into<String>, version: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: version.into(),
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}
