//! Core types for the Causeway REST gateway.
//!
//! This crate provides the foundation types used across Causeway components:
//! - Declarative schemas with validation
//! - Schema introspection (wire shape classification)
//! - OpenAPI 3.0 JSON-Schema fragment generation
//! - Error code taxonomy and HTTP status table
//! - The success/failure wire envelope

pub mod envelope;
pub mod error;
pub mod introspect;
pub mod issue;
pub mod json_schema;
pub mod schema;

pub use envelope::{ErrorShape, WireEnvelope};
pub use error::{ErrorCode, ProcedureError, ProcedureErrorKind};
pub use introspect::{classify, FieldShape, ObjectField, ShapeDescriptor};
pub use issue::{Issue, IssueCode, PathSegment};
pub use json_schema::{to_openapi_schema, AdditionalProperties, ComponentRegistry, JsonSchema};
pub use schema::{Effect, ObjectSchema, Schema, SchemaKind};
