//! Schema-driven REST gateway with OpenAPI 3.0 support.
//!
//! This crate exposes typed procedures over plain HTTP and describes them in
//! an OpenAPI 3.0 document generated from the same descriptors.
//! It supports:
//! - Path templates with named parameters (e.g., `/users/{id}`)
//! - Query procedures over GET/DELETE and mutations over POST/PUT/PATCH
//! - JSON and form-encoded request bodies with a size limit
//! - A fixed `{ok, data}` / `{ok, error}` response envelope
//! - Context, response-metadata, error and teardown hooks
//! - Mounting into axum as a router fallback

pub mod caller;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod hooks;
pub mod mapping;
pub mod openapi;
pub mod procedure;
pub mod router;
pub mod routes;

pub use caller::{ProcedureCall, ProcedureCaller, ProcedureTable};
pub use config::{DocumentInfo, GatewayConfig};
pub use error::{ConfigurationError, GatewayResult};
pub use hooks::{ErrorEvent, GatewayHooks, ResponseMeta, ResponseMetaArgs};
pub use mapping::{HttpMethod, PathTemplate};
pub use openapi::{OpenApiDocument, OpenApiDocumentBuilder};
pub use procedure::{HeaderParam, ProcedureDescriptor, ProcedureGroup, ProcedureKind, RegisteredProcedure};
pub use router::{Gateway, GatewayBuilder};
pub use routes::{RouteMatch, RouteTable};
