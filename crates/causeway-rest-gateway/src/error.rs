//! Configuration errors raised while building a gateway or its document

use crate::mapping::HttpMethod;
use crate::procedure::ProcedureKind;
use thiserror::Error;

/// A procedure set that cannot be exposed over REST.
///
/// Raised eagerly at build time, never while serving a request.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("{kind} method must be {allowed}, got {method}")]
    MethodKindMismatch {
        kind: ProcedureKind,
        method: HttpMethod,
        allowed: &'static str,
    },

    #[error("Subscriptions are not supported by OpenAPI v3")]
    UnsupportedSubscription,

    #[error("No input schema defined")]
    MissingInputSchema,

    #[error("No output schema defined")]
    MissingOutputSchema,

    #[error("Input schema must be an object")]
    InputNotObject,

    #[error("Input schema expects key from path: \"{0}\"")]
    MissingPathParameter(String),

    #[error("Path parameter \"{0}\" must be a required input key")]
    OptionalPathParameter(String),

    #[error("Input schema key \"{0}\" must be string-like")]
    FieldNotStringLike(String),

    #[error("Duplicate procedure defined for route `{method} {path}` (already registered by `{existing}`)")]
    DuplicateRoute {
        method: HttpMethod,
        path: String,
        existing: String,
    },

    #[error("Path `{path}` has the same shape as `{existing_path}` (registered by `{existing}`) but is spelled differently")]
    ConflictingPathSpelling {
        path: String,
        existing_path: String,
        existing: String,
    },

    #[error("Duplicate path parameter \"{0}\"")]
    DuplicatePathParameter(String),

    #[error("Invalid path template \"{template}\": {reason}")]
    InvalidPathTemplate { template: String, reason: String },

    #[error("At least one content type must be declared")]
    EmptyContentTypes,

    #[error("Duplicate procedure name: {0}")]
    DuplicateProcedureName(String),

    #[error("No context factory configured")]
    MissingContextFactory,

    /// Wraps a failure with the procedure it came from
    #[error("[{kind}.{name}] - {source}")]
    Procedure {
        kind: ProcedureKind,
        name: String,
        #[source]
        source: Box<ConfigurationError>,
    },
}

/// Result type for gateway configuration
pub type GatewayResult<T> = Result<T, ConfigurationError>;

impl ConfigurationError {
    /// Attach the originating procedure to this error
    pub fn in_procedure(self, kind: ProcedureKind, name: &str) -> Self {
        match self {
            already @ ConfigurationError::Procedure { .. } => already,
            other => ConfigurationError::Procedure {
                kind,
                name: name.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through procedure wrappers
    pub fn root(&self) -> &ConfigurationError {
        match self {
            ConfigurationError::Procedure { source, .. } => source.root(),
            other => other,
        }
    }
}
