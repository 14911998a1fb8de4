//! Error codes and the runtime procedure error.

use crate::issue::Issue;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed taxonomy of wire error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ParseError,
    BadRequest,
    NotFound,
    InternalServerError,
    Unauthorized,
    Forbidden,
    Timeout,
    Conflict,
    ClientClosedRequest,
    PreconditionFailed,
    PayloadTooLarge,
    MethodNotSupported,
}

impl ErrorCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::ClientClosedRequest => "CLIENT_CLOSED_REQUEST",
            ErrorCode::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::MethodNotSupported => "METHOD_NOT_SUPPORTED",
        }
    }

    /// HTTP status for this code (fixed table)
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ParseError | ErrorCode::BadRequest => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::MethodNotSupported => 405,
            ErrorCode::Timeout => 408,
            ErrorCode::Conflict => 409,
            ErrorCode::PreconditionFailed => 412,
            ErrorCode::PayloadTooLarge => 413,
            ErrorCode::ClientClosedRequest => 499,
            ErrorCode::InternalServerError => 500,
        }
    }

    /// HTTP status as a `StatusCode`
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a procedure failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureErrorKind {
    /// Thrown deliberately by procedure logic
    Domain,
    /// Input failed schema validation
    InputValidation,
    /// Output failed schema validation
    OutputValidation,
    /// Request body could not be parsed
    Parse,
    /// Request body exceeded the configured limit
    PayloadTooLarge,
    /// No procedure matched
    NotFound,
    /// Anything else
    Unknown,
}

/// A failure raised while serving a procedure call
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ProcedureError {
    code: ErrorCode,
    message: String,
    issues: Option<Vec<Issue>>,
    kind: ProcedureErrorKind,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProcedureError {
    /// Create a domain error with an explicit code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            issues: None,
            kind: ProcedureErrorKind::Domain,
            source: None,
        }
    }

    pub fn not_found() -> Self {
        Self {
            kind: ProcedureErrorKind::NotFound,
            ..Self::new(ErrorCode::NotFound, "Not found")
        }
    }

    /// Input did not satisfy the procedure's input schema
    pub fn input_validation(issues: Vec<Issue>) -> Self {
        Self {
            issues: Some(issues),
            kind: ProcedureErrorKind::InputValidation,
            ..Self::new(ErrorCode::BadRequest, "Input validation failed")
        }
    }

    /// Output did not satisfy the procedure's output schema.
    ///
    /// This is a server fault, so the issues are kept for diagnostics only.
    pub fn output_validation(issues: Vec<Issue>) -> Self {
        Self {
            issues: Some(issues),
            kind: ProcedureErrorKind::OutputValidation,
            ..Self::new(ErrorCode::InternalServerError, "Output validation failed")
        }
    }

    pub fn parse_error(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            kind: ProcedureErrorKind::Parse,
            source: Some(Box::new(source)),
            ..Self::new(ErrorCode::ParseError, "Failed to parse request body")
        }
    }

    pub fn payload_too_large() -> Self {
        Self {
            kind: ProcedureErrorKind::PayloadTooLarge,
            ..Self::new(ErrorCode::PayloadTooLarge, "Request body too large")
        }
    }

    /// Internal fault with a message meant for logs
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ProcedureErrorKind::Unknown,
            ..Self::new(ErrorCode::InternalServerError, message)
        }
    }

    /// Wrap an arbitrary error that carries no wire code of its own
    pub fn unknown(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            code: ErrorCode::InternalServerError,
            message: source.to_string(),
            issues: None,
            kind: ProcedureErrorKind::Unknown,
            source: Some(Box::new(source)),
        }
    }

    /// Attach a source error
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach structured issues
    pub fn with_issues(mut self, issues: Vec<Issue>) -> Self {
        self.issues = Some(issues);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn issues(&self) -> Option<&[Issue]> {
        self.issues.as_deref()
    }

    pub fn kind(&self) -> ProcedureErrorKind {
        self.kind
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        assert_eq!(ErrorCode::ParseError.http_status(), 400);
        assert_eq!(ErrorCode::BadRequest.http_status(), 400);
        assert_eq!(ErrorCode::NotFound.http_status(), 404);
        assert_eq!(ErrorCode::InternalServerError.http_status(), 500);
        assert_eq!(ErrorCode::Unauthorized.http_status(), 401);
        assert_eq!(ErrorCode::Forbidden.http_status(), 403);
        assert_eq!(ErrorCode::Timeout.http_status(), 408);
        assert_eq!(ErrorCode::Conflict.http_status(), 409);
        assert_eq!(ErrorCode::ClientClosedRequest.http_status(), 499);
        assert_eq!(ErrorCode::PreconditionFailed.http_status(), 412);
        assert_eq!(ErrorCode::PayloadTooLarge.http_status(), 413);
        assert_eq!(ErrorCode::MethodNotSupported.http_status(), 405);
        assert_eq!(ErrorCode::ClientClosedRequest.status_code().as_u16(), 499);
    }

    #[test]
    fn test_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::PayloadTooLarge).unwrap();
        assert_eq!(json, "\"PAYLOAD_TOO_LARGE\"");
        let code: ErrorCode = serde_json::from_str("\"CLIENT_CLOSED_REQUEST\"").unwrap();
        assert_eq!(code, ErrorCode::ClientClosedRequest);
    }

    #[test]
    fn test_input_validation_error() {
        let err = ProcedureError::input_validation(vec![]);
        assert_eq!(err.code(), ErrorCode::BadRequest);
        assert_eq!(err.message(), "Input validation failed");
        assert_eq!(err.kind(), ProcedureErrorKind::InputValidation);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_output_validation_is_server_fault() {
        let err = ProcedureError::output_validation(vec![]);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_display() {
        let err = ProcedureError::new(ErrorCode::Conflict, "already exists");
        assert_eq!(err.to_string(), "CONFLICT: already exists");
    }
}
