//! Response encoding: success and failure envelopes

use crate::hooks::ResponseMeta;
use bytes::Bytes;
use causeway_core::{ErrorShape, ProcedureError, ProcedureErrorKind, WireEnvelope};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response, StatusCode};
use serde_json::Value;
use tracing::error;

/// Message sent for unexpected failures unless internals are exposed
pub const GENERIC_INTERNAL_MESSAGE: &str = "Internal server error";

/// Project a procedure error onto the wire shape.
///
/// Validation failures carry their issues; unexpected failures hide their
/// message unless `expose_internal` is set.
pub fn error_shape(error: &ProcedureError, expose_internal: bool) -> ErrorShape {
    let hide = !expose_internal
        && matches!(
            error.kind(),
            ProcedureErrorKind::Unknown | ProcedureErrorKind::OutputValidation
        );

    let message = if hide {
        GENERIC_INTERNAL_MESSAGE.to_string()
    } else {
        error.message().to_string()
    };

    let issues = match error.kind() {
        ProcedureErrorKind::OutputValidation if hide => None,
        _ => error.issues().map(<[_]>::to_vec),
    };

    ErrorShape {
        message,
        code: error.code(),
        issues,
    }
}

/// `{ok: true, data}` with status 200 unless overridden
pub fn success_response(data: Value, meta: ResponseMeta) -> Response<Bytes> {
    envelope_response(WireEnvelope::success(data), StatusCode::OK, meta)
}

/// `{ok: false, error}` with the status mapped from the error code unless overridden
pub fn error_response(shape: ErrorShape, meta: ResponseMeta) -> Response<Bytes> {
    let status = shape.code.status_code();
    envelope_response(WireEnvelope::failure(shape), status, meta)
}

/// Empty response with the given status, used for probes
pub fn empty_response(status: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

fn envelope_response(envelope: WireEnvelope, status: StatusCode, meta: ResponseMeta) -> Response<Bytes> {
    let body = match envelope.to_vec() {
        Ok(body) => Bytes::from(body),
        Err(e) => {
            error!("Failed to serialize response envelope: {}", e);
            return fallback_response();
        }
    };

    let mut response = Response::new(body);
    *response.status_mut() = meta.status.unwrap_or(status);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in meta.headers.iter() {
        response.headers_mut().insert(name.clone(), value.clone());
    }
    response
}

fn fallback_response() -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(
        br#"{"ok":false,"error":{"message":"Internal server error","code":"INTERNAL_SERVER_ERROR"}}"#,
    ));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
