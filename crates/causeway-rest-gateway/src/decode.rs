//! Request decoding: query string, body and path parameters into one input value

use crate::procedure::ProcedureKind;
use crate::routes::RouteMatch;
use bytes::Bytes;
use causeway_core::introspect::{coerce_scalar, is_coercible, is_void_like, object_fields};
use causeway_core::{ErrorCode, ProcedureError, Schema};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::request::Parts;
use http_body::Body;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::{Map, Value};
use std::error::Error as StdError;

/// Boxed error used by request bodies
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Limits and behavior applied while decoding
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    pub max_body_size: Option<usize>,
    pub coerce_input: bool,
}

/// Decode the input for a matched route.
///
/// Queries read the URL query string, mutations read the body. Path
/// parameters are merged in last and override same-named keys. `None`
/// means nothing was sent.
pub async fn decode_input<B>(
    parts: &Parts,
    body: B,
    route: &RouteMatch<'_>,
    options: DecodeOptions,
) -> Result<Option<Value>, ProcedureError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let descriptor = &route.entry.descriptor;
    let schema = descriptor.input.as_ref();

    if schema.map_or(true, is_void_like) {
        return Ok(Some(Value::Object(Map::new())));
    }

    let decoded = match descriptor.kind {
        ProcedureKind::Mutation => {
            let bytes = read_body(parts, body, options.max_body_size).await?;
            parse_body(parts, &bytes)?
        }
        _ => Some(Value::Object(parse_query(parts.uri.query()))),
    };

    let mut input = merge_path_params(decoded, &route.params);

    if options.coerce_input {
        if let (Some(schema), Some(Value::Object(map))) = (schema, input.as_mut()) {
            coerce_fields(schema, map);
        }
    }

    Ok(input)
}

/// Read the whole body, refusing anything over `limit` bytes
pub async fn read_body<B>(parts: &Parts, body: B, limit: Option<usize>) -> Result<Bytes, ProcedureError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let limit = limit.unwrap_or(usize::MAX);

    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if matches!(declared, Some(length) if length > limit as u64) {
        return Err(ProcedureError::payload_too_large());
    }

    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(ProcedureError::payload_too_large()),
        Err(e) => Err(ProcedureError::new(ErrorCode::BadRequest, "Failed to read request body")
            .with_source(BodyReadError(e))),
    }
}

/// Body read failure that is not about size
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct BodyReadError(BoxError);

/// Media type without parameters, lowercased
fn media_type(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
}

/// Parse a body according to its content type.
///
/// An empty body is `None`. A missing content type is treated as JSON;
/// unknown types are passed through as a string and left to validation.
pub fn parse_body(parts: &Parts, bytes: &[u8]) -> Result<Option<Value>, ProcedureError> {
    if bytes.is_empty() {
        return Ok(None);
    }

    match media_type(parts).as_deref() {
        None | Some("application/json") => serde_json::from_slice(bytes)
            .map(Some)
            .map_err(ProcedureError::parse_error),
        Some("application/x-www-form-urlencoded") => Ok(Some(Value::Object(parse_pairs(bytes)))),
        Some(_) => Ok(Some(Value::String(String::from_utf8_lossy(bytes).into_owned()))),
    }
}

/// Parse a query string; empty values count as absent and the first value wins
pub fn parse_query(query: Option<&str>) -> Map<String, Value> {
    query.map(|q| parse_pairs(q.as_bytes())).unwrap_or_default()
}

fn parse_pairs(input: &[u8]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        if value.is_empty() || map.contains_key(key.as_ref()) {
            continue;
        }
        map.insert(key.into_owned(), Value::String(value.into_owned()));
    }
    map
}

fn merge_path_params(
    input: Option<Value>,
    params: &indexmap::IndexMap<String, String>,
) -> Option<Value> {
    if params.is_empty() {
        return input;
    }
    let mut map = match input {
        None => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => return Some(other),
    };
    for (name, value) in params {
        map.insert(name.clone(), Value::String(value.clone()));
    }
    Some(Value::Object(map))
}

fn coerce_fields(schema: &Schema, map: &mut Map<String, Value>) {
    let Some(fields) = object_fields(schema) else {
        return;
    };
    for field in fields {
        if !is_coercible(&field.schema) {
            continue;
        }
        if let Some(value) = map.get_mut(&field.name) {
            let raw = std::mem::take(value);
            *value = coerce_scalar(&field.schema, raw);
        }
    }
}
