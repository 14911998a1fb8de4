//! Schema introspection: reduce a schema to its wire-relevant shape.
//!
//! Unwrapping strips modifiers that do not change what travels on the wire
//! (optional, default, effects, lazy). For preprocessing effects the declared
//! inner schema is authoritative. Classification then decides whether a
//! schema is void, an object of fields, representable as a single string
//! token, or opaque.

use crate::schema::{Schema, SchemaKind, MAX_DEPTH};
use serde_json::Value;

/// Wire classification of a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeDescriptor {
    Void,
    StringLike,
    ObjectOf(Vec<FieldShape>),
    Opaque,
}

/// Classified object field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldShape {
    pub name: String,
    pub shape: ShapeDescriptor,
    pub required: bool,
}

/// Object field with its declared schema
#[derive(Debug, Clone)]
pub struct ObjectField {
    pub name: String,
    pub schema: Schema,
    pub required: bool,
}

impl ObjectField {
    /// Description carried by the field, looking through wrappers
    pub fn description(&self) -> Option<String> {
        description_of(&self.schema)
    }
}

/// Strip wire-neutral modifiers until a fixed point is reached
pub fn unwrap(schema: &Schema) -> Schema {
    let mut current = schema.clone();
    for _ in 0..MAX_DEPTH {
        let next = match current.kind() {
            SchemaKind::Optional(inner)
            | SchemaKind::Default(inner, _)
            | SchemaKind::Effects(inner, _) => inner.clone(),
            SchemaKind::Lazy(lazy) => lazy.resolve(),
            _ => break,
        };
        current = next;
    }
    current
}

/// Classify a schema by wire shape
pub fn classify(schema: &Schema) -> ShapeDescriptor {
    classify_at(schema, 0)
}

fn classify_at(schema: &Schema, depth: usize) -> ShapeDescriptor {
    if depth > MAX_DEPTH {
        return ShapeDescriptor::Opaque;
    }
    if is_void_like(schema) {
        return ShapeDescriptor::Void;
    }
    if is_string_like(schema) {
        return ShapeDescriptor::StringLike;
    }
    match object_fields(schema) {
        Some(fields) => ShapeDescriptor::ObjectOf(
            fields
                .into_iter()
                .map(|field| FieldShape {
                    shape: classify_at(&field.schema, depth + 1),
                    name: field.name,
                    required: field.required,
                })
                .collect(),
        ),
        None => ShapeDescriptor::Opaque,
    }
}

/// Whether the schema is losslessly representable as one string token
pub fn is_string_like(schema: &Schema) -> bool {
    string_like_at(schema, 0)
}

fn string_like_at(schema: &Schema, depth: usize) -> bool {
    if depth > MAX_DEPTH {
        return false;
    }
    let unwrapped = unwrap(schema);
    match unwrapped.kind() {
        SchemaKind::String { .. } => true,
        SchemaKind::Literal(value) => value.is_string(),
        SchemaKind::Enum(_) => true,
        SchemaKind::NativeEnum(members) => {
            !members.is_empty() && members.iter().all(|(_, value)| value.is_string())
        }
        SchemaKind::Union(options) => {
            !options.is_empty() && options.iter().all(|s| string_like_at(s, depth + 1))
        }
        SchemaKind::Intersection(operands) => {
            !operands.is_empty() && operands.iter().all(|s| string_like_at(s, depth + 1))
        }
        _ => false,
    }
}

/// Whether the schema accepts nothing but an absent value
pub fn is_void_like(schema: &Schema) -> bool {
    matches!(unwrap(schema).kind(), SchemaKind::Void | SchemaKind::Undefined)
}

/// Scalars a string wire value can be coerced into
pub fn is_coercible(schema: &Schema) -> bool {
    matches!(
        unwrap(schema).kind(),
        SchemaKind::Number | SchemaKind::Integer | SchemaKind::Boolean
    )
}

pub fn is_object(schema: &Schema) -> bool {
    matches!(unwrap(schema).kind(), SchemaKind::Object(_))
}

/// Fields of an object schema in declaration order, `None` for non-objects
pub fn object_fields(schema: &Schema) -> Option<Vec<ObjectField>> {
    let unwrapped = unwrap(schema);
    match unwrapped.kind() {
        SchemaKind::Object(object) => Some(
            object
                .fields
                .iter()
                .map(|(name, field)| ObjectField {
                    name: name.clone(),
                    schema: field.clone(),
                    required: !field.is_optional(),
                })
                .collect(),
        ),
        _ => None,
    }
}

/// First description found on the schema or its wrappers
pub fn description_of(schema: &Schema) -> Option<String> {
    let mut current = schema.clone();
    for _ in 0..MAX_DEPTH {
        if let Some(description) = current.description() {
            return Some(description.to_string());
        }
        current = match current.kind() {
            SchemaKind::Optional(inner)
            | SchemaKind::Nullable(inner)
            | SchemaKind::Default(inner, _)
            | SchemaKind::Effects(inner, _) => inner.clone(),
            SchemaKind::Lazy(lazy) => lazy.resolve(),
            _ => return None,
        };
    }
    None
}

/// Coerce a string wire value toward the scalar type `schema` expects.
///
/// Returns the value unchanged when no sensible coercion exists so that
/// validation reports the mismatch.
pub fn coerce_scalar(schema: &Schema, value: Value) -> Value {
    let raw = match value.as_str() {
        Some(raw) => raw.trim().to_string(),
        None => return value,
    };
    match unwrap(schema).kind() {
        SchemaKind::Number => raw
            .parse::<f64>()
            .ok()
            .and_then(|f| serde_json::Number::from_f64(f))
            .map(|n| match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::from(f as i64),
                _ => Value::Number(n),
            })
            .unwrap_or(value),
        SchemaKind::Integer => raw.parse::<i64>().map(Value::from).unwrap_or(value),
        SchemaKind::Boolean => match raw.as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => value,
        },
        _ => value,
    }
}
