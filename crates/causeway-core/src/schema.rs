//! Declarative schema model and validator.
//!
//! A [`Schema`] describes the shape of a procedure's input or output. It can
//! validate a JSON value (applying defaults, transforms and refinements) and
//! is introspected by [`crate::introspect`] to decide where each field lives
//! on the wire.
//!
//! Validation treats a missing value ("undefined") as `None`, distinct from
//! an explicit JSON `null`.

use crate::issue::{Issue, IssueCode, PathSegment};
use serde_json::{Map, Value};
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// A validator type
#[derive(Debug, Clone)]
pub struct Schema {
    kind: Arc<SchemaKind>,
    description: Option<String>,
    name: Option<String>,
}

/// The structural variants a schema can take
#[derive(Debug)]
pub enum SchemaKind {
    String { format: Option<String> },
    Number,
    Integer,
    Boolean,
    Null,
    Any,
    Void,
    Undefined,
    Literal(Value),
    Enum(Vec<String>),
    NativeEnum(Vec<(String, Value)>),
    Array(Schema),
    Record(Schema),
    Object(ObjectSchema),
    Optional(Schema),
    Nullable(Schema),
    Default(Schema, Value),
    Effects(Schema, Effect),
    Lazy(LazySchema),
    Union(Vec<Schema>),
    Intersection(Vec<Schema>),
}

/// Object fields in declaration order
#[derive(Debug, Clone)]
pub struct ObjectSchema {
    pub fields: Vec<(String, Schema)>,
    /// Reject unknown keys instead of stripping them
    pub strict: bool,
}

/// Processing attached to an inner schema
#[derive(Clone)]
pub enum Effect {
    /// Extra check run after the inner schema passes
    Refine {
        message: String,
        check: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
    },
    /// Maps the validated value
    Transform(Arc<dyn Fn(Value) -> Value + Send + Sync>),
    /// Maps the raw value before the inner schema sees it
    Preprocess(Arc<dyn Fn(Value) -> Value + Send + Sync>),
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Refine { message, .. } => f.debug_struct("Refine").field("message", message).finish(),
            Effect::Transform(_) => f.write_str("Transform"),
            Effect::Preprocess(_) => f.write_str("Preprocess"),
        }
    }
}

/// Deferred schema reference, used for recursive shapes
#[derive(Clone)]
pub struct LazySchema {
    getter: Arc<dyn Fn() -> Schema + Send + Sync>,
    id: TypeId,
}

impl LazySchema {
    /// Invoke the deferred getter
    pub fn resolve(&self) -> Schema {
        (self.getter)()
    }

    /// Identity of the getter code. Two lazies built from the same function
    /// or closure share an id, which is what recursion detection needs.
    pub fn id(&self) -> TypeId {
        self.id
    }
}

impl fmt::Debug for LazySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Lazy")
    }
}

impl Schema {
    fn from_kind(kind: SchemaKind) -> Self {
        Self {
            kind: Arc::new(kind),
            description: None,
            name: None,
        }
    }

    pub fn string() -> Self {
        Self::from_kind(SchemaKind::String { format: None })
    }

    pub fn number() -> Self {
        Self::from_kind(SchemaKind::Number)
    }

    pub fn integer() -> Self {
        Self::from_kind(SchemaKind::Integer)
    }

    pub fn boolean() -> Self {
        Self::from_kind(SchemaKind::Boolean)
    }

    pub fn null() -> Self {
        Self::from_kind(SchemaKind::Null)
    }

    pub fn any() -> Self {
        Self::from_kind(SchemaKind::Any)
    }

    pub fn void() -> Self {
        Self::from_kind(SchemaKind::Void)
    }

    pub fn undefined() -> Self {
        Self::from_kind(SchemaKind::Undefined)
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::from_kind(SchemaKind::Literal(value.into()))
    }

    /// String enumeration
    pub fn enumeration<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_kind(SchemaKind::Enum(options.into_iter().map(Into::into).collect()))
    }

    /// Enumeration of named members with string or numeric values
    pub fn native_enum<I, S, V>(members: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        Self::from_kind(SchemaKind::NativeEnum(
            members
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        ))
    }

    pub fn array(item: Schema) -> Self {
        Self::from_kind(SchemaKind::Array(item))
    }

    /// Object with arbitrary keys and uniformly typed values
    pub fn record(value: Schema) -> Self {
        Self::from_kind(SchemaKind::Record(value))
    }

    pub fn object<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Schema)>,
        S: Into<String>,
    {
        Self::from_kind(SchemaKind::Object(ObjectSchema {
            fields: fields
                .into_iter()
                .map(|(name, schema)| (name.into(), schema))
                .collect(),
            strict: false,
        }))
    }

    pub fn union(options: impl IntoIterator<Item = Schema>) -> Self {
        Self::from_kind(SchemaKind::Union(options.into_iter().collect()))
    }

    pub fn intersection(operands: impl IntoIterator<Item = Schema>) -> Self {
        Self::from_kind(SchemaKind::Intersection(operands.into_iter().collect()))
    }

    /// Deferred schema; the getter runs each time the schema is resolved
    pub fn lazy<F>(getter: F) -> Self
    where
        F: Fn() -> Schema + Send + Sync + 'static,
    {
        Self::from_kind(SchemaKind::Lazy(LazySchema {
            getter: Arc::new(getter),
            id: TypeId::of::<F>(),
        }))
    }

    /// Run `f` over the raw value before validating against `inner`
    pub fn preprocess<F>(f: F, inner: Schema) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self::from_kind(SchemaKind::Effects(inner, Effect::Preprocess(Arc::new(f))))
    }

    pub fn optional(self) -> Self {
        Self::from_kind(SchemaKind::Optional(self))
    }

    pub fn nullable(self) -> Self {
        Self::from_kind(SchemaKind::Nullable(self))
    }

    /// Value used when the input is undefined
    pub fn default_value(self, value: impl Into<Value>) -> Self {
        Self::from_kind(SchemaKind::Default(self, value.into()))
    }

    pub fn refine<F>(self, message: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::from_kind(SchemaKind::Effects(
            self,
            Effect::Refine {
                message: message.into(),
                check: Arc::new(check),
            },
        ))
    }

    pub fn transform<F>(self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self::from_kind(SchemaKind::Effects(self, Effect::Transform(Arc::new(f))))
    }

    /// Attach a human-readable description
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Register this schema as a named reusable component
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// String format hint (`uuid`, `email`, `date-time`, ...). No effect on other kinds.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        if matches!(self.kind(), SchemaKind::String { .. }) {
            self.kind = Arc::new(SchemaKind::String {
                format: Some(format.into()),
            });
        }
        self
    }

    /// Reject unknown keys. No effect on non-object schemas.
    pub fn strict(mut self) -> Self {
        let fields = match self.kind() {
            SchemaKind::Object(object) => object.fields.clone(),
            _ => return self,
        };
        self.kind = Arc::new(SchemaKind::Object(ObjectSchema { fields, strict: true }));
        self
    }

    pub fn kind(&self) -> &SchemaKind {
        &self.kind
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Copy of this schema without its component name
    pub fn anonymous(&self) -> Schema {
        Schema {
            name: None,
            ..self.clone()
        }
    }

    /// Whether an undefined value is acceptable
    pub fn is_optional(&self) -> bool {
        self.is_optional_at(0)
    }

    fn is_optional_at(&self, depth: usize) -> bool {
        if depth > MAX_DEPTH {
            return false;
        }
        match self.kind() {
            SchemaKind::Optional(_) | SchemaKind::Default(..) => true,
            SchemaKind::Any | SchemaKind::Void | SchemaKind::Undefined => true,
            SchemaKind::Nullable(inner) | SchemaKind::Effects(inner, _) => inner.is_optional_at(depth + 1),
            SchemaKind::Lazy(lazy) => lazy.resolve().is_optional_at(depth + 1),
            SchemaKind::Union(options) => options.iter().any(|s| s.is_optional_at(depth + 1)),
            SchemaKind::Intersection(operands) => {
                !operands.is_empty() && operands.iter().all(|s| s.is_optional_at(depth + 1))
            }
            _ => false,
        }
    }

    /// Validate a possibly-undefined value
    pub fn validate(&self, value: Option<Value>) -> Result<Option<Value>, Vec<Issue>> {
        let mut issues = Vec::new();
        let mut path = Vec::new();
        let output = self.check(value, &mut path, &mut issues);
        if issues.is_empty() {
            Ok(output)
        } else {
            Err(issues)
        }
    }

    /// Validate a present value; an undefined result becomes `null`
    pub fn parse(&self, value: Value) -> Result<Value, Vec<Issue>> {
        self.validate(Some(value)).map(|v| v.unwrap_or(Value::Null))
    }

    fn check(
        &self,
        value: Option<Value>,
        path: &mut Vec<PathSegment>,
        issues: &mut Vec<Issue>,
    ) -> Option<Value> {
        match self.kind() {
            SchemaKind::String { .. } => expect_type(value, "string", Value::is_string, path, issues),
            SchemaKind::Number => expect_type(value, "number", Value::is_number, path, issues),
            SchemaKind::Integer => match value {
                Some(Value::Number(n)) if !is_integral(&n) => {
                    issues.push(invalid_type("integer", "float", path));
                    None
                }
                other => expect_type(other, "integer", Value::is_number, path, issues),
            },
            SchemaKind::Boolean => expect_type(value, "boolean", Value::is_boolean, path, issues),
            SchemaKind::Null => expect_type(value, "null", Value::is_null, path, issues),
            SchemaKind::Any => value,
            SchemaKind::Void | SchemaKind::Undefined => match value {
                None => None,
                Some(other) => {
                    let expected = if matches!(self.kind(), SchemaKind::Void) { "void" } else { "undefined" };
                    issues.push(invalid_type(expected, type_name(Some(&other)), path));
                    None
                }
            },
            SchemaKind::Literal(expected) => match value {
                None => {
                    issues.push(invalid_type(type_name(Some(expected)), "undefined", path));
                    None
                }
                Some(v) if &v == expected => Some(v),
                Some(_) => {
                    issues.push(
                        Issue::new(
                            IssueCode::InvalidLiteral,
                            format!("Invalid literal value, expected {}", expected),
                            path,
                        )
                        .with_detail("expected", expected.clone()),
                    );
                    None
                }
            },
            SchemaKind::Enum(options) => match value {
                Some(Value::String(s)) if options.contains(&s) => Some(Value::String(s)),
                Some(Value::String(s)) => {
                    issues.push(invalid_enum(options.iter().cloned().map(Value::String).collect(), Value::String(s), path));
                    None
                }
                other => expect_type(other, "string", |_| false, path, issues),
            },
            SchemaKind::NativeEnum(members) => match value {
                None => {
                    issues.push(invalid_type("enum", "undefined", path));
                    None
                }
                Some(v) if members.iter().any(|(_, m)| m == &v) => Some(v),
                Some(v) => {
                    issues.push(invalid_enum(members.iter().map(|(_, m)| m.clone()).collect(), v, path));
                    None
                }
            },
            SchemaKind::Array(item) => match value {
                Some(Value::Array(items)) => {
                    let mut out = Vec::with_capacity(items.len());
                    for (index, element) in items.into_iter().enumerate() {
                        path.push(PathSegment::Index(index));
                        if let Some(v) = item.check(Some(element), path, issues) {
                            out.push(v);
                        }
                        path.pop();
                    }
                    Some(Value::Array(out))
                }
                other => expect_type(other, "array", |_| false, path, issues),
            },
            SchemaKind::Record(value_schema) => match value {
                Some(Value::Object(map)) => {
                    let mut out = Map::new();
                    for (key, element) in map {
                        path.push(PathSegment::Key(key.clone()));
                        if let Some(v) = value_schema.check(Some(element), path, issues) {
                            out.insert(key, v);
                        }
                        path.pop();
                    }
                    Some(Value::Object(out))
                }
                other => expect_type(other, "object", |_| false, path, issues),
            },
            SchemaKind::Object(object) => match value {
                Some(Value::Object(mut map)) => {
                    let mut out = Map::new();
                    for (key, field) in &object.fields {
                        path.push(PathSegment::Key(key.clone()));
                        if let Some(v) = field.check(map.remove(key), path, issues) {
                            out.insert(key.clone(), v);
                        }
                        path.pop();
                    }
                    if object.strict && !map.is_empty() {
                        let keys: Vec<Value> = map.keys().cloned().map(Value::String).collect();
                        let listed: Vec<String> = map.keys().map(|k| format!("'{}'", k)).collect();
                        issues.push(
                            Issue::new(
                                IssueCode::UnrecognizedKeys,
                                format!("Unrecognized key(s) in object: {}", listed.join(", ")),
                                path,
                            )
                            .with_detail("keys", keys),
                        );
                    }
                    Some(Value::Object(out))
                }
                other => expect_type(other, "object", |_| false, path, issues),
            },
            SchemaKind::Optional(inner) => match value {
                None => None,
                some => inner.check(some, path, issues),
            },
            SchemaKind::Nullable(inner) => match value {
                Some(Value::Null) => Some(Value::Null),
                other => inner.check(other, path, issues),
            },
            SchemaKind::Default(inner, default) => match value {
                None => inner.check(Some(default.clone()), path, issues),
                some => inner.check(some, path, issues),
            },
            SchemaKind::Effects(inner, effect) => self.check_effect(inner, effect, value, path, issues),
            SchemaKind::Lazy(lazy) => lazy.resolve().check(value, path, issues),
            SchemaKind::Union(options) => {
                if value.is_none() && !self.is_optional() {
                    issues.push(invalid_type("union", "undefined", path));
                    return None;
                }
                for option in options {
                    let mut attempt = Vec::new();
                    let output = option.check(value.clone(), path, &mut attempt);
                    if attempt.is_empty() {
                        return output;
                    }
                }
                issues.push(Issue::new(IssueCode::InvalidUnion, "Invalid input", path));
                None
            }
            SchemaKind::Intersection(operands) => {
                let before = issues.len();
                let outputs: Vec<Option<Value>> = operands
                    .iter()
                    .map(|operand| operand.check(value.clone(), path, issues))
                    .collect();
                if issues.len() > before {
                    return None;
                }
                match merge_intersection(outputs) {
                    Ok(merged) => merged,
                    Err(()) => {
                        issues.push(Issue::new(
                            IssueCode::InvalidIntersectionTypes,
                            "Intersection results could not be merged",
                            path,
                        ));
                        None
                    }
                }
            }
        }
    }

    fn check_effect(
        &self,
        inner: &Schema,
        effect: &Effect,
        value: Option<Value>,
        path: &mut Vec<PathSegment>,
        issues: &mut Vec<Issue>,
    ) -> Option<Value> {
        match effect {
            Effect::Preprocess(f) => inner.check(value.map(|v| f(v)), path, issues),
            Effect::Refine { message, check } => {
                let before = issues.len();
                let output = inner.check(value, path, issues);
                if issues.len() == before {
                    if let Some(v) = &output {
                        if !check(v) {
                            issues.push(Issue::new(IssueCode::Custom, message.clone(), path));
                        }
                    }
                }
                output
            }
            Effect::Transform(f) => {
                let before = issues.len();
                let output = inner.check(value, path, issues);
                if issues.len() == before {
                    output.map(|v| f(v))
                } else {
                    output
                }
            }
        }
    }
}

/// Guard against self-referential lazy chains
pub(crate) const MAX_DEPTH: usize = 64;

fn expect_type(
    value: Option<Value>,
    expected: &str,
    accept: impl Fn(&Value) -> bool,
    path: &[PathSegment],
    issues: &mut Vec<Issue>,
) -> Option<Value> {
    match value {
        Some(v) if accept(&v) => Some(v),
        other => {
            issues.push(invalid_type(expected, type_name(other.as_ref()), path));
            None
        }
    }
}

fn invalid_type(expected: &str, received: &str, path: &[PathSegment]) -> Issue {
    let message = if received == "undefined" {
        "Required".to_string()
    } else {
        format!("Expected {}, received {}", expected, received)
    };
    Issue::new(IssueCode::InvalidType, message, path)
        .with_detail("expected", expected)
        .with_detail("received", received)
}

fn invalid_enum(options: Vec<Value>, received: Value, path: &[PathSegment]) -> Issue {
    let listed: Vec<String> = options.iter().map(|o| o.to_string()).collect();
    Issue::new(
        IssueCode::InvalidEnumValue,
        format!(
            "Invalid enum value. Expected {}, received {}",
            listed.join(" | "),
            received
        ),
        path,
    )
    .with_detail("options", options)
    .with_detail("received", received)
}

fn is_integral(n: &serde_json::Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
}

/// Name of a JSON value's type as reported in issues
pub fn type_name(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}

fn merge_intersection(outputs: Vec<Option<Value>>) -> Result<Option<Value>, ()> {
    let mut merged: Option<Value> = None;
    for output in outputs {
        merged = match (merged, output) {
            (None, next) => next,
            (Some(current), None) => Some(current),
            (Some(Value::Object(mut current)), Some(Value::Object(next))) => {
                for (key, value) in next {
                    current.insert(key, value);
                }
                Some(Value::Object(current))
            }
            (Some(current), Some(next)) if current == next => Some(current),
            _ => return Err(()),
        };
    }
    Ok(merged)
}
