//! OpenAPI 3.0 JSON-Schema fragments generated from [`Schema`] values.

use crate::introspect::description_of;
use crate::schema::{Schema, SchemaKind, MAX_DEPTH};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashSet;

/// OpenAPI 3.0 schema object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonSchema {
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, JsonSchema>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub any_of: Vec<JsonSchema>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub all_of: Vec<JsonSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// `additionalProperties` is either a flag or a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<JsonSchema>),
}

impl JsonSchema {
    /// Schema with only `type` set
    pub fn typed(schema_type: &str) -> Self {
        Self {
            schema_type: Some(schema_type.to_string()),
            ..Default::default()
        }
    }

    /// `$ref` to a named component schema
    pub fn reference(name: &str) -> Self {
        Self {
            reference: Some(format!("#/components/schemas/{}", name)),
            ..Default::default()
        }
    }

    /// Closed object with the given properties
    pub fn object(properties: IndexMap<String, JsonSchema>, required: Vec<String>) -> Self {
        Self {
            schema_type: Some("object".to_string()),
            properties: Some(properties),
            required,
            additional_properties: Some(AdditionalProperties::Allowed(false)),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        if self.reference.is_none() {
            self.description = description;
        }
        self
    }

    fn is_reference(&self) -> bool {
        self.reference.is_some()
    }
}

/// Named schemas collected while generating a document.
///
/// Passed explicitly into generation so that one document build owns one
/// registry; nothing is shared across builds.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    schemas: IndexMap<String, JsonSchema>,
    in_progress: HashSet<String>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&JsonSchema> {
        self.schemas.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Registered schemas in first-registration order
    pub fn into_schemas(self) -> IndexMap<String, JsonSchema> {
        self.schemas
    }
}

/// Generate the OpenAPI fragment for `schema`, registering named components
pub fn to_openapi_schema(schema: &Schema, registry: &mut ComponentRegistry) -> JsonSchema {
    Emitter {
        registry,
        lazy_stack: Vec::new(),
    }
    .emit(schema, 0)
}

struct Emitter<'r> {
    registry: &'r mut ComponentRegistry,
    lazy_stack: Vec<TypeId>,
}

impl Emitter<'_> {
    fn emit(&mut self, schema: &Schema, depth: usize) -> JsonSchema {
        if depth > MAX_DEPTH {
            return JsonSchema::default();
        }
        if let Some(name) = schema.name() {
            return self.emit_named(name, schema, depth);
        }
        let fragment = self.emit_kind(schema, depth);
        match schema.description() {
            Some(description) => fragment.with_description(Some(description.to_string())),
            None => fragment,
        }
    }

    fn emit_named(&mut self, name: &str, schema: &Schema, depth: usize) -> JsonSchema {
        if self.registry.schemas.contains_key(name) || self.registry.in_progress.contains(name) {
            return JsonSchema::reference(name);
        }
        self.registry.in_progress.insert(name.to_string());
        let fragment = self.emit(&schema.anonymous(), depth + 1);
        self.registry.in_progress.remove(name);
        self.registry.schemas.insert(name.to_string(), fragment);
        JsonSchema::reference(name)
    }

    fn emit_kind(&mut self, schema: &Schema, depth: usize) -> JsonSchema {
        match schema.kind() {
            SchemaKind::String { format } => JsonSchema {
                format: format.clone(),
                ..JsonSchema::typed("string")
            },
            SchemaKind::Number => JsonSchema::typed("number"),
            SchemaKind::Integer => JsonSchema::typed("integer"),
            SchemaKind::Boolean => JsonSchema::typed("boolean"),
            SchemaKind::Null => null_schema(),
            SchemaKind::Any | SchemaKind::Void | SchemaKind::Undefined => JsonSchema::default(),
            SchemaKind::Literal(value) => literal_schema(std::slice::from_ref(value)),
            SchemaKind::Enum(options) => JsonSchema {
                enum_values: Some(options.iter().cloned().map(Value::String).collect()),
                ..JsonSchema::typed("string")
            },
            SchemaKind::NativeEnum(members) => {
                let values: Vec<Value> = members.iter().map(|(_, value)| value.clone()).collect();
                literal_schema(&values)
            }
            SchemaKind::Array(item) => JsonSchema {
                items: Some(Box::new(self.emit(item, depth + 1))),
                ..JsonSchema::typed("array")
            },
            SchemaKind::Record(value) => JsonSchema {
                additional_properties: Some(AdditionalProperties::Schema(Box::new(
                    self.emit(value, depth + 1),
                ))),
                ..JsonSchema::typed("object")
            },
            SchemaKind::Object(object) => {
                let mut properties = IndexMap::new();
                let mut required = Vec::new();
                for (name, field) in &object.fields {
                    properties.insert(name.clone(), self.emit(field, depth + 1));
                    if !field.is_optional() {
                        required.push(name.clone());
                    }
                }
                JsonSchema::object(properties, required)
            }
            SchemaKind::Optional(inner) | SchemaKind::Effects(inner, _) => self.emit(inner, depth + 1),
            SchemaKind::Nullable(inner) => nullable(self.emit(inner, depth + 1)),
            SchemaKind::Default(inner, value) => {
                let mut fragment = self.emit(inner, depth + 1);
                if fragment.is_reference() {
                    fragment = JsonSchema {
                        all_of: vec![fragment],
                        ..Default::default()
                    };
                }
                fragment.default = Some(value.clone());
                fragment
            }
            SchemaKind::Lazy(lazy) => {
                if self.lazy_stack.contains(&lazy.id()) {
                    return JsonSchema::default();
                }
                self.lazy_stack.push(lazy.id());
                let fragment = self.emit(&lazy.resolve(), depth + 1);
                self.lazy_stack.pop();
                fragment
            }
            SchemaKind::Union(options) => self.emit_union(options, depth),
            SchemaKind::Intersection(operands) => JsonSchema {
                all_of: operands.iter().map(|s| self.emit(s, depth + 1)).collect(),
                ..Default::default()
            },
        }
    }

    fn emit_union(&mut self, options: &[Schema], depth: usize) -> JsonSchema {
        let mut has_null = false;
        let mut rest = Vec::new();
        for option in options {
            match option.kind() {
                SchemaKind::Null => has_null = true,
                SchemaKind::Literal(Value::Null) => has_null = true,
                _ => rest.push(option),
            }
        }

        let literals: Option<Vec<Value>> = rest
            .iter()
            .map(|option| match option.kind() {
                SchemaKind::Literal(value) if option.name().is_none() => Some(vec![value.clone()]),
                SchemaKind::Enum(values) if option.name().is_none() => {
                    Some(values.iter().cloned().map(Value::String).collect())
                }
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(|groups| groups.into_iter().flatten().collect());

        let fragment = match literals {
            Some(values) if !values.is_empty() && single_json_type(&values).is_some() => {
                literal_schema(&values)
            }
            _ if rest.len() == 1 => self.emit(rest[0], depth + 1),
            _ => JsonSchema {
                any_of: rest.iter().map(|s| self.emit(s, depth + 1)).collect(),
                ..Default::default()
            },
        };

        match (has_null, rest.is_empty()) {
            (true, true) => null_schema(),
            (true, false) => nullable(fragment),
            (false, _) => fragment,
        }
    }
}

/// `nullable` has no effect without a type, so a bare null is pinned by `enum`
fn null_schema() -> JsonSchema {
    JsonSchema {
        nullable: Some(true),
        enum_values: Some(vec![Value::Null]),
        ..Default::default()
    }
}

fn nullable(fragment: JsonSchema) -> JsonSchema {
    // `{}` already admits null
    if fragment == JsonSchema::default() {
        return fragment;
    }
    let mut fragment = if fragment.is_reference() {
        JsonSchema {
            all_of: vec![fragment],
            ..Default::default()
        }
    } else {
        fragment
    };
    fragment.nullable = Some(true);
    fragment
}

fn json_type(value: &Value) -> Option<&'static str> {
    match value {
        Value::String(_) => Some("string"),
        Value::Number(_) => Some("number"),
        Value::Bool(_) => Some("boolean"),
        _ => None,
    }
}

fn single_json_type(values: &[Value]) -> Option<&'static str> {
    let first = json_type(values.first()?)?;
    values
        .iter()
        .all(|v| json_type(v) == Some(first))
        .then_some(first)
}

/// `{type, enum}` for same-typed literals, `anyOf` of per-type enums otherwise
fn literal_schema(values: &[Value]) -> JsonSchema {
    if let Some(schema_type) = single_json_type(values) {
        return JsonSchema {
            enum_values: Some(values.to_vec()),
            ..JsonSchema::typed(schema_type)
        };
    }

    let mut groups: IndexMap<&'static str, Vec<Value>> = IndexMap::new();
    let mut has_null = false;
    for value in values {
        match json_type(value) {
            Some(t) => groups.entry(t).or_default().push(value.clone()),
            None => has_null = true,
        }
    }
    let mut fragment = match groups.len() {
        0 => return null_schema(),
        1 => {
            let (schema_type, values) = groups.into_iter().next().unwrap_or(("string", Vec::new()));
            JsonSchema {
                enum_values: Some(values),
                ..JsonSchema::typed(schema_type)
            }
        }
        _ => JsonSchema {
            any_of: groups
                .into_iter()
                .map(|(schema_type, values)| JsonSchema {
                    enum_values: Some(values),
                    ..JsonSchema::typed(schema_type)
                })
                .collect(),
            ..Default::default()
        },
    };
    if has_null {
        fragment.nullable = Some(true);
    }
    fragment
}

/// Fragment with the description carried anywhere on the wrapper chain
pub fn to_openapi_schema_described(schema: &Schema, registry: &mut ComponentRegistry) -> JsonSchema {
    to_openapi_schema(schema, registry).with_description(description_of(schema))
}
