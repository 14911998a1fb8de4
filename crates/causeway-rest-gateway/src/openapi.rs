//! OpenAPI 3.0 document generation

use crate::config::DocumentInfo;
use crate::error::{ConfigurationError, GatewayResult};
use crate::mapping::{normalize_path, HttpMethod, PathTemplate};
use crate::procedure::{ProcedureDescriptor, ProcedureKind};
use causeway_core::introspect::{is_coercible, is_string_like, is_void_like, object_fields, ObjectField};
use causeway_core::json_schema::to_openapi_schema_described;
use causeway_core::{AdditionalProperties, ComponentRegistry, JsonSchema, Schema};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// OpenAPI version emitted in every document
pub const OPENAPI_VERSION: &str = "3.0.3";

/// Name of the bearer security scheme and of the shared error response
const AUTHORIZATION_SCHEME: &str = "Authorization";
const ERROR_RESPONSE: &str = "error";

/// OpenAPI 3.0 document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiDocument {
    pub openapi: String,
    pub info: OpenApiInfo,
    pub servers: Vec<OpenApiServer>,
    pub paths: IndexMap<String, OpenApiPathItem>,
    pub components: OpenApiComponents,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<OpenApiTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_docs: Option<OpenApiExternalDocs>,
}

impl OpenApiDocument {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Look up the operation for a path key and method
    pub fn operation(&self, path: &str, method: HttpMethod) -> Option<&OpenApiOperation> {
        self.paths.get(path).and_then(|item| item.get(method))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiInfo {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiServer {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiTag {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiExternalDocs {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenApiPathItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<OpenApiOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<OpenApiOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<OpenApiOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<OpenApiOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<OpenApiOperation>,
}

impl OpenApiPathItem {
    pub fn get(&self, method: HttpMethod) -> Option<&OpenApiOperation> {
        match method {
            HttpMethod::Get => self.get.as_ref(),
            HttpMethod::Post => self.post.as_ref(),
            HttpMethod::Put => self.put.as_ref(),
            HttpMethod::Patch => self.patch.as_ref(),
            HttpMethod::Delete => self.delete.as_ref(),
        }
    }

    fn set(&mut self, method: HttpMethod, operation: OpenApiOperation) {
        let slot = match method {
            HttpMethod::Get => &mut self.get,
            HttpMethod::Post => &mut self.post,
            HttpMethod::Put => &mut self.put,
            HttpMethod::Patch => &mut self.patch,
            HttpMethod::Delete => &mut self.delete,
        };
        *slot = Some(operation);
    }
}

/// Security requirement: scheme name to scopes
pub type SecurityRequirement = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiOperation {
    pub operation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<SecurityRequirement>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parameters: Vec<OpenApiParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<OpenApiRequestBody>,
    pub responses: IndexMap<String, OpenApiResponseOrRef>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub deprecated: bool,
}

/// Where a parameter travels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiParameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<JsonSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiRequestBody {
    pub required: bool,
    pub content: IndexMap<String, OpenApiMediaType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiResponse {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<IndexMap<String, OpenApiMediaType>>,
}

/// Inline response or a `$ref` to a shared one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenApiResponseOrRef {
    Reference {
        #[serde(rename = "$ref")]
        reference: String,
    },
    Inline(OpenApiResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiMediaType {
    pub schema: JsonSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiSecurityScheme {
    #[serde(rename = "type")]
    pub scheme_type: String,
    pub scheme: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiComponents {
    pub security_schemes: IndexMap<String, OpenApiSecurityScheme>,
    pub responses: IndexMap<String, OpenApiResponse>,
    #[serde(skip_serializing_if = "IndexMap::is_empty", default)]
    pub schemas: IndexMap<String, JsonSchema>,
}

/// A descriptor that passed every exposure check
pub(crate) struct CheckedDescriptor {
    pub template: PathTemplate,
    pub input: Schema,
    pub output: Schema,
    /// Object fields of the input; `None` for void input
    pub fields: Option<Vec<ObjectField>>,
}

/// Check that a descriptor can be exposed over REST.
///
/// Shared by document generation and route table construction so both
/// reject exactly the same descriptors.
pub(crate) fn check_descriptor(
    descriptor: &ProcedureDescriptor,
    coerce_input: bool,
) -> GatewayResult<CheckedDescriptor> {
    if descriptor.kind == ProcedureKind::Subscription {
        return Err(ConfigurationError::UnsupportedSubscription);
    }
    if !descriptor.kind.allows(descriptor.method) {
        return Err(ConfigurationError::MethodKindMismatch {
            kind: descriptor.kind,
            method: descriptor.method,
            allowed: descriptor.kind.allowed_methods(),
        });
    }
    if descriptor.content_types.is_empty() {
        return Err(ConfigurationError::EmptyContentTypes);
    }
    let input = descriptor
        .input
        .clone()
        .ok_or(ConfigurationError::MissingInputSchema)?;
    let output = descriptor
        .output
        .clone()
        .ok_or(ConfigurationError::MissingOutputSchema)?;

    let template = PathTemplate::compile(&descriptor.path)?;

    if is_void_like(&input) {
        if !template.parameter_names().is_empty() {
            return Err(ConfigurationError::InputNotObject);
        }
        return Ok(CheckedDescriptor {
            template,
            input,
            output,
            fields: None,
        });
    }

    let fields = object_fields(&input).ok_or(ConfigurationError::InputNotObject)?;

    for param in template.parameter_names() {
        let field = fields
            .iter()
            .find(|field| &field.name == param)
            .ok_or_else(|| ConfigurationError::MissingPathParameter(param.clone()))?;
        if !field.required {
            return Err(ConfigurationError::OptionalPathParameter(param.clone()));
        }
    }

    // Query inputs travel entirely as strings; mutation inputs only for path params
    for field in &fields {
        let on_wire_as_string =
            descriptor.kind == ProcedureKind::Query || template.has_parameter(&field.name);
        if !on_wire_as_string {
            continue;
        }
        let accepted = is_string_like(&field.schema) || (coerce_input && is_coercible(&field.schema));
        if !accepted {
            return Err(ConfigurationError::FieldNotStringLike(field.name.clone()));
        }
    }

    Ok(CheckedDescriptor {
        template,
        input,
        output,
        fields: Some(fields),
    })
}

/// OpenAPI document builder
pub struct OpenApiDocumentBuilder {
    info: DocumentInfo,
    coerce_input: bool,
    procedures: Vec<(String, Arc<ProcedureDescriptor>)>,
}

impl OpenApiDocumentBuilder {
    pub fn new(info: DocumentInfo) -> Self {
        Self {
            info,
            coerce_input: true,
            procedures: Vec::new(),
        }
    }

    /// Accept coercible scalars as query and path parameters
    pub fn coerce_input(mut self, coerce_input: bool) -> Self {
        self.coerce_input = coerce_input;
        self
    }

    /// Add a procedure under its qualified name
    pub fn procedure(mut self, name: impl Into<String>, descriptor: Arc<ProcedureDescriptor>) -> Self {
        self.procedures.push((name.into(), descriptor));
        self
    }

    pub fn procedures<I>(mut self, procedures: I) -> Self
    where
        I: IntoIterator<Item = (String, Arc<ProcedureDescriptor>)>,
    {
        self.procedures.extend(procedures);
        self
    }

    /// Build the OpenAPI document
    pub fn build(self) -> GatewayResult<OpenApiDocument> {
        let mut registry = ComponentRegistry::new();
        let mut paths: IndexMap<String, OpenApiPathItem> = IndexMap::new();
        let mut routes = RouteRegistry::default();

        for (name, descriptor) in &self.procedures {
            if !descriptor.enabled {
                continue;
            }

            let (path, operation) = build_operation(
                name,
                descriptor,
                self.coerce_input,
                &mut registry,
                &mut routes,
            )
            .map_err(|e| e.in_procedure(descriptor.kind, name))?;

            paths.entry(path).or_default().set(descriptor.method, operation);
        }

        let mut security_schemes = IndexMap::new();
        security_schemes.insert(
            AUTHORIZATION_SCHEME.to_string(),
            OpenApiSecurityScheme {
                scheme_type: "http".to_string(),
                scheme: "bearer".to_string(),
            },
        );

        let mut responses = IndexMap::new();
        responses.insert(ERROR_RESPONSE.to_string(), error_response());

        Ok(OpenApiDocument {
            openapi: OPENAPI_VERSION.to_string(),
            info: OpenApiInfo {
                title: self.info.title,
                description: self.info.description,
                version: self.info.version,
            },
            servers: vec![OpenApiServer {
                url: self.info.base_url,
            }],
            paths,
            components: OpenApiComponents {
                security_schemes,
                responses,
                schemas: registry.into_schemas(),
            },
            tags: self
                .info
                .tags
                .into_iter()
                .map(|name| OpenApiTag { name })
                .collect(),
            external_docs: self.info.docs_url.map(|url| OpenApiExternalDocs { url }),
        })
    }
}

/// Routes claimed so far while building one document.
///
/// Paths that differ only in parameter names are one path to OpenAPI, so every
/// method on a route shape must use the first spelling seen for it.
#[derive(Default)]
struct RouteRegistry {
    /// (method, route key) -> procedure name
    operations: HashMap<(HttpMethod, String), String>,
    /// route key -> (path, procedure name) of the first registration
    spellings: HashMap<String, (String, String)>,
}

impl RouteRegistry {
    fn claim(&mut self, name: &str, method: HttpMethod, template: &PathTemplate, path: &str) -> GatewayResult<()> {
        let key = template.route_key();

        if let Some(existing) = self.operations.get(&(method, key.clone())) {
            return Err(ConfigurationError::DuplicateRoute {
                method,
                path: path.to_string(),
                existing: existing.clone(),
            });
        }

        match self.spellings.get(&key) {
            Some((existing_path, existing)) if existing_path != path => {
                return Err(ConfigurationError::ConflictingPathSpelling {
                    path: path.to_string(),
                    existing_path: existing_path.clone(),
                    existing: existing.clone(),
                });
            }
            Some(_) => {}
            None => {
                self.spellings.insert(key.clone(), (path.to_string(), name.to_string()));
            }
        }

        self.operations.insert((method, key), name.to_string());
        Ok(())
    }
}

fn build_operation(
    name: &str,
    descriptor: &ProcedureDescriptor,
    coerce_input: bool,
    registry: &mut ComponentRegistry,
    routes: &mut RouteRegistry,
) -> GatewayResult<(String, OpenApiOperation)> {
    let checked = check_descriptor(descriptor, coerce_input)?;
    let path = normalize_path(&descriptor.path);
    routes.claim(name, descriptor.method, &checked.template, &path)?;

    let mut parameters: Vec<OpenApiParameter> = descriptor
        .headers
        .iter()
        .map(|header| OpenApiParameter {
            name: header.name.clone(),
            location: ParameterLocation::Header,
            description: header.description.clone(),
            required: header.required,
            schema: Some(JsonSchema::typed("string")),
        })
        .collect();

    let mut request_body = None;

    if let Some(fields) = &checked.fields {
        let input_required = !checked.input.is_optional();
        let mut body_fields = Vec::new();

        for field in fields {
            let location = if checked.template.has_parameter(&field.name) {
                ParameterLocation::Path
            } else if descriptor.kind == ProcedureKind::Query {
                ParameterLocation::Query
            } else {
                body_fields.push(field);
                continue;
            };

            parameters.push(OpenApiParameter {
                name: field.name.clone(),
                location,
                description: field.description(),
                required: location == ParameterLocation::Path || (input_required && field.required),
                schema: Some(to_openapi_schema_described(&field.schema, registry)),
            });
        }

        if descriptor.kind == ProcedureKind::Mutation && !body_fields.is_empty() {
            let schema = if body_fields.len() == fields.len() {
                to_openapi_schema_described(&checked.input, registry)
            } else {
                let mut properties = IndexMap::new();
                let mut required = Vec::new();
                for field in body_fields {
                    if field.required {
                        required.push(field.name.clone());
                    }
                    properties.insert(
                        field.name.clone(),
                        to_openapi_schema_described(&field.schema, registry),
                    );
                }
                JsonSchema::object(properties, required)
            };

            let content = descriptor
                .content_types
                .iter()
                .map(|content_type| {
                    (
                        content_type.clone(),
                        OpenApiMediaType {
                            schema: schema.clone(),
                        },
                    )
                })
                .collect();

            request_body = Some(OpenApiRequestBody {
                required: input_required,
                content,
            });
        }
    }

    let output_schema = if is_void_like(&checked.output) {
        JsonSchema::default()
    } else {
        to_openapi_schema_described(&checked.output, registry)
    };

    let mut responses = IndexMap::new();
    responses.insert(
        "200".to_string(),
        OpenApiResponseOrRef::Inline(success_response(output_schema)),
    );
    responses.insert(
        "default".to_string(),
        OpenApiResponseOrRef::Reference {
            reference: format!("#/components/responses/{}", ERROR_RESPONSE),
        },
    );

    let security = descriptor.protected.then(|| {
        let mut requirement = IndexMap::new();
        requirement.insert(AUTHORIZATION_SCHEME.to_string(), Vec::new());
        vec![requirement]
    });

    let operation = OpenApiOperation {
        operation_id: descriptor
            .operation_id
            .clone()
            .unwrap_or_else(|| name.replace('.', "_")),
        summary: descriptor.summary.clone(),
        description: descriptor.description.clone(),
        tags: descriptor.tags.clone(),
        security,
        parameters,
        request_body,
        responses,
        deprecated: descriptor.deprecated,
    };

    Ok((path, operation))
}

fn json_content(schema: JsonSchema) -> IndexMap<String, OpenApiMediaType> {
    let mut content = IndexMap::new();
    content.insert("application/json".to_string(), OpenApiMediaType { schema });
    content
}

fn literal_boolean(value: bool) -> JsonSchema {
    JsonSchema {
        enum_values: Some(vec![json!(value)]),
        ..JsonSchema::typed("boolean")
    }
}

fn success_response(data: JsonSchema) -> OpenApiResponse {
    let mut properties = IndexMap::new();
    properties.insert("ok".to_string(), literal_boolean(true));
    properties.insert("data".to_string(), data);

    OpenApiResponse {
        description: "Successful response".to_string(),
        content: Some(json_content(JsonSchema::object(
            properties,
            vec!["ok".to_string(), "data".to_string()],
        ))),
    }
}

/// Shared `{ok: false, error: {message, code, issues?}}` response
fn error_response() -> OpenApiResponse {
    let mut issue_properties = IndexMap::new();
    issue_properties.insert("message".to_string(), JsonSchema::typed("string"));
    let issue = JsonSchema {
        additional_properties: Some(AdditionalProperties::Allowed(true)),
        ..JsonSchema::object(issue_properties, vec!["message".to_string()])
    };

    let mut error_properties = IndexMap::new();
    error_properties.insert("message".to_string(), JsonSchema::typed("string"));
    error_properties.insert("code".to_string(), JsonSchema::typed("string"));
    error_properties.insert(
        "issues".to_string(),
        JsonSchema {
            items: Some(Box::new(issue)),
            ..JsonSchema::typed("array")
        },
    );

    let mut properties = IndexMap::new();
    properties.insert("ok".to_string(), literal_boolean(false));
    properties.insert(
        "error".to_string(),
        JsonSchema::object(
            error_properties,
            vec!["message".to_string(), "code".to_string()],
        ),
    );

    OpenApiResponse {
        description: "Error response".to_string(),
        content: Some(json_content(JsonSchema::object(
            properties,
            vec!["ok".to_string(), "error".to_string()],
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedure::HeaderParam;
    use serde_json::Value;
    use std::collections::HashSet;

    fn build(procedures: Vec<(&str, ProcedureDescriptor)>) -> GatewayResult<OpenApiDocument> {
        OpenApiDocumentBuilder::new(DocumentInfo::new("Test", "1.0.0", "http://localhost:3000"))
            .procedures(
                procedures
                    .into_iter()
                    .map(|(name, descriptor)| (name.to_string(), Arc::new(descriptor))),
            )
            .build()
    }

    fn say_hello() -> ProcedureDescriptor {
        ProcedureDescriptor::query(HttpMethod::Get, "/say-hello")
            .input(Schema::object([("name", Schema::string().describe("Who to greet"))]))
            .output(Schema::object([("greeting", Schema::string())]))
    }

    #[test]
    fn test_document_level_fields() {
        let doc = build(vec![("sayHello", say_hello())]).unwrap();
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["openapi"], "3.0.3");
        assert_eq!(json["info"]["title"], "Test");
        assert_eq!(json["servers"][0]["url"], "http://localhost:3000");
        assert_eq!(json["components"]["securitySchemes"]["Authorization"]["scheme"], "bearer");
        assert_eq!(
            json["components"]["responses"]["error"]["content"]["application/json"]["schema"]["required"],
            json!(["ok", "error"])
        );
        assert!(json.get("externalDocs").is_none());
        assert!(json.get("tags").is_none());
    }

    #[test]
    fn test_query_parameters() {
        let doc = build(vec![("sayHello", say_hello())]).unwrap();
        let operation = doc.operation("/say-hello", HttpMethod::Get).unwrap();

        assert_eq!(operation.operation_id, "sayHello");
        assert_eq!(operation.parameters.len(), 1);
        let param = &operation.parameters[0];
        assert_eq!(param.name, "name");
        assert_eq!(param.location, ParameterLocation::Query);
        assert!(param.required);
        assert_eq!(param.description.as_deref(), Some("Who to greet"));
        assert!(operation.request_body.is_none());
        assert!(operation.security.is_none());
    }

    #[test]
    fn test_success_response_envelope() {
        let doc = build(vec![("sayHello", say_hello())]).unwrap();
        let json = serde_json::to_value(&doc).unwrap();
        let ok = &json["paths"]["/say-hello"]["get"]["responses"]["200"];

        assert_eq!(ok["description"], "Successful response");
        let schema = &ok["content"]["application/json"]["schema"];
        assert_eq!(schema["properties"]["ok"]["enum"], json!([true]));
        assert_eq!(schema["properties"]["data"]["properties"]["greeting"]["type"], "string");
        assert_eq!(
            json["paths"]["/say-hello"]["get"]["responses"]["default"]["$ref"],
            "#/components/responses/error"
        );
    }

    #[test]
    fn test_mutation_body_omits_path_params() {
        let descriptor = ProcedureDescriptor::mutation(HttpMethod::Patch, "/users/{id}")
            .input(Schema::object([
                ("id", Schema::string()),
                ("name", Schema::string()),
                ("age", Schema::number().optional()),
            ]))
            .output(Schema::object([("id", Schema::string())]))
            .content_types(["application/json", "application/x-www-form-urlencoded"])
            .protect()
            .header(HeaderParam::new("x-request-id").description("Trace id"));

        let doc = build(vec![("users.update", descriptor)]).unwrap();
        let operation = doc.operation("/users/{id}", HttpMethod::Patch).unwrap();

        assert_eq!(operation.operation_id, "users_update");
        assert_eq!(operation.parameters[0].location, ParameterLocation::Header);
        assert_eq!(operation.parameters[1].name, "id");
        assert_eq!(operation.parameters[1].location, ParameterLocation::Path);
        assert_eq!(operation.parameters.len(), 2);

        let body = operation.request_body.as_ref().unwrap();
        assert!(body.required);
        assert_eq!(body.content.len(), 2);
        let schema = &body.content["application/json"].schema;
        let properties = schema.properties.as_ref().unwrap();
        assert!(properties.contains_key("name"));
        assert!(!properties.contains_key("id"));
        assert_eq!(schema.required, ["name"]);

        let json = serde_json::to_value(operation).unwrap();
        assert_eq!(json["security"], json!([{ "Authorization": [] }]));
    }

    #[test]
    fn test_void_input_has_no_parameters() {
        let descriptor = ProcedureDescriptor::mutation(HttpMethod::Post, "/ping")
            .input(Schema::void())
            .output(Schema::void());
        let doc = build(vec![("ping", descriptor)]).unwrap();
        let operation = doc.operation("/ping", HttpMethod::Post).unwrap();
        assert!(operation.parameters.is_empty());
        assert!(operation.request_body.is_none());
    }

    #[test]
    fn test_disabled_procedure_skipped() {
        let descriptor = say_hello().enabled(false).input(Schema::number());
        let doc = build(vec![("hidden", descriptor)]).unwrap();
        assert!(doc.paths.is_empty());
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let first = ProcedureDescriptor::query(HttpMethod::Get, "/users/{id}")
            .input(Schema::object([("id", Schema::string())]))
            .output(Schema::any());
        let second = ProcedureDescriptor::query(HttpMethod::Get, "/Users/{userId}/")
            .input(Schema::object([("userId", Schema::string())]))
            .output(Schema::any());

        let err = build(vec![("a", first), ("b", second)]).unwrap_err();
        assert!(err.to_string().starts_with("[query.b] - Duplicate procedure defined for route `GET /Users/{userId}`"));
        assert!(matches!(err.root(), ConfigurationError::DuplicateRoute { existing, .. } if existing == "a"));
    }

    #[test]
    fn test_equivalent_paths_must_share_spelling() {
        let get = ProcedureDescriptor::query(HttpMethod::Get, "/users/{id}")
            .input(Schema::object([("id", Schema::string())]))
            .output(Schema::any());
        let remove = ProcedureDescriptor::query(HttpMethod::Delete, "/users/{userId}")
            .input(Schema::object([("userId", Schema::string())]))
            .output(Schema::any());

        let err = build(vec![("users.get", get.clone()), ("users.remove", remove)]).unwrap_err();
        assert!(matches!(
            err.root(),
            ConfigurationError::ConflictingPathSpelling { path, existing_path, existing }
                if path == "/users/{userId}" && existing_path == "/users/{id}" && existing == "users.get"
        ));

        let remove = ProcedureDescriptor::query(HttpMethod::Delete, "/users/{id}")
            .input(Schema::object([("id", Schema::string())]))
            .output(Schema::any());
        let doc = build(vec![("users.get", get), ("users.remove", remove)]).unwrap();
        assert_eq!(doc.paths.len(), 1);
        assert_valid_document(&doc);
    }

    /// Structural checks an OpenAPI 3.0 validator would make on a document
    fn assert_valid_document(doc: &OpenApiDocument) {
        let json = serde_json::to_value(doc).unwrap();
        assert_eq!(json["openapi"], "3.0.3");
        assert!(json["info"]["title"].is_string());
        assert!(json["info"]["version"].is_string());

        let mut route_keys = HashSet::new();
        let mut operation_ids = HashSet::new();
        for (path, item) in json["paths"].as_object().unwrap() {
            assert!(path.starts_with('/'), "path must be absolute: {}", path);
            let template = PathTemplate::compile(path).unwrap();
            assert!(route_keys.insert(template.route_key()), "equivalent paths: {}", path);

            for (method, operation) in item.as_object().unwrap() {
                assert!(["get", "post", "put", "patch", "delete"].contains(&method.as_str()));
                let id = operation["operationId"].as_str().unwrap();
                assert!(operation_ids.insert(id.to_string()), "duplicate operationId {}", id);
                assert!(!operation["responses"].as_object().unwrap().is_empty());

                let parameters = operation["parameters"].as_array().cloned().unwrap_or_default();
                let mut seen = HashSet::new();
                for parameter in &parameters {
                    let key = (parameter["name"].clone().to_string(), parameter["in"].clone().to_string());
                    assert!(seen.insert(key), "duplicate parameter in {} {}", method, path);
                    if parameter["in"] == "path" {
                        assert_eq!(parameter["required"], true);
                        assert!(template.has_parameter(parameter["name"].as_str().unwrap()));
                    }
                }
                for name in template.parameter_names() {
                    assert!(
                        parameters.iter().any(|p| p["in"] == "path" && p["name"] == name.as_str()),
                        "undeclared path parameter {} in {}",
                        name,
                        path
                    );
                }
            }
        }

        check_schemas(&json, &json);
    }

    fn check_schemas(root: &Value, node: &Value) {
        match node {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    let pointer = reference.trim_start_matches('#');
                    assert!(root.pointer(pointer).is_some(), "dangling $ref {}", reference);
                }
                if map.get("nullable") == Some(&Value::Bool(true)) {
                    assert!(
                        ["type", "enum", "allOf", "anyOf"].iter().any(|k| map.contains_key(*k)),
                        "nullable without a type: {}",
                        node
                    );
                }
                if let (Some(Value::Array(required)), Some(Value::Object(properties))) =
                    (map.get("required"), map.get("properties"))
                {
                    for name in required {
                        assert!(properties.contains_key(name.as_str().unwrap()), "required {} not declared", name);
                    }
                }
                map.values().for_each(|v| check_schemas(root, v));
            }
            Value::Array(items) => items.iter().for_each(|v| check_schemas(root, v)),
            _ => {}
        }
    }

    #[test]
    fn test_mixed_schema_document_is_valid() {
        let address = Schema::object([
            ("street", Schema::string()),
            ("zip", Schema::string().optional()),
        ])
        .named("Address");

        let search = ProcedureDescriptor::query(HttpMethod::Get, "/orgs/{org}/users")
            .header(HeaderParam::new("x-request-id"))
            .input(Schema::object([
                ("org", Schema::string()),
                ("q", Schema::string().optional()),
                ("limit", Schema::integer().default_value(20)),
                ("sort", Schema::enumeration(["asc", "desc"])),
                ("view", Schema::literal("full")),
                ("active", Schema::boolean().optional()),
            ]))
            .output(Schema::object([(
                "users",
                Schema::array(Schema::object([("id", Schema::string()), ("address", address.clone())])),
            )]));

        let update = ProcedureDescriptor::mutation(HttpMethod::Put, "/orgs/{org}/users/{id}")
            .protect()
            .content_types(["application/json", "application/x-www-form-urlencoded"])
            .input(Schema::object([
                ("org", Schema::string()),
                ("id", Schema::string()),
                ("nickname", Schema::union([Schema::string(), Schema::null()])),
                ("score", Schema::union([Schema::number(), Schema::string()])),
                ("address", address.clone().nullable()),
                ("note", Schema::null().optional()),
                ("tier", Schema::union([Schema::literal(1), Schema::literal(2)])),
                ("labels", Schema::record(Schema::string())),
                (
                    "profile",
                    Schema::intersection([
                        Schema::object([("bio", Schema::string())]),
                        Schema::object([("website", Schema::string().format("uri").optional())]),
                    ]),
                ),
            ]))
            .output(address.clone());

        let remove = ProcedureDescriptor::query(HttpMethod::Delete, "/orgs/{org}/users/{id}")
            .input(Schema::object([("org", Schema::string()), ("id", Schema::string())]))
            .output(Schema::union([Schema::literal(true), Schema::null()]));

        let doc = build(vec![
            ("users.search", search),
            ("users.update", update),
            ("users.remove", remove),
        ])
        .unwrap();

        assert_eq!(doc.paths.len(), 2);
        assert!(doc.components.schemas.contains_key("Address"));
        assert_valid_document(&doc);
    }

    #[test]
    fn test_same_path_different_methods() {
        let get = ProcedureDescriptor::query(HttpMethod::Get, "/items")
            .input(Schema::void())
            .output(Schema::any());
        let post = ProcedureDescriptor::mutation(HttpMethod::Post, "/items")
            .input(Schema::void())
            .output(Schema::any());
        let doc = build(vec![("list", get), ("create", post)]).unwrap();
        assert_eq!(doc.paths.len(), 1);
        assert!(doc.paths["/items"].get.is_some());
        assert!(doc.paths["/items"].post.is_some());
    }

    fn expect_error(descriptor: ProcedureDescriptor, predicate: impl Fn(&ConfigurationError) -> bool) {
        let err = build(vec![("p", descriptor)]).unwrap_err();
        assert!(err.to_string().starts_with("["), "missing procedure prefix: {}", err);
        assert!(predicate(err.root()), "unexpected error: {}", err);
    }

    #[test]
    fn test_configuration_errors() {
        expect_error(
            ProcedureDescriptor::query(HttpMethod::Post, "/x").input(Schema::void()).output(Schema::any()),
            |e| matches!(e, ConfigurationError::MethodKindMismatch { .. }),
        );
        expect_error(
            ProcedureDescriptor::mutation(HttpMethod::Get, "/x").input(Schema::void()).output(Schema::any()),
            |e| matches!(e, ConfigurationError::MethodKindMismatch { .. }),
        );
        expect_error(
            ProcedureDescriptor::subscription("/x").input(Schema::void()).output(Schema::any()),
            |e| matches!(e, ConfigurationError::UnsupportedSubscription),
        );
        expect_error(
            ProcedureDescriptor::query(HttpMethod::Get, "/x").output(Schema::any()),
            |e| matches!(e, ConfigurationError::MissingInputSchema),
        );
        expect_error(
            ProcedureDescriptor::query(HttpMethod::Get, "/x").input(Schema::void()),
            |e| matches!(e, ConfigurationError::MissingOutputSchema),
        );
        expect_error(
            ProcedureDescriptor::query(HttpMethod::Get, "/x").input(Schema::string()).output(Schema::any()),
            |e| matches!(e, ConfigurationError::InputNotObject),
        );
        expect_error(
            ProcedureDescriptor::query(HttpMethod::Get, "/x/{id}").input(Schema::void()).output(Schema::any()),
            |e| matches!(e, ConfigurationError::InputNotObject),
        );
        expect_error(
            ProcedureDescriptor::query(HttpMethod::Get, "/x/{id}")
                .input(Schema::object([("other", Schema::string())]))
                .output(Schema::any()),
            |e| matches!(e, ConfigurationError::MissingPathParameter(p) if p == "id"),
        );
        expect_error(
            ProcedureDescriptor::query(HttpMethod::Get, "/x/{id}")
                .input(Schema::object([("id", Schema::string().optional())]))
                .output(Schema::any()),
            |e| matches!(e, ConfigurationError::OptionalPathParameter(p) if p == "id"),
        );
        expect_error(
            ProcedureDescriptor::query(HttpMethod::Get, "/x")
                .input(Schema::object([("tags", Schema::array(Schema::string()))]))
                .output(Schema::any()),
            |e| matches!(e, ConfigurationError::FieldNotStringLike(p) if p == "tags"),
        );
        expect_error(
            ProcedureDescriptor::mutation(HttpMethod::Post, "/x")
                .input(Schema::void())
                .output(Schema::any())
                .content_types(Vec::<String>::new()),
            |e| matches!(e, ConfigurationError::EmptyContentTypes),
        );
    }

    #[test]
    fn test_coercible_query_fields() {
        let descriptor = ProcedureDescriptor::query(HttpMethod::Get, "/page")
            .input(Schema::object([("limit", Schema::number().optional())]))
            .output(Schema::any());

        assert!(build(vec![("page", descriptor.clone())]).is_ok());

        let err = OpenApiDocumentBuilder::new(DocumentInfo::default())
            .coerce_input(false)
            .procedure("page", Arc::new(descriptor))
            .build()
            .unwrap_err();
        assert!(matches!(err.root(), ConfigurationError::FieldNotStringLike(p) if p == "limit"));
    }

    #[test]
    fn test_mutation_body_fields_need_not_be_string_like() {
        let descriptor = ProcedureDescriptor::mutation(HttpMethod::Post, "/items")
            .input(Schema::object([("tags", Schema::array(Schema::string()))]))
            .output(Schema::any());
        assert!(build(vec![("create", descriptor)]).is_ok());
    }

    #[test]
    fn test_named_schemas_registered() {
        let user = Schema::object([("id", Schema::string())]).named("User");
        let descriptor = ProcedureDescriptor::query(HttpMethod::Get, "/me")
            .input(Schema::void())
            .output(user);
        let doc = build(vec![("me", descriptor)]).unwrap();
        assert!(doc.components.schemas.contains_key("User"));

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            json["paths"]["/me"]["get"]["responses"]["200"]["content"]["application/json"]["schema"]["properties"]["data"]["$ref"],
            "#/components/schemas/User"
        );
    }

    #[test]
    fn test_tags_and_external_docs() {
        let mut info = DocumentInfo::new("Test", "1.0.0", "/api");
        info.tags = vec!["users".to_string()];
        info.docs_url = Some("https://docs.example.com".to_string());

        let doc = OpenApiDocumentBuilder::new(info).build().unwrap();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["tags"], json!([{ "name": "users" }]));
        assert_eq!(json["externalDocs"]["url"], "https://docs.example.com");
    }

    #[test]
    fn test_deprecated_and_operation_id_override() {
        let descriptor = say_hello().deprecated().operation_id("greet");
        let doc = build(vec![("sayHello", descriptor)]).unwrap();
        let json = serde_json::to_value(doc.operation("/say-hello", HttpMethod::Get).unwrap()).unwrap();
        assert_eq!(json["deprecated"], true);
        assert_eq!(json["operationId"], "greet");
    }
}
