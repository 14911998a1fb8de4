//! Procedure descriptors, handlers and hierarchical registration

use crate::error::{ConfigurationError, GatewayResult};
use crate::mapping::HttpMethod;
use causeway_core::{ProcedureError, Schema};
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Procedure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcedureKind {
    /// Read operation; input travels in the query string
    Query,
    /// Write operation; input travels in the request body
    Mutation,
    /// Push stream; never exposed over REST
    Subscription,
}

impl ProcedureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcedureKind::Query => "query",
            ProcedureKind::Mutation => "mutation",
            ProcedureKind::Subscription => "subscription",
        }
    }

    /// Methods this kind may be bound to, rendered for error messages
    pub fn allowed_methods(&self) -> &'static str {
        match self {
            ProcedureKind::Query => "GET or DELETE",
            ProcedureKind::Mutation => "POST, PATCH or PUT",
            ProcedureKind::Subscription => "nothing",
        }
    }

    /// Whether `method` is acceptable for this kind
    pub fn allows(&self, method: HttpMethod) -> bool {
        match self {
            ProcedureKind::Query => matches!(method, HttpMethod::Get | HttpMethod::Delete),
            ProcedureKind::Mutation => method.accepts_body(),
            ProcedureKind::Subscription => false,
        }
    }
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra header parameter documented on an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderParam {
    pub name: String,
    pub required: bool,
    pub description: Option<String>,
}

impl HeaderParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// REST exposure metadata attached to a procedure
#[derive(Debug, Clone)]
pub struct ProcedureDescriptor {
    pub kind: ProcedureKind,
    pub method: HttpMethod,
    /// Path template, e.g. `/users/{id}`
    pub path: String,
    pub input: Option<Schema>,
    pub output: Option<Schema>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Marks the operation as requiring bearer authentication
    pub protected: bool,
    pub content_types: Vec<String>,
    pub headers: Vec<HeaderParam>,
    pub deprecated: bool,
    /// Disabled procedures are neither documented nor routed
    pub enabled: bool,
    pub operation_id: Option<String>,
}

impl ProcedureDescriptor {
    pub fn new(kind: ProcedureKind, method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            kind,
            method,
            path: path.into(),
            input: None,
            output: None,
            summary: None,
            description: None,
            tags: Vec::new(),
            protected: false,
            content_types: vec!["application/json".to_string()],
            headers: Vec::new(),
            deprecated: false,
            enabled: true,
            operation_id: None,
        }
    }

    pub fn query(method: HttpMethod, path: impl Into<String>) -> Self {
        Self::new(ProcedureKind::Query, method, path)
    }

    pub fn mutation(method: HttpMethod, path: impl Into<String>) -> Self {
        Self::new(ProcedureKind::Mutation, method, path)
    }

    pub fn subscription(path: impl Into<String>) -> Self {
        Self::new(ProcedureKind::Subscription, HttpMethod::Get, path)
    }

    pub fn input(mut self, schema: Schema) -> Self {
        self.input = Some(schema);
        self
    }

    pub fn output(mut self, schema: Schema) -> Self {
        self.output = Some(schema);
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn protect(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Replace the accepted request body content types
    pub fn content_types<I, S>(mut self, content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_types = content_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn header(mut self, header: HeaderParam) -> Self {
        self.headers.push(header);
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }
}

/// Future returned by a procedure handler
pub type HandlerFuture = BoxFuture<'static, Result<Value, ProcedureError>>;

/// Type-erased procedure handler working on validated JSON values
pub type HandlerFn<C> = Arc<dyn Fn(Value, Arc<C>) -> HandlerFuture + Send + Sync>;

/// Wrap a typed handler so it works on JSON values
pub fn typed_handler<C, I, O, F, Fut>(handler: F) -> HandlerFn<C>
where
    C: Send + Sync + 'static,
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(I, Arc<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ProcedureError>> + Send + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |input: Value, ctx: Arc<C>| -> HandlerFuture {
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            let input: I = serde_json::from_value(input).map_err(|e| {
                ProcedureError::internal(format!("Validated input does not fit handler type: {}", e))
                    .with_source(e)
            })?;
            let output = handler(input, ctx).await?;
            serde_json::to_value(output).map_err(ProcedureError::unknown)
        })
    })
}

/// A procedure waiting to be registered in a group
struct Procedure<C> {
    descriptor: ProcedureDescriptor,
    handler: HandlerFn<C>,
}

/// Procedure with its fully qualified name
pub struct RegisteredProcedure<C> {
    /// Dot-joined name, e.g. `users.byId`
    pub name: String,
    pub descriptor: Arc<ProcedureDescriptor>,
    pub handler: HandlerFn<C>,
}

impl<C> Clone for RegisteredProcedure<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            descriptor: Arc::clone(&self.descriptor),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<C> fmt::Debug for RegisteredProcedure<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredProcedure")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

enum GroupEntry<C> {
    Procedure(Procedure<C>),
    Group(ProcedureGroup<C>),
}

/// Named collection of procedures and nested groups
pub struct ProcedureGroup<C> {
    entries: Vec<(String, GroupEntry<C>)>,
}

impl<C> Default for ProcedureGroup<C> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<C: Send + Sync + 'static> ProcedureGroup<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a procedure with a typed handler
    pub fn procedure<I, O, F, Fut>(
        self,
        name: impl Into<String>,
        descriptor: ProcedureDescriptor,
        handler: F,
    ) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I, Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ProcedureError>> + Send + 'static,
    {
        self.raw_procedure(name, descriptor, typed_handler(handler))
    }

    /// Register a procedure with a handler that works on JSON values directly
    pub fn raw_procedure(
        mut self,
        name: impl Into<String>,
        descriptor: ProcedureDescriptor,
        handler: HandlerFn<C>,
    ) -> Self {
        self.entries.push((
            name.into(),
            GroupEntry::Procedure(Procedure { descriptor, handler }),
        ));
        self
    }

    /// Nest a group; its procedure names are prefixed with `name.`
    pub fn nest(mut self, name: impl Into<String>, group: ProcedureGroup<C>) -> Self {
        self.entries.push((name.into(), GroupEntry::Group(group)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flatten the hierarchy into registration order.
    ///
    /// Fails when two procedures end up with the same qualified name.
    pub fn flatten(self) -> GatewayResult<Vec<RegisteredProcedure<C>>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        flatten_into(self, "", &mut out, &mut seen)?;
        Ok(out)
    }
}

fn flatten_into<C>(
    group: ProcedureGroup<C>,
    prefix: &str,
    out: &mut Vec<RegisteredProcedure<C>>,
    seen: &mut HashSet<String>,
) -> GatewayResult<()> {
    for (name, entry) in group.entries {
        let qualified = if prefix.is_empty() {
            name
        } else {
            format!("{}.{}", prefix, name)
        };

        match entry {
            GroupEntry::Procedure(procedure) => {
                if !seen.insert(qualified.clone()) {
                    return Err(ConfigurationError::DuplicateProcedureName(qualified));
                }
                out.push(RegisteredProcedure {
                    name: qualified,
                    descriptor: Arc::new(procedure.descriptor),
                    handler: procedure.handler,
                });
            }
            GroupEntry::Group(nested) => flatten_into(nested, &qualified, out, seen)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Greeting {
        name: String,
    }

    fn noop_group() -> ProcedureGroup<()> {
        ProcedureGroup::new().procedure(
            "ping",
            ProcedureDescriptor::query(HttpMethod::Get, "/ping")
                .input(Schema::void())
                .output(Schema::string()),
            |_: Value, _ctx: Arc<()>| async { Ok("pong") },
        )
    }

    #[test]
    fn test_kind_allows_methods() {
        assert!(ProcedureKind::Query.allows(HttpMethod::Get));
        assert!(ProcedureKind::Query.allows(HttpMethod::Delete));
        assert!(!ProcedureKind::Query.allows(HttpMethod::Post));
        assert!(ProcedureKind::Mutation.allows(HttpMethod::Patch));
        assert!(!ProcedureKind::Mutation.allows(HttpMethod::Get));
        assert!(!ProcedureKind::Subscription.allows(HttpMethod::Get));
    }

    #[test]
    fn test_descriptor_defaults() {
        let descriptor = ProcedureDescriptor::mutation(HttpMethod::Post, "/users");
        assert_eq!(descriptor.content_types, ["application/json"]);
        assert!(descriptor.enabled);
        assert!(!descriptor.protected);
        assert!(descriptor.input.is_none());
    }

    #[test]
    fn test_flatten_qualifies_nested_names() {
        let group = ProcedureGroup::new()
            .nest("health", noop_group())
            .nest("admin", ProcedureGroup::new().nest("system", noop_group()));

        let names: Vec<String> = group.flatten().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["health.ping", "admin.system.ping"]);
    }

    #[test]
    fn test_flatten_rejects_duplicate_names() {
        let group = noop_group().procedure(
            "ping",
            ProcedureDescriptor::query(HttpMethod::Get, "/ping2"),
            |_: Value, _ctx: Arc<()>| async { Ok(()) },
        );

        let err = group.flatten().unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateProcedureName(name) if name == "ping"));
    }

    #[tokio::test]
    async fn test_typed_handler() {
        let handler = typed_handler(|input: Greeting, _ctx: Arc<()>| async move {
            Ok(json!({ "greeting": format!("Hello {}!", input.name) }))
        });

        let output = handler(json!({ "name": "Lily" }), Arc::new(())).await.unwrap();
        assert_eq!(output, json!({ "greeting": "Hello Lily!" }));
    }

    #[tokio::test]
    async fn test_typed_handler_propagates_errors() {
        let handler = typed_handler(|_: Value, _ctx: Arc<()>| async move {
            Err::<(), _>(ProcedureError::new(causeway_core::ErrorCode::Forbidden, "nope"))
        });

        let err = handler(json!({}), Arc::new(())).await.unwrap_err();
        assert_eq!(err.code(), causeway_core::ErrorCode::Forbidden);
    }
}
