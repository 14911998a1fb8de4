//! Gateway dispatcher and its axum shim

use crate::caller::{ProcedureCall, ProcedureCaller, ProcedureTable};
use crate::config::{DocumentInfo, GatewayConfig};
use crate::decode::{decode_input, BoxError, DecodeOptions};
use crate::encode::{empty_response, error_response, error_shape, success_response};
use crate::error::{ConfigurationError, GatewayResult};
use crate::hooks::{CreateContextFn, ErrorEvent, GatewayHooks, ResponseMeta, ResponseMetaArgs};
use crate::mapping::normalize_path;
use crate::openapi::{OpenApiDocument, OpenApiDocumentBuilder};
use crate::procedure::{ProcedureDescriptor, ProcedureGroup};
use crate::routes::{RouteMatch, RouteTable};
use axum::{body::Body, extract::Request as AxumRequest, routing::get, Router};
use bytes::Bytes;
use causeway_core::{ErrorShape, ProcedureError};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::header::CONTENT_TYPE;
use http::{Method, Request, Response, StatusCode};
use http_body::Body as HttpBody;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Schema-driven REST gateway over a set of procedures
pub struct Gateway<C> {
    routes: RouteTable,
    caller: Arc<dyn ProcedureCaller<C>>,
    context: CreateContextFn<C>,
    hooks: GatewayHooks<C>,
    config: GatewayConfig,
    document: OpenApiDocument,
}

impl<C: Send + Sync + 'static> Gateway<C> {
    /// Start building a gateway for a procedure group
    pub fn builder(procedures: ProcedureGroup<C>) -> GatewayBuilder<C> {
        GatewayBuilder::new(procedures)
    }

    /// Get the OpenAPI document computed at build time
    pub fn document(&self) -> &OpenApiDocument {
        &self.document
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Number of routable procedures
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Serve one request; unmatched requests get a 404 envelope
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Bytes>
    where
        B: HttpBody<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let route = self.routes.lookup(request.method(), request.uri().path());
        match route {
            Some(route) => self.dispatch(route, request).await,
            None if request.method() == Method::HEAD => self.probe(),
            None => self.not_found(request.method(), request.uri().path()),
        }
    }

    /// Serve one request, handing it back untouched when nothing matches
    pub async fn handle_or_next<B>(&self, request: Request<B>) -> Result<Response<Bytes>, Request<B>>
    where
        B: HttpBody<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let route = self.routes.lookup(request.method(), request.uri().path());
        match route {
            Some(route) => Ok(self.dispatch(route, request).await),
            None if request.method() == Method::HEAD => Ok(self.probe()),
            None => {
                debug!("No route for {} {}, delegating", request.method(), request.uri().path());
                self.hooks.finish(None);
                Err(request)
            }
        }
    }

    fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            max_body_size: self.config.max_body_size,
            coerce_input: self.config.coerce_input,
        }
    }

    /// Bare HEAD with no route: liveness probe
    fn probe(&self) -> Response<Bytes> {
        self.hooks.finish(None);
        empty_response(StatusCode::NO_CONTENT)
    }

    fn not_found(&self, method: &Method, path: &str) -> Response<Bytes> {
        let error = ProcedureError::not_found();
        let response = self.fail(ErrorEvent {
            error: &error,
            kind: None,
            name: None,
            input: None,
            ctx: None,
            method,
            path,
        });
        self.hooks.finish(None);
        response
    }

    async fn dispatch<B>(&self, route: RouteMatch<'_>, request: Request<B>) -> Response<Bytes>
    where
        B: HttpBody<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        let entry = route.entry;
        debug!(
            "{} {} -> {} {}",
            parts.method,
            parts.uri.path(),
            entry.descriptor.kind,
            entry.name
        );

        let mut ctx: Option<Arc<C>> = None;
        let mut input: Option<Value> = None;
        let result = AssertUnwindSafe(self.invoke(&parts, body, &route, &mut ctx, &mut input))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panic_error(panic)));

        let response = match result {
            Ok(data) => {
                let meta = self.hooks.meta(ResponseMetaArgs {
                    kind: Some(entry.descriptor.kind),
                    name: Some(&entry.name),
                    ctx: ctx.as_deref(),
                    data: Some(&data),
                    error: None,
                });
                success_response(data, meta)
            }
            Err(error) => self.fail(ErrorEvent {
                error: &error,
                kind: Some(entry.descriptor.kind),
                name: Some(&entry.name),
                input: input.as_ref(),
                ctx: ctx.as_deref(),
                method: &parts.method,
                path: parts.uri.path(),
            }),
        };

        self.hooks.finish(ctx.as_deref());
        response
    }

    /// Decode, create the context, call. Records input and context as they
    /// become available so failures can report them.
    async fn invoke<B>(
        &self,
        parts: &http::request::Parts,
        body: B,
        route: &RouteMatch<'_>,
        ctx: &mut Option<Arc<C>>,
        input: &mut Option<Value>,
    ) -> Result<Value, ProcedureError>
    where
        B: HttpBody<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let decoded = decode_input(parts, body, route, self.decode_options()).await?;
        *input = decoded.clone();

        let context = Arc::new((self.context)(parts).await?);
        *ctx = Some(Arc::clone(&context));

        self.caller
            .call(ProcedureCall {
                kind: route.entry.descriptor.kind,
                name: route.entry.name.clone(),
                input: decoded,
                ctx: context,
            })
            .await
    }

    fn fail(&self, event: ErrorEvent<'_, C>) -> Response<Bytes> {
        let error = event.error;
        let procedure = event.name.unwrap_or("-");
        if error.status_code().is_server_error() {
            error!(
                "{} {} ({}) failed: {} (source: {:?})",
                event.method,
                event.path,
                procedure,
                error,
                std::error::Error::source(error)
            );
        } else {
            warn!("{} {} ({}) failed: {}", event.method, event.path, procedure, error);
        }

        let shape: ErrorShape = self
            .hooks
            .format(error_shape(error, self.config.expose_internal_errors), error);
        let meta = self.hooks.meta(ResponseMetaArgs {
            kind: event.kind,
            name: event.name,
            ctx: event.ctx,
            data: None,
            error: Some(error),
        });
        self.hooks.report(event);

        error_response(shape, meta)
    }

    /// Mount as an axum router: the gateway is the fallback, and the
    /// document is served at `openapi_path` when configured.
    pub fn into_router(self) -> Router {
        let openapi = self
            .config
            .openapi_path
            .as_deref()
            .map(|path| (normalize_path(path), self.document.to_json()));
        let gateway = Arc::new(self);

        let mut router = Router::new();
        match openapi {
            Some((path, Ok(json))) => {
                router = router.route(
                    &path,
                    get(move || async move { ([(CONTENT_TYPE, "application/json")], json) }),
                );
            }
            Some((_, Err(e))) => error!("Failed to serialize OpenAPI document: {}", e),
            None => {}
        }

        router.fallback(move |request: AxumRequest| async move {
            gateway.handle(request).await.map(Body::from)
        })
    }
}

/// A panic in the context factory, caller or handler becomes an unknown error
fn panic_error(panic: Box<dyn Any + Send>) -> ProcedureError {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    ProcedureError::internal(format!("Procedure panicked: {}", detail))
}

/// Gateway builder
pub struct GatewayBuilder<C> {
    procedures: ProcedureGroup<C>,
    info: DocumentInfo,
    config: GatewayConfig,
    hooks: GatewayHooks<C>,
    caller: Option<Arc<dyn ProcedureCaller<C>>>,
}

impl<C: Send + Sync + 'static> GatewayBuilder<C> {
    /// Create a new gateway builder
    pub fn new(procedures: ProcedureGroup<C>) -> Self {
        Self {
            procedures,
            info: DocumentInfo::default(),
            config: GatewayConfig::default(),
            hooks: GatewayHooks::default(),
            caller: None,
        }
    }

    /// Replace all document metadata
    pub fn info(mut self, info: DocumentInfo) -> Self {
        self.info = info;
        self
    }

    /// Set API title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.info.title = title.into();
        self
    }

    /// Set API version
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.info.version = version.into();
        self
    }

    /// Set API description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.info.description = Some(description.into());
        self
    }

    /// Set the server URL advertised in the document
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.info.base_url = base_url.into();
        self
    }

    pub fn docs_url(mut self, docs_url: impl Into<String>) -> Self {
        self.info.docs_url = Some(docs_url.into());
        self
    }

    /// Add a document-level tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.info.tags.push(tag.into());
        self
    }

    /// Replace the runtime configuration
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_body_size(mut self, max_body_size: Option<usize>) -> Self {
        self.config.max_body_size = max_body_size;
        self
    }

    pub fn coerce_input(mut self, coerce_input: bool) -> Self {
        self.config.coerce_input = coerce_input;
        self
    }

    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.config.expose_internal_errors = expose;
        self
    }

    /// Serve the document at this path from [`Gateway::into_router`]
    pub fn openapi_path(mut self, path: impl Into<String>) -> Self {
        self.config.openapi_path = Some(path.into());
        self
    }

    /// Set the per-request context factory
    pub fn create_context<F, Fut>(mut self, factory: F) -> Self
    where
        F: Fn(&http::request::Parts) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C, ProcedureError>> + Send + 'static,
    {
        let wrapped: CreateContextFn<C> = Arc::new(
            move |parts: &http::request::Parts| -> BoxFuture<'static, Result<C, ProcedureError>> {
                Box::pin(factory(parts))
            },
        );
        self.hooks.create_context = Some(wrapped);
        self
    }

    pub fn response_meta<F>(mut self, hook: F) -> Self
    where
        F: Fn(ResponseMetaArgs<'_, C>) -> ResponseMeta + Send + Sync + 'static,
    {
        self.hooks.response_meta = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(ErrorEvent<'_, C>) + Send + Sync + 'static,
    {
        self.hooks.on_error = Some(Arc::new(hook));
        self
    }

    pub fn format_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(ErrorShape, &ProcedureError) -> ErrorShape + Send + Sync + 'static,
    {
        self.hooks.format_error = Some(Arc::new(hook));
        self
    }

    pub fn teardown<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&C>) + Send + Sync + 'static,
    {
        self.hooks.teardown = Some(Arc::new(hook));
        self
    }

    /// Route calls through a custom caller instead of the group's handlers
    pub fn caller(mut self, caller: impl ProcedureCaller<C> + 'static) -> Self {
        self.caller = Some(Arc::new(caller));
        self
    }

    /// Build the gateway.
    ///
    /// Generates the document first so that every descriptor problem is
    /// reported before any route exists.
    pub fn build(self) -> GatewayResult<Gateway<C>> {
        let context = self
            .hooks
            .create_context
            .clone()
            .ok_or(ConfigurationError::MissingContextFactory)?;

        let procedures = self.procedures.flatten()?;
        let descriptors: Vec<(String, Arc<ProcedureDescriptor>)> = procedures
            .iter()
            .map(|p| (p.name.clone(), Arc::clone(&p.descriptor)))
            .collect();

        let document = OpenApiDocumentBuilder::new(self.info)
            .coerce_input(self.config.coerce_input)
            .procedures(descriptors.clone())
            .build()?;
        let routes = RouteTable::build(descriptors, self.config.coerce_input)?;

        let procedure_count = procedures.len();
        let caller = match self.caller {
            Some(caller) => caller,
            None => Arc::new(ProcedureTable::new(procedures)),
        };

        info!(
            "Built REST gateway with {} procedures and {} routes",
            procedure_count,
            routes.len()
        );

        Ok(Gateway {
            routes,
            caller,
            context,
            hooks: self.hooks,
            config: self.config,
            document,
        })
    }
}

impl<C: Default + Send + Sync + 'static> GatewayBuilder<C> {
    /// Use `C::default()` as the context of every request
    pub fn default_context(self) -> Self {
        self.create_context(|_| async { Ok(C::default()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::HttpMethod;
    use causeway_core::Schema;
    use http_body_util::Full;
    use serde_json::json;

    fn group() -> ProcedureGroup<()> {
        ProcedureGroup::new().procedure(
            "sayHello",
            ProcedureDescriptor::query(HttpMethod::Get, "/say-hello")
                .input(Schema::object([("name", Schema::string())]))
                .output(Schema::object([("greeting", Schema::string())])),
            |input: Value, _ctx: Arc<()>| async move {
                Ok(json!({ "greeting": format!("Hello {}!", input["name"].as_str().unwrap_or("")) }))
            },
        )
    }

    #[test]
    fn test_build_requires_context_factory() {
        let err = Gateway::builder(group()).build().err().unwrap();
        assert!(matches!(err, ConfigurationError::MissingContextFactory));
    }

    #[test]
    fn test_build_reports_document_errors() {
        let group = group().procedure(
            "bad",
            ProcedureDescriptor::query(HttpMethod::Post, "/bad")
                .input(Schema::void())
                .output(Schema::any()),
            |_: Value, _ctx: Arc<()>| async { Ok(()) },
        );
        let err = Gateway::builder(group).default_context().build().err().unwrap();
        assert!(err.to_string().starts_with("[query.bad]"));
    }

    #[tokio::test]
    async fn test_handle_success() {
        let gateway = Gateway::builder(group()).default_context().build().unwrap();
        assert_eq!(gateway.route_count(), 1);

        let request = Request::get("/say-hello?name=James").body(Full::<Bytes>::default()).unwrap();
        let response = gateway.handle(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, json!({ "ok": true, "data": { "greeting": "Hello James!" } }));
    }

    #[tokio::test]
    async fn test_handle_or_next_returns_request() {
        let gateway = Gateway::builder(group()).default_context().build().unwrap();
        let request = Request::get("/elsewhere").body(Full::<Bytes>::default()).unwrap();
        let returned = gateway.handle_or_next(request).await.err().unwrap();
        assert_eq!(returned.uri().path(), "/elsewhere");
    }
}
