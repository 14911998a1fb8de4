//! Caller-supplied hooks invoked around each request

use crate::procedure::ProcedureKind;
use causeway_core::{ErrorShape, ProcedureError};
use futures_util::future::BoxFuture;
use http::{HeaderMap, Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;

/// Builds the per-request context from the incoming request head
pub type CreateContextFn<C> =
    Arc<dyn Fn(&http::request::Parts) -> BoxFuture<'static, Result<C, ProcedureError>> + Send + Sync>;

/// Overrides status and headers of an outgoing response
pub type ResponseMetaFn<C> = Arc<dyn Fn(ResponseMetaArgs<'_, C>) -> ResponseMeta + Send + Sync>;

/// Observes failures; cannot change the response
pub type OnErrorFn<C> = Arc<dyn Fn(ErrorEvent<'_, C>) + Send + Sync>;

/// Rewrites the error shape; the wire code is always restored afterwards
pub type FormatErrorFn = Arc<dyn Fn(ErrorShape, &ProcedureError) -> ErrorShape + Send + Sync>;

/// Runs once after every request, whether or not a context was created
pub type TeardownFn<C> = Arc<dyn Fn(Option<&C>) + Send + Sync>;

/// What the response-meta hook gets to look at
pub struct ResponseMetaArgs<'a, C> {
    pub kind: Option<ProcedureKind>,
    pub name: Option<&'a str>,
    pub ctx: Option<&'a C>,
    /// Set on success
    pub data: Option<&'a Value>,
    /// Set on failure
    pub error: Option<&'a ProcedureError>,
}

/// Status and headers to apply to a response
#[derive(Debug, Clone, Default)]
pub struct ResponseMeta {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
}

impl ResponseMeta {
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn header(mut self, name: http::header::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A failure reported to the on-error hook
pub struct ErrorEvent<'a, C> {
    pub error: &'a ProcedureError,
    pub kind: Option<ProcedureKind>,
    pub name: Option<&'a str>,
    pub input: Option<&'a Value>,
    pub ctx: Option<&'a C>,
    pub method: &'a Method,
    pub path: &'a str,
}

/// Optional hooks; every one defaults to doing nothing
pub struct GatewayHooks<C> {
    pub create_context: Option<CreateContextFn<C>>,
    pub response_meta: Option<ResponseMetaFn<C>>,
    pub on_error: Option<OnErrorFn<C>>,
    pub format_error: Option<FormatErrorFn>,
    pub teardown: Option<TeardownFn<C>>,
}

impl<C> Default for GatewayHooks<C> {
    fn default() -> Self {
        Self {
            create_context: None,
            response_meta: None,
            on_error: None,
            format_error: None,
            teardown: None,
        }
    }
}

impl<C> Clone for GatewayHooks<C> {
    fn clone(&self) -> Self {
        Self {
            create_context: self.create_context.clone(),
            response_meta: self.response_meta.clone(),
            on_error: self.on_error.clone(),
            format_error: self.format_error.clone(),
            teardown: self.teardown.clone(),
        }
    }
}

impl<C> GatewayHooks<C> {
    pub(crate) fn meta(&self, args: ResponseMetaArgs<'_, C>) -> ResponseMeta {
        match &self.response_meta {
            Some(hook) => hook(args),
            None => ResponseMeta::default(),
        }
    }

    pub(crate) fn report(&self, event: ErrorEvent<'_, C>) {
        if let Some(hook) = &self.on_error {
            hook(event);
        }
    }

    /// Apply the format hook, keeping the original code
    pub(crate) fn format(&self, shape: ErrorShape, error: &ProcedureError) -> ErrorShape {
        match &self.format_error {
            Some(hook) => {
                let code = shape.code;
                let mut formatted = hook(shape, error);
                formatted.code = code;
                formatted
            }
            None => shape,
        }
    }

    pub(crate) fn finish(&self, ctx: Option<&C>) {
        if let Some(hook) = &self.teardown {
            hook(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_core::ErrorCode;

    #[test]
    fn test_format_restores_code() {
        let mut hooks: GatewayHooks<()> = GatewayHooks::default();
        hooks.format_error = Some(Arc::new(|mut shape: ErrorShape, _: &ProcedureError| {
            shape.code = ErrorCode::Conflict;
            shape.message = "rewritten".to_string();
            shape
        }));

        let error = ProcedureError::not_found();
        let shape = ErrorShape {
            message: "Not found".to_string(),
            code: ErrorCode::NotFound,
            issues: None,
        };
        let formatted = hooks.format(shape, &error);
        assert_eq!(formatted.code, ErrorCode::NotFound);
        assert_eq!(formatted.message, "rewritten");
    }

    #[test]
    fn test_defaults_are_inert() {
        let hooks: GatewayHooks<()> = GatewayHooks::default();
        let meta = hooks.meta(ResponseMetaArgs {
            kind: None,
            name: None,
            ctx: None,
            data: None,
            error: None,
        });
        assert!(meta.status.is_none());
        assert!(meta.headers.is_empty());
        hooks.finish(None);
    }
}
