//! Metadata middleware for REST gateway
//!
//! Before the handler runs, the request is annotated with a [`CallContext`]
//! stored in the request extensions. Handlers issue the RPC call with that
//! context and put the context carrying
//! [`ServerMetadata`](quill_metadata::ServerMetadata) into the response
//! extensions, where it is rendered into response headers on the way out.

use axum::{
    extract::{OriginalUri, Request, State},
    http::{HeaderMap, Method, Uri},
    middleware::Next,
    response::Response,
};
use quill_metadata::{CallContext, MetadataPolicy, MetadataResult, RequestView};
use std::sync::Arc;
use tracing::debug;

/// Metadata middleware
#[derive(Clone, Debug)]
pub struct MetadataMiddleware {
    policy: Arc<MetadataPolicy>,
}

impl MetadataMiddleware {
    /// Create a new metadata middleware, rejecting malformed policies
    pub fn new(policy: MetadataPolicy) -> MetadataResult<Self> {
        policy.validate()?;
        Ok(Self {
            policy: Arc::new(policy),
        })
    }

    pub fn policy(&self) -> &MetadataPolicy {
        &self.policy
    }

    /// Attach request metadata to the context in the request extensions
    fn annotate_request(&self, request: &mut Request) {
        let base = request
            .extensions()
            .get::<CallContext>()
            .cloned()
            .unwrap_or_default();
        let view: &Request = request;
        let ctx = match view.extensions().get::<OriginalUri>() {
            Some(OriginalUri(uri)) => {
                let received = ReceivedRequest { request: view, uri };
                self.policy.annotate(&base, &received)
            }
            None => self.policy.annotate(&base, view),
        };
        request.extensions_mut().insert(ctx);
    }

    /// Render server metadata found in the response extensions
    fn render_response(response: &mut Response) {
        let Some(ctx) = response.extensions_mut().remove::<CallContext>() else {
            return;
        };
        if let Some(md) = ctx.server_metadata() {
            let written = md.write_response_headers(response.headers_mut());
            debug!(written, "Rendered server metadata into response headers");
        }
    }

    /// Create middleware handler
    ///
    /// Use with `axum::middleware::from_fn_with_state`.
    pub async fn handle(
        State(middleware): State<MetadataMiddleware>,
        mut request: Request,
        next: Next,
    ) -> Response {
        middleware.annotate_request(&mut request);
        let mut response = next.run(request).await;
        Self::render_response(&mut response);
        response
    }
}

/// Request as the client sent it. Nested routers strip their prefix from
/// `Request::uri`, so the target comes from [`OriginalUri`].
struct ReceivedRequest<'a> {
    request: &'a Request,
    uri: &'a Uri,
}

impl RequestView for ReceivedRequest<'_> {
    fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    fn method(&self) -> &Method {
        self.request.method()
    }

    fn uri(&self) -> &Uri {
        self.uri
    }
}

impl Default for MetadataMiddleware {
    fn default() -> Self {
        Self {
            policy: Arc::new(MetadataPolicy::default()),
        }
    }
}
