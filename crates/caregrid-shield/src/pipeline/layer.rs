//! Tower integration: the pipeline as request middleware.
//!
//! The service resolves the client identity, buffers write bodies up to the
//! profile's size cap (so inspection and the downstream handler read the
//! same bytes), runs the orchestrator, and either forwards the request or
//! renders the rejection as a JSON response.

use super::{PipelineOrchestrator, PipelineVerdict};
use crate::domain::error::BlockReason;
use crate::domain::identity::client_identity;
use crate::guards::RequestContext;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderValue, Method, Request},
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::warn;

/// Shield middleware layer
#[derive(Clone)]
pub struct ShieldLayer {
    orchestrator: Arc<PipelineOrchestrator>,
    body_limit: u64,
}

impl ShieldLayer {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, body_limit: u64) -> Self {
        Self {
            orchestrator,
            body_limit,
        }
    }

    pub fn orchestrator(&self) -> Arc<PipelineOrchestrator> {
        Arc::clone(&self.orchestrator)
    }
}

impl<S> Layer<S> for ShieldLayer {
    type Service = ShieldService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ShieldService {
            inner,
            orchestrator: Arc::clone(&self.orchestrator),
            body_limit: self.body_limit,
        }
    }
}

/// Shield middleware service
#[derive(Clone)]
pub struct ShieldService<S> {
    inner: S,
    orchestrator: Arc<PipelineOrchestrator>,
    body_limit: u64,
}

impl<S> Service<Request<Body>> for ShieldService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let orchestrator = Arc::clone(&self.orchestrator);
        let body_limit = self.body_limit;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let peer = parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0);
            let identity = client_identity(&parts.headers, peer);

            let is_write = matches!(parts.method, Method::POST | Method::PUT | Method::PATCH);
            let declared = parts
                .headers
                .get(header::CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok());
            // A declared length beyond the cap is left unread; the size
            // guard rejects it from the declared header alone.
            let oversize_declared = declared.is_some_and(|length| length > body_limit);

            let (buffered, passthrough) = if is_write && !oversize_declared {
                let limit = usize::try_from(body_limit).unwrap_or(usize::MAX);
                match axum::body::to_bytes(body, limit).await {
                    Ok(bytes) => (Some(bytes.clone()), Body::from(bytes)),
                    Err(_) => {
                        warn!(
                            identity = %identity,
                            path = %parts.uri.path(),
                            "request body overran the read cap"
                        );
                        let ctx = RequestContext::from_parts(identity, &parts, None);
                        let reason = orchestrator.reject_overflow(&ctx, body_limit);
                        return Ok(blocked_response(&reason));
                    }
                }
            } else {
                (None, body)
            };

            let ctx = RequestContext::from_parts(identity, &parts, buffered);
            match orchestrator.evaluate(&ctx).await {
                PipelineVerdict::Allow => {
                    let req = Request::from_parts(parts, passthrough);
                    inner.call(req).await
                }
                PipelineVerdict::Reject(reason) => Ok(blocked_response(&reason)),
            }
        })
    }
}

/// Render a rejection as the wire-level JSON error response.
fn blocked_response(reason: &BlockReason) -> Response {
    let body = serde_json::to_vec(reason).unwrap_or_default();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = reason.status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Some(retry_after) = reason.retry_after {
        if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}
