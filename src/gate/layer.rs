//! Tower middleware applying a [`Gate`] to HTTP requests.

use axum::body::Body;
use futures::future::BoxFuture;
use http::{Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use super::{Gate, Verdict};

/// A layer that puts a [`Gate`] in front of a service.
#[derive(Clone, Debug)]
pub struct GateLayer {
    gate: Arc<Gate>,
}

impl GateLayer {
    pub fn new(gate: Arc<Gate>) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for GateLayer {
    type Service = GateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GateService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

/// Middleware service produced by [`GateLayer`].
///
/// Admitted responses get `X-RateLimit-*` headers; rejections come from the
/// gate's limit handler with `Retry-After` added; undecidable requests get the
/// error handler's response. Only the inner service's own errors are
/// returned as `Err`.
#[derive(Clone, Debug)]
pub struct GateService<S> {
    inner: S,
    gate: Arc<Gate>,
}

impl<S, B> Service<Request<B>> for GateService<S>
where
    S: Service<Request<B>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let gate = self.gate.clone();
        // Keep the instance that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            match gate.evaluate(&parts).await {
                Ok(Verdict::Admitted(headers)) => {
                    let mut response = inner.call(Request::from_parts(parts, body)).await?;
                    headers.apply(response.headers_mut());
                    Ok(response)
                }
                Ok(Verdict::Rejected { decision, headers }) => {
                    let mut response = gate.limit_handler().on_limited(&parts, &decision);
                    headers.apply(response.headers_mut());
                    Ok(response)
                }
                Ok(Verdict::Bypassed) | Ok(Verdict::FailedOpen(_)) => {
                    inner.call(Request::from_parts(parts, body)).await
                }
                Err(err) => Ok(gate.error_handler().on_error(&parts, &err)),
            }
        })
    }
}
