//! Pluggable responses and request filtering.

use axum::body::Body;
use http::request::Parts;
use http::{header, HeaderValue, Response, StatusCode};

use crate::error::GateError;
use crate::ratelimit::Decision;

/// Builds the response sent when a request is over budget.
///
/// Rate limit headers are added to whatever this returns.
pub trait LimitHandler: Send + Sync {
    fn on_limited(&self, parts: &Parts, decision: &Decision) -> Response<Body>;
}

/// Builds the response sent when the gate could not reach a decision.
///
/// The gate logs the error before calling this.
pub trait ErrorHandler: Send + Sync {
    fn on_error(&self, parts: &Parts, error: &GateError) -> Response<Body>;
}

/// Selects requests that bypass the gate entirely.
pub trait RequestFilter: Send + Sync {
    fn skip(&self, parts: &Parts) -> bool;
}

impl<F> RequestFilter for F
where
    F: Fn(&Parts) -> bool + Send + Sync,
{
    fn skip(&self, parts: &Parts) -> bool {
        self(parts)
    }
}

fn plain_text(status: StatusCode, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Replies with a fixed status code and message.
#[derive(Debug, Clone)]
pub struct StatusMessage {
    status: StatusCode,
    message: String,
}

impl StatusMessage {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl LimitHandler for StatusMessage {
    fn on_limited(&self, _parts: &Parts, _decision: &Decision) -> Response<Body> {
        plain_text(self.status, self.message.clone())
    }
}

/// Replies 500. The gate has already logged the failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct InternalError;

impl ErrorHandler for InternalError {
    fn on_error(&self, _parts: &Parts, _err: &GateError) -> Response<Body> {
        plain_text(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_string(),
        )
    }
}
