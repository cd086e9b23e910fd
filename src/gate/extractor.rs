//! Request key extraction.

use axum::extract::ConnectInfo;
use http::header::HeaderName;
use http::request::Parts;
use std::net::SocketAddr;

/// Derives the caller key a request is limited under.
///
/// Returning `None` means the request carries no usable identity.
pub trait KeyExtractor: Send + Sync {
    fn extract(&self, parts: &Parts) -> Option<String>;
}

impl<F> KeyExtractor for F
where
    F: Fn(&Parts) -> Option<String> + Send + Sync,
{
    fn extract(&self, parts: &Parts) -> Option<String> {
        self(parts)
    }
}

/// Keys requests by the peer's IP address.
///
/// Reads axum's `ConnectInfo<SocketAddr>` extension, or a bare `SocketAddr`
/// extension inserted by other servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteIp;

impl KeyExtractor for RemoteIp {
    fn extract(&self, parts: &Parts) -> Option<String> {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0)
            .or_else(|| parts.extensions.get::<SocketAddr>().copied())
            .map(|addr| addr.ip().to_string())
    }
}

/// Keys requests by the value of a header, such as an API token.
#[derive(Debug, Clone)]
pub struct HeaderKey {
    name: HeaderName,
}

impl HeaderKey {
    pub fn new(name: HeaderName) -> Self {
        Self { name }
    }
}

impl KeyExtractor for HeaderKey {
    fn extract(&self, parts: &Parts) -> Option<String> {
        parts
            .headers
            .get(&self.name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}
