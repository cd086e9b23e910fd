//! Request admission gate.
//!
//! The gate wraps a [`RateLimiter`] with everything a request pipeline needs:
//! key extraction, optional bypass, rate limit headers and the policy for
//! counter store failures. [`Gate::evaluate`] makes the decision for one
//! request; [`GateLayer`] applies it as tower middleware.

mod extractor;
mod handler;
pub mod headers;
mod layer;

use http::request::Parts;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

pub use extractor::{HeaderKey, KeyExtractor, RemoteIp};
pub use handler::{ErrorHandler, InternalError, LimitHandler, RequestFilter, StatusMessage};
pub use headers::RateLimitHeaders;
pub use layer::{GateLayer, GateService};

use crate::clock::Clock;
use crate::config::GateConfig;
use crate::error::{GateError, Result, StoreError};
use crate::ratelimit::{Decision, Limit, RateLimiter};
use crate::store::CounterStore;

/// Key used for requests the extractor cannot identify.
pub const UNKNOWN_KEY: &str = "unknown";

/// What the gate decided for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The filter matched; the limiter was not consulted
    Bypassed,
    /// Within budget
    Admitted(RateLimitHeaders),
    /// Over budget
    Rejected {
        decision: Decision,
        headers: RateLimitHeaders,
    },
    /// The store failed and `skip_on_error` let the request through
    FailedOpen(StoreError),
}

impl Verdict {
    /// Whether the request should reach the inner service.
    pub fn proceeds(&self) -> bool {
        !matches!(self, Verdict::Rejected { .. })
    }
}

/// A fully configured admission gate.
pub struct Gate {
    config: GateConfig,
    limit: Limit,
    limiter: RateLimiter,
    key_extractor: Arc<dyn KeyExtractor>,
    limit_handler: Arc<dyn LimitHandler>,
    error_handler: Arc<dyn ErrorHandler>,
    filter: Option<Arc<dyn RequestFilter>>,
}

impl Gate {
    /// Start building a gate from `config`.
    pub fn builder(config: GateConfig) -> GateBuilder {
        GateBuilder::new(config)
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn limit(&self) -> &Limit {
        &self.limit
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Wrap this gate as tower middleware.
    pub fn layer(self) -> GateLayer {
        GateLayer::new(Arc::new(self))
    }

    pub(crate) fn limit_handler(&self) -> &dyn LimitHandler {
        self.limit_handler.as_ref()
    }

    pub(crate) fn error_handler(&self) -> &dyn ErrorHandler {
        self.error_handler.as_ref()
    }

    /// Decide whether the request described by `parts` may proceed.
    ///
    /// A store failure is logged, then returned as an error unless
    /// `skip_on_error` is set, in which case it becomes [`Verdict::FailedOpen`].
    /// Header timestamps are relative to the instant the decision was made.
    #[instrument(skip(self, parts), fields(method = %parts.method, path = %parts.uri.path()))]
    pub async fn evaluate(&self, parts: &Parts) -> Result<Verdict> {
        if let Some(filter) = &self.filter {
            if filter.skip(parts) {
                debug!("Request bypasses the gate");
                return Ok(Verdict::Bypassed);
            }
        }

        let caller = self.key_extractor.extract(parts).unwrap_or_else(|| {
            debug!("No caller key on request, using the shared unknown key");
            UNKNOWN_KEY.to_string()
        });

        let now = self.limiter.clock().now_millis();
        match self.check(&caller, now).await {
            Ok(decision) => {
                let headers = RateLimitHeaders::from_decision(&decision, now);
                if decision.allowed {
                    Ok(Verdict::Admitted(headers))
                } else {
                    debug!(
                        caller = %caller,
                        retry_after_ms = decision.retry_after.as_millis() as u64,
                        "Request rejected"
                    );
                    Ok(Verdict::Rejected { decision, headers })
                }
            }
            Err(err) if self.config.skip_on_error => {
                warn!(
                    caller = %caller,
                    error = %err,
                    "Counter store failed, letting request through"
                );
                Ok(Verdict::FailedOpen(err))
            }
            Err(err) => {
                error!(caller = %caller, error = %err, "Rate limit check failed");
                Err(GateError::Store(err))
            }
        }
    }

    async fn check(&self, caller: &str, now_ms: u64) -> std::result::Result<Decision, StoreError> {
        let check = self.limiter.allow_at(caller, &self.limit, now_ms);
        match self.config.store_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, check)
                .await
                .map_err(|_| StoreError::Timeout(timeout))?,
            None => check.await,
        }
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .field("filtered", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Gate`]; every collaborator except the store has a default.
pub struct GateBuilder {
    config: GateConfig,
    store: Option<Arc<dyn CounterStore>>,
    clock: Option<Arc<dyn Clock>>,
    key_extractor: Arc<dyn KeyExtractor>,
    limit_handler: Option<Arc<dyn LimitHandler>>,
    error_handler: Arc<dyn ErrorHandler>,
    filter: Option<Arc<dyn RequestFilter>>,
}

impl GateBuilder {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            store: None,
            clock: None,
            key_extractor: Arc::new(RemoteIp),
            limit_handler: None,
            error_handler: Arc::new(InternalError),
            filter: None,
        }
    }

    /// The shared counter store. Required.
    pub fn store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn key_extractor(mut self, extractor: impl KeyExtractor + 'static) -> Self {
        self.key_extractor = Arc::new(extractor);
        self
    }

    pub fn limit_handler(mut self, handler: impl LimitHandler + 'static) -> Self {
        self.limit_handler = Some(Arc::new(handler));
        self
    }

    pub fn error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    pub fn filter(mut self, filter: impl RequestFilter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Validate the configuration and produce the gate.
    pub fn build(self) -> Result<Gate> {
        let store = self
            .store
            .ok_or_else(|| GateError::Config("counter store is missing".to_string()))?;
        self.config.validate()?;
        let limit = self.config.limit()?;

        let mut limiter = RateLimiter::new(store).with_prefix(self.config.key_prefix.clone());
        if let Some(clock) = self.clock {
            limiter = limiter.with_clock(clock);
        }

        let limit_handler = match self.limit_handler {
            Some(handler) => handler,
            None => Arc::new(StatusMessage::new(
                self.config.status()?,
                self.config.message.clone(),
            )),
        };

        Ok(Gate {
            config: self.config,
            limit,
            limiter,
            key_extractor: self.key_extractor,
            limit_handler,
            error_handler: self.error_handler,
            filter: self.filter,
        })
    }
}
