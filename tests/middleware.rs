//! The gate as tower middleware in front of an HTTP service.

use async_trait::async_trait;
use axum::body::Body;
use http::header::RETRY_AFTER;
use http::request::Parts;
use http::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::{service_fn, Layer, ServiceExt};

use hivegate::clock::ManualClock;
use hivegate::gate::headers::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};
use hivegate::gate::{ErrorHandler, HeaderKey, LimitHandler};
use hivegate::store::{CasOutcome, CounterStore};
use hivegate::{Algorithm, Decision, Gate, GateConfig, GateError, MemoryStore, StoreError};

const START_MS: u64 = 1_704_067_200_000;

struct FlakyStore;

#[async_trait]
impl CounterStore for FlakyStore {
    async fn increment_and_expire(&self, _key: &str, _ttl: Duration) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection reset by peer".to_string()))
    }

    async fn compare_and_swap(
        &self,
        _key: &str,
        _expected: Option<&[u8]>,
        _new: &[u8],
        _ttl: Duration,
    ) -> Result<CasOutcome, StoreError> {
        Err(StoreError::Unavailable("connection reset by peer".to_string()))
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Unavailable("connection reset by peer".to_string()))
    }
}

fn memory_gate(config: GateConfig) -> Gate {
    let clock = Arc::new(ManualClock::new(START_MS));
    Gate::builder(config)
        .store(Arc::new(MemoryStore::with_clock(clock.clone())))
        .clock(clock)
        .build()
        .unwrap()
}

fn request() -> Request<Body> {
    let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
    request
        .extensions_mut()
        .insert(SocketAddr::from(([127, 0, 0, 1], 50000)));
    request
}

async fn send(gate: &Arc<Gate>, request: Request<Body>) -> Response<Body> {
    let inner = service_fn(|_req: Request<Body>| async {
        Ok::<_, Infallible>(Response::new(Body::from("Welcome!")))
    });
    hivegate::GateLayer::new(gate.clone())
        .layer(inner)
        .oneshot(request)
        .await
        .unwrap()
}

#[tokio::test]
async fn admitted_responses_carry_rate_limit_headers() {
    let gate = Arc::new(memory_gate(GateConfig::default().with_max(3).with_burst(3)));

    let response = send(&gate, request()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[X_RATELIMIT_LIMIT], "3");
    assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "2");
    // Fixed windows of one minute: the window containing START_MS ends at +60s
    assert_eq!(response.headers()[X_RATELIMIT_RESET], "1704067260");
    assert!(response.headers().get(RETRY_AFTER).is_none());
}

#[tokio::test]
async fn rejection_uses_configured_status_and_retry_after() {
    let config = GateConfig {
        max: 1,
        burst: 1,
        period_ms: 10_000,
        algorithm: Algorithm::Gcra,
        status_code: 503,
        message: "come back later".to_string(),
        ..GateConfig::default()
    };
    let gate = Arc::new(memory_gate(config));

    assert_eq!(send(&gate, request()).await.status(), StatusCode::OK);

    let response = send(&gate, request()).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()[RETRY_AFTER], "1704067210");
    assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "0");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"come back later");
}

#[tokio::test]
async fn store_failure_is_a_server_error_by_default() {
    let gate = Arc::new(
        Gate::builder(GateConfig::default())
            .store(Arc::new(FlakyStore))
            .build()
            .unwrap(),
    );

    let response = send(&gate, request()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(X_RATELIMIT_LIMIT).is_none());
}

#[tokio::test]
async fn store_failure_proceeds_with_skip_on_error() {
    let gate = Arc::new(
        Gate::builder(GateConfig::default().with_skip_on_error(true))
            .store(Arc::new(FlakyStore))
            .build()
            .unwrap(),
    );

    let response = send(&gate, request()).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn filtered_requests_skip_the_gate() {
    let clock = Arc::new(ManualClock::new(START_MS));
    let gate = Arc::new(
        Gate::builder(GateConfig::default().with_max(1))
            .store(Arc::new(FlakyStore))
            .clock(clock)
            .filter(|parts: &Parts| parts.uri.path().starts_with("/health"))
            .build()
            .unwrap(),
    );

    let health = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let response = send(&gate, health).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(X_RATELIMIT_LIMIT).is_none());
}

struct Teapot;

impl LimitHandler for Teapot {
    fn on_limited(&self, _parts: &Parts, decision: &Decision) -> Response<Body> {
        let mut response = Response::new(Body::from(format!("limit {}", decision.limit)));
        *response.status_mut() = StatusCode::IM_A_TEAPOT;
        response
    }
}

struct Unavailable;

impl ErrorHandler for Unavailable {
    fn on_error(&self, _parts: &Parts, err: &GateError) -> Response<Body> {
        assert!(err.is_store());
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        response
    }
}

#[tokio::test]
async fn custom_handlers_and_header_keys() {
    let clock = Arc::new(ManualClock::new(START_MS));
    let gate = Arc::new(
        Gate::builder(GateConfig::default().with_max(1))
            .store(Arc::new(MemoryStore::with_clock(clock.clone())))
            .clock(clock)
            .key_extractor(HeaderKey::new(http::HeaderName::from_static("x-api-key")))
            .limit_handler(Teapot)
            .build()
            .unwrap(),
    );

    let keyed = |key: &str| {
        Request::builder()
            .uri("/")
            .header("x-api-key", key)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(send(&gate, keyed("alpha")).await.status(), StatusCode::OK);
    assert_eq!(send(&gate, keyed("beta")).await.status(), StatusCode::OK);

    let response = send(&gate, keyed("alpha")).await;
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert!(response.headers().get(RETRY_AFTER).is_some());

    let failing = Arc::new(
        Gate::builder(GateConfig::default())
            .store(Arc::new(FlakyStore))
            .error_handler(Unavailable)
            .build()
            .unwrap(),
    );
    assert_eq!(
        send(&failing, request()).await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}
