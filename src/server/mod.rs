//! HTTP surface.
//!
//! | Method   | Path             | Purpose                               |
//! |----------|------------------|---------------------------------------|
//! | `GET`    | `/secret`        | generate a random string              |
//! | `POST`   | `/secrets`       | store a secret                        |
//! | `GET`    | `/secrets/{id}`  | redeem a secret (burn-after-read)     |
//! | `DELETE` | `/secrets/{id}`  | delete a secret without reading it    |
//! | `GET`    | `/healthz`       | liveness, exempt from rate limiting   |
//!
//! Every response carries an `x-request-id` (the caller's, or a fresh
//! UUID) and is logged with its method, path, status, and latency.

pub mod client_ip;
pub mod handlers;
pub mod response;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::{Level, Span};

use crate::errors::Result;
use crate::ratelimit::RateLimiter;
use crate::secret::SecretService;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SecretService>,
    /// `None` disables rate limiting.
    pub limiter: Option<Arc<RateLimiter>>,
}

impl AppState {
    pub fn new(service: Arc<SecretService>) -> Self {
        Self {
            service,
            limiter: None,
        }
    }

    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/secret", get(handlers::generate_secret))
        .route("/secrets", axum::routing::post(handlers::create_secret))
        .route(
            "/secrets/:id",
            get(handlers::get_secret).delete(handlers::delete_secret),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/healthz", get(handlers::health))
        .merge(api)
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn request_span(request: &Request) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(limiter) = &state.limiter else {
        return next.run(request).await;
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_ip::client_key(request.headers(), peer);

    match limiter.check(&key) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}
