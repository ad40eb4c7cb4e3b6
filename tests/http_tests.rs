//! HTTP surface tests, driven through the router without a socket.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use emberdrop::ratelimit::RateLimiter;
use emberdrop::secret::{SecretRepository, SecretService};
use emberdrop::server::{self, AppState};
use emberdrop::store::memory::MemoryStore;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

fn state() -> AppState {
    let repository = SecretRepository::new(Arc::new(MemoryStore::new()));
    let service = SecretService::new(repository, "http-test-key").unwrap();
    AppState::new(Arc::new(service))
}

fn app() -> Router {
    server::router(state())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

fn post_secret(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/secrets")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_secret(id: &str, passphrase: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(format!("/secrets/{id}"));
    if let Some(p) = passphrase {
        builder = builder.header("Passphrase", p);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn create_then_redeem_once() {
    let app = app();

    let (status, _, body) = send(&app, post_secret(json!({ "value": "hunter2", "ttl": "1h" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let created = json_body(&body);
    let id = created["id"].as_str().unwrap().to_string();
    assert!(created["expiresAt"].is_string());
    assert!(created.get("value").is_none());

    let (status, _, body) = send(&app, get_secret(&id, None)).await;
    assert_eq!(status, StatusCode::OK);
    let redeemed = json_body(&body);
    assert_eq!(redeemed["id"], id.as_str());
    assert_eq!(redeemed["value"], "hunter2");
    assert_eq!(redeemed["expiresAt"], created["expiresAt"]);

    let (status, _, body) = send(&app, get_secret(&id, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error = json_body(&body);
    assert_eq!(error["statusCode"], 404);
    assert!(error["message"].is_string());
}

#[tokio::test]
async fn passphrase_header_is_required_to_decrypt() {
    let app = app();

    let (_, _, body) = send(
        &app,
        post_secret(json!({ "value": "vault", "passphrase": "pw" })),
    )
    .await;
    let id = json_body(&body)["id"].as_str().unwrap().to_string();

    let (status, _, body) = send(&app, get_secret(&id, Some("wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body)["statusCode"], 401);

    let (status, _, body) = send(&app, get_secret(&id, Some("pw"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["value"], "vault");
}

#[tokio::test]
async fn invalid_create_requests_are_400() {
    let app = app();

    let cases = [
        json!({}),
        json!({ "value": "" }),
        json!({ "value": "x".repeat(5001) }),
        json!({ "value": "x", "ttl": "soon" }),
        json!({ "value": "x", "ttl": "-5m" }),
        json!({ "value": "x", "ttl": "0" }),
        json!({ "value": "x", "ttl": "366d" }),
        json!({ "value": "x", "ttl": "99999999d" }),
    ];
    for case in cases {
        let (status, _, body) = send(&app, post_secret(case.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{case}");
        assert_eq!(json_body(&body)["statusCode"], 400);
    }

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/secrets")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, _) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_returns_204_then_404() {
    let app = app();

    let (_, _, body) = send(&app, post_secret(json!({ "value": "gone" }))).await;
    let id = json_body(&body)["id"].as_str().unwrap().to_string();

    let delete = |id: &str| {
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/secrets/{id}"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _, body) = send(&app, delete(&id)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let (status, _, _) = send(&app, delete(&id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app, get_secret(&id, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_checks_the_passphrase() {
    let app = app();

    let (_, _, body) = send(
        &app,
        post_secret(json!({ "value": "guarded", "passphrase": "pw" })),
    )
    .await;
    let id = json_body(&body)["id"].as_str().unwrap().to_string();

    let delete = |passphrase: Option<&str>| {
        let mut builder = Request::builder()
            .method(Method::DELETE)
            .uri(format!("/secrets/{id}"));
        if let Some(p) = passphrase {
            builder = builder.header("Passphrase", p);
        }
        builder.body(Body::empty()).unwrap()
    };

    let (status, _, _) = send(&app, delete(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, _) = send(&app, delete(Some("wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(&app, delete(Some("pw"))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = send(&app, get_secret(&id, Some("pw"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = app();

    let (_, headers, _) = send(
        &app,
        Request::builder().uri("/healthz").body(Body::empty()).unwrap(),
    )
    .await;
    let generated = headers["x-request-id"].to_str().unwrap();
    assert!(!generated.is_empty());

    let (_, headers, _) = send(
        &app,
        Request::builder()
            .uri("/healthz")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(headers["x-request-id"], "abc-123");
}

#[tokio::test]
async fn generate_returns_json_by_default() {
    let app = app();

    let request = Request::builder()
        .uri("/secret?length=24&specialCharacters=true")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let value = json_body(&body)["value"].as_str().unwrap().to_string();
    assert_eq!(value.chars().count(), 24);

    let request = Request::builder().uri("/secret").body(Body::empty()).unwrap();
    let (_, _, body) = send(&app, request).await;
    assert_eq!(json_body(&body)["value"].as_str().unwrap().len(), 16);
}

#[tokio::test]
async fn generate_honours_short_params_and_plain_text() {
    let app = app();

    let request = Request::builder()
        .uri("/secret?l=8&sc=false")
        .header(header::ACCEPT, "text/plain")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let text = String::from_utf8(body).unwrap();
    assert_eq!(text.len(), 8);
    assert!(text.chars().all(|c| c.is_ascii_alphabetic()));
}

#[tokio::test]
async fn generate_clamps_length() {
    let app = app();

    let request = Request::builder()
        .uri("/secret?length=100000")
        .body(Body::empty())
        .unwrap();
    let (_, _, body) = send(&app, request).await;
    assert_eq!(json_body(&body)["value"].as_str().unwrap().len(), 512);
}

#[tokio::test]
async fn health_and_unknown_routes() {
    let app = app();

    let (status, _, body) = send(
        &app,
        Request::builder().uri("/healthz").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["status"], "ok");

    let (status, _, body) = send(
        &app,
        Request::builder().uri("/nope").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["statusCode"], 404);
}

#[tokio::test]
async fn rate_limiter_returns_429_with_retry_after() {
    let limiter = Arc::new(RateLimiter::new(0.5, 2));
    let app = server::router(state().with_limiter(limiter));

    let generate = |ip: &str| {
        Request::builder()
            .uri("/secret")
            .header("X-Forwarded-For", ip)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..2 {
        let (status, _, _) = send(&app, generate("203.0.113.7")).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, headers, body) = send(&app, generate("203.0.113.7")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!(retry_after >= 1);
    assert_eq!(json_body(&body)["statusCode"], 429);

    // Other clients have their own bucket.
    let (status, _, _) = send(&app, generate("198.51.100.1")).await;
    assert_eq!(status, StatusCode::OK);

    // Health checks are never limited.
    let health = Request::builder()
        .uri("/healthz")
        .header("X-Forwarded-For", "203.0.113.7")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, health).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn serve_over_a_real_socket() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(server::serve(listener, state(), async {
        let _ = rx.await;
    }));

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));

    tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
