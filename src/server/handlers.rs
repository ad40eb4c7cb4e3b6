use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::response::{CreatedResponse, ErrorBody, GeneratedResponse, SecretResponse};
use super::AppState;
use crate::config::duration;
use crate::errors::{EmberdropError, Result};
use crate::secret::Secret;

pub const DEFAULT_GENERATED_LENGTH: usize = 16;
pub const PASSPHRASE_HEADER: &str = "passphrase";
/// Longest lifetime a client may request.
pub const MAX_TTL: chrono::Duration = chrono::Duration::days(365);

/// Body of `POST /secrets`.
#[derive(Debug, Deserialize)]
pub struct CreateSecretRequest {
    pub value: Option<String>,
    pub passphrase: Option<String>,
    pub ttl: Option<String>,
}

/// `GET /secret?length=&specialCharacters=` (or `l=`/`sc=`).
///
/// Values that do not parse fall back to the defaults.
pub async fn generate_secret(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let length = param(&params, "length", "l")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_GENERATED_LENGTH);
    let special = param(&params, "specialCharacters", "sc")
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    let value = state.service.generate(length, special);

    if wants_plain_text(&headers) {
        return ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], value).into_response();
    }
    Json(GeneratedResponse { value }).into_response()
}

/// `POST /secrets`
pub async fn create_secret(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateSecretRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedResponse>)> {
    let Json(request) =
        payload.map_err(|e| EmberdropError::InvalidRequest(format!("malformed body: {}", e.body_text())))?;

    let value = request
        .value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EmberdropError::InvalidRequest("value is required".into()))?;

    let mut secret = Secret::new(value);
    if let Some(passphrase) = request.passphrase.filter(|p| !p.is_empty()) {
        secret = secret.with_passphrase(passphrase);
    }
    if let Some(ttl) = request.ttl.filter(|t| !t.is_empty()) {
        let ttl = duration::parse_signed(&ttl)?;
        if ttl <= chrono::Duration::zero() {
            return Err(EmberdropError::InvalidRequest("ttl must be positive".into()));
        }
        if ttl > MAX_TTL {
            return Err(EmberdropError::InvalidRequest("ttl must be at most 365d".into()));
        }
        secret = secret.with_ttl(ttl);
    }

    let created = state.service.create(secret).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse::from_secret(created))))
}

/// `GET /secrets/{id}` with an optional `Passphrase` header.
pub async fn get_secret(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SecretResponse>> {
    let secret = state.service.get(&id, passphrase(&headers)).await?;
    Ok(Json(SecretResponse::from_secret(secret)))
}

/// `DELETE /secrets/{id}`, with the same `Passphrase` rules as reading.
pub async fn delete_secret(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    state.service.delete(&id, passphrase(&headers)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /healthz`
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new(StatusCode::NOT_FOUND, "not found")),
    )
}

fn passphrase(headers: &HeaderMap) -> Option<&str> {
    headers.get(PASSPHRASE_HEADER).and_then(|v| v.to_str().ok())
}

fn param<'a>(params: &'a HashMap<String, String>, name: &str, alias: &str) -> Option<&'a str> {
    params
        .get(name)
        .or_else(|| params.get(alias))
        .map(String::as_str)
}

fn wants_plain_text(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/plain"))
        .unwrap_or(false)
}
