//! Response bodies and the error-to-HTTP mapping.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::EmberdropError;
use crate::secret::Secret;

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub message: String,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            message: message.into(),
        }
    }
}

/// `GET /secret`
#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratedResponse {
    pub value: String,
}

/// `POST /secrets`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResponse {
    pub id: String,
    pub expires_at: DateTime<Utc>,
}

/// `GET /secrets/{id}`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretResponse {
    pub id: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl CreatedResponse {
    pub fn from_secret(secret: Secret) -> Self {
        Self {
            expires_at: secret.expires_at.unwrap_or_else(Utc::now),
            id: secret.id,
        }
    }
}

impl SecretResponse {
    pub fn from_secret(secret: Secret) -> Self {
        Self {
            expires_at: secret.expires_at.unwrap_or_else(Utc::now),
            id: secret.id,
            value: secret.value,
        }
    }
}

impl IntoResponse for EmberdropError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let mut response = (status, Json(ErrorBody::new(status, self.client_message()))).into_response();
        if let EmberdropError::TooManyRequests { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_uses_camel_case() {
        let body = ErrorBody::new(StatusCode::NOT_FOUND, "secret not found");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["statusCode"], 404);
        assert_eq!(json["message"], "secret not found");
    }

    #[test]
    fn storage_errors_become_500_without_detail() {
        let response = EmberdropError::StorageUnavailable("db at 10.1.1.1 down".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let response = EmberdropError::TooManyRequests { retry_after_secs: 7 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    }
}
