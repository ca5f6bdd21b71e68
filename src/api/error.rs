//! HTTP error taxonomy and the JSON error envelope.

use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{engine::EngineError, normalize::NormalizeError};

/// Reasons a gateway request fails.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request did not declare a JSON body.
    #[error("Content-Type must be application/json")]
    UnsupportedMediaType,
    /// The body exceeded the configured size.
    #[error("Payload too large")]
    PayloadTooLarge,
    /// The body was not valid JSON.
    #[error("Malformed JSON body")]
    MalformedJson,
    /// The body or one of its fields failed validation.
    #[error("{0}")]
    InvalidField(String),
    /// A field exceeded its maximum length.
    #[error("{0}")]
    FieldTooLong(String),
    /// The caller exhausted its rate-limit window.
    #[error("Too many requests")]
    RateLimited {
        /// Time until the window resets.
        retry_after: Duration,
    },
    /// Every heavy-route slot is taken.
    #[error("Server busy: too many concurrent verification requests")]
    Busy,
    /// No engine channel could be obtained.
    #[error("Apalache server unavailable")]
    BackendUnavailable,
    /// The engine call failed or replied with an unusable payload.
    #[error("Upstream engine error: {0}")]
    Upstream(String),
    /// The engine did not reply within the gateway deadline.
    #[error("Engine call timed out")]
    Timeout,
    /// A newer request from the same client session replaced this one.
    #[error("superseded by a newer request")]
    Superseded,
    /// No API route matched.
    #[error("Not found")]
    NotFound,
    /// Anything unexpected.
    #[error("Internal server error")]
    Internal,
}

impl GatewayError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge | Self::FieldTooLong(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MalformedJson | Self::InvalidField(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } | Self::Busy => StatusCode::TOO_MANY_REQUESTS,
            Self::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Superseded => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&EngineError> for GatewayError {
    fn from(value: &EngineError) -> Self {
        match value {
            EngineError::Deadline(_) => Self::Timeout,
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<NormalizeError> for GatewayError {
    fn from(value: NormalizeError) -> Self { Self::Upstream(value.to_string()) }
}

/// A [`GatewayError`] bound to the request it answers.
#[derive(Debug, Error)]
#[error("{error} (request {request_id})")]
pub struct ApiError {
    /// What went wrong.
    pub error: GatewayError,
    /// Correlation identifier of the failed request.
    pub request_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    error: String,
    request_id: &'a str,
}

impl ApiError {
    /// Bind `error` to `request_id`.
    #[must_use]
    pub fn new(error: GatewayError, request_id: impl Into<String>) -> Self {
        Self {
            error,
            request_id: request_id.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        let body = Json(Envelope {
            error: self.error.to_string(),
            request_id: &self.request_id,
        });
        let mut response = (status, body).into_response();
        if let GatewayError::RateLimited { retry_after } = self.error {
            let seconds = retry_after
                .as_secs()
                .saturating_add(u64::from(retry_after.subsec_nanos() > 0))
                .max(1);
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
