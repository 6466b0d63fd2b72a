//! Error-to-HTTP response conversion.
//!
//! Proxy failures render as `{ message, error, code, url }`; everything else
//! as `{ error, code }`. Both carry the request id when one is known.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hivestream_proxy::{forward, ProxyError};
use serde_json::json;

/// Failure surfaced by a route handler or middleware.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Proxy(e) => e.http_status(),
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Proxy(e) => e.code(),
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Attach a request id to the rendered body.
    pub fn with_request_id(self, id: Option<String>) -> WithRequestId {
        WithRequestId {
            inner: self,
            request_id: id,
        }
    }
}

/// [`AppError`] tagged with the id of the request that produced it.
#[derive(Debug)]
pub struct WithRequestId {
    inner: AppError,
    request_id: Option<String>,
}

impl IntoResponse for WithRequestId {
    fn into_response(self) -> Response {
        render(self.inner, self.request_id)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        render(self, None)
    }
}

fn render(err: AppError, request_id: Option<String>) -> Response {
    let status = err.status();

    if status.is_server_error() {
        tracing::error!(
            status = %status,
            code = err.code(),
            error = %err,
            "Server error in handler"
        );
    } else {
        tracing::debug!(status = %status, code = err.code(), error = %err, "Client error");
    }

    let body = match &err {
        AppError::Proxy(e) => json!({
            "message": e.summary(),
            "error": e.to_string(),
            "code": e.code(),
            "url": e.url(),
            "request_id": request_id,
        }),
        other => json!({
            "error": other.to_string(),
            "code": other.code(),
            "request_id": request_id,
        }),
    };

    let mut response = (status, axum::Json(body)).into_response();
    if matches!(err, AppError::Proxy(_)) {
        // Players read proxy errors cross-origin too.
        forward::apply_cors(response.headers_mut());
    }
    response
}
