//! Failure taxonomy for the proxy pipeline.
//!
//! Validation failures are client errors and short-circuit before any
//! upstream I/O. Everything that goes wrong while talking to upstream maps to
//! a server error. Nothing here is retried; retry policy belongs to callers.

use std::time::Duration;

use axum::http::StatusCode;
use url::Url;

/// Error produced by the validator or the fetcher.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The `url` query parameter is absent or empty.
    #[error("parameter 'url' is required")]
    MissingParameter,

    /// The target could not be parsed as an absolute URL.
    #[error("invalid URL '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    /// The target scheme is not `http` or `https`.
    #[error("protocol '{scheme}' is not allowed")]
    DisallowedProtocol { url: String, scheme: String },

    /// The redirect chain exceeded the ceiling.
    #[error("too many redirects (limit {limit})")]
    TooManyRedirects { url: String, limit: u8 },

    /// A single hop did not produce response headers in time.
    #[error("upstream did not respond within {timeout:?}")]
    UpstreamTimeout { url: String, timeout: Duration },

    /// DNS, connect, reset or TLS failure.
    #[error("upstream unreachable: {message}")]
    UpstreamUnreachable { url: String, message: String },

    /// Upstream answered with something we cannot act on.
    #[error("upstream protocol error: {message}")]
    UpstreamProtocolError { url: String, message: String },
}

impl ProxyError {
    /// HTTP status the error maps to.
    pub fn http_status(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Whether the failure was caused by the inbound request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter | Self::MalformedUrl { .. } | Self::DisallowedProtocol { .. }
        )
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingParameter => "missing_parameter",
            Self::MalformedUrl { .. } => "malformed_url",
            Self::DisallowedProtocol { .. } => "disallowed_protocol",
            Self::TooManyRedirects { .. } => "too_many_redirects",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::UpstreamUnreachable { .. } => "upstream_unreachable",
            Self::UpstreamProtocolError { .. } => "upstream_protocol_error",
        }
    }

    /// Short human-readable summary, independent of the diagnostic detail.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::MissingParameter => "Parameter 'url' is required.",
            Self::MalformedUrl { .. } => "Invalid URL.",
            Self::DisallowedProtocol { .. } => "Protocol not allowed.",
            _ => "Failed to fetch the resource.",
        }
    }

    /// The URL the failure relates to, when one is known.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::MissingParameter => None,
            Self::MalformedUrl { url, .. }
            | Self::DisallowedProtocol { url, .. }
            | Self::TooManyRedirects { url, .. }
            | Self::UpstreamTimeout { url, .. }
            | Self::UpstreamUnreachable { url, .. }
            | Self::UpstreamProtocolError { url, .. } => Some(url),
        }
    }

    /// Classify a `reqwest` failure for the given hop.
    pub(crate) fn from_reqwest(url: &Url, err: reqwest::Error, timeout: Duration) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            return Self::UpstreamTimeout { url, timeout };
        }

        let message = error_chain(&err);
        if err.is_body() || err.is_decode() || err.is_redirect() {
            Self::UpstreamProtocolError { url, message }
        } else {
            Self::UpstreamUnreachable { url, message }
        }
    }
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Result alias for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
