//! `/api/proxy`: open media proxy endpoint.

use crate::server::error::AppError;
use crate::server::request_id::RequestId;
use crate::server::AppContext;
use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, request::Parts, HeaderMap, Request, Uri},
    response::{IntoResponse, Response},
};
use hivestream_proxy::{forward, validate_target, ProxyError, ProxyRequest};
use serde::Deserialize;
use url::Url;

/// Path the proxy is mounted at, used when deriving the rewrite base.
pub const PROXY_PATH: &str = "/api/proxy";

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

/// `GET|HEAD /api/proxy?url=...`
pub async fn proxy(
    State(ctx): State<AppContext>,
    query: Result<Query<ProxyQuery>, QueryRejection>,
    request: Request<Body>,
) -> Response {
    let (parts, _body) = request.into_parts();
    let request_id = current_request_id(&parts);

    let target = query
        .map_err(|rejection| malformed_query(&parts.uri, &rejection))
        .and_then(|Query(query)| validate_target(query.url.as_deref()));

    match target {
        Ok(target) => forward_to_upstream(&ctx, target, &parts, request_id).await,
        Err(e) => AppError::from(e).with_request_id(request_id).into_response(),
    }
}

/// `OPTIONS /api/proxy`
pub async fn preflight() -> Response {
    forward::preflight_response()
}

/// A query string serde could not map (duplicate `url`, bad encoding).
fn malformed_query(uri: &Uri, rejection: &QueryRejection) -> ProxyError {
    ProxyError::MalformedUrl {
        url: uri.query().unwrap_or_default().to_string(),
        reason: rejection.body_text(),
    }
}

/// Run a validated target through the proxy and render the outcome.
pub(crate) async fn forward_to_upstream(
    ctx: &AppContext,
    target: Url,
    parts: &Parts,
    request_id: Option<String>,
) -> Response {
    let base = proxy_base_url(ctx, &parts.headers, &parts.uri);
    let proxy_request =
        ProxyRequest::new(target, parts.method.clone()).with_client_headers(&parts.headers);

    match ctx.proxy.proxy(proxy_request, &base).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(url = ?e.url(), code = e.code(), error = %e, "Proxy request failed");
            AppError::from(e).with_request_id(request_id).into_response()
        }
    }
}

/// Externally visible proxy endpoint for rewritten manifests.
///
/// The configured `public_base_url` wins; otherwise it is derived from
/// `X-Forwarded-Proto` (default `https`) and `Host`, then the request URI
/// authority, then `localhost`.
pub fn proxy_base_url(ctx: &AppContext, headers: &HeaderMap, uri: &Uri) -> String {
    if let Some(ref base) = ctx.config.server.public_base_url {
        return base.trim_end_matches('/').to_string();
    }

    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("https");

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| format!("localhost:{}", ctx.config.server.port));

    format!("{proto}://{host}{PROXY_PATH}")
}

pub(crate) fn current_request_id(parts: &Parts) -> Option<String> {
    parts.extensions.get::<RequestId>().map(|id| id.0.clone())
}
