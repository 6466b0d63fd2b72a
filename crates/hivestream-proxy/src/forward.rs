//! Client response construction.
//!
//! Video and opaque bodies are streamed chunk by chunk as they arrive from
//! upstream. Manifests arrive here already buffered and rewritten.

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::Response;
use tracing::debug;

use crate::fetch::UpstreamResponse;

/// CORS headers attached to every proxied response.
const CORS_HEADERS: [(HeaderName, &str); 4] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, HEAD, OPTIONS"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Range"),
    (
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        "Content-Length, Content-Range, Accept-Ranges",
    ),
];

/// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Overwrite the CORS headers on `headers`.
pub fn apply_cors(headers: &mut HeaderMap) {
    for (name, value) in &CORS_HEADERS {
        headers.insert(name.clone(), HeaderValue::from_static(*value));
    }
}

/// Upstream headers minus hop-by-hop ones. Multi-valued headers keep every
/// value.
pub fn passthrough_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if !HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Stream a video/opaque response to the client without buffering.
///
/// Status and headers (`Content-Length`, `Content-Range`, `Accept-Ranges`,
/// `ETag`, ...) are copied from upstream. Dropping the returned body (for
/// instance on client disconnect) drops the upstream response and releases
/// its connection.
pub fn stream_response(upstream: UpstreamResponse) -> Response {
    let status = upstream.status();
    let mut headers = passthrough_headers(upstream.headers());
    apply_cors(&mut headers);

    debug!(
        url = %upstream.final_url(),
        status = %status,
        content_length = ?headers.get(header::CONTENT_LENGTH),
        "Streaming upstream body"
    );

    let body = Body::from_stream(upstream.into_inner().bytes_stream());
    build(status, headers, body)
}

/// Send a rewritten manifest with the upstream status and headers.
///
/// `Content-Length` is dropped because rewriting changed the byte length.
pub fn manifest_response(
    status: StatusCode,
    upstream_headers: &HeaderMap,
    body: String,
) -> Response {
    let mut headers = passthrough_headers(upstream_headers);
    headers.remove(header::CONTENT_LENGTH);
    apply_cors(&mut headers);
    build(status, headers, Body::from(body))
}

/// Bodiless 204 for CORS pre-flight requests.
pub fn preflight_response() -> Response {
    let mut headers = HeaderMap::new();
    apply_cors(&mut headers);
    build(StatusCode::NO_CONTENT, headers, Body::empty())
}

fn build(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    fn upstream_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/vnd.apple.mpegurl"),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::ETAG, HeaderValue::from_static("\"abc\""));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://only.example.com"),
        );
        headers
    }

    #[test]
    fn passthrough_drops_hop_by_hop_only() {
        let headers = passthrough_headers(&upstream_headers());
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "42");
        assert_eq!(headers.get(header::ETAG).unwrap(), "\"abc\"");
        assert_eq!(headers.get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn cors_overrides_upstream_values() {
        let mut headers = upstream_headers();
        apply_cors(&mut headers);
        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
            "GET, HEAD, OPTIONS"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
            "Content-Type, Range"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_EXPOSE_HEADERS).unwrap(),
            "Content-Length, Content-Range, Accept-Ranges"
        );
    }

    #[tokio::test]
    async fn manifest_response_drops_content_length() {
        let response =
            manifest_response(StatusCode::OK, &upstream_headers(), "#EXTM3U\n".to_string());
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/vnd.apple.mpegurl"
        );
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"#EXTM3U\n");
    }

    #[test]
    fn manifest_response_keeps_upstream_status() {
        let response = manifest_response(StatusCode::NOT_FOUND, &HeaderMap::new(), String::new());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn preflight_is_empty_204() {
        let response = preflight_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }
}
