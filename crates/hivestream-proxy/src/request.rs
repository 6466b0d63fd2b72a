//! Target validation and the per-request state threaded through the fetcher.

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use url::Url;

use crate::error::{ProxyError, Result};

/// Schemes the proxy is willing to fetch.
pub const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

/// Client request headers copied to every upstream hop.
const FORWARDED_REQUEST_HEADERS: [HeaderName; 2] = [header::RANGE, header::IF_RANGE];

/// Validate the raw `url` query parameter.
///
/// Returns the parsed absolute URL, or the validation error the caller must
/// answer with a 400.
pub fn validate_target(raw: Option<&str>) -> Result<Url> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ProxyError::MissingParameter)?;

    let url = Url::parse(raw).map_err(|e| ProxyError::MalformedUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    ensure_allowed_scheme(&url)?;
    Ok(url)
}

/// Reject anything that is not plain HTTP(S).
pub(crate) fn ensure_allowed_scheme(url: &Url) -> Result<()> {
    if ALLOWED_SCHEMES.contains(&url.scheme()) {
        Ok(())
    } else {
        Err(ProxyError::DisallowedProtocol {
            url: url.to_string(),
            scheme: url.scheme().to_string(),
        })
    }
}

/// One inbound proxy request.
///
/// Everything is fixed at construction except the redirect counter, which
/// only the fetcher advances.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    target_url: Url,
    method: Method,
    forwarded_headers: HeaderMap,
    pub(crate) redirect_count: u8,
}

impl ProxyRequest {
    pub fn new(target_url: Url, method: Method) -> Self {
        Self {
            target_url,
            method,
            forwarded_headers: HeaderMap::new(),
            redirect_count: 0,
        }
    }

    /// Copy the client headers that must reach upstream unchanged (`Range`,
    /// `If-Range`).
    pub fn with_client_headers(mut self, client: &HeaderMap) -> Self {
        for name in &FORWARDED_REQUEST_HEADERS {
            if let Some(value) = client.get(name) {
                self.forwarded_headers.insert(name.clone(), value.clone());
            }
        }
        self
    }

    pub fn target_url(&self) -> &Url {
        &self.target_url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn forwarded_headers(&self) -> &HeaderMap {
        &self.forwarded_headers
    }

    /// Number of redirects followed so far.
    pub fn redirect_count(&self) -> u8 {
        self.redirect_count
    }

    /// Header set sent on every hop.
    ///
    /// `Referer` and `Origin` always carry the target's own origin; many
    /// media hosts refuse requests whose referer does not match.
    pub(crate) fn upstream_headers(&self) -> HeaderMap {
        let mut headers = self.forwarded_headers.clone();
        let origin = self.target_url.origin().ascii_serialization();
        if let Ok(value) = HeaderValue::from_str(&origin) {
            headers.insert(header::REFERER, value.clone());
            headers.insert(header::ORIGIN, value);
        }
        headers
    }
}
