//! Redirect-following upstream fetcher.
//!
//! The HTTP client never follows redirects on its own. Each hop is issued
//! here, inspected, and either returned or replaced by the next hop, so the
//! redirect ceiling, scheme checks and per-hop timeout are enforced in one
//! place.

use std::time::Duration;

use reqwest::header::{self, HeaderMap};
use reqwest::{redirect, Client, Method, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ProxyError, Result};
use crate::request::{ensure_allowed_scheme, ProxyRequest};

/// Maximum number of redirects followed for a single request.
pub const MAX_REDIRECTS: u8 = 5;

/// Default time allowed for one hop to produce response headers.
pub const DEFAULT_HOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default TCP/TLS connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Browser-like agent; several media hosts reject obvious bots.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0 Safari/537.36";

/// Fetcher tuning.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub hop_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            hop_timeout: DEFAULT_HOP_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Terminal (non-redirect) upstream response.
///
/// The body has not been read. It is consumed exactly once, either by the
/// manifest rewriter or by the stream forwarder.
#[derive(Debug)]
pub struct UpstreamResponse {
    final_url: Url,
    inner: Response,
}

impl UpstreamResponse {
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// URL of the hop that produced this response.
    pub fn final_url(&self) -> &Url {
        &self.final_url
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn into_inner(self) -> Response {
        self.inner
    }
}

/// Issues upstream requests and resolves redirect chains.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    hop_timeout: Duration,
}

impl Fetcher {
    pub fn new(config: &FetcherConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            hop_timeout: config.hop_timeout,
        })
    }

    /// Fetch the request target, following up to [`MAX_REDIRECTS`] redirects.
    ///
    /// Non-redirect responses, including 4xx and 5xx, are returned unchanged.
    /// A 3xx without a `Location` header is also terminal.
    pub async fn fetch(&self, request: &mut ProxyRequest) -> Result<UpstreamResponse> {
        let headers = request.upstream_headers();
        let mut current = request.target_url().clone();

        loop {
            let response = self.send_hop(request.method(), &current, &headers).await?;
            let status = response.status();

            let Some(location) = redirect_location(&current, &response)? else {
                debug!(
                    url = %current,
                    status = %status,
                    redirects = request.redirect_count(),
                    "Upstream responded"
                );
                return Ok(UpstreamResponse {
                    final_url: current,
                    inner: response,
                });
            };

            if request.redirect_count() >= MAX_REDIRECTS {
                warn!(
                    url = %request.target_url(),
                    limit = MAX_REDIRECTS,
                    "Redirect ceiling reached"
                );
                return Err(ProxyError::TooManyRedirects {
                    url: request.target_url().to_string(),
                    limit: MAX_REDIRECTS,
                });
            }

            let next = resolve_location(&current, &location)?;

            // Release this hop's connection before opening the next one.
            drop(response);

            request.redirect_count += 1;
            debug!(
                from = %current,
                to = %next,
                status = %status,
                hop = request.redirect_count(),
                "Following redirect"
            );
            current = next;
        }
    }

    /// Read a whole response body, bounded by the hop timeout.
    pub async fn read_body(&self, upstream: UpstreamResponse) -> Result<bytes::Bytes> {
        let url = upstream.final_url;
        match tokio::time::timeout(self.hop_timeout, upstream.inner.bytes()).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(err)) => Err(ProxyError::from_reqwest(&url, err, self.hop_timeout)),
            Err(_) => Err(ProxyError::UpstreamTimeout {
                url: url.to_string(),
                timeout: self.hop_timeout,
            }),
        }
    }

    async fn send_hop(&self, method: &Method, url: &Url, headers: &HeaderMap) -> Result<Response> {
        let pending = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers.clone())
            .send();

        // Dropping `pending` on timeout aborts the in-flight connection.
        match tokio::time::timeout(self.hop_timeout, pending).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => {
                warn!(url = %url, error = %err, "Upstream request failed");
                Err(ProxyError::from_reqwest(url, err, self.hop_timeout))
            }
            Err(_) => {
                warn!(url = %url, timeout = ?self.hop_timeout, "Upstream hop timed out");
                Err(ProxyError::UpstreamTimeout {
                    url: url.to_string(),
                    timeout: self.hop_timeout,
                })
            }
        }
    }
}

/// Raw `Location` value of a redirect response, if this is one.
fn redirect_location(current: &Url, response: &Response) -> Result<Option<String>> {
    if !response.status().is_redirection() {
        return Ok(None);
    }

    let Some(value) = response.headers().get(header::LOCATION) else {
        return Ok(None);
    };

    value
        .to_str()
        .map(|s| Some(s.to_string()))
        .map_err(|_| ProxyError::UpstreamProtocolError {
            url: current.to_string(),
            message: "Location header is not valid ASCII".to_string(),
        })
}

/// Resolve a redirect target against the URL that produced it.
fn resolve_location(current: &Url, location: &str) -> Result<Url> {
    let next = current
        .join(location.trim())
        .map_err(|e| ProxyError::UpstreamProtocolError {
            url: current.to_string(),
            message: format!("invalid redirect target '{location}': {e}"),
        })?;

    ensure_allowed_scheme(&next).map_err(|_| ProxyError::UpstreamProtocolError {
        url: current.to_string(),
        message: format!("redirect to unsupported scheme '{}'", next.scheme()),
    })?;

    Ok(next)
}
