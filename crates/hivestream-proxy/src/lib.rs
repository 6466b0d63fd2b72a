//! Streaming media reverse proxy core.
//!
//! Fetches a third-party media resource on a client's behalf and hands it
//! back in a form a browser player can consume:
//!
//! - [`request`]: validates the `url` parameter (absolute, `http`/`https` only)
//! - [`fetch`]: issues the upstream request and follows up to
//!   [`fetch::MAX_REDIRECTS`] redirects with a per-hop timeout
//! - [`classify`]: decides manifest / video / opaque
//! - [`rewrite`]: routes every absolute URL in HLS/DASH manifests back
//!   through the proxy
//! - [`forward`]: streams video and opaque bodies through untouched, with
//!   CORS and byte-range headers intact
//!
//! The proxy keeps no state between requests. [`MediaProxy`] is cheap to
//! clone and safe to share across tasks; clones share one connection pool.

pub mod classify;
pub mod error;
pub mod fetch;
pub mod forward;
pub mod request;
pub mod rewrite;

pub use classify::{classify, ContentClass};
pub use error::{ProxyError, Result};
pub use fetch::{Fetcher, FetcherConfig, UpstreamResponse, MAX_REDIRECTS};
pub use request::{validate_target, ProxyRequest};
pub use rewrite::{rewrite_manifest, RewriteContext, RewrittenManifest};

use axum::response::Response;
use tracing::info;

/// Validator, fetcher, classifier, rewriter and forwarder wired together.
#[derive(Debug, Clone)]
pub struct MediaProxy {
    fetcher: Fetcher,
}

impl MediaProxy {
    pub fn new(config: &FetcherConfig) -> reqwest::Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(config)?,
        })
    }

    /// Proxy one request.
    ///
    /// `proxy_base_url` is the externally visible proxy endpoint used when
    /// rewriting manifests. Errors are returned before any part of the client
    /// response exists.
    pub async fn proxy(&self, mut request: ProxyRequest, proxy_base_url: &str) -> Result<Response> {
        let upstream = self.fetcher.fetch(&mut request).await?;
        let class = classify(upstream.content_type(), request.target_url());

        info!(
            url = %request.target_url(),
            final_url = %upstream.final_url(),
            status = %upstream.status(),
            redirects = request.redirect_count(),
            class = %class,
            "Proxying upstream response"
        );

        if class.needs_rewrite() {
            let ctx = RewriteContext::new(proxy_base_url, request.target_url().clone());
            self.rewrite(upstream, &ctx).await
        } else {
            Ok(forward::stream_response(upstream))
        }
    }

    async fn rewrite(&self, upstream: UpstreamResponse, ctx: &RewriteContext) -> Result<Response> {
        let status = upstream.status();
        let headers = upstream.headers().clone();

        let raw = self.fetcher.read_body(upstream).await?;
        let text = String::from_utf8_lossy(&raw);
        let rewritten = rewrite_manifest(&text, ctx);

        info!(
            url = %ctx.original_url(),
            bytes = raw.len(),
            replaced = rewritten.replaced,
            "Rewrote manifest"
        );

        Ok(forward::manifest_response(status, &headers, rewritten.body))
    }
}
