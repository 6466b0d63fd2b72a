//! Manifest URL rewriting.
//!
//! A lexical scan, not a URI parser: any `http://` or `https://` run up to a
//! CR, LF, single or double quote is treated as one URL. That covers HLS
//! playlists (one URI per line, or quoted `URI="..."` attributes) and DASH
//! text nodes without a parser per dialect.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

static ABSOLUTE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\r\n'"]+"#).expect("static pattern is valid"));

/// Where rewritten URLs should point.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    proxy_base_url: String,
    original_url: Url,
}

impl RewriteContext {
    /// `proxy_base_url` is this server's externally visible proxy endpoint,
    /// without a query string (e.g. `https://host/api/proxy`).
    pub fn new(proxy_base_url: impl Into<String>, original_url: Url) -> Self {
        Self {
            proxy_base_url: proxy_base_url.into(),
            original_url,
        }
    }

    pub fn original_url(&self) -> &Url {
        &self.original_url
    }

    /// Token that replaces `url` in the manifest.
    pub fn proxy_token(&self, url: &str) -> String {
        format!("{}?url={}", self.proxy_base_url, urlencoding::encode(url))
    }
}

/// Result of a rewrite pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenManifest {
    pub body: String,
    /// Number of URL occurrences replaced.
    pub replaced: usize,
}

/// Replace every absolute URL in `body` with its proxy token.
pub fn rewrite_manifest(body: &str, ctx: &RewriteContext) -> RewrittenManifest {
    let mut replaced = 0;
    let rewritten = ABSOLUTE_URL.replace_all(body, |caps: &Captures<'_>| {
        replaced += 1;
        ctx.proxy_token(&caps[0])
    });

    RewrittenManifest {
        body: rewritten.into_owned(),
        replaced,
    }
}
