use hivestream_proxy::fetch::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HOP_TIMEOUT, DEFAULT_USER_AGENT,
};
use hivestream_proxy::FetcherConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub downloads: DownloadsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally visible proxy endpoint used in rewritten manifests,
    /// e.g. `https://media.example.com/api/proxy`. Derived from the request
    /// `Host` header when unset.
    #[serde(default)]
    pub public_base_url: Option<String>,

    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: None,
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Require a bearer token on download routes
    #[serde(default = "default_auth_enabled")]
    pub enabled: bool,

    /// HMAC secret for HS256 tokens (overridden by `JWT_SECRET`)
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Lifetime of tokens minted by `hivestream issue-token` (default: 7 days)
    #[serde(default = "default_token_ttl")]
    pub token_ttl_hours: u64,
}

fn default_auth_enabled() -> bool {
    true
}

fn default_token_ttl() -> u64 {
    24 * 7
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: default_auth_enabled(),
            jwt_secret: None,
            token_ttl_hours: default_token_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Per-hop upstream timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upstream connect timeout in seconds (default: 10)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_HOP_TIMEOUT.as_secs()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl From<&ProxyConfig> for FetcherConfig {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            hop_timeout: Duration::from_secs(config.timeout_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            user_agent: config.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadsConfig {
    /// Downloads allowed per user per UTC day (default: 5)
    #[serde(default = "default_max_per_day")]
    pub max_per_day: u32,
}

fn default_max_per_day() -> u32 {
    5
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            max_per_day: default_max_per_day(),
        }
    }
}
