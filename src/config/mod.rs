mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Environment variable that overrides `server.auth.jwt_secret`.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config = parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./config.toml",
        "./hivestream.toml",
        "~/.config/hivestream/config.toml",
        "/etc/hivestream/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    // Return default config if no file found; callers validate before serving
    let mut config = Config::default();
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML document without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
        if !secret.is_empty() {
            config.server.auth.jwt_secret = Some(secret);
        }
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    // Validate server config
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if let Some(ref base) = config.server.public_base_url {
        let url = url::Url::parse(base)
            .with_context(|| format!("Invalid server.public_base_url: {}", base))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("server.public_base_url must be an http(s) URL: {}", base);
        }
        if url.query().is_some() {
            anyhow::bail!("server.public_base_url must not carry a query string: {}", base);
        }
    }

    // Validate auth config
    let auth = &config.server.auth;
    if auth.enabled && auth.jwt_secret.as_deref().unwrap_or_default().is_empty() {
        anyhow::bail!(
            "Auth is enabled but no JWT secret is configured (set {} or server.auth.jwt_secret)",
            JWT_SECRET_ENV
        );
    }

    // Validate proxy config
    if config.proxy.timeout_secs == 0 {
        anyhow::bail!("proxy.timeout_secs cannot be 0");
    }
    if config.proxy.connect_timeout_secs == 0 {
        anyhow::bail!("proxy.connect_timeout_secs cannot be 0");
    }

    if config.downloads.max_per_day == 0 {
        tracing::warn!("downloads.max_per_day is 0; every download will be rejected");
    }

    Ok(())
}
