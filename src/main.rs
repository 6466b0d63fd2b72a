mod cli;

use hivestream::{
    config,
    server::{self, auth},
};
use hivestream_proxy::{classify, validate_target, Fetcher, FetcherConfig, ProxyRequest};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    // Load config
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting Hivestream server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );
    tracing::info!(
        "Upstream timeout {}s per hop, {} downloads per user per day",
        config.proxy.timeout_secs,
        config.downloads.max_per_day
    );

    server::start_server(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            // Verbose mode: trace for hivestream, debug for HTTP
            "hivestream=trace,hivestream_proxy=trace,tower_http=debug".to_string()
        } else {
            // Normal mode: debug for hivestream crates, info for HTTP requests
            "hivestream=debug,hivestream_proxy=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            // Create tokio runtime
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("hivestream {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::IssueToken { user_id, email } => {
            issue_token(cli.config.as_deref(), &user_id, email.as_deref())
        }
        Commands::Fetch { url, head } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(fetch_once(cli.config.as_deref(), &url, head))
        }
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!(
                "  Public base URL: {}",
                config
                    .server
                    .public_base_url
                    .as_deref()
                    .unwrap_or("(derived from Host)")
            );
            println!("  Auth enabled: {}", config.server.auth.enabled);
            println!(
                "  Upstream timeout: {}s (connect {}s)",
                config.proxy.timeout_secs, config.proxy.connect_timeout_secs
            );
            println!("  Downloads per day: {}", config.downloads.max_per_day);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Auth enabled: {}", config.server.auth.enabled);
        }
    }

    Ok(())
}

fn issue_token(config_path: Option<&Path>, user_id: &str, email: Option<&str>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let token = auth::issue_token(&config.server.auth, user_id, email)?;
    println!("{}", token);
    Ok(())
}

async fn fetch_once(config_path: Option<&Path>, raw_url: &str, head: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let target = validate_target(Some(raw_url))?;

    let fetcher = Fetcher::new(&FetcherConfig::from(&config.proxy))
        .context("Failed to build upstream HTTP client")?;
    let method = if head {
        reqwest::Method::HEAD
    } else {
        reqwest::Method::GET
    };

    let mut request = ProxyRequest::new(target, method);
    let upstream = fetcher.fetch(&mut request).await?;
    let class = classify(upstream.content_type(), request.target_url());

    println!("URL:       {}", request.target_url());
    println!("Final URL: {}", upstream.final_url());
    println!("Redirects: {}", request.redirect_count());
    println!("Status:    {}", upstream.status());
    println!("Class:     {}", class);
    println!("Headers:");
    for (name, value) in upstream.headers() {
        println!("  {}: {}", name, value.to_str().unwrap_or("<binary>"));
    }

    Ok(())
}
