use crate::config::Config;
use crate::downloads::{DownloadQuota, MemoryDownloadLedger};
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use hivestream_proxy::{FetcherConfig, MediaProxy};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod auth;
pub mod error;
pub mod request_id;
pub mod routes_downloads;
pub mod routes_proxy;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Proxy pipeline; clones share one upstream connection pool
    pub proxy: MediaProxy,
    /// Download history and daily quota
    pub downloads: Arc<dyn DownloadQuota>,
}

impl AppContext {
    /// Build a context with the in-memory download ledger.
    pub fn new(config: Config) -> Result<Self> {
        let downloads = Arc::new(MemoryDownloadLedger::new(config.downloads.max_per_day));
        Self::with_downloads(config, downloads)
    }

    pub fn with_downloads(config: Config, downloads: Arc<dyn DownloadQuota>) -> Result<Self> {
        let proxy = MediaProxy::new(&FetcherConfig::from(&config.proxy))
            .context("Failed to build upstream HTTP client")?;

        Ok(Self {
            config: Arc::new(config),
            proxy,
            downloads,
        })
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        .nest("/api", api_routes(&ctx))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .with_state(ctx)
}

fn api_routes(ctx: &AppContext) -> Router<AppContext> {
    // The proxy answers its own pre-flight and sets CORS on every response.
    let proxy_routes = Router::new().route(
        "/proxy",
        get(routes_proxy::proxy).options(routes_proxy::preflight),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::RANGE]);

    // The auth middleware always runs; with auth disabled it attaches an
    // anonymous identity.
    let download_routes = routes_downloads::download_routes()
        .route_layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::auth_middleware,
        ))
        .layer(cors);

    proxy_routes.merge(download_routes)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    if !config.server.auth.enabled {
        tracing::warn!("Auth is disabled; download routes are open to everyone");
    }

    let ctx = AppContext::new(config)?;
    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
