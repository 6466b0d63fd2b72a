//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which builds a config with auth enabled and a
//! known secret plus the full [`AppContext`]. The `with_server` constructors
//! start Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::Router;
use hivestream::config::Config;
use hivestream::server::{auth, create_router, AppContext};

pub const TEST_SECRET: &str = "integration-test-secret";

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
}

impl TestHarness {
    /// Default configuration with auth enabled.
    pub fn config() -> Config {
        let mut config = Config::default();
        config.server.auth.enabled = true;
        config.server.auth.jwt_secret = Some(TEST_SECRET.to_string());
        config.proxy.timeout_secs = 5;
        config.proxy.connect_timeout_secs = 2;
        config
    }

    pub fn new() -> Self {
        Self::with_config(Self::config())
    }

    pub fn with_config(config: Config) -> Self {
        let ctx = AppContext::new(config).expect("failed to build app context");
        Self { ctx }
    }

    /// Router for `tower::ServiceExt::oneshot` tests.
    pub fn router(&self) -> Router {
        create_router(self.ctx.clone())
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::with_server_config(Self::config()).await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        let harness = Self::with_config(config);
        let app = harness.router();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    /// Bearer token for `user_id` signed with the harness secret.
    pub fn token(&self, user_id: &str) -> String {
        auth::issue_token(&self.ctx.config.server.auth, user_id, None)
            .expect("failed to issue token")
    }
}
