//! Hivestream - streaming media reverse proxy
//!
//! This library crate exposes the server, configuration and download quota
//! for integration testing. The proxy pipeline itself lives in
//! `hivestream-proxy`.

pub mod config;
pub mod downloads;
pub mod server;
