use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hivestream")]
#[command(author, version, about = "Streaming media reverse proxy")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,

    /// Mint a bearer token for the download routes
    IssueToken {
        /// User id to put in the token
        user_id: String,

        /// Optional email claim
        #[arg(long)]
        email: Option<String>,
    },

    /// Fetch a URL once through the proxy pipeline and describe the result
    Fetch {
        /// Absolute http(s) URL
        url: String,

        /// Send HEAD instead of GET
        #[arg(long)]
        head: bool,
    },
}
