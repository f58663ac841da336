//! FOCAL - local MCP rules server
//!
//! Entry point for the `focal` binary: the HTTP server, the stdio MCP
//! server, and workspace maintenance commands.

mod cli;

use clap::{Parser, Subcommand};
use focal_core::error::Result;
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(name = "focal")]
#[command(about = "Serve markdown rules and agent roles to MCP clients", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (MCP, SSE notifications, workspace API)
    Serve {
        /// Workspace root (overrides FOCAL_WORKSPACE_ROOT and config file)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Listen address
        #[arg(long)]
        addr: Option<String>,

        /// Require `Authorization: Bearer <token>` on every route but /health
        #[arg(long)]
        token: Option<String>,
    },

    /// Start the MCP server on stdin/stdout
    Stdio {
        /// Workspace root
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Create the workspace layout and seed missing core files
    Init {
        /// Workspace root
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Show rules fingerprint and prompt list
    Status {
        /// Workspace root
        #[arg(long)]
        root: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let level = level.as_str().to_lowercase();

    // Our crates at the requested level, HTTP tracing one notch quieter
    let filter = EnvFilter::new(format!(
        "focal={level},focal_core={level},tower_http={},tokio_stream=error",
        if level == "trace" || level == "debug" { "debug" } else { "warn" }
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // stdout belongs to the stdio transport
        .init();

    debug!("FOCAL v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { root, addr, token } => cli::serve::handle(root, addr, token).await,
        Commands::Stdio { root } => cli::stdio::handle(root).await,
        Commands::Init { root } => cli::init::handle(root).await,
        Commands::Status { root, json } => cli::status::handle(root, json).await,
    }
}
