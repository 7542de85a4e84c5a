//! applemusic-mcp: MCP server for Apple Music over STDIO
//!
//! Connect from an MCP client with:
//!   command = "applemusic-mcp"

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use applemusic_core::{Config, MusicService, TrackCache};
use applemusic_mcp::tools::{ToolRegistry, format, register_all};
use applemusic_mcp::{McpServer, McpToolAdapter};

#[derive(Parser)]
#[command(name = "applemusic-mcp", version, about = "MCP server for Apple Music")]
struct Cli {
    /// Config file (defaults to ~/.config/applemusic-mcp/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over STDIO (default)
    Serve,
    /// Inspect the track cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache size and age
    Stats,
    /// Delete every cached track
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&config).await,
        Commands::Cache { action } => {
            let cache = TrackCache::open_file(config.cache_path());
            if let CacheAction::Clear = action {
                let cleared = cache.stats().distinct_tracks;
                cache.clear();
                println!("Cleared {cleared} cached tracks");
            } else {
                println!("{}", format::cache_stats(&cache.stats()));
            }
            Ok(())
        }
    }
}

async fn serve(config: &Config) -> Result<()> {
    info!(
        "applemusic-mcp v{} starting on STDIO",
        env!("CARGO_PKG_VERSION")
    );

    let service = Arc::new(MusicService::from_config(config));
    let mut registry = ToolRegistry::new();
    register_all(&mut registry, service);
    info!("Registered {} tools", registry.len());

    let server = McpServer::new(McpToolAdapter::new(Arc::new(registry)));
    server.serve_stdio().await
}
