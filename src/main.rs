//! Grok X MCP Server - Rust Implementation
//!
//! A Model Context Protocol (MCP) server answering X (Twitter) lookups through
//! the Grok API's live search.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use grok_x_mcp::config::{grok, Config};
use grok_x_mcp::error::{GrokMcpError, Result};
use grok_x_mcp::grok::cache::{PersistentCache, TtlCache};
use grok_x_mcp::grok::circuit_breaker::CircuitBreaker;
use grok_x_mcp::grok::client::GrokClient;
use grok_x_mcp::grok::transport::XaiTransport;
use grok_x_mcp::grok::types::TrendsReport;
use grok_x_mcp::mcp::server::McpServer;
use grok_x_mcp::mcp::tools::ToolHandler;

/// Grok X MCP Server
#[derive(Parser)]
#[command(name = "grok-x-mcp")]
#[command(author, version, about = "Grok X MCP Server - A Model Context Protocol server for X via Grok")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete the persistent cache file
    ClearCache,

    /// Validate the environment and print the effective configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout is reserved for JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(GrokMcpError::Config(e)) => {
            eprintln!("Error: {}", e);
            eprintln!("Set XAI_API_KEY to a valid xAI API key (https://console.x.ai).");
            std::process::exit(1);
        }
        Err(e) => return Err(e),
    };

    match cli.command {
        Some(Commands::ClearCache) => {
            let cache: PersistentCache<TrendsReport> =
                PersistentCache::open(&config.cache_path, grok::TRENDS_CACHE_TTL);
            cache.clear();
            eprintln!("Cache cleared: {}", config.cache_path.display());
        }
        Some(Commands::CheckConfig) => {
            eprintln!("API key:        {}", config.redacted_api_key());
            eprintln!("Base URL:       {}", config.base_url);
            eprintln!("Model:          {}", config.model);
            eprintln!("Vision model:   {}", config.vision_model);
            eprintln!("Max tokens:     {}", config.max_tokens);
            eprintln!("Max retries:    {}", config.max_retries);
            eprintln!(
                "Breaker:        {} failures, {}s retry window",
                config.circuit_breaker.failure_threshold,
                config.circuit_breaker.retry_timeout.as_secs()
            );
            eprintln!("Cache file:     {}", config.cache_path.display());
        }
        None => {
            run_server(config).await?;
        }
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    let transport = Arc::new(XaiTransport::new(config.transport_config()));
    let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker));
    let client = Arc::new(GrokClient::new(transport, breaker));

    let tool_handler = ToolHandler::new(
        client,
        TtlCache::new(grok::PROFILE_CACHE_TTL),
        PersistentCache::open(&config.cache_path, grok::TRENDS_CACHE_TTL),
    );

    tracing::info!(model = %config.model, "Starting Grok X MCP server on stdio");
    let server = Arc::new(McpServer::new(Arc::new(tool_handler)));
    server.run_stdio().await?;

    Ok(())
}
