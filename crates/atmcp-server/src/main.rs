//! `atmcp` - AT Protocol MCP server over stdio

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use atmcp_server::{App, ServerConfig, logging};

#[derive(Parser, Debug)]
#[command(
    name = "atmcp",
    version,
    about = "AT Protocol access for MCP clients, over stdio",
    long_about = "Serves AT Protocol operations to an MCP client on stdin/stdout.\n\
                  Public operations work without credentials. Configure ATMCP_AUTH__IDENTIFIER\n\
                  and ATMCP_AUTH__PASSWORD (an app password), or a delegated grant, for\n\
                  private operations. Logs go to stderr."
)]
struct Cli {
    /// Configuration file (.toml, .yaml, .yml or .json)
    #[arg(long, short = 'c', env = "ATMCP_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, overriding the configured level (RUST_LOG still wins)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,

    /// Do not run the change-feed client
    #[arg(long)]
    no_stream: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        ServerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.log_json {
        config.logging.json = true;
    }
    if cli.no_stream {
        config.stream.enabled = false;
    }

    logging::init(&config.logging).context("Failed to initialize logging")?;
    info!(version = env!("CARGO_PKG_VERSION"), service = %config.service_url, "Starting atmcp");

    let app = App::build(&config).context("Failed to assemble server")?;
    app.initialize().await;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            signal.cancel();
        }
    });

    let served = app
        .server()
        .serve(tokio::io::stdin(), tokio::io::stdout(), shutdown)
        .await;
    app.shutdown().await;
    served.context("Stdio transport failed")
}
