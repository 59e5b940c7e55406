use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

use mcp_chain::config::{self, Config};
use mcp_chain::{logging, FrontServer, McpHandler};

#[derive(Parser, Debug)]
#[command(name = "mcp-chain")]
#[command(about = "Serve an MCP server behind a chain of middleware layers", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (YAML/JSON/TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Serve the chain on stdio (default)
    Run,
    /// Build the chain and print its metadata
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).await?;
    if args.debug {
        config.logging.level = "debug".to_string();
    }
    let _guard = logging::init(&config.logging).context("Failed to initialize logging")?;

    match args.command.unwrap_or(Command::Run) {
        Command::Check => run_check(&config).await,
        Command::Run => run_stdio(config).await,
    }
}

async fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => config::load_from_path(path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => config::load_from_env_or_file()
            .await
            .context("Failed to load configuration from default locations"),
    }
}

async fn run_check(config: &Config) -> anyhow::Result<()> {
    let chain = config::build_chain(config).context("Failed to build chain")?;
    let metadata = chain
        .get_metadata()
        .await
        .context("Failed to fetch metadata through the chain")?;

    println!("{}", serde_yaml::to_string(&metadata)?);
    Ok(())
}

async fn run_stdio(config: Config) -> anyhow::Result<()> {
    let chain = config::build_chain(&config).context("Failed to build chain")?;
    info!(
        "Starting '{}' with {} middleware layer(s)",
        config.name,
        chain.depth()
    );
    let front = FrontServer::new(&config.name, chain)?;

    tokio::select! {
        result = mcp_chain::serve_stdio(&front) => {
            if let Err(e) = &result {
                error!("Serve loop failed: {}", e);
            }
            result?;
        }
        _ = shutdown_signal() => {}
    }

    info!("'{}' exiting", config.name);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
