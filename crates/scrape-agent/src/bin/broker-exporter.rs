//! Main binary for the broker scrape exporter

use anyhow::Context;
use clap::{Parser, Subcommand};
use scrape_agent::{init_agent, AgentBuilder, AgentConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "broker-exporter")]
#[command(about = "Prometheus exporter for message broker statistics")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "BROKER_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Address to serve HTTP on
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the exporter
    Run,
    /// Print the default configuration
    Config,
    /// Validate a configuration file
    Validate {
        /// Configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config) => print_default_config(),
        Some(Commands::Validate { ref config }) => validate_config(config),
        Some(Commands::Run) | None => run(&cli).await,
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut config = AgentConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(listen) = cli.listen {
        config.exporter.listen_addr = listen;
    }
    config.validate()?;

    let mut agent = init_agent(&config).await?;
    info!("Listening on {}", config.exporter.listen_addr);

    if let Err(e) = agent.run().await {
        error!("Broker exporter failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn print_default_config() -> anyhow::Result<()> {
    print!("{}", AgentConfig::default().to_yaml()?);
    Ok(())
}

fn validate_config(config_path: &Path) -> anyhow::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = AgentConfig::from_file(config_path)
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;
    AgentBuilder::new()
        .with_config(config.clone())
        .build()
        .context("Configuration does not describe a runnable exporter")?;

    println!("Configuration is valid");
    println!("Broker: {}", config.exporter.broker.url);
    println!("Listen address: {}", config.exporter.listen_addr);
    println!("Endpoints:");
    for endpoint in &config.exporter.endpoints {
        let schedule = match endpoint.refresh_interval_seconds {
            0 => "on demand".to_string(),
            secs => format!("every {}s", secs),
        };
        println!(
            "  - {} at {} ({}, {} sources)",
            endpoint.name,
            endpoint.path(),
            schedule,
            endpoint.sources.len()
        );
    }

    Ok(())
}
