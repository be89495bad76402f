//! Table Gateway - CLI Application
//!
//! Serves the `/api/:table[/:id]` CRUD surface and forwards every request to
//! the configured backend.

use clap::{Parser, Subcommand};
use table_gateway::{config::GatewayConfig, server};
use tracing_subscriber::EnvFilter;

/// Table Gateway - a small REST gateway over a JSON backend
#[derive(Parser)]
#[command(name = "table-gateway")]
#[command(version, about = "A small REST gateway over a JSON backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Start {
        /// Configuration file path (defaults plus environment when omitted)
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Validate the configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Generate a sample configuration file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "config.toml")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config } => start_server(config.as_deref()).await?,
        Commands::Validate { config } => validate_config(&config)?,
        Commands::Init { output } => generate_sample_config(&output)?,
    }

    Ok(())
}

/// Start the gateway server
async fn start_server(config_path: Option<&str>) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::load(config_path)?;
    match config_path {
        Some(path) => tracing::info!("Loaded configuration from {}", path),
        None => tracing::info!("No configuration file given, using defaults and environment"),
    }

    server::serve(config).await
}

/// Validate configuration file
fn validate_config(config_path: &str) -> anyhow::Result<()> {
    match GatewayConfig::load(Some(config_path)) {
        Ok(config) => {
            println!("✓ Configuration is valid!");
            println!();
            println!("Server: {}", config.server_addr());
            println!("Backend: {}", config.backend.url);
            match config.backend.timeout {
                Some(secs) => println!("Backend timeout: {}s", secs),
                None => println!("Backend timeout: none"),
            }
            println!("Existence probe: {}", config.gateway.existence_probe);
            println!("Runtime mode: {:?}", config.runtime.mode);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration is invalid:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}

/// Generate sample configuration file
fn generate_sample_config(output_path: &str) -> anyhow::Result<()> {
    let sample_config = r#"# Table Gateway Configuration
# PORT, HOST, BACKEND_URL, BACKEND_TIMEOUT and GATEWAY_ENV override these values.

[server]
host = "0.0.0.0"
port = 3000

[backend]
url = "http://localhost:3001"
# timeout = 10  # seconds; unset means backend calls never time out

[gateway]
existence_probe = true  # read the record before PUT and DELETE
cors = true

[runtime]
mode = "production"  # Options: production, development

[metrics]
enabled = true
path = "/metrics"

[health]
enabled = true
path = "/health"
"#;

    std::fs::write(output_path, sample_config)?;
    println!("Sample configuration written to {}", output_path);
    Ok(())
}
