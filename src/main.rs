//! SCADA Hub Server
//!
//! Run with: cargo run --bin scada-hub -- serve --config config.toml
//!
//! Without `--config` the usual locations are searched (see
//! [`Config::load_default`]); `SCADA_HUB_*` environment variables override
//! file values and `RUST_LOG` overrides the configured log level.

use anyhow::Context;
use clap::{Parser, Subcommand};
use scada_hub::api::{serve, AppState};
use scada_hub::config::{generate_default_config, Config, LoggingConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "scada-hub")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Supervises controller connections and streams telemetry to dashboards")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hub (default)
    Serve {
        /// Config file path
        #[arg(short, long, env = "SCADA_HUB_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Print a default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load and validate a config file, then list its devices
    Check {
        /// Config file path
        #[arg(short, long, env = "SCADA_HUB_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve { config: None }) {
        Commands::Serve { config } => {
            let config = load_config(config.as_ref())?;
            init_tracing(&config.logging);
            run(config).await
        }
        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
            Ok(())
        }
        Commands::Check { config } => {
            let config = load_config(config.as_ref())?;
            config.validate()?;

            println!("Configuration OK");
            println!("  API:      {}:{}", config.api.host, config.api.port);
            println!("  Interval: {}s", config.polling.interval_secs);
            println!("  Devices:  {}", config.devices.len());
            for device in config.descriptors() {
                println!(
                    "    {:<20} {:<32} root={}",
                    device.id, device.url, device.root_node_id
                );
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(Config::load_default()),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("scada_hub={},tower_http=info", logging.level))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    tracing::info!("Starting SCADA hub v{}", env!("CARGO_PKG_VERSION"));
    if config.devices.is_empty() {
        tracing::warn!("No devices configured; subscribers will receive empty updates");
    }
    for device in config.descriptors() {
        tracing::info!(device = %device.name, url = %device.url, "Supervising device");
    }

    let state = AppState::from_config(&config)?;
    let scheduler = state.scheduler.clone().start();

    let served = serve(state.clone()).await;

    tracing::info!("Stopping scheduler and closing device sessions...");
    state.shutdown().await;
    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "Scheduler task ended abnormally");
    }

    served?;
    tracing::info!("SCADA hub stopped");
    Ok(())
}
