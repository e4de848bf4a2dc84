//! SCADA Hub CLI
//!
//! Command-line client for a running hub:
//! - Show live telemetry
//! - List devices and their connection state
//! - Write a tag value
//! - Check server health

use clap::{Parser, Subcommand};
use reqwest::{RequestBuilder, Response};
use scada_hub::api::dto::{DeviceListResponse, HealthResponse, WriteRequest};
use scada_hub::device::WriteInput;
use scada_hub::snapshot::TelemetryPayload;

#[derive(Parser)]
#[command(name = "scada-hub-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query and control a running SCADA hub")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Hub server URL
    #[arg(long, default_value = "http://localhost:8000", global = true)]
    pub server: String,

    /// Bearer token
    #[arg(long, env = "SCADA_HUB_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the latest values of every visible device
    Telemetry,

    /// List visible devices
    Devices,

    /// Write one value to one tag
    Write {
        /// Device endpoint URL
        plc_url: String,
        /// Tag name
        node_name: String,
        /// Value: true/false, a number, a JSON array of booleans, or text
        value: String,
    },

    /// Show server health
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let json = cli.format == "json";

    match &cli.command {
        Commands::Telemetry => {
            let request = client.get(format!("{}/api/v1/telemetry", cli.server));
            let response = send(&cli, authorized(request, &cli)).await?;
            let payload: TelemetryPayload = response.json().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }

            if payload.plc_clients.is_empty() {
                println!("No devices visible to this account.");
            }
            for device in &payload.plc_clients {
                println!("{} [{}] {}", device.name, device.status.as_str(), device.url);
                if let Some(error) = &device.error {
                    println!("  error: {}", error);
                }
                for (tag, value) in &device.nodes {
                    println!("  {:<28} {}", tag, value);
                }
                println!();
            }
        }

        Commands::Devices => {
            let request = client.get(format!("{}/api/v1/devices", cli.server));
            let response = send(&cli, authorized(request, &cli)).await?;
            let list: DeviceListResponse = response.json().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
                return Ok(());
            }

            println!(
                "{:<16} {:<14} {:<6} {:<20} {}",
                "ID", "Status", "Tags", "Last attempt", "URL"
            );
            println!("{}", "-".repeat(90));
            for device in &list.devices {
                let last = device
                    .last_attempt
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<16} {:<14} {:<6} {:<20} {}",
                    device.id,
                    device.status.as_str(),
                    device.tags,
                    last,
                    device.url
                );
            }
            println!();
            println!("{} device(s)", list.total);
        }

        Commands::Write {
            plc_url,
            node_name,
            value,
        } => {
            let body = WriteRequest {
                plc_url: plc_url.clone(),
                node_name: node_name.clone(),
                value: parse_value(value),
            };
            let request = client
                .post(format!("{}/api/v1/write", cli.server))
                .json(&body);
            send(&cli, authorized(request, &cli)).await?;

            println!("Wrote {} = {} on {}", node_name, value, plc_url);
        }

        Commands::Health => {
            let request = client.get(format!("{}/health", cli.server));
            let response = send(&cli, request).await?;
            let health: HealthResponse = response.json().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&health)?);
                return Ok(());
            }

            println!("SCADA hub v{}", health.version);
            println!();
            println!("Status:      {}", health.status);
            println!(
                "Devices:     {}/{} connected",
                health.devices_connected, health.devices_total
            );
            println!("Subscribers: {}", health.subscribers);
            println!("Ticks:       {}", health.ticks);
            println!("Uptime:      {}", format_duration(health.uptime_seconds));
        }
    }

    Ok(())
}

fn authorized(request: RequestBuilder, cli: &Cli) -> RequestBuilder {
    match &cli.token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// Send a request, exiting with the server's error message on failure
async fn send(cli: &Cli, request: RequestBuilder) -> Result<Response, Box<dyn std::error::Error>> {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("Cannot connect to SCADA hub at {}", cli.server);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or_default();
    let message = body["error"]["message"].as_str().unwrap_or("no details");
    eprintln!("Request failed ({}): {}", status, message);
    if status == reqwest::StatusCode::UNAUTHORIZED && cli.token.is_none() {
        eprintln!("Pass --token or set SCADA_HUB_TOKEN");
    }
    std::process::exit(1);
}

/// JSON literals keep their type, anything else is sent as text
fn parse_value(raw: &str) -> WriteInput {
    serde_json::from_str(raw).unwrap_or_else(|_| WriteInput::Text(raw.to_string()))
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}
