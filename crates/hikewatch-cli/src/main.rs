//! hikewatch control tool
//!
//! CLI for controlling the hikewatch daemon via D-Bus.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hikewatch_client::{BusType, MonitorClient, DEFAULT_SERVICE};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum CliBusType {
    /// Try session bus first, fall back to system bus
    #[default]
    Auto,
    /// Use session bus (for user services)
    Session,
    /// Use system bus (for system services)
    System,
}

impl From<CliBusType> for BusType {
    fn from(bus: CliBusType) -> Self {
        match bus {
            CliBusType::Auto => BusType::Auto,
            CliBusType::Session => BusType::Session,
            CliBusType::System => BusType::System,
        }
    }
}

#[derive(Parser)]
#[command(name = "hikewatchctl")]
#[command(about = "Control tool for the hikewatch daemon")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// D-Bus bus type to use
    #[arg(long, default_value = "auto", value_enum)]
    bus: CliBusType,

    /// D-Bus service name of the daemon
    #[arg(long, default_value = DEFAULT_SERVICE)]
    name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring after the countdown
    Start {
        /// Wait until monitoring is active
        #[arg(long)]
        wait: bool,
    },
    /// Stop monitoring
    Stop,
    /// Show monitoring state, peer status and readings
    Status {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the latest sample of one metric
    Latest {
        /// Metric: heart-rate (hr), oxygen-saturation (spo2),
        /// heart-rate-variability (hrv), altitude (alt)
        metric: String,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Record log commands
    Record {
        #[command(subcommand)]
        action: RecordCommands,
    },
    /// Write the export file
    Export,
    /// Daemon control commands
    Daemon {
        #[command(subcommand)]
        action: DaemonCommands,
    },
}

#[derive(Subcommand)]
enum RecordCommands {
    /// Add a record with explicit values
    #[command(allow_negative_numbers = true)]
    Add {
        /// Heart rate in bpm
        heart_rate: f64,
        /// Oxygen saturation as a fraction (e.g., 0.98)
        oxygen_saturation: f64,
        /// Heart-rate variability in ms
        heart_rate_variability: f64,
        /// Altitude in meters
        altitude: f64,
    },
    /// Record the current readings
    Snapshot,
    /// Show how many records were kept
    Count,
}

#[derive(Subcommand)]
enum DaemonCommands {
    /// Check if daemon is running
    Status,
    /// Request daemon shutdown
    Quit,
}

/// How long `start --wait` waits for the countdown.
const START_WAIT: Duration = Duration::from_secs(15);

/// How long `idle` may be reported before the daemon has picked up the
/// start request.
const START_GRACE: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Connect to daemon
    let client = MonitorClient::connect_with_bus(cli.bus.into(), &cli.name)
        .await
        .context("Failed to connect to daemon. Is hikewatchd running?")?;

    match cli.command {
        Commands::Start { wait } => handle_start(wait, &client).await,
        Commands::Stop => {
            client.stop_monitoring().await?;
            println!("Stop requested");
            Ok(())
        }
        Commands::Status { json } => handle_status(json, &client).await,
        Commands::Latest { metric, json } => handle_latest(&metric, json, &client).await,
        Commands::Record { action } => handle_record(action, &client).await,
        Commands::Export => handle_export(&client).await,
        Commands::Daemon { action } => handle_daemon(action, &client).await,
    }
}

async fn handle_start(wait: bool, client: &MonitorClient) -> Result<()> {
    client.start_monitoring().await?;
    println!("Start requested");
    if !wait {
        return Ok(());
    }

    let started = tokio::time::Instant::now();
    let mut left_idle = false;
    loop {
        let state = client.get_state().await?;
        if state == "active" {
            println!("Monitoring started");
            return Ok(());
        }
        let elapsed = started.elapsed();
        if start_failed(&state, left_idle, elapsed) || elapsed >= START_WAIT {
            anyhow::bail!("Monitoring did not start (state: {})", state);
        }
        left_idle |= state != "idle";
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Idle means the start was dropped or undone, once the daemon has had
/// time to act on it.
fn start_failed(state: &str, left_idle: bool, elapsed: Duration) -> bool {
    state == "idle" && (left_idle || elapsed >= START_GRACE)
}

async fn handle_status(json: bool, client: &MonitorClient) -> Result<()> {
    let state = client.get_state().await?;
    let role = client.role().await?;
    let peer = client.is_peer_reachable().await?;
    let readings = client.list_latest().await?;

    if json {
        let status = serde_json::json!({
            "role": role,
            "state": state,
            "peer_reachable": peer,
            "readings": readings,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Monitor Status:");
    println!("  Role: {}", role);
    println!("  State: {}", state);
    println!("  Peer reachable: {}", if peer { "yes" } else { "no" });
    println!("Readings:");
    for line in readings {
        println!("  {}", line);
    }
    Ok(())
}

async fn handle_latest(metric: &str, json: bool, client: &MonitorClient) -> Result<()> {
    let latest = client.get_latest(metric).await?;

    if json {
        let value = match &latest {
            Some(sample) => serde_json::json!({
                "metric": metric,
                "value": sample.value,
                "captured_at": sample.captured_at,
            }),
            None => serde_json::json!({ "metric": metric, "value": null }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match latest {
        Some(sample) => println!("{}: {} (at {})", metric, sample.value, sample.captured_at),
        None => println!("{}: no reading yet", metric),
    }
    Ok(())
}

async fn handle_record(action: RecordCommands, client: &MonitorClient) -> Result<()> {
    match action {
        RecordCommands::Add {
            heart_rate,
            oxygen_saturation,
            heart_rate_variability,
            altitude,
        } => {
            if !(0.0..=1.0).contains(&oxygen_saturation) {
                anyhow::bail!("Oxygen saturation must be a fraction between 0 and 1");
            }
            let count = client
                .add_record(heart_rate, oxygen_saturation, heart_rate_variability, altitude)
                .await?;
            println!("Record added ({} total)", count);
        }
        RecordCommands::Snapshot => {
            let count = client.snapshot_record().await?;
            println!("Current readings recorded ({} total)", count);
        }
        RecordCommands::Count => {
            let count = client.record_count().await?;
            println!("Records: {}", count);
        }
    }

    Ok(())
}

async fn handle_export(client: &MonitorClient) -> Result<()> {
    match client.export().await? {
        Some(path) => println!("Exported to: {}", path),
        None => println!("No data to export"),
    }
    Ok(())
}

async fn handle_daemon(action: DaemonCommands, client: &MonitorClient) -> Result<()> {
    match action {
        DaemonCommands::Status => {
            let role = client.role().await?;
            println!("Daemon: running");
            println!("Role: {}", role);
        }
        DaemonCommands::Quit => {
            client.quit().await?;
            println!("Shutdown request sent to daemon");
        }
    }

    Ok(())
}
