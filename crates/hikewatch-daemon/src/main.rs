//! hikewatch daemon
//!
//! Samples health sensors while monitoring is active and mirrors the
//! monitoring flag to a paired peer. Controlled over D-Bus and an optional
//! HTMX web UI.

mod config;
mod dbus;
mod peer;
mod sensors;
mod state;
mod web;

use anyhow::{Context, Result};
use futures::StreamExt;
use hikewatch_core::{MonitorHandle, MonitoringController, Transport, Unpaired};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use peer::TcpTransport;
use state::{format_reading, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = Config::load(&config_path).context("Failed to load configuration")?;
    info!("Loaded configuration from: {}", config_path);
    info!("Running as {}", config.role);

    // Peer link
    let peer = if config.peer.enable {
        let transport = Arc::new(TcpTransport::new(&config.peer.address));
        transport.spawn_probe(Duration::from_secs(config.peer.probe_interval_secs.max(1)));
        info!("Paired with peer at {}", transport.address());
        Some(transport)
    } else {
        info!("Peer link disabled");
        None
    };
    let transport: Arc<dyn Transport> = match &peer {
        Some(transport) => transport.clone(),
        None => Arc::new(Unpaired),
    };

    // Start the monitor
    let source = sensors::create_source(&config.sensor);
    let controller = MonitoringController::new(source, transport, config.monitor.settings());
    let handle = controller.handle();
    let monitor_task = tokio::spawn(controller.run());

    if config.peer.enable {
        let listener = TcpListener::bind(&config.peer.listen)
            .await
            .with_context(|| format!("Failed to bind peer listener on {}", config.peer.listen))?;
        info!("Accepting peer messages on {}", config.peer.listen);
        tokio::spawn(peer::serve(listener, handle.clone()));
    }

    // Initialize application state
    let state = Arc::new(AppState::new(config.clone(), handle.clone(), peer));

    // Log state and reading changes
    tokio::spawn(report_loop(state.monitor().clone()));

    // Create channel for shutdown
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Keep a clone of shutdown_tx to prevent the channel from closing if D-Bus fails
    let _shutdown_tx_keepalive = shutdown_tx.clone();

    // Start D-Bus service
    let _dbus_connection = match dbus::run_dbus_server(state.clone(), shutdown_tx).await {
        Ok(conn) => {
            info!("D-Bus service started");
            Some(conn)
        }
        Err(e) => {
            warn!(
                "Failed to start D-Bus service: {}. Continuing without D-Bus.",
                e
            );
            None
        }
    };

    // Setup Unix signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    // Optionally start web server
    if config.web.enable {
        let app = web::create_router(state.clone());
        let addr: SocketAddr = config
            .web
            .listen
            .parse()
            .context("Invalid listen address")?;
        let listener = TcpListener::bind(addr).await?;
        info!("Web server listening on http://{}", addr);

        // Run server with shutdown handling
        tokio::select! {
            result = axum::serve(listener, app) => {
                result?;
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown requested via D-Bus");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
            }
        }
    } else {
        info!("Web server disabled");
        // Wait for shutdown signal
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutdown requested via D-Bus");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
            }
        }
    }

    // Stop pollers before exiting
    handle.shutdown();
    if let Err(e) = monitor_task.await {
        warn!("Monitor task ended abnormally: {}", e);
    }

    Ok(())
}

/// Logs every monitoring state change and metric update.
async fn report_loop(handle: MonitorHandle) {
    enum Change {
        State,
        Readings,
    }

    let states = WatchStream::from_changes(handle.subscribe_state()).map(|_| Change::State);
    let readings =
        WatchStream::from_changes(handle.subscribe_readings()).map(|_| Change::Readings);
    let mut changes = futures::stream::select(states, readings);

    while let Some(change) = changes.next().await {
        match change {
            Change::State => info!("Monitoring is {}", handle.state()),
            Change::Readings => {
                let line = handle
                    .readings()
                    .iter()
                    .map(|(kind, sample)| format_reading(kind, sample))
                    .collect::<Vec<_>>()
                    .join("  ");
                debug!("{}", line);
            }
        }
    }
}
