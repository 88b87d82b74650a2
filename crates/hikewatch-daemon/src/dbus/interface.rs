//! D-Bus interface implementation using zbus.

use std::sync::Arc;

use hikewatch_core::MetricKind;
use tracing::{debug, info, warn};
use zbus::{interface, Connection};

use crate::config::DbusBusType;
use crate::state::{format_reading, AppState, StateError};

/// Object path the monitor is served at.
const OBJECT_PATH: &str = "/org/hikewatch/Monitor";

/// D-Bus interface implementation for the monitor.
pub struct Monitor1Interface {
    state: Arc<AppState>,
    shutdown_tx: tokio::sync::mpsc::Sender<()>,
}

impl Monitor1Interface {
    /// Creates a new D-Bus interface.
    pub fn new(state: Arc<AppState>, shutdown_tx: tokio::sync::mpsc::Sender<()>) -> Self {
        Self { state, shutdown_tx }
    }
}

fn to_fdo(e: StateError) -> zbus::fdo::Error {
    match e {
        StateError::InvalidValue { .. } => zbus::fdo::Error::InvalidArgs(e.to_string()),
        StateError::PrimaryOnly(_) => zbus::fdo::Error::NotSupported(e.to_string()),
        StateError::MissingReading(_) => zbus::fdo::Error::Failed(e.to_string()),
    }
}

#[interface(name = "org.hikewatch.Monitor1")]
impl Monitor1Interface {
    /// Requests monitoring to start after the countdown.
    fn start_monitoring(&self) {
        self.state.start_monitoring();
        debug!("D-Bus: StartMonitoring");
    }

    /// Requests monitoring to stop.
    fn stop_monitoring(&self) {
        self.state.stop_monitoring();
        debug!("D-Bus: StopMonitoring");
    }

    /// Gets the monitoring state ("idle", "counting-down" or "active").
    fn get_state(&self) -> String {
        self.state.monitoring_state().to_string()
    }

    /// Gets the latest sample of one metric as (present, value, capture
    /// time in RFC 3339, empty when absent).
    fn get_latest(&self, metric: &str) -> zbus::fdo::Result<(bool, f64, String)> {
        let kind: MetricKind = metric
            .parse()
            .map_err(|e: hikewatch_core::Error| zbus::fdo::Error::InvalidArgs(e.to_string()))?;

        Ok(match self.state.latest(kind) {
            Some(sample) => (true, sample.value(), sample.captured_at().to_rfc3339()),
            None => (false, 0.0, String::new()),
        })
    }

    /// Lists every metric formatted for display, e.g. "HR: 75 bpm".
    fn list_latest(&self) -> Vec<String> {
        self.state
            .readings()
            .iter()
            .map(|(kind, sample)| format_reading(kind, sample))
            .collect()
    }

    /// Appends a record; returns the record count.
    fn add_record(
        &self,
        heart_rate: f64,
        oxygen_saturation: f64,
        heart_rate_variability: f64,
        altitude: f64,
    ) -> zbus::fdo::Result<u32> {
        let count = self
            .state
            .add_record(heart_rate, oxygen_saturation, heart_rate_variability, altitude)
            .map_err(to_fdo)?;

        debug!(
            "D-Bus: AddRecord({}, {}, {}, {})",
            heart_rate, oxygen_saturation, heart_rate_variability, altitude
        );
        Ok(count as u32)
    }

    /// Records the current readings; returns the record count.
    fn snapshot_record(&self) -> zbus::fdo::Result<u32> {
        self.state.snapshot_record().map_err(to_fdo)?;
        debug!("D-Bus: SnapshotRecord");
        Ok(self.state.record_count() as u32)
    }

    /// Number of records kept this session.
    fn record_count(&self) -> u32 {
        self.state.record_count() as u32
    }

    /// Writes the export file. Returns its path, or an empty string when
    /// nothing was written.
    fn export(&self) -> zbus::fdo::Result<String> {
        let path = self.state.export().map_err(to_fdo)?;
        debug!("D-Bus: Export");
        Ok(path
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default())
    }

    /// Shuts down the daemon.
    async fn quit(&self) -> zbus::fdo::Result<()> {
        info!("D-Bus: Quit requested");
        self.shutdown_tx
            .send(())
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(())
    }

    // Properties

    /// Current monitoring state.
    #[zbus(property)]
    fn state(&self) -> String {
        self.state.monitoring_state().to_string()
    }

    /// "primary" or "companion".
    #[zbus(property)]
    fn role(&self) -> String {
        self.state.role().to_string()
    }

    /// Whether the paired peer answers probes.
    #[zbus(property)]
    fn peer_reachable(&self) -> bool {
        self.state.is_peer_reachable()
    }
}

/// Connects to the appropriate D-Bus bus based on configuration.
async fn connect_to_bus(bus_type: DbusBusType) -> anyhow::Result<(Connection, &'static str)> {
    match bus_type {
        DbusBusType::Session => {
            let conn = Connection::session()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to session bus: {}", e))?;
            Ok((conn, "session"))
        }
        DbusBusType::System => {
            let conn = Connection::system()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to system bus: {}", e))?;
            Ok((conn, "system"))
        }
        DbusBusType::Auto => match Connection::session().await {
            Ok(conn) => Ok((conn, "session")),
            Err(session_err) => {
                warn!(
                    "Session bus unavailable ({}), trying system bus",
                    session_err
                );
                let conn = Connection::system().await.map_err(|system_err| {
                    anyhow::anyhow!(
                        "Failed to connect to any D-Bus: session={}, system={}",
                        session_err,
                        system_err
                    )
                })?;
                Ok((conn, "system"))
            }
        },
    }
}

/// Runs the D-Bus server.
pub async fn run_dbus_server(
    state: Arc<AppState>,
    shutdown_tx: tokio::sync::mpsc::Sender<()>,
) -> anyhow::Result<Connection> {
    let dbus = state.config().dbus.clone();
    let interface = Monitor1Interface::new(state, shutdown_tx);

    let (connection, bus_name) = connect_to_bus(dbus.bus).await?;

    connection
        .object_server()
        .at(OBJECT_PATH, interface)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to register object: {}", e))?;

    connection
        .request_name(dbus.name.as_str())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to request bus name: {}", e))?;

    info!("D-Bus service registered at {} on {} bus", dbus.name, bus_name);
    Ok(connection)
}
