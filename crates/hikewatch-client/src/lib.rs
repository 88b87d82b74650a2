//! D-Bus client library for communicating with the hikewatch daemon.

use anyhow::{Context, Result};
use tracing::debug;
use zbus::names::BusName;
use zbus::{proxy, Connection};

/// Default well-known name of the daemon.
pub const DEFAULT_SERVICE: &str = "org.hikewatch.Monitor";

/// D-Bus bus type selection.
#[derive(Debug, Clone, Copy, Default)]
pub enum BusType {
    /// Session bus (user session).
    Session,
    /// System bus (system-wide).
    System,
    /// Try session first, fall back to system.
    #[default]
    Auto,
}

/// Latest sample of one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Latest {
    pub value: f64,
    /// Capture time in RFC 3339.
    pub captured_at: String,
}

/// D-Bus proxy for the hikewatch daemon.
#[proxy(
    interface = "org.hikewatch.Monitor1",
    default_service = "org.hikewatch.Monitor",
    default_path = "/org/hikewatch/Monitor"
)]
trait Monitor1 {
    /// Requests monitoring to start after the countdown.
    fn start_monitoring(&self) -> zbus::Result<()>;

    /// Requests monitoring to stop.
    fn stop_monitoring(&self) -> zbus::Result<()>;

    /// Gets the monitoring state.
    fn get_state(&self) -> zbus::Result<String>;

    /// Gets the latest sample as (present, value, capture time).
    fn get_latest(&self, metric: &str) -> zbus::Result<(bool, f64, String)>;

    /// Lists every metric formatted for display.
    fn list_latest(&self) -> zbus::Result<Vec<String>>;

    /// Appends a record; returns the record count.
    fn add_record(
        &self,
        heart_rate: f64,
        oxygen_saturation: f64,
        heart_rate_variability: f64,
        altitude: f64,
    ) -> zbus::Result<u32>;

    /// Records the current readings; returns the record count.
    fn snapshot_record(&self) -> zbus::Result<u32>;

    /// Number of records kept this session.
    fn record_count(&self) -> zbus::Result<u32>;

    /// Writes the export file; returns its path or an empty string.
    fn export(&self) -> zbus::Result<String>;

    /// Shuts down the daemon.
    fn quit(&self) -> zbus::Result<()>;

    /// Current monitoring state.
    #[zbus(property)]
    fn state(&self) -> zbus::Result<String>;

    /// "primary" or "companion".
    #[zbus(property)]
    fn role(&self) -> zbus::Result<String>;

    /// Whether the paired peer answers probes.
    #[zbus(property)]
    fn peer_reachable(&self) -> zbus::Result<bool>;
}

/// D-Bus client wrapper for the daemon.
pub struct MonitorClient {
    proxy: Monitor1Proxy<'static>,
}

impl MonitorClient {
    /// Connects to the daemon under its default name, trying the session
    /// bus first.
    pub async fn connect() -> Result<Self> {
        Self::connect_with_bus(BusType::Auto, DEFAULT_SERVICE).await
    }

    /// Connects to the daemon registered as `service` on the given bus.
    pub async fn connect_with_bus(bus_type: BusType, service: &str) -> Result<Self> {
        let connection = match bus_type {
            BusType::Session => {
                debug!("Connecting to session bus");
                Connection::session()
                    .await
                    .context("Failed to connect to session bus")?
            }
            BusType::System => {
                debug!("Connecting to system bus");
                Connection::system()
                    .await
                    .context("Failed to connect to system bus")?
            }
            BusType::Auto => {
                // Try session bus first, but verify the service exists
                if let Ok(conn) = Connection::session().await {
                    debug!("Connected to session bus, checking for daemon service");
                    if Self::service_exists(&conn, service).await {
                        debug!("Found daemon on session bus");
                        conn
                    } else {
                        debug!("Daemon not on session bus, trying system bus");
                        let sys_conn = Connection::system()
                            .await
                            .context("Failed to connect to system bus")?;
                        if !Self::service_exists(&sys_conn, service).await {
                            anyhow::bail!(
                                "Daemon service {} not found on session or system bus. Is hikewatchd running?",
                                service
                            );
                        }
                        debug!("Found daemon on system bus");
                        sys_conn
                    }
                } else {
                    debug!("Session bus unavailable, trying system bus");
                    Connection::system()
                        .await
                        .context("Failed to connect to any D-Bus")?
                }
            }
        };

        let proxy = Monitor1Proxy::builder(&connection)
            .destination(service.to_string())
            .context("Invalid service name")?
            .build()
            .await
            .context("Failed to create D-Bus proxy")?;

        Ok(Self { proxy })
    }

    /// Checks if the daemon service exists on the given connection.
    async fn service_exists(conn: &Connection, service: &str) -> bool {
        use zbus::fdo::DBusProxy;
        let Ok(name) = BusName::try_from(service) else {
            return false;
        };
        match DBusProxy::new(conn).await {
            Ok(dbus_proxy) => dbus_proxy.name_has_owner(name).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Requests monitoring to start.
    pub async fn start_monitoring(&self) -> Result<()> {
        self.proxy
            .start_monitoring()
            .await
            .context("Failed to start monitoring via D-Bus")
    }

    /// Requests monitoring to stop.
    pub async fn stop_monitoring(&self) -> Result<()> {
        self.proxy
            .stop_monitoring()
            .await
            .context("Failed to stop monitoring via D-Bus")
    }

    /// Gets the monitoring state.
    pub async fn get_state(&self) -> Result<String> {
        self.proxy
            .get_state()
            .await
            .context("Failed to get state via D-Bus")
    }

    /// Gets the latest sample of one metric, if any.
    pub async fn get_latest(&self, metric: &str) -> Result<Option<Latest>> {
        let (present, value, captured_at) = self
            .proxy
            .get_latest(metric)
            .await
            .context("Failed to get latest reading via D-Bus")?;
        Ok(present.then_some(Latest { value, captured_at }))
    }

    /// Lists every metric formatted for display.
    pub async fn list_latest(&self) -> Result<Vec<String>> {
        self.proxy
            .list_latest()
            .await
            .context("Failed to list readings via D-Bus")
    }

    /// Appends a record; returns the record count.
    pub async fn add_record(
        &self,
        heart_rate: f64,
        oxygen_saturation: f64,
        heart_rate_variability: f64,
        altitude: f64,
    ) -> Result<u32> {
        self.proxy
            .add_record(heart_rate, oxygen_saturation, heart_rate_variability, altitude)
            .await
            .context("Failed to add record via D-Bus")
    }

    /// Records the current readings; returns the record count.
    pub async fn snapshot_record(&self) -> Result<u32> {
        self.proxy
            .snapshot_record()
            .await
            .context("Failed to record readings via D-Bus")
    }

    /// Number of records kept this session.
    pub async fn record_count(&self) -> Result<u32> {
        self.proxy
            .record_count()
            .await
            .context("Failed to get record count via D-Bus")
    }

    /// Writes the export file; returns its path, or `None` if nothing was
    /// written.
    pub async fn export(&self) -> Result<Option<String>> {
        let path = self
            .proxy
            .export()
            .await
            .context("Failed to export via D-Bus")?;
        Ok((!path.is_empty()).then_some(path))
    }

    /// Shuts down the daemon.
    pub async fn quit(&self) -> Result<()> {
        self.proxy
            .quit()
            .await
            .context("Failed to quit daemon via D-Bus")
    }

    /// Gets the daemon's role.
    pub async fn role(&self) -> Result<String> {
        self.proxy
            .role()
            .await
            .context("Failed to get role via D-Bus")
    }

    /// Checks whether the daemon's peer is reachable.
    pub async fn is_peer_reachable(&self) -> Result<bool> {
        self.proxy
            .peer_reachable()
            .await
            .context("Failed to get peer status via D-Bus")
    }
}
