//! Configuration management.

use anyhow::{Context, Result};
use hikewatch_core::{Exporter, MonitorSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which side of the pair this process is
    #[serde(default)]
    pub role: Role,

    /// Monitoring cycle timing
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Sensor source
    #[serde(default)]
    pub sensor: SensorConfig,

    /// Paired peer link
    #[serde(default)]
    pub peer: PeerConfig,

    /// Export file location
    #[serde(default)]
    pub export: ExportConfig,

    /// Web UI
    #[serde(default)]
    pub web: WebConfig,

    /// D-Bus service
    #[serde(default)]
    pub dbus: DbusConfig,
}

/// Side of the pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Phone side; keeps the record log and exports.
    #[default]
    Primary,
    /// Wrist side.
    Companion,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Primary => write!(f, "primary"),
            Role::Companion => write!(f, "companion"),
        }
    }
}

/// Monitoring cycle timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Pull metric polling period in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Countdown ticks before monitoring becomes active
    #[serde(default = "default_countdown_ticks")]
    pub countdown_ticks: u32,

    /// Countdown tick length in milliseconds
    #[serde(default = "default_countdown_tick")]
    pub countdown_tick_ms: u64,
}

impl MonitorConfig {
    /// Converts to core settings.
    pub fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            countdown_ticks: self.countdown_ticks,
            countdown_tick: Duration::from_millis(self.countdown_tick_ms),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            countdown_ticks: default_countdown_ticks(),
            countdown_tick_ms: default_countdown_tick(),
        }
    }
}

/// Which sensor source backs the pollers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSourceKind {
    /// Synthetic readings.
    #[default]
    Simulated,
    /// One file per metric under `sensor.path`.
    File,
}

/// Sensor source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Source type
    #[serde(default)]
    pub source: SensorSourceKind,

    /// Directory read by the file source
    #[serde(default = "default_sensor_path")]
    pub path: String,

    /// Interval between altitude updates in milliseconds
    #[serde(default = "default_push_interval")]
    pub push_interval_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            source: SensorSourceKind::default(),
            path: default_sensor_path(),
            push_interval_ms: default_push_interval(),
        }
    }
}

/// Paired peer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Whether to pair with a peer at all
    #[serde(default)]
    pub enable: bool,

    /// Address to accept peer messages on
    #[serde(default = "default_peer_listen")]
    pub listen: String,

    /// Address of the peer's listener
    #[serde(default = "default_peer_address")]
    pub address: String,

    /// Reachability probe interval in seconds
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            enable: false,
            listen: default_peer_listen(),
            address: default_peer_address(),
            probe_interval_secs: default_probe_interval(),
        }
    }
}

/// Export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Output directory; empty means the system temp dir
    #[serde(default)]
    pub dir: String,

    /// Output file name
    #[serde(default = "default_export_file")]
    pub file_name: String,
}

impl ExportConfig {
    /// Builds the exporter for this configuration.
    pub fn exporter(&self) -> Exporter {
        if self.dir.is_empty() {
            Exporter::new(std::env::temp_dir(), &self.file_name)
        } else {
            Exporter::new(&self.dir, &self.file_name)
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: String::new(),
            file_name: default_export_file(),
        }
    }
}

/// Web UI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Whether to serve the web UI
    #[serde(default)]
    pub enable: bool,

    /// Server listen address (e.g., "127.0.0.1:8686")
    #[serde(default = "default_web_listen")]
    pub listen: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enable: false,
            listen: default_web_listen(),
        }
    }
}

/// D-Bus bus selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbusBusType {
    /// Session bus, falling back to the system bus.
    #[default]
    Auto,
    Session,
    System,
}

/// D-Bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbusConfig {
    /// Bus to register on
    #[serde(default)]
    pub bus: DbusBusType,

    /// Well-known service name
    #[serde(default = "default_dbus_name")]
    pub name: String,
}

impl Default for DbusConfig {
    fn default() -> Self {
        Self {
            bus: DbusBusType::default(),
            name: default_dbus_name(),
        }
    }
}

// Default value functions
fn default_poll_interval() -> u64 {
    hikewatch_core::DEFAULT_POLL_INTERVAL_SECS
}

fn default_countdown_ticks() -> u32 {
    hikewatch_core::DEFAULT_COUNTDOWN_TICKS
}

fn default_countdown_tick() -> u64 {
    hikewatch_core::DEFAULT_COUNTDOWN_TICK_MS
}

fn default_sensor_path() -> String {
    "/var/lib/hikewatch/sensors".to_string()
}

fn default_push_interval() -> u64 {
    5000
}

fn default_peer_listen() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_peer_address() -> String {
    "127.0.0.1:8788".to_string()
}

fn default_probe_interval() -> u64 {
    10
}

fn default_export_file() -> String {
    hikewatch_core::export::DEFAULT_EXPORT_FILE.to_string()
}

fn default_web_listen() -> String {
    "127.0.0.1:8686".to_string()
}

fn default_dbus_name() -> String {
    "org.hikewatch.Monitor".to_string()
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        Self::parse(&content)
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects timing values the monitor cannot schedule.
    fn validate(&self) -> Result<()> {
        let monitor = &self.monitor;
        ensure_range(
            "monitor.poll_interval_secs",
            monitor.poll_interval_secs,
            1,
            MAX_INTERVAL_MS / 1000,
        )?;
        ensure_range(
            "monitor.countdown_tick_ms",
            monitor.countdown_tick_ms,
            0,
            MAX_COUNTDOWN_MS,
        )?;
        let countdown_ms = monitor.countdown_tick_ms * u64::from(monitor.countdown_ticks);
        if countdown_ms > MAX_COUNTDOWN_MS {
            anyhow::bail!(
                "Countdown of {} x {} ms exceeds {} ms",
                monitor.countdown_ticks,
                monitor.countdown_tick_ms,
                MAX_COUNTDOWN_MS
            );
        }
        ensure_range(
            "sensor.push_interval_ms",
            self.sensor.push_interval_ms,
            1,
            MAX_INTERVAL_MS,
        )?;
        ensure_range(
            "peer.probe_interval_secs",
            self.peer.probe_interval_secs,
            1,
            MAX_INTERVAL_MS / 1000,
        )?;
        Ok(())
    }
}

/// Longest accepted polling, push or probe period (one day).
const MAX_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

/// Longest accepted countdown (one hour).
const MAX_COUNTDOWN_MS: u64 = 60 * 60 * 1000;

fn ensure_range(field: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if !(min..=max).contains(&value) {
        anyhow::bail!("{} must be between {} and {}, got {}", field, min, max, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.role, Role::Primary);
        assert_eq!(config.monitor.settings(), MonitorSettings::default());
        assert_eq!(config.sensor.source, SensorSourceKind::Simulated);
        assert!(!config.peer.enable);
        assert_eq!(config.export.file_name, "HealthData.csv");
        assert_eq!(config.dbus.bus, DbusBusType::Auto);
        assert_eq!(config.dbus.name, "org.hikewatch.Monitor");
    }

    #[test]
    fn test_companion_config() {
        let config = Config::parse(
            r#"
            role = "companion"

            [monitor]
            poll_interval_secs = 30

            [sensor]
            source = "file"
            path = "/tmp/sensors"

            [peer]
            enable = true
            address = "192.168.1.20:8787"

            [dbus]
            bus = "session"
            "#,
        )
        .unwrap();

        assert_eq!(config.role, Role::Companion);
        assert_eq!(
            config.monitor.settings().poll_interval,
            Duration::from_secs(30)
        );
        assert_eq!(config.monitor.countdown_ticks, 3);
        assert_eq!(config.sensor.source, SensorSourceKind::File);
        assert_eq!(config.sensor.path, "/tmp/sensors");
        assert!(config.peer.enable);
        assert_eq!(config.peer.address, "192.168.1.20:8787");
        assert_eq!(config.peer.listen, "0.0.0.0:8787");
        assert_eq!(config.dbus.bus, DbusBusType::Session);
    }

    #[test]
    fn test_shipped_configs_parse() {
        let primary = Config::parse(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(primary.role, Role::Primary);
        assert!(primary.web.enable);

        let companion = Config::parse(include_str!("../../../config/companion.toml")).unwrap();
        assert_eq!(companion.role, Role::Companion);
        assert!(companion.peer.enable);
        assert_eq!(companion.peer.address, primary.peer.listen.replace("0.0.0.0", "127.0.0.1"));
        assert_ne!(companion.dbus.name, primary.dbus.name);
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        assert!(Config::parse("role = \"tablet\"").is_err());
        assert!(Config::parse("[sensor]\nsource = \"bluetooth\"").is_err());
    }

    #[test]
    fn test_zero_push_interval_is_rejected() {
        let err = Config::parse("[sensor]\npush_interval_ms = 0").unwrap_err();
        assert!(err.to_string().contains("sensor.push_interval_ms"));
    }

    #[test]
    fn test_unschedulable_timing_is_rejected() {
        assert!(Config::parse("[monitor]\npoll_interval_secs = 0").is_err());
        assert!(Config::parse("[monitor]\npoll_interval_secs = 9999999999").is_err());
        assert!(Config::parse("[monitor]\ncountdown_tick_ms = 9999999999").is_err());
        assert!(Config::parse("[monitor]\ncountdown_ticks = 4000000000").is_err());
        assert!(Config::parse("[peer]\nprobe_interval_secs = 0").is_err());

        let config = Config::parse("[monitor]\ncountdown_ticks = 0").unwrap();
        assert_eq!(config.monitor.settings().countdown(), Duration::ZERO);
    }

    #[test]
    fn test_export_dir_defaults_to_temp() {
        let config = Config::default();
        assert_eq!(
            config.export.exporter().path(),
            std::env::temp_dir().join("HealthData.csv")
        );

        let export = ExportConfig {
            dir: "/srv/hikewatch".to_string(),
            file_name: "trail.csv".to_string(),
        };
        assert_eq!(
            export.exporter().path(),
            Path::new("/srv/hikewatch/trail.csv")
        );
    }
}
