//! D-Bus interface for the hikewatch daemon.
//!
//! Provides the `org.hikewatch.Monitor1` interface.

mod interface;

pub use interface::run_dbus_server;
