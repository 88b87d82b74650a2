//! TCP link to the paired peer.
//!
//! Each message is one JSON line on a fresh connection, answered by one
//! acknowledgment line.

mod listener;
mod transport;

pub use listener::serve;
pub use transport::TcpTransport;
