//! Channel plumbing: the WebSocket transport seam, the capped-exponential
//! reconnect schedule, and the per-scope connection supervisor.

pub mod backoff;
pub mod connection;
pub mod transport;

pub use backoff::Backoff;
pub use connection::{Connection, ConnectionManager, LinkEvent, LinkState};
pub use transport::{Frame, Transport, WireStream, WsTransport};
