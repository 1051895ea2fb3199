//! Transports to the NASA bus
//!
//! - [`tcp::TcpInterface`] - RS-485 to TCP gateway
//! - [`serial::SerialInterface`] - local RS-485 adapter (requires `serial` feature)
//!
//! Transports move raw bytes only. Framing is done by
//! [`crate::codec::FrameDecoder`] in the bridge service, so bytes from any
//! transport go through the same resynchronization logic.
//!
//! # Feature Requirements
//!
//! - `serial`: Requires `libudev-dev` and `pkg-config` on Linux
//!   ```bash
//!   # Ubuntu/Debian
//!   apt install libudev-dev pkg-config
//!   ```

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::SerialInterface;

mod tcp;
pub use tcp::TcpInterface;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Size of a single transport read
pub(crate) const READ_CHUNK_SIZE: usize = 512;

/// Byte-stream transport to the NASA bus
///
/// This trait abstracts over serial ports and TCP gateways, providing a
/// unified API for reading and writing raw bytes.
#[async_trait]
pub trait SerialTransport: Send + Sync {
    /// Open the transport
    async fn connect(&mut self) -> Result<()>;

    /// Close the transport
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if currently connected
    fn is_connected(&self) -> bool;

    /// Read the next chunk of bytes
    ///
    /// Returns `None` when nothing arrived within the read timeout.
    /// Returns `Err` on connection/read errors.
    async fn read(&mut self) -> Result<Option<Bytes>>;

    /// Write bytes to the bus
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Get the transport name (for logging)
    fn name(&self) -> &str;
}

/// Connection state for transports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Connection in progress
    Connecting,
    /// Successfully connected
    Connected,
    /// Connection lost, may reconnect
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}
