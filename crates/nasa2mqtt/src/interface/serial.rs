//! Serial port transport
//!
//! The NASA bus runs at 9600 baud, 8 data bits, even parity, one stop bit.
//! Anything else is almost certainly a misconfigured adapter, so the line
//! settings are fixed and only the baud rate can be overridden.

use crate::config::DEFAULT_BAUD_RATE;
use crate::error::{BridgeError, Result};
use crate::interface::{ConnectionState, SerialTransport, READ_CHUNK_SIZE};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, error, info, trace};

/// Default read timeout
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial transport over a local RS-485 adapter
pub struct SerialInterface {
    /// Serial port path
    port_path: PathBuf,

    /// Baud rate
    baud_rate: u32,

    /// Read timeout
    read_timeout: Duration,

    /// Serial stream (when connected)
    stream: Option<SerialStream>,

    /// Current connection state
    state: ConnectionState,

    /// Interface name for logging
    name: String,
}

impl SerialInterface {
    /// Create a new serial interface
    pub fn new(port: impl AsRef<Path>) -> Self {
        let port_path = port.as_ref().to_path_buf();
        let name = format!("serial:{}", port_path.display());

        Self {
            port_path,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            stream: None,
            state: ConnectionState::Disconnected,
            name,
        }
    }

    /// Create with custom baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Create with custom read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Get the port path
    pub fn port_path(&self) -> &Path {
        &self.port_path
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

#[async_trait]
impl SerialTransport for SerialInterface {
    async fn connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        info!(port = %self.port_path.display(), baud = self.baud_rate, "Opening serial port (8E1)");

        if !self.port_path.exists() {
            self.state = ConnectionState::Disconnected;
            return Err(BridgeError::PortNotFound(
                self.port_path.display().to_string(),
            ));
        }

        let stream = tokio_serial::new(self.port_path.to_string_lossy(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::Even)
            .stop_bits(StopBits::One)
            .open_native_async()
            .map_err(|e| {
                self.state = ConnectionState::Disconnected;
                BridgeError::PortOpenFailed {
                    port: self.port_path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;

        self.stream = Some(stream);
        self.state = ConnectionState::Connected;

        info!(port = %self.port_path.display(), "Serial port open");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.stream = None;
        self.state = ConnectionState::Disconnected;

        info!(port = %self.port_path.display(), "Closed serial port");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.stream.is_some()
    }

    async fn read(&mut self) -> Result<Option<Bytes>> {
        let stream = self.stream.as_mut().ok_or(BridgeError::Disconnected)?;
        let mut buf = [0u8; READ_CHUNK_SIZE];

        match tokio::time::timeout(self.read_timeout, stream.read(&mut buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => {
                // EOF - adapter unplugged
                self.state = ConnectionState::Disconnected;
                self.stream = None;
                Err(BridgeError::Disconnected)
            }
            Ok(Ok(n)) => {
                trace!(bytes = n, "Read from serial port");
                Ok(Some(Bytes::copy_from_slice(&buf[..n])))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Ok(Err(e)) => {
                error!(error = %e, "Serial read error");
                self.state = ConnectionState::Disconnected;
                self.stream = None;
                Err(BridgeError::ReadError(e.to_string()))
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(BridgeError::Disconnected)?;
        debug!(size = data.len(), "Writing to serial port");

        if let Err(e) = stream.write_all(data).await {
            error!(error = %e, "Serial write error");
            self.state = ConnectionState::Disconnected;
            self.stream = None;
            return Err(BridgeError::WriteError(e.to_string()));
        }

        stream
            .flush()
            .await
            .map_err(|e| BridgeError::WriteError(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SerialInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialInterface")
            .field("port", &self.port_path)
            .field("baud_rate", &self.baud_rate)
            .field("state", &self.state)
            .finish()
    }
}
