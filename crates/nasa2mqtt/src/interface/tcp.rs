//! TCP transport for RS-485 gateways
//!
//! Many installations reach the bus through a serial-to-Ethernet converter
//! that exposes the raw RS-485 byte stream on a TCP port.

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace};

use super::{ConnectionState, SerialTransport, READ_CHUNK_SIZE};

/// Default connect timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default read timeout
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// TCP transport to a serial gateway
pub struct TcpInterface {
    address: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    stream: Option<TcpStream>,
    state: ConnectionState,
    name: String,
}

impl TcpInterface {
    /// Create a new TCP transport
    ///
    /// # Arguments
    ///
    /// * `address` - Gateway address (e.g., "192.168.1.100:8899")
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        let name = format!("tcp:{}", address);
        Self {
            address,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            stream: None,
            state: ConnectionState::Disconnected,
            name,
        }
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

#[async_trait]
impl SerialTransport for TcpInterface {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        info!(address = %self.address, "Connecting to TCP gateway");

        let stream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect(self.address.as_str()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.state = ConnectionState::Disconnected;
                return Err(BridgeError::PortOpenFailed {
                    port: self.address.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                self.state = ConnectionState::Disconnected;
                return Err(BridgeError::ConnectionTimeout {
                    duration_ms: self.connect_timeout.as_millis() as u64,
                });
            }
        };

        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        self.state = ConnectionState::Connected;

        info!(address = %self.address, "Connected to TCP gateway");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.state = ConnectionState::Disconnected;

        info!(address = %self.address, "Disconnected from TCP gateway");
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
                self.state = ConnectionState::Disconnected;
                self.stream = None;
                Err(BridgeError::Disconnected)
            }
            Ok(Ok(n)) => {
                trace!(bytes = n, "Read from TCP gateway");
                Ok(Some(Bytes::copy_from_slice(&buf[..n])))
            }
            Ok(Err(e)) => {
                error!(error = %e, "TCP read error");
                self.state = ConnectionState::Disconnected;
                self.stream = None;
                Err(BridgeError::ReadError(e.to_string()))
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(BridgeError::Disconnected)?;
        debug!(size = data.len(), "Writing to TCP gateway");

        if let Err(e) = stream.write_all(data).await {
            error!(error = %e, "TCP write error");
            self.state = ConnectionState::Disconnected;
            self.stream = None;
            return Err(BridgeError::WriteError(e.to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for TcpInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpInterface")
            .field("address", &self.address)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_interface_name() {
        let iface = TcpInterface::new("192.168.1.100:8899");
        assert_eq!(iface.name(), "tcp:192.168.1.100:8899");
        assert_eq!(iface.state(), ConnectionState::Disconnected);
        assert!(!iface.is_connected());
    }

    #[tokio::test]
    async fn test_read_without_connect() {
        let mut iface = TcpInterface::new("127.0.0.1:1");
        assert!(matches!(iface.read().await, Err(BridgeError::Disconnected)));
    }

    #[tokio::test]
    async fn test_exchange_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&[0x32, 0x00, 0x12]).await.unwrap();
            let mut buf = [0u8; 2];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut iface = TcpInterface::new(addr.to_string()).with_read_timeout(Duration::from_secs(2));
        iface.connect().await.unwrap();
        assert!(iface.is_connected());

        let chunk = iface.read().await.unwrap().unwrap();
        assert_eq!(chunk.as_ref(), &[0x32, 0x00, 0x12]);

        iface.write(&[0xAB, 0xCD]).await.unwrap();
        assert_eq!(server.await.unwrap(), [0xAB, 0xCD]);

        iface.disconnect().await.unwrap();
        assert!(!iface.is_connected());
    }

    #[tokio::test]
    async fn test_peer_close_reports_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut iface = TcpInterface::new(addr.to_string()).with_read_timeout(Duration::from_secs(2));
        iface.connect().await.unwrap();
        assert!(matches!(iface.read().await, Err(BridgeError::Disconnected)));
        assert!(!iface.is_connected());
    }
}
