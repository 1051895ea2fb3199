//! Error types for NASA bridge operations
//!
//! The taxonomy follows the pipeline: transport failures (serial/TCP),
//! protocol failures (bad frames), request timeouts, MQTT connection
//! failures and inbound command mapping failures. Only transport
//! initialization failures are treated as fatal by the bridge service.

use thiserror::Error;

/// Main error type for NASA bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // ===== Transport Errors =====
    /// Serial port not found
    #[error("Serial port not found: {0}")]
    PortNotFound(String),

    /// Serial port or socket open failed
    #[error("Failed to open transport {port}: {reason}")]
    PortOpenFailed {
        /// Port path or socket address
        port: String,
        /// Failure reason
        reason: String,
    },

    /// Transport read error
    #[error("Transport read error: {0}")]
    ReadError(String),

    /// Transport write error
    #[error("Transport write error: {0}")]
    WriteError(String),

    /// Transport disconnected
    #[error("Transport disconnected")]
    Disconnected,

    /// Connection timeout
    #[error("Connection timeout after {duration_ms}ms")]
    ConnectionTimeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    // ===== Protocol Errors =====
    /// Malformed frame
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A request exhausted its retries without a matching response
    #[error("Request timed out: {address} {message} after {attempts} attempts")]
    RequestTimeout {
        /// Destination address (text form)
        address: String,
        /// Message number (text form)
        message: String,
        /// Number of transmissions made
        attempts: u32,
    },

    // ===== MQTT Errors =====
    /// MQTT connection or client failure
    #[error("MQTT connection error: {0}")]
    MqttConnection(String),

    /// Inbound command could not be mapped to a frame
    #[error("Command mapping error: {0}")]
    CommandMapping(#[from] CommandMappingError),

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ===== General Errors =====
    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame-level decoding failures. Always recovered locally by resync.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// First byte is not the start marker
    #[error("invalid start byte 0x{0:02x}")]
    InvalidStart(u8),

    /// Last byte is not the end marker
    #[error("invalid end byte 0x{0:02x}")]
    InvalidEnd(u8),

    /// Declared or actual size outside the accepted range
    #[error("unexpected frame size {0}")]
    InvalidSize(usize),

    /// Declared size does not match the buffer
    #[error("declared size {declared} does not match actual size {actual}")]
    SizeMismatch {
        /// Size field value
        declared: usize,
        /// Bytes actually present minus two
        actual: usize,
    },

    /// Checksum mismatch
    #[error("invalid crc - calculated 0x{calculated:04x} but frame says 0x{expected:04x}")]
    Checksum {
        /// CRC computed over the frame body
        calculated: u16,
        /// CRC carried in the frame
        expected: u16,
    },

    /// Message sets run past the end of the payload
    #[error("message set {index} truncated")]
    Truncated {
        /// Zero-based message set index
        index: usize,
    },

    /// Structure message in a multi-message frame
    #[error("structure messages can only have one message but frame has {0}")]
    StructureCapacity(usize),

    /// Bytes left over after the declared message sets
    #[error("{extra} unexpected bytes after {count} message sets")]
    TrailingData {
        /// Declared message set count
        count: usize,
        /// Unconsumed payload bytes
        extra: usize,
    },
}

/// Failures translating an inbound MQTT command. Logged and dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandMappingError {
    /// Topic does not map to a known device capability
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// Payload is not a valid value for the capability
    #[error("malformed payload for {topic}: {reason}")]
    MalformedPayload {
        /// Command topic
        topic: String,
        /// Why the payload was rejected
        reason: String,
    },
}

impl BridgeError {
    /// Check if this error is recoverable/retriable
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionTimeout { .. }
                | BridgeError::Disconnected
                | BridgeError::ReadError(_)
                | BridgeError::WriteError(_)
                | BridgeError::MqttConnection(_)
                | BridgeError::Io(_)
        )
    }

    /// Check if this is a protocol error (bad data from the bus)
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, BridgeError::Protocol(_))
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::PortNotFound(_) => "PORT_NOT_FOUND",
            BridgeError::PortOpenFailed { .. } => "PORT_OPEN_FAILED",
            BridgeError::ReadError(_) => "READ_ERROR",
            BridgeError::WriteError(_) => "WRITE_ERROR",
            BridgeError::Disconnected => "DISCONNECTED",
            BridgeError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            BridgeError::Protocol(_) => "PROTOCOL_ERROR",
            BridgeError::RequestTimeout { .. } => "REQUEST_TIMEOUT",
            BridgeError::MqttConnection(_) => "MQTT_CONNECTION",
            BridgeError::CommandMapping(_) => "COMMAND_MAPPING",
            BridgeError::InvalidConfig(_) => "INVALID_CONFIG",
            BridgeError::ChannelClosed => "CHANNEL_CLOSED",
            BridgeError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<rumqttc::ClientError> for BridgeError {
    fn from(err: rumqttc::ClientError) -> Self {
        BridgeError::MqttConnection(err.to_string())
    }
}

impl From<rumqttc::ConnectionError> for BridgeError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        BridgeError::MqttConnection(err.to_string())
    }
}

// Conversion from serialport error (only when serial feature is enabled)
#[cfg(feature = "serial")]
impl From<tokio_serial::Error> for BridgeError {
    fn from(err: tokio_serial::Error) -> Self {
        match err.kind {
            tokio_serial::ErrorKind::NoDevice => BridgeError::PortNotFound(err.description),
            tokio_serial::ErrorKind::Io(kind) => {
                BridgeError::Io(std::io::Error::new(kind, err.description))
            }
            _ => BridgeError::PortOpenFailed {
                port: String::new(),
                reason: err.description,
            },
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for BridgeError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        BridgeError::ChannelClosed
    }
}
