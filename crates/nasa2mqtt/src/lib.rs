//! Samsung NASA to MQTT Bridge
//!
//! This crate connects to the NASA bus of a Samsung heat pump or air
//! conditioner, either directly through an RS-485 serial adapter or through
//! a TCP serial gateway, and mirrors the values the units broadcast onto an
//! MQTT broker. MQTT clients can write values back through command topics.
//!
//! # Architecture
//!
//! The bridge operates in four layers:
//!
//! 1. **Transport** - serial port or TCP gateway carrying raw bytes
//! 2. **Codec** - framing, CRC and message sets of the NASA protocol
//! 3. **State** - last known value per device and capability, change detection
//! 4. **MQTT** - state publishing, buffering while offline, command mapping
//!
//! A [`PollScheduler`] sends read requests for configured values that the
//! units do not broadcast on their own, retrying unanswered requests.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use nasa2mqtt::{MqttBridge, Nasa2Mqtt, Nasa2MqttConfigBuilder, TcpInterface};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Nasa2MqttConfigBuilder::new()
//!         .tcp("192.168.1.50", 8899)
//!         .mqtt_host("broker.local", 1883)
//!         .build();
//!     config.validate()?;
//!
//!     let mqtt = MqttBridge::connect(&config.mqtt, &config.reconnect);
//!     let transport = TcpInterface::new("192.168.1.50:8899");
//!     let (service, handle) = Nasa2Mqtt::new(transport, config, Some(mqtt));
//!
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         handle.shutdown().await.ok();
//!     });
//!     service.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `serial` - Serial port transport (requires `libudev-dev` on Linux)
//!
//! # Message Flow
//!
//! ## Bus → MQTT
//!
//! 1. Transport reads a chunk of bytes
//! 2. FrameDecoder resynchronizes on the start marker and validates the CRC
//! 3. DeviceStateStore records each value and reports changes
//! 4. MqttBridge publishes `{prefix}/{address}/{number}/state`
//!
//! ## MQTT → Bus
//!
//! 1. Client publishes to `{prefix}/{address}/{number}/set`
//! 2. TopicScheme maps the topic and payload to a Request frame
//! 3. The bridge assigns a packet number and writes the frame
//! 4. The device answers; the new value arrives as a normal state update
//!
//! # Protocol Details
//!
//! ```text
//! 0x32 | size (2) | source (3) | destination (3) | command (3) | count (1)
//!      | message sets ... | crc16 (2) | 0x34
//! ```
//!
//! `size` is the total frame length minus two. The CRC is CRC-16/XMODEM
//! over everything between the size field and the CRC.

#![warn(rustdoc::missing_crate_level_docs)]

// Protocol
pub mod catalog;
pub mod codec;
pub mod error;

// Transport and configuration
pub mod config;
pub mod interface;

// Bridge components
pub mod debug;
pub mod mqtt;
pub mod scheduler;
pub mod state;

// Service
pub mod bridge;

// Testing utilities
pub mod test_utils;

// Re-exports for convenience - protocol
pub use codec::{
    Address, AddressClass, Command, DataType, Decoded, Frame, FrameDecoder, MessageKind,
    MessageNumber, MessageSet, MessageValue, PacketType,
};
pub use error::{BridgeError, CommandMappingError, ProtocolError, Result};

// Re-exports for convenience - transport and configuration
pub use config::{
    DebugConfig, MqttConfig, Nasa2MqttConfig, Nasa2MqttConfigBuilder, PollConfig, PollTarget,
    ReconnectConfig, TransportConfig,
};
pub use interface::{ConnectionState, SerialTransport, TcpInterface};

#[cfg(feature = "serial")]
pub use interface::SerialInterface;

// Re-exports for convenience - bridge components
pub use debug::{DebugLogger, DebugRecord};
pub use mqtt::{MqttBridge, MqttEvent, MqttPublisher, MqttStats, PublishQueue, TopicScheme};
pub use scheduler::{PollRequest, PollScheduler, RequestOrigin, RequestTimeout};
pub use state::{DeviceStateStore, Observation, StateDelta};

// Re-exports for convenience - service
pub use bridge::{BridgeHandle, BridgeStats, DiscoveredDevices, Nasa2Mqtt};

// Re-exports for convenience - testing
pub use test_utils::{MockTransport, RecordingPublisher, TestFixture};

// Protocol constants re-exports
pub use codec::{END_BYTE, MAX_FRAME_SIZE, MIN_FRAME_SIZE, START_BYTE};
pub use config::{DEFAULT_BAUD_RATE, DEFAULT_MQTT_PORT, DEFAULT_TOPIC_PREFIX};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
