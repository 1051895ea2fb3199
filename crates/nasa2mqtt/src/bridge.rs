//! Nasa2Mqtt - bridge service
//!
//! Connects the NASA bus to MQTT. A single task owns every piece of mutable
//! state and processes one event at a time:
//!
//! - bytes from the transport are decoded, applied to the state store and
//!   the resulting deltas published
//! - MQTT commands are mapped to Request frames and written to the bus
//! - the poll tick sends read requests and logs discovered devices
//! - the retry tick resends or gives up on unanswered requests
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Nasa2Mqtt                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────────┐   ┌───────────────┐   ┌─────────────────┐   │
//! │  │ Transport   │──►│ FrameDecoder  │──►│ DeviceStateStore│   │
//! │  │ (serial/tcp)│   └───────────────┘   └────────┬────────┘   │
//! │  │             │                                │ deltas     │
//! │  │             │◄──┌───────────────┐   ┌────────▼────────┐   │
//! │  └─────────────┘   │ PollScheduler │   │ MqttBridge      │   │
//! │         ▲          └───────────────┘   │ (queue, topics) │   │
//! │         └──── command frames ◄─────────┤                 │   │
//! │                                        └─────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use nasa2mqtt::{MqttBridge, Nasa2Mqtt, Nasa2MqttConfigBuilder, TcpInterface};
//!
//! let config = Nasa2MqttConfigBuilder::new()
//!     .tcp("192.168.1.50", 8899)
//!     .mqtt_host("broker.local", 1883)
//!     .build();
//! let mqtt = MqttBridge::connect(&config.mqtt, &config.reconnect);
//! let transport = TcpInterface::new("192.168.1.50:8899");
//!
//! let (service, handle) = Nasa2Mqtt::new(transport, config, Some(mqtt));
//! tokio::spawn(service.run());
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::codec::{Address, AddressClass, DataType, Decoded, Frame, FrameDecoder};
use crate::config::Nasa2MqttConfig;
use crate::debug::DebugLogger;
use crate::error::{BridgeError, Result};
use crate::interface::{ConnectionState, SerialTransport};
use crate::mqtt::{MqttBridge, MqttEvent};
use crate::scheduler::{PollRequest, PollScheduler};
use crate::state::{DeviceStateStore, StateDelta};

/// Shortest interval between retry checks
const MIN_RETRY_CHECK: Duration = Duration::from_millis(100);

/// Commands that can be sent to the bridge
#[derive(Debug)]
pub enum BridgeCommand {
    /// Get bridge statistics
    GetStats(oneshot::Sender<BridgeStats>),
    /// Get the devices seen on the bus
    GetDiscovered(oneshot::Sender<DiscoveredDevices>),
    /// Shutdown the bridge
    Shutdown,
}

/// Bridge statistics
#[derive(Debug, Clone, Default)]
pub struct BridgeStats {
    /// Bytes read from the transport
    pub bytes_received: u64,
    /// Frames decoded successfully
    pub frames_decoded: u64,
    /// Frame candidates rejected by the codec
    pub frames_invalid: u64,
    /// Frames from other controllers that were not applied
    pub frames_ignored: u64,
    /// State deltas produced
    pub deltas: u64,
    /// Read requests written, retries included
    pub requests_sent: u64,
    /// Requests that ran out of retries
    pub request_timeouts: u64,
    /// Command frames written for MQTT clients
    pub commands_sent: u64,
    /// MQTT commands that could not be mapped
    pub command_errors: u64,
    /// Transport read/write errors
    pub transport_errors: u64,
    /// Successful transport reconnections
    pub reconnects: u64,
    /// Current state of the bus link
    pub transport_state: ConnectionState,
    /// Publishes waiting for the broker
    pub mqtt_queued: usize,
    /// Publishes dropped from the full queue
    pub mqtt_dropped: u64,
    /// Debug records dropped
    pub debug_dropped: u64,
}

/// Devices seen on the bus, grouped by class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredDevices {
    pub outdoor: Vec<Address>,
    pub indoor: Vec<Address>,
    pub other: Vec<Address>,
}

impl DiscoveredDevices {
    fn from_addresses<'a>(addresses: impl IntoIterator<Item = &'a Address>) -> Self {
        let mut devices = Self::default();
        for address in addresses {
            match address.class {
                AddressClass::Outdoor => devices.outdoor.push(*address),
                AddressClass::Indoor => devices.indoor.push(*address),
                _ => devices.other.push(*address),
            }
        }
        devices
    }

    /// Total number of devices
    pub fn len(&self) -> usize {
        self.outdoor.len() + self.indoor.len() + self.other.len()
    }

    /// Whether nothing has been seen yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn join_addresses(addresses: &[Address]) -> String {
    if addresses.is_empty() {
        return "-".to_string();
    }
    addresses
        .iter()
        .map(Address::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for DiscoveredDevices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Outdoor: {}; Indoor: {}",
            join_addresses(&self.outdoor),
            join_addresses(&self.indoor)
        )?;
        if !self.other.is_empty() {
            write!(f, "; Other: {}", join_addresses(&self.other))?;
        }
        Ok(())
    }
}

/// How a reconnect attempt ended
enum Reconnect {
    Connected,
    ShutdownRequested,
}

/// Handle for controlling the bridge service
#[derive(Clone)]
pub struct BridgeHandle {
    command_tx: mpsc::Sender<BridgeCommand>,
}

impl BridgeHandle {
    /// Get bridge statistics
    pub async fn stats(&self) -> Result<BridgeStats> {
        let (tx, rx) = oneshot::channel();
        self.command_tx.send(BridgeCommand::GetStats(tx)).await?;
        rx.await.map_err(|_| BridgeError::ChannelClosed)
    }

    /// Get the devices seen on the bus so far
    pub async fn discovered(&self) -> Result<DiscoveredDevices> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(BridgeCommand::GetDiscovered(tx))
            .await?;
        rx.await.map_err(|_| BridgeError::ChannelClosed)
    }

    /// Shutdown the bridge
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx.send(BridgeCommand::Shutdown).await?;
        Ok(())
    }
}

/// Main bridge service connecting the NASA bus to MQTT
pub struct Nasa2Mqtt<T: SerialTransport> {
    /// Bus transport
    transport: T,
    /// Configuration
    config: Nasa2MqttConfig,
    /// Receive buffer and framing
    decoder: FrameDecoder,
    /// Last known values
    store: DeviceStateStore,
    /// Read requests and retries
    scheduler: PollScheduler,
    /// MQTT side, `None` when no broker is configured
    mqtt: Option<MqttBridge>,
    /// Raw/decoded frame tracing
    debug: DebugLogger,
    /// Source addresses seen on the bus
    discovered: BTreeSet<Address>,
    /// Command frames accepted while the bus link was down
    held_commands: Vec<Frame>,
    /// Command receiver
    command_rx: mpsc::Receiver<BridgeCommand>,
    /// Bridge statistics
    stats: BridgeStats,
}

impl<T: SerialTransport + 'static> Nasa2Mqtt<T> {
    /// Create a new bridge service
    ///
    /// Spawns the debug log sink when debug logging is enabled, so this must
    /// be called inside a tokio runtime in that case.
    pub fn new(
        transport: T,
        config: Nasa2MqttConfig,
        mqtt: Option<MqttBridge>,
    ) -> (Self, BridgeHandle) {
        let debug = DebugLogger::new(&config.debug);
        Self::with_debug_logger(transport, config, mqtt, debug)
    }

    /// Create a bridge service with an explicit debug logger
    pub fn with_debug_logger(
        transport: T,
        config: Nasa2MqttConfig,
        mqtt: Option<MqttBridge>,
        debug: DebugLogger,
    ) -> (Self, BridgeHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let handle = BridgeHandle { command_tx };

        let service = Self {
            transport,
            decoder: FrameDecoder::new(),
            store: DeviceStateStore::new(),
            scheduler: PollScheduler::new(&config.poll),
            mqtt,
            debug,
            discovered: BTreeSet::new(),
            held_commands: Vec::new(),
            command_rx,
            stats: BridgeStats::default(),
            config,
        };

        (service, handle)
    }

    /// Run the bridge service
    ///
    /// Fails immediately if the transport cannot be opened. Afterwards,
    /// transport errors trigger reconnection; the service only returns an
    /// error once reconnection gives up. Shutdown is honoured at any time,
    /// including while reconnecting.
    pub async fn run(mut self) -> Result<()> {
        info!(transport = %self.transport.name(), "Starting NASA bridge service");
        self.stats.transport_state = ConnectionState::Connecting;
        if let Err(e) = self.transport.connect().await {
            self.stats.transport_state = ConnectionState::Disconnected;
            return Err(e);
        }
        self.stats.transport_state = ConnectionState::Connected;

        if self.mqtt.is_none() {
            info!("MQTT disabled, values will only be logged");
        }

        let mut poll = tokio::time::interval(self.config.poll.interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut retry =
            tokio::time::interval((self.config.poll.response_timeout / 2).max(MIN_RETRY_CHECK));
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                read = self.transport.read() => {
                    match read {
                        Ok(Some(data)) => {
                            self.on_data(&data, Instant::now());
                        }
                        Ok(None) => {
                            self.decoder.expire_partial(Instant::now());
                        }
                        Err(e) => {
                            warn!(error = %e, code = e.error_code(), "Transport read failed");
                            self.stats.transport_errors += 1;
                            match self.try_reconnect().await {
                                Ok(Reconnect::Connected) => {}
                                Ok(Reconnect::ShutdownRequested) => break Ok(()),
                                Err(reconnect_err) => {
                                    error!(error = %reconnect_err, "Giving up on transport");
                                    break Err(reconnect_err);
                                }
                            }
                        }
                    }
                }

                event = next_mqtt_event(&mut self.mqtt) => {
                    if let Some(frame) = self.on_mqtt_event(event, Instant::now()) {
                        if self.write_frame(&frame).await.is_ok() {
                            self.stats.commands_sent += 1;
                        }
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    if self.handle_command(cmd) {
                        break Ok(());
                    }
                }

                _ = poll.tick() => {
                    let requests = self.on_tick(Instant::now());
                    self.send_requests(requests).await;
                }

                _ = retry.tick() => {
                    let retries = self.on_expire(Instant::now());
                    self.send_requests(retries).await;
                }
            }
        };

        self.shutdown().await;
        info!("NASA bridge stopped");
        result
    }

    /// Feed received bytes through the decoder
    ///
    /// Every decoded frame is handled in order; the produced deltas are
    /// published (or logged without MQTT) and returned.
    pub fn on_data(&mut self, data: &[u8], now: Instant) -> Vec<StateDelta> {
        self.stats.bytes_received += data.len() as u64;
        self.debug.log_raw(data);
        self.decoder.push(data, now);

        let mut deltas = Vec::new();
        loop {
            match self.decoder.next_frame() {
                Decoded::Frame(frame) => {
                    self.stats.frames_decoded += 1;
                    deltas.extend(self.handle_frame(&frame, now));
                }
                Decoded::NeedMoreData => break,
                Decoded::Invalid(e) => {
                    self.stats.frames_invalid += 1;
                    debug!(error = %e, "Discarding invalid frame");
                }
            }
        }
        deltas
    }

    /// Start a poll round and report discovered devices
    pub fn on_tick(&mut self, now: Instant) -> Vec<PollRequest> {
        self.report_discovered();
        self.scheduler.tick(now)
    }

    /// Check for unanswered requests, returning the retries to send
    pub fn on_expire(&mut self, now: Instant) -> Vec<PollRequest> {
        let (retries, timeouts) = self.scheduler.expire(now);
        self.stats.request_timeouts += timeouts.len() as u64;
        for timeout in timeouts {
            let err = BridgeError::from(timeout);
            debug!(error = %err, code = err.error_code(), "Request abandoned");
        }
        retries
    }

    /// Apply an MQTT event, returning a command frame to write if any
    pub fn on_mqtt_event(&mut self, event: MqttEvent, now: Instant) -> Option<Frame> {
        let mqtt = self.mqtt.as_mut()?;
        if event == MqttEvent::Connected {
            // republish everything after an outage so dropped updates are not lost
            self.store.request_full_resync();
        }
        let (topic, payload) = mqtt.handle_event(event)?;

        match mqtt.on_command(&topic, &payload) {
            Ok(mut frame) => {
                frame.command.packet_number = self.scheduler.next_packet_number();
                if let Some(set) = frame.messages.first() {
                    self.scheduler
                        .track_command(frame.destination, set.number, now);
                    info!(
                        %topic,
                        address = %frame.destination,
                        message = %set.number,
                        "Forwarding command to bus"
                    );
                }
                Some(frame)
            }
            Err(e) => {
                self.stats.command_errors += 1;
                let err = BridgeError::from(e);
                warn!(error = %err, code = err.error_code(), "Dropping MQTT command");
                None
            }
        }
    }

    /// Snapshot of the bridge statistics
    pub fn stats(&self) -> BridgeStats {
        let mut stats = self.stats.clone();
        if let Some(mqtt) = &self.mqtt {
            let mqtt_stats = mqtt.stats();
            stats.mqtt_queued = mqtt_stats.queued;
            stats.mqtt_dropped = mqtt_stats.dropped;
        }
        stats.debug_dropped = self.debug.dropped();
        stats
    }

    /// Devices seen on the bus so far
    pub fn discovered(&self) -> DiscoveredDevices {
        DiscoveredDevices::from_addresses(&self.discovered)
    }

    /// The state store
    pub fn store(&self) -> &DeviceStateStore {
        &self.store
    }

    /// The poll scheduler
    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    /// The MQTT side, if enabled
    pub fn mqtt(&self) -> Option<&MqttBridge> {
        self.mqtt.as_ref()
    }

    /// Answer a handle command, returning true on shutdown
    fn handle_command(&mut self, cmd: BridgeCommand) -> bool {
        match cmd {
            BridgeCommand::GetStats(tx) => {
                let _ = tx.send(self.stats());
            }
            BridgeCommand::GetDiscovered(tx) => {
                let _ = tx.send(self.discovered());
            }
            BridgeCommand::Shutdown => {
                info!("Bridge shutdown requested");
                return true;
            }
        }
        false
    }

    fn handle_frame(&mut self, frame: &Frame, now: Instant) -> Vec<StateDelta> {
        self.debug.log_decoded(frame);

        match frame.command.data_type {
            DataType::Read | DataType::Write | DataType::Request => {
                debug!(
                    data_type = ?frame.command.data_type,
                    source = %frame.source,
                    destination = %frame.destination,
                    "Ignoring frame from another controller"
                );
                self.stats.frames_ignored += 1;
                return Vec::new();
            }
            DataType::Response => {
                for set in &frame.messages {
                    self.scheduler.on_response(frame.source, set.number);
                }
            }
            _ => {}
        }

        if self.discovered.insert(frame.source) {
            info!(address = %frame.source, "Discovered device");
        }

        let deltas = self.store.apply(frame, now);
        self.stats.deltas += deltas.len() as u64;

        match self.mqtt.as_mut() {
            Some(mqtt) => {
                if self.debug.logs_messages() {
                    for set in &frame.messages {
                        mqtt.publish_debug(set);
                    }
                }
                for delta in &deltas {
                    mqtt.publish(delta);
                }
            }
            None => {
                for delta in &deltas {
                    debug!(
                        address = %delta.address,
                        capability = delta.capability_name(),
                        old = ?delta.old,
                        new = delta.new,
                        "State changed"
                    );
                }
            }
        }

        deltas
    }

    fn report_discovered(&self) {
        let devices = self.discovered();
        info!(
            outdoor = %join_addresses(&devices.outdoor),
            indoor = %join_addresses(&devices.indoor),
            "Discovered devices"
        );
        if !devices.other.is_empty() {
            info!(other = %join_addresses(&devices.other), "Discovered other devices");
        }
        trace!(
            frames = self.stats.frames_decoded,
            invalid = self.stats.frames_invalid,
            deltas = self.stats.deltas,
            "Bridge stats"
        );
    }

    async fn send_requests(&mut self, requests: Vec<PollRequest>) {
        for request in requests {
            if self.write_frame(&request.frame).await.is_ok() {
                self.stats.requests_sent += 1;
            }
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let bytes = match frame.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Refusing to send unencodable frame");
                return Err(e.into());
            }
        };

        trace!(bytes = %hex::encode(&bytes), "Writing frame");
        if let Err(e) = self.transport.write(&bytes).await {
            warn!(error = %e, code = e.error_code(), "Transport write failed");
            self.stats.transport_errors += 1;
            return Err(e);
        }
        Ok(())
    }

    /// Try to reconnect the transport with backoff
    ///
    /// Handle commands and MQTT events keep being served between attempts.
    /// MQTT commands accepted meanwhile are written once the link is back.
    async fn try_reconnect(&mut self) -> Result<Reconnect> {
        warn!(transport = %self.transport.name(), "Attempting to reconnect transport...");
        self.stats.transport_state = ConnectionState::Reconnecting;

        let _ = self.transport.disconnect().await;
        self.decoder.clear();

        let mut failures = 0u32;
        loop {
            if !self.config.reconnect.allows(failures) {
                self.stats.transport_state = ConnectionState::Disconnected;
                return Err(BridgeError::Disconnected);
            }

            let backoff = tokio::time::sleep(self.config.reconnect.backoff(failures + 1));
            tokio::pin!(backoff);
            loop {
                tokio::select! {
                    _ = &mut backoff => break,

                    Some(cmd) = self.command_rx.recv() => {
                        if self.handle_command(cmd) {
                            self.stats.transport_state = ConnectionState::Disconnected;
                            return Ok(Reconnect::ShutdownRequested);
                        }
                    }

                    event = next_mqtt_event(&mut self.mqtt) => {
                        if let Some(frame) = self.on_mqtt_event(event, Instant::now()) {
                            debug!(address = %frame.destination, "Holding command until the bus is back");
                            self.held_commands.push(frame);
                        }
                    }
                }
            }

            match self.transport.connect().await {
                Ok(()) => {
                    self.stats.reconnects += 1;
                    self.stats.transport_state = ConnectionState::Connected;
                    info!(transport = %self.transport.name(), "Transport reconnected");
                    self.write_held_commands().await;
                    return Ok(Reconnect::Connected);
                }
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, attempt = failures, "Reconnect failed");
                }
            }
        }
    }

    async fn write_held_commands(&mut self) {
        for frame in std::mem::take(&mut self.held_commands) {
            if self.write_frame(&frame).await.is_ok() {
                self.stats.commands_sent += 1;
            }
        }
    }

    async fn shutdown(&mut self) {
        let abandoned = self.scheduler.abandon_all();
        if abandoned > 0 {
            debug!(abandoned, "Abandoned pending requests");
        }
        if !self.held_commands.is_empty() {
            debug!(dropped = self.held_commands.len(), "Dropping held commands");
            self.held_commands.clear();
        }
        if let Some(mqtt) = self.mqtt.as_mut() {
            mqtt.shutdown();
        }
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "Error disconnecting transport");
        }
        self.stats.transport_state = ConnectionState::Disconnected;
    }
}

/// Next MQTT event, or never when MQTT is disabled or its task has ended
async fn next_mqtt_event(mqtt: &mut Option<MqttBridge>) -> MqttEvent {
    if let Some(mqtt) = mqtt.as_mut() {
        if let Some(event) = mqtt.next_event().await {
            return event;
        }
    }
    std::future::pending().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Command, MessageNumber, MessageSet};
    use crate::config::Nasa2MqttConfigBuilder;
    use crate::test_utils::MockTransport;

    fn notification(source: Address, data_type: DataType, sets: Vec<MessageSet>) -> Vec<u8> {
        Frame::new(
            source,
            Address::new(AddressClass::BroadcastSetLayer, 0x00, 0xFF),
            Command::normal(data_type, 1),
            sets,
        )
        .encode()
        .unwrap()
        .to_vec()
    }

    fn service() -> (Nasa2Mqtt<MockTransport>, BridgeHandle) {
        let config = Nasa2MqttConfigBuilder::new().build();
        Nasa2Mqtt::new(MockTransport::new(), config, None)
    }

    #[test]
    fn test_requests_from_other_controllers_ignored() {
        let (mut bridge, _handle) = service();
        let source = Address::new(AddressClass::WiredRemote, 0x00, 0x00);
        let data = notification(
            source,
            DataType::Write,
            vec![MessageSet::new(MessageNumber(0x4000), 1).unwrap()],
        );
        assert!(bridge.on_data(&data, Instant::now()).is_empty());
        assert_eq!(bridge.stats().frames_ignored, 1);
        assert!(bridge.discovered().is_empty());
    }

    #[test]
    fn test_notification_applied_and_discovered() {
        let (mut bridge, _handle) = service();
        let outdoor = Address::new(AddressClass::Outdoor, 0x00, 0x00);
        let data = notification(
            outdoor,
            DataType::Notification,
            vec![MessageSet::new(MessageNumber(0x8204), 80).unwrap()],
        );
        let deltas = bridge.on_data(&data, Instant::now());
        assert_eq!(deltas.len(), 1);
        assert_eq!(bridge.discovered().outdoor, vec![outdoor]);
        assert_eq!(bridge.discovered().to_string(), "Outdoor: 10.00.00; Indoor: -");
    }

    #[test]
    fn test_split_reads_reassembled() {
        let (mut bridge, _handle) = service();
        let data = notification(
            Address::new(AddressClass::Indoor, 0x00, 0x00),
            DataType::Notification,
            vec![MessageSet::new(MessageNumber(0x4203), 215).unwrap()],
        );
        let now = Instant::now();
        assert!(bridge.on_data(&data[..5], now).is_empty());
        assert_eq!(bridge.on_data(&data[5..], now).len(), 1);
        assert_eq!(bridge.stats().frames_decoded, 1);
        assert_eq!(bridge.stats().bytes_received, data.len() as u64);
    }

    #[test]
    fn test_discovered_display_other() {
        let devices = DiscoveredDevices::from_addresses(&[
            Address::new(AddressClass::Indoor, 0x00, 0x00),
            Address::new(AddressClass::WiFiKit, 0x00, 0x01),
        ]);
        assert_eq!(devices.len(), 2);
        assert_eq!(
            devices.to_string(),
            "Outdoor: -; Indoor: 20.00.00; Other: 62.00.01"
        );
    }

    #[tokio::test]
    async fn test_handle_stats_and_shutdown() {
        let (bridge, handle) = service();
        let task = tokio::spawn(bridge.run());

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.frames_decoded, 0);
        assert_eq!(stats.transport_state, ConnectionState::Connected);
        handle.shutdown().await.unwrap();
        assert!(task.await.unwrap().is_ok());
    }
}
