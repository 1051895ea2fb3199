//! Test utilities for running the bridge without hardware or a broker
//!
//! [`MockTransport`] stands in for the serial port or TCP gateway and
//! [`RecordingPublisher`] for the MQTT client. Both are cheap clones over
//! shared state, so a test can hand one copy to the bridge and keep another
//! to inject bytes and inspect what was written or published.
//!
//! # Example
//!
//! ```rust,ignore
//! use nasa2mqtt::test_utils::{MockTransport, TestFixture};
//!
//! let fixture = TestFixture::new();
//! fixture.transport.queue_incoming(MockTransport::create_notification(
//!     indoor,
//!     &[(0x4203, 215)],
//! ));
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::QoS;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::codec::{Address, AddressClass, Command, DataType, Frame, MessageNumber, MessageSet};
use crate::config::{Nasa2MqttConfig, Nasa2MqttConfigBuilder};
use crate::error::{BridgeError, Result};
use crate::interface::SerialTransport;
use crate::mqtt::MqttPublisher;

/// How long a read waits when nothing is queued
const MOCK_READ_TIMEOUT: Duration = Duration::from_millis(20);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    incoming: VecDeque<Vec<u8>>,
    outgoing: Vec<Vec<u8>>,
    simulate_errors: bool,
    failing_connects: usize,
    error_on_nth_read: Option<usize>,
    read_count: usize,
    connect_count: usize,
}

/// Mock transport for testing without a bus
///
/// Reads return queued chunks in order, or `None` after a short wait when
/// the queue is empty. Writes are recorded.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a chunk to be returned by a later read
    pub fn queue_incoming(&self, data: Vec<u8>) {
        lock(&self.state).incoming.push_back(data);
    }

    /// Chunks written so far
    pub fn get_outgoing(&self) -> Vec<Vec<u8>> {
        lock(&self.state).outgoing.clone()
    }

    /// Frames written so far, decoded
    pub fn sent_frames(&self) -> Vec<Frame> {
        lock(&self.state)
            .outgoing
            .iter()
            .filter_map(|bytes| Frame::decode(bytes).ok())
            .collect()
    }

    /// Clear the recorded writes
    pub fn clear_outgoing(&self) {
        lock(&self.state).outgoing.clear();
    }

    /// Fail every operation while enabled
    pub fn simulate_errors(&self, enabled: bool) {
        lock(&self.state).simulate_errors = enabled;
    }

    /// Fail the next `count` connect attempts
    pub fn fail_connects(&self, count: usize) {
        lock(&self.state).failing_connects = count;
    }

    /// Fail the Nth read from now
    pub fn error_on_read(&self, n: Option<usize>) {
        let mut state = lock(&self.state);
        state.error_on_nth_read = n;
        state.read_count = 0;
    }

    /// Successful connects so far
    pub fn connect_count(&self) -> usize {
        lock(&self.state).connect_count
    }

    /// Encode a notification frame broadcast by `source`
    ///
    /// Sets whose value does not fit the message kind are skipped.
    pub fn create_notification(source: Address, sets: &[(u16, i64)]) -> Vec<u8> {
        Self::create_frame(
            source,
            Address::new(AddressClass::BroadcastSetLayer, 0x00, 0xFF),
            Command::normal(DataType::Notification, 0),
            sets,
        )
    }

    /// Encode a response from `source` to the bridge
    pub fn create_response(source: Address, packet_number: u8, sets: &[(u16, i64)]) -> Vec<u8> {
        Self::create_frame(
            source,
            Address::bridge(),
            Command::normal(DataType::Response, packet_number),
            sets,
        )
    }

    fn create_frame(
        source: Address,
        destination: Address,
        command: Command,
        sets: &[(u16, i64)],
    ) -> Vec<u8> {
        let messages = sets
            .iter()
            .filter_map(|&(number, value)| MessageSet::new(MessageNumber(number), value))
            .collect();
        Frame::new(source, destination, command, messages)
            .encode()
            .map(|bytes| bytes.to_vec())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SerialTransport for MockTransport {
    async fn connect(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.simulate_errors {
            return Err(BridgeError::ConnectionTimeout { duration_ms: 5000 });
        }
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(BridgeError::PortOpenFailed {
                port: "mock".to_string(),
                reason: "Simulated failure".to_string(),
            });
        }
        state.connected = true;
        state.connect_count += 1;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        lock(&self.state).connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    async fn read(&mut self) -> Result<Option<Bytes>> {
        let next = {
            let mut state = lock(&self.state);
            state.read_count += 1;

            if state.error_on_nth_read == Some(state.read_count) {
                state.error_on_nth_read = None;
                return Err(BridgeError::ReadError("Simulated error".to_string()));
            }
            if state.simulate_errors || !state.connected {
                return Err(BridgeError::Disconnected);
            }
            state.incoming.pop_front()
        };

        match next {
            Some(data) => Ok(Some(Bytes::from(data))),
            None => {
                tokio::time::sleep(MOCK_READ_TIMEOUT).await;
                Ok(None)
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if state.simulate_errors {
            return Err(BridgeError::WriteError("Simulated error".to_string()));
        }
        state.outgoing.push(data.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "MockTransport"
    }
}

#[derive(Debug, Default)]
struct Recorded {
    published: Vec<(String, String, QoS)>,
    subscriptions: Vec<String>,
    failing: bool,
    disconnects: usize,
}

/// MQTT publisher that records instead of sending
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Topic and payload of every accepted publish, in order
    pub fn published(&self) -> Vec<(String, String)> {
        lock(&self.recorded)
            .published
            .iter()
            .map(|(topic, payload, _)| (topic.clone(), payload.clone()))
            .collect()
    }

    /// Accepted publishes with their QoS
    pub fn published_with_qos(&self) -> Vec<(String, String, QoS)> {
        lock(&self.recorded).published.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.recorded).subscriptions.clone()
    }

    /// Refuse publishes while enabled, as a full client channel would
    pub fn set_failing(&self, failing: bool) {
        lock(&self.recorded).failing = failing;
    }

    pub fn disconnects(&self) -> usize {
        lock(&self.recorded).disconnects
    }
}

impl MqttPublisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: &str, qos: QoS) -> Result<()> {
        let mut recorded = lock(&self.recorded);
        if recorded.failing {
            return Err(BridgeError::MqttConnection("request channel full".to_string()));
        }
        recorded
            .published
            .push((topic.to_string(), payload.to_string(), qos));
        Ok(())
    }

    fn subscribe(&self, filter: &str) -> Result<()> {
        lock(&self.recorded).subscriptions.push(filter.to_string());
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        lock(&self.recorded).disconnects += 1;
        Ok(())
    }
}

/// Test fixture for creating pre-configured test scenarios
pub struct TestFixture {
    /// Mock transport
    pub transport: MockTransport,
    /// Test configuration
    pub config: Nasa2MqttConfig,
}

impl TestFixture {
    /// Create a basic test fixture
    pub fn new() -> Self {
        Self {
            transport: MockTransport::new(),
            config: Nasa2MqttConfigBuilder::new().build(),
        }
    }

    /// Create with pre-queued incoming chunks
    pub fn with_incoming(chunks: Vec<Vec<u8>>) -> Self {
        let fixture = Self::new();
        for chunk in chunks {
            fixture.transport.queue_incoming(chunk);
        }
        fixture
    }

    /// One outdoor and one indoor unit broadcasting a few values
    pub fn heat_pump() -> Self {
        let outdoor = Address::new(AddressClass::Outdoor, 0x00, 0x00);
        let indoor = Address::new(AddressClass::Indoor, 0x00, 0x00);
        Self::with_incoming(vec![
            MockTransport::create_notification(outdoor, &[(0x8204, 85), (0x8413, 1200)]),
            MockTransport::create_notification(indoor, &[(0x4000, 1), (0x4203, 215)]),
        ])
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
