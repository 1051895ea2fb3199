//! MQTT side of the bridge
//!
//! [`MqttBridge`] publishes state deltas and turns inbound command
//! publishes into NASA frames. The rumqttc event loop runs in its own task
//! and reports connection changes and incoming commands over a channel, so
//! a slow or absent broker never stalls frame decoding.
//!
//! # Buffering
//!
//! State publishes made while disconnected, or while the client's request
//! channel is full, go to a [`PublishQueue`]. The queue is bounded; on
//! overflow the oldest publish is dropped. It is flushed in arrival order
//! once the broker acknowledges a connection. Debug publishes are never
//! queued.

mod queue;
mod topic;

pub use queue::{PublishQueue, QueuedPublish};
pub use topic::TopicScheme;

use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::codec::{Frame, MessageSet};
use crate::config::{MqttConfig, ReconnectConfig};
use crate::error::{CommandMappingError, Result};
use crate::state::StateDelta;

/// Capacity of the event channel from the MQTT task
const EVENT_CHANNEL_SIZE: usize = 64;

/// Shortest keep-alive rumqttc accepts
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Client requests issued on ConnAck besides the queue flush (subscribe, plus a spare)
const CONTROL_REQUESTS: usize = 2;

/// Request capacity of the rumqttc client, large enough for a full queue
/// flush followed by the command subscription
fn client_capacity(queue_capacity: usize) -> usize {
    (queue_capacity + CONTROL_REQUESTS).max(10)
}

/// Non-blocking MQTT client operations used by the bridge
///
/// Implemented for [`rumqttc::AsyncClient`]; tests substitute a recorder.
pub trait MqttPublisher: Send + Sync {
    /// Queue a publish with the client, failing instead of waiting
    fn publish(&self, topic: &str, payload: &str, qos: QoS) -> Result<()>;

    /// Subscribe to a topic filter
    fn subscribe(&self, filter: &str) -> Result<()>;

    /// Request a graceful disconnect
    fn disconnect(&self) -> Result<()>;
}

impl MqttPublisher for AsyncClient {
    fn publish(&self, topic: &str, payload: &str, qos: QoS) -> Result<()> {
        self.try_publish(topic, qos, false, payload.as_bytes().to_vec())?;
        Ok(())
    }

    fn subscribe(&self, filter: &str) -> Result<()> {
        self.try_subscribe(filter, QoS::AtLeastOnce)?;
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.try_disconnect()?;
        Ok(())
    }
}

/// Events reported by the MQTT task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttEvent {
    /// Broker acknowledged the connection
    Connected,
    /// Connection lost
    Disconnected(String),
    /// Publish received on a command topic
    Command { topic: String, payload: Bytes },
}

/// MQTT statistics
#[derive(Debug, Clone, Default)]
pub struct MqttStats {
    /// State publishes handed to the client
    pub published: u64,
    /// Debug publishes handed to the client
    pub debug_published: u64,
    /// Publishes currently queued
    pub queued: usize,
    /// Publishes dropped from a full queue
    pub dropped: u64,
    /// Commands received
    pub commands: u64,
    /// Commands rejected by the topic mapping
    pub command_errors: u64,
    /// Broker connections acknowledged
    pub connects: u64,
}

/// Publishes state deltas and maps inbound commands
pub struct MqttBridge {
    publisher: Box<dyn MqttPublisher>,
    events: mpsc::Receiver<MqttEvent>,
    scheme: TopicScheme,
    queue: PublishQueue,
    connected: bool,
    stats: MqttStats,
}

impl std::fmt::Debug for MqttBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBridge")
            .field("scheme", &self.scheme)
            .field("connected", &self.connected)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl MqttBridge {
    /// Create the rumqttc client and spawn its event loop
    ///
    /// Must be called inside a tokio runtime. Connection happens in the
    /// background; [`MqttEvent::Connected`] is reported once the broker
    /// acknowledges.
    pub fn connect(config: &MqttConfig, reconnect: &ReconnectConfig) -> Self {
        let client_id = if config.client_id.is_empty() {
            format!("nasa2mqtt-{}", Uuid::new_v4().simple())
        } else {
            config.client_id.clone()
        };
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive.max(MIN_KEEP_ALIVE));
        options.set_clean_session(true);
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }

        let (client, eventloop) = AsyncClient::new(options, client_capacity(config.queue_capacity));
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

        info!(host = %config.host, port = config.port, "Connecting to MQTT broker");
        tokio::spawn(run_event_loop(eventloop, tx, reconnect.clone()));

        Self::with_publisher(Box::new(client), rx, config)
    }

    /// Build a bridge around any publisher and event source
    pub fn with_publisher(
        publisher: Box<dyn MqttPublisher>,
        events: mpsc::Receiver<MqttEvent>,
        config: &MqttConfig,
    ) -> Self {
        Self {
            publisher,
            events,
            scheme: TopicScheme::from_config(config),
            queue: PublishQueue::new(config.queue_capacity),
            connected: false,
            stats: MqttStats::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn scheme(&self) -> &TopicScheme {
        &self.scheme
    }

    /// Wait for the next event from the MQTT task
    pub async fn next_event(&mut self) -> Option<MqttEvent> {
        self.events.recv().await
    }

    /// Apply a connection event
    ///
    /// Returns the topic and payload of a command event for the caller to
    /// map with [`MqttBridge::on_command`].
    pub fn handle_event(&mut self, event: MqttEvent) -> Option<(String, Bytes)> {
        match event {
            MqttEvent::Connected => {
                self.connected = true;
                self.stats.connects += 1;
                let filter = self.scheme.command_filter();
                if let Err(e) = self.publisher.subscribe(&filter) {
                    warn!(error = %e, %filter, "Failed to subscribe to command topics");
                }
                self.flush();
                None
            }
            MqttEvent::Disconnected(reason) => {
                if self.connected {
                    warn!(%reason, queued = self.queue.len(), "MQTT disconnected");
                }
                self.connected = false;
                None
            }
            MqttEvent::Command { topic, payload } => {
                self.stats.commands += 1;
                Some((topic, payload))
            }
        }
    }

    /// Publish a state delta, queueing it while the broker is unreachable
    pub fn publish(&mut self, delta: &StateDelta) {
        let item = QueuedPublish {
            topic: self.scheme.state_topic(delta.address, delta.capability),
            payload: delta.new.to_string(),
        };

        if self.connected {
            self.flush();
        }
        if self.connected && self.queue.is_empty() {
            match self.publisher.publish(&item.topic, &item.payload, QoS::AtLeastOnce) {
                Ok(()) => {
                    trace!(topic = %item.topic, payload = %item.payload, "Published");
                    self.stats.published += 1;
                    return;
                }
                Err(e) => debug!(error = %e, topic = %item.topic, "Publish deferred"),
            }
        }

        if let Some(evicted) = self.queue.push(item) {
            debug!(topic = %evicted.topic, "Publish queue full, dropped oldest");
        }
    }

    /// Publish a decoded message to the debug tree; skipped while disconnected
    pub fn publish_debug(&mut self, set: &MessageSet) {
        if !self.connected {
            return;
        }
        let Some(value) = set.value.as_i64() else {
            return;
        };
        let topic = self.scheme.debug_topic(set.number);
        match self
            .publisher
            .publish(&topic, &value.to_string(), QoS::AtMostOnce)
        {
            Ok(()) => self.stats.debug_published += 1,
            Err(e) => trace!(error = %e, %topic, "Debug publish dropped"),
        }
    }

    /// Send queued publishes in order until the queue is empty or the client
    /// refuses one
    pub fn flush(&mut self) {
        let mut sent = 0usize;
        while let Some(item) = self.queue.pop() {
            if let Err(e) = self.publisher.publish(&item.topic, &item.payload, QoS::AtLeastOnce) {
                debug!(error = %e, remaining = self.queue.len() + 1, "Flush interrupted");
                self.queue.requeue_front(item);
                break;
            }
            sent += 1;
        }
        if sent > 0 {
            self.stats.published += sent as u64;
            info!(sent, "Flushed queued publishes");
        }
    }

    /// Translate an inbound command into a frame
    pub fn on_command(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> std::result::Result<Frame, CommandMappingError> {
        let result = self.scheme.on_command(topic, payload);
        if result.is_err() {
            self.stats.command_errors += 1;
        }
        result
    }

    /// Request a graceful disconnect
    pub fn shutdown(&mut self) {
        if let Err(e) = self.publisher.disconnect() {
            debug!(error = %e, "MQTT disconnect request failed");
        }
        self.connected = false;
    }

    pub fn stats(&self) -> MqttStats {
        MqttStats {
            queued: self.queue.len(),
            dropped: self.queue.dropped(),
            ..self.stats.clone()
        }
    }
}

/// Drive the rumqttc event loop, reporting events until the bridge goes away
///
/// rumqttc reconnects on the next `poll` after an error; the delay between
/// attempts doubles up to the configured maximum and resets on ConnAck.
async fn run_event_loop(
    mut eventloop: EventLoop,
    events: mpsc::Sender<MqttEvent>,
    reconnect: ReconnectConfig,
) {
    let mut failures = 0u32;
    let mut connected = false;

    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected");
                failures = 0;
                connected = true;
                Some(MqttEvent::Connected)
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => Some(MqttEvent::Command {
                topic: publish.topic,
                payload: publish.payload,
            }),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent, stopping event loop");
                break;
            }
            Ok(_) => None,
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = reconnect.backoff(failures);
                warn!(error = %e, attempt = failures, delay = ?delay, "MQTT connection error");

                let event = connected.then(|| MqttEvent::Disconnected(e.to_string()));
                connected = false;
                if let Some(event) = event {
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                tokio::time::sleep(delay).await;
                None
            }
        };

        if let Some(event) = event {
            if events.send(event).await.is_err() {
                break;
            }
        }
    }
}
