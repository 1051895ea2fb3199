//! Raw and decoded frame tracing
//!
//! Records are handed to a background sink task over a bounded channel, so
//! the decode path never waits on log output. When the sink falls behind,
//! new records are dropped and counted.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::codec::Frame;
use crate::config::DebugConfig;

/// A record for the debug sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugRecord {
    /// Bytes as received from the transport
    Raw(Bytes),
    /// A decoded frame
    Decoded(Frame),
}

impl DebugRecord {
    /// Render the record the way the sink logs it
    pub fn render(&self) -> String {
        match self {
            DebugRecord::Raw(bytes) => format!("RAW: {}", hex::encode(bytes)),
            DebugRecord::Decoded(frame) => format!("MSG: {}", frame),
        }
    }
}

/// Debug logger gated by the raw and message flags
#[derive(Debug, Clone)]
pub struct DebugLogger {
    tx: Option<mpsc::Sender<DebugRecord>>,
    raw: bool,
    messages: bool,
    dropped: Arc<AtomicU64>,
}

impl DebugLogger {
    /// Create a logger and spawn its sink task
    ///
    /// With both flags off no task is spawned. Must be called inside a tokio
    /// runtime when any flag is on.
    pub fn new(config: &DebugConfig) -> Self {
        if !config.log_messages && !config.log_messages_raw {
            return Self::disabled();
        }
        let (logger, rx) = Self::with_channel(config);
        tokio::spawn(run_sink(rx));
        logger
    }

    /// Create a logger whose records go to the returned receiver
    pub fn with_channel(config: &DebugConfig) -> (Self, mpsc::Receiver<DebugRecord>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let logger = Self {
            tx: Some(tx),
            raw: config.log_messages_raw,
            messages: config.log_messages,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (logger, rx)
    }

    /// A logger that records nothing
    pub fn disabled() -> Self {
        Self {
            tx: None,
            raw: false,
            messages: false,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether decoded frames are logged
    pub fn logs_messages(&self) -> bool {
        self.messages
    }

    /// Log received bytes if raw logging is enabled
    pub fn log_raw(&self, bytes: &[u8]) {
        if self.raw {
            self.submit(DebugRecord::Raw(Bytes::copy_from_slice(bytes)));
        }
    }

    /// Log a decoded frame if message logging is enabled
    pub fn log_decoded(&self, frame: &Frame) {
        if self.messages {
            self.submit(DebugRecord::Decoded(frame.clone()));
        }
    }

    /// Records dropped because the sink was behind
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn submit(&self, record: DebugRecord) {
        if let Some(tx) = &self.tx {
            if tx.try_send(record).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

async fn run_sink(mut rx: mpsc::Receiver<DebugRecord>) {
    while let Some(record) = rx.recv().await {
        warn!(target: "nasa2mqtt::debug", "{}", record.render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Address, AddressClass, Command, DataType, MessageNumber, MessageSet};

    fn config(raw: bool, messages: bool, capacity: usize) -> DebugConfig {
        DebugConfig {
            log_messages: messages,
            log_messages_raw: raw,
            channel_capacity: capacity,
        }
    }

    fn frame() -> Frame {
        Frame::new(
            Address::new(AddressClass::Outdoor, 0, 0),
            Address::new(AddressClass::BroadcastSelfLayer, 0, 0xFF),
            Command::normal(DataType::Notification, 1),
            vec![MessageSet::new(MessageNumber(0x8204), 80).unwrap()],
        )
    }

    #[test]
    fn test_flags_gate_records() {
        let (logger, mut rx) = DebugLogger::with_channel(&config(true, false, 8));
        logger.log_raw(&[0x32, 0x00]);
        logger.log_decoded(&frame());

        assert_eq!(rx.try_recv().unwrap().render(), "RAW: 3200");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_decoded_render() {
        let (logger, mut rx) = DebugLogger::with_channel(&config(false, true, 8));
        logger.log_decoded(&frame());
        let text = rx.try_recv().unwrap().render();
        assert!(text.starts_with("MSG: #Packet Sa:10.00.00 Da:b0.00.ff"));
        assert!(text.contains("Variable 8204 80"));
    }

    #[test]
    fn test_full_channel_drops() {
        let (logger, _rx) = DebugLogger::with_channel(&config(true, false, 2));
        for _ in 0..5 {
            logger.log_raw(&[0x00]);
        }
        assert_eq!(logger.dropped(), 3);
    }

    #[test]
    fn test_disabled_logger() {
        let logger = DebugLogger::new(&DebugConfig::default());
        assert!(!logger.logs_messages());
        logger.log_raw(&[0x01]);
        assert_eq!(logger.dropped(), 0);
    }
}
