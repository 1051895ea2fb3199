//! NASA frame codec
//!
//! Frames on the bus look like this:
//!
//! ```text
//! 0x32 | size(2) | src(3) | dst(3) | command(3) | count(1) | messages... | crc(2) | 0x34
//! ```
//!
//! `size` is the total frame length minus two. The CRC is CRC-16/XMODEM over
//! everything between the size field and the CRC itself.
//!
//! [`decode`] works on a growing [`BytesMut`] cursor: it skips garbage before a
//! start marker, waits for the declared length, then validates the frame.
//! A bad frame advances the cursor by exactly one byte (past the offending
//! start marker) so the next call resynchronizes on the following marker.

mod address;
mod command;
mod message;

pub use address::{Address, AddressClass};
pub use command::{Command, DataType, PacketType};
pub use message::{MessageKind, MessageNumber, MessageSet, MessageValue};

use bytes::{Buf, Bytes, BytesMut};
use crc::{Crc, CRC_16_XMODEM};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

use crate::error::ProtocolError;

/// Frame start marker
pub const START_BYTE: u8 = 0x32;

/// Frame end marker
pub const END_BYTE: u8 = 0x34;

/// Smallest valid frame (header, zero messages, crc, end marker)
pub const MIN_FRAME_SIZE: usize = 16;

/// Largest frame accepted from the bus
pub const MAX_FRAME_SIZE: usize = 1500;

/// Idle gap after which a partially received frame is dropped
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 500;

/// Offset of the first address byte
const HEADER_SIZE: usize = 3;

/// Bytes after the message sets: crc + end marker
const TRAILER_SIZE: usize = 3;

const NASA_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// CRC-16/XMODEM as used by the NASA protocol
pub fn crc16(data: &[u8]) -> u16 {
    NASA_CRC.checksum(data)
}

/// A decoded NASA frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub source: Address,
    pub destination: Address,
    pub command: Command,
    pub messages: Vec<MessageSet>,
}

impl Frame {
    /// Create a frame from its parts
    pub fn new(
        source: Address,
        destination: Address,
        command: Command,
        messages: Vec<MessageSet>,
    ) -> Self {
        Self {
            source,
            destination,
            command,
            messages,
        }
    }

    /// Total encoded length in bytes
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE
            + Address::SIZE * 2
            + Command::SIZE
            + 1
            + self.messages.iter().map(MessageSet::encoded_len).sum::<usize>()
            + TRAILER_SIZE
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let total = self.encoded_len();
        if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&total) {
            return Err(ProtocolError::InvalidSize(total));
        }
        let count =
            u8::try_from(self.messages.len()).map_err(|_| ProtocolError::InvalidSize(total))?;

        let mut out = Vec::with_capacity(total);
        out.push(START_BYTE);
        out.extend_from_slice(&((total - 2) as u16).to_be_bytes());
        self.source.encode(&mut out);
        self.destination.encode(&mut out);
        out.extend_from_slice(&self.command.to_bytes());
        out.push(count);
        for set in &self.messages {
            set.encode(&mut out);
        }

        let crc = crc16(&out[HEADER_SIZE..]);
        out.extend_from_slice(&crc.to_be_bytes());
        out.push(END_BYTE);

        Ok(Bytes::from(out))
    }

    /// Decode one complete frame
    ///
    /// `data` must contain exactly one frame, start marker to end marker.
    pub fn decode(data: &[u8]) -> Result<Frame, ProtocolError> {
        let first = *data.first().ok_or(ProtocolError::InvalidSize(0))?;
        if first != START_BYTE {
            return Err(ProtocolError::InvalidStart(first));
        }

        let last = data[data.len() - 1];
        if last != END_BYTE {
            return Err(ProtocolError::InvalidEnd(last));
        }

        if data.len() < MIN_FRAME_SIZE || data.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::InvalidSize(data.len()));
        }

        let size = u16::from_be_bytes([data[1], data[2]]) as usize;
        if size + 2 != data.len() {
            return Err(ProtocolError::SizeMismatch {
                declared: size,
                actual: data.len() - 2,
            });
        }

        let crc_at = data.len() - TRAILER_SIZE;
        let calculated = crc16(&data[HEADER_SIZE..crc_at]);
        let expected = u16::from_be_bytes([data[crc_at], data[crc_at + 1]]);
        if calculated != expected {
            return Err(ProtocolError::Checksum {
                calculated,
                expected,
            });
        }

        let mut cursor = HEADER_SIZE;
        let source = Address::decode(&data[cursor..]);
        cursor += Address::SIZE;
        let destination = Address::decode(&data[cursor..]);
        cursor += Address::SIZE;
        let command = Command::decode(&data[cursor..]);
        cursor += Command::SIZE;
        let count = data[cursor] as usize;
        cursor += 1;

        let messages = MessageSet::decode_all(&data[cursor..crc_at], count)?;

        Ok(Frame {
            source,
            destination,
            command,
            messages,
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#Packet Sa:{} Da:{}", self.source, self.destination)?;
        write!(f, "Command: {}", self.command)?;
        for message in &self.messages {
            write!(f, "\nMessage: {}", message)?;
        }
        Ok(())
    }
}

/// Outcome of one decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete, valid frame was consumed from the cursor
    Frame(Frame),
    /// Not enough bytes buffered; keep the remainder for the next read
    NeedMoreData,
    /// A frame candidate was rejected and its start marker skipped
    Invalid(ProtocolError),
}

/// Decode the next frame from the front of `buf`
pub fn decode(buf: &mut BytesMut) -> Decoded {
    match buf.iter().position(|&b| b == START_BYTE) {
        Some(0) => {}
        Some(pos) => {
            trace!(discarded = pos, "Discarding bytes before start marker");
            buf.advance(pos);
        }
        None => {
            if !buf.is_empty() {
                trace!(discarded = buf.len(), "Discarding buffer without start marker");
                buf.clear();
            }
            return Decoded::NeedMoreData;
        }
    }

    if buf.len() < HEADER_SIZE {
        return Decoded::NeedMoreData;
    }

    let total = u16::from_be_bytes([buf[1], buf[2]]) as usize + 2;
    if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&total) {
        buf.advance(1);
        return Decoded::Invalid(ProtocolError::InvalidSize(total));
    }

    if buf.len() < total {
        trace!(have = buf.len(), need = total, "Waiting for complete frame");
        return Decoded::NeedMoreData;
    }

    match Frame::decode(&buf[..total]) {
        Ok(frame) => {
            buf.advance(total);
            Decoded::Frame(frame)
        }
        Err(e) => {
            buf.advance(1);
            Decoded::Invalid(e)
        }
    }
}

/// Stateful decoder that owns the receive buffer
///
/// Adds the inter-byte idle rule: if more than `idle_timeout` passes between
/// two chunks while a frame is partially buffered, the partial frame is
/// dropped before the new bytes are appended.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    idle_timeout: Duration,
    last_data_at: Option<Instant>,
}

impl FrameDecoder {
    /// Create a decoder with the default idle timeout
    pub fn new() -> Self {
        Self::with_idle_timeout(Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS))
    }

    /// Create a decoder with a custom idle timeout
    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_FRAME_SIZE * 2),
            idle_timeout,
            last_data_at: None,
        }
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8], now: Instant) {
        self.expire_partial(now);
        self.last_data_at = Some(now);
        self.buffer.extend_from_slice(data);
    }

    /// Drop a partially buffered frame if the line has been idle too long
    ///
    /// Returns true when bytes were discarded.
    pub fn expire_partial(&mut self, now: Instant) -> bool {
        let idle = self
            .last_data_at
            .is_some_and(|at| now.saturating_duration_since(at) >= self.idle_timeout);
        if idle && !self.buffer.is_empty() {
            warn!(
                discarded = self.buffer.len(),
                "Last transmission too long ago, dropping partial frame"
            );
            self.buffer.clear();
            return true;
        }
        false
    }

    /// Decode the next frame from the buffer
    pub fn next_frame(&mut self) -> Decoded {
        decode(&mut self.buffer)
    }

    /// Number of buffered bytes
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.last_data_at = None;
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
