//! Message sets carried in a frame payload
//!
//! A message set is a 16-bit message number followed by a value whose width
//! is encoded in bits 10..9 of the number itself.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProtocolError;

/// Value width class of a message number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// One unsigned byte
    Enum,
    /// Two bytes, signed
    Variable,
    /// Four bytes, signed
    LongVariable,
    /// Opaque bytes, only valid as the single message of a frame
    Structure,
}

impl MessageKind {
    /// Encoded value width, `None` for structures
    pub fn value_len(self) -> Option<usize> {
        match self {
            MessageKind::Enum => Some(1),
            MessageKind::Variable => Some(2),
            MessageKind::LongVariable => Some(4),
            MessageKind::Structure => None,
        }
    }

    /// Inclusive range of values this kind can carry
    pub fn value_range(self) -> Option<(i64, i64)> {
        match self {
            MessageKind::Enum => Some((0, u8::MAX as i64)),
            MessageKind::Variable => Some((i16::MIN as i64, i16::MAX as i64)),
            MessageKind::LongVariable => Some((i32::MIN as i64, i32::MAX as i64)),
            MessageKind::Structure => None,
        }
    }

    /// Path segment used by the debug topic tree
    pub fn debug_segment(self) -> &'static str {
        match self {
            MessageKind::Enum => "enum",
            MessageKind::Variable => "var",
            MessageKind::LongVariable => "var_long",
            MessageKind::Structure => "structure",
        }
    }
}

/// 16-bit NASA message number
///
/// Serialized as four hex digits, e.g. `"4203"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageNumber(pub u16);

impl MessageNumber {
    /// Value width class, taken from bits 10..9
    pub fn kind(self) -> MessageKind {
        match (self.0 & 0x0600) >> 9 {
            0 => MessageKind::Enum,
            1 => MessageKind::Variable,
            2 => MessageKind::LongVariable,
            _ => MessageKind::Structure,
        }
    }

    /// Parse the 4-digit hex form used in topics
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.is_empty() || s.len() > 4 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u16::from_str_radix(s, 16).ok().map(MessageNumber)
    }
}

impl fmt::Display for MessageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl TryFrom<String> for MessageNumber {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let digits = value.trim_start_matches("0x");
        MessageNumber::from_hex(digits)
            .ok_or_else(|| format!("invalid message number '{}'", value))
    }
}

impl From<MessageNumber> for String {
    fn from(value: MessageNumber) -> Self {
        value.to_string()
    }
}

/// Decoded message value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageValue {
    Enum(u8),
    Variable(i16),
    LongVariable(i32),
    Structure(Bytes),
}

impl MessageValue {
    /// Numeric value, `None` for structures
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MessageValue::Enum(v) => Some(*v as i64),
            MessageValue::Variable(v) => Some(*v as i64),
            MessageValue::LongVariable(v) => Some(*v as i64),
            MessageValue::Structure(_) => None,
        }
    }

    /// Build a value of `kind`, rejecting out-of-range numbers
    pub fn from_i64(kind: MessageKind, value: i64) -> Option<Self> {
        match kind {
            MessageKind::Enum => u8::try_from(value).ok().map(MessageValue::Enum),
            MessageKind::Variable => i16::try_from(value).ok().map(MessageValue::Variable),
            MessageKind::LongVariable => {
                i32::try_from(value).ok().map(MessageValue::LongVariable)
            }
            MessageKind::Structure => None,
        }
    }
}

/// A message number and its value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageSet {
    pub number: MessageNumber,
    pub value: MessageValue,
}

impl MessageSet {
    /// Create a numeric message set; the value is coerced to the number's kind
    pub fn new(number: MessageNumber, value: i64) -> Option<Self> {
        MessageValue::from_i64(number.kind(), value).map(|value| Self { number, value })
    }

    /// A zero-valued set, used for read requests
    pub fn zero(number: MessageNumber) -> Self {
        let value = match number.kind() {
            MessageKind::Enum => MessageValue::Enum(0),
            MessageKind::Variable => MessageValue::Variable(0),
            MessageKind::LongVariable => MessageValue::LongVariable(0),
            MessageKind::Structure => MessageValue::Structure(Bytes::new()),
        };
        Self { number, value }
    }

    /// Encoded length in bytes
    pub fn encoded_len(&self) -> usize {
        2 + match &self.value {
            MessageValue::Enum(_) => 1,
            MessageValue::Variable(_) => 2,
            MessageValue::LongVariable(_) => 4,
            MessageValue::Structure(b) => b.len(),
        }
    }

    /// Append the wire form to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.number.0.to_be_bytes());
        match &self.value {
            MessageValue::Enum(v) => out.push(*v),
            MessageValue::Variable(v) => out.extend_from_slice(&v.to_be_bytes()),
            MessageValue::LongVariable(v) => out.extend_from_slice(&v.to_be_bytes()),
            MessageValue::Structure(b) => out.extend_from_slice(b),
        }
    }

    /// Decode `count` message sets from `body`
    ///
    /// `body` spans from the first message number up to (not including) the
    /// checksum. A structure set consumes the rest of the body; otherwise the
    /// sets must cover `body` exactly.
    pub fn decode_all(body: &[u8], count: usize) -> Result<Vec<MessageSet>, ProtocolError> {
        let mut sets = Vec::with_capacity(count);
        let mut cursor = 0usize;

        for index in 0..count {
            if body.len() < cursor + 2 {
                return Err(ProtocolError::Truncated { index });
            }
            let number = MessageNumber(u16::from_be_bytes([body[cursor], body[cursor + 1]]));
            cursor += 2;

            let value = match number.kind().value_len() {
                Some(len) => {
                    if body.len() < cursor + len {
                        return Err(ProtocolError::Truncated { index });
                    }
                    let raw = &body[cursor..cursor + len];
                    cursor += len;
                    match len {
                        1 => MessageValue::Enum(raw[0]),
                        2 => MessageValue::Variable(i16::from_be_bytes([raw[0], raw[1]])),
                        _ => MessageValue::LongVariable(i32::from_be_bytes([
                            raw[0], raw[1], raw[2], raw[3],
                        ])),
                    }
                }
                None => {
                    if count != 1 {
                        return Err(ProtocolError::StructureCapacity(count));
                    }
                    let raw = Bytes::copy_from_slice(&body[cursor..]);
                    cursor = body.len();
                    MessageValue::Structure(raw)
                }
            };

            sets.push(MessageSet { number, value });
        }

        if cursor != body.len() {
            return Err(ProtocolError::TrailingData {
                count,
                extra: body.len() - cursor,
            });
        }

        Ok(sets)
    }
}

impl fmt::Display for MessageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            MessageValue::Enum(v) => write!(f, "Enum {} {}", self.number, v),
            MessageValue::Variable(v) => write!(f, "Variable {} {}", self.number, v),
            MessageValue::LongVariable(v) => write!(f, "LongVariable {} {}", self.number, v),
            MessageValue::Structure(b) => write!(f, "Structure #{} {}", self.number, b.len()),
        }
    }
}
