//! Frame command header
//!
//! Three bytes following the addresses:
//!
//! ```text
//! byte 0: packet_information(7) | protocol_version(6..5) | retry_count(4..3)
//! byte 1: packet_type(7..4) | data_type(3..0)
//! byte 2: packet number
//! ```

use std::fmt;

/// Packet type (high nibble of command byte 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    StandBy,
    Normal,
    Gathering,
    Install,
    Download,
    /// Nibble not in the known table
    Other(u8),
}

impl PacketType {
    fn from_nibble(n: u8) -> Self {
        match n {
            0 => PacketType::StandBy,
            1 => PacketType::Normal,
            2 => PacketType::Gathering,
            3 => PacketType::Install,
            4 => PacketType::Download,
            other => PacketType::Other(other),
        }
    }

    fn to_nibble(self) -> u8 {
        match self {
            PacketType::StandBy => 0,
            PacketType::Normal => 1,
            PacketType::Gathering => 2,
            PacketType::Install => 3,
            PacketType::Download => 4,
            PacketType::Other(n) => n & 0x0F,
        }
    }
}

/// Data type (low nibble of command byte 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Undefined,
    Read,
    Write,
    Request,
    Notification,
    Response,
    Ack,
    Nack,
    /// Nibble not in the known table
    Other(u8),
}

impl DataType {
    fn from_nibble(n: u8) -> Self {
        match n {
            0 => DataType::Undefined,
            1 => DataType::Read,
            2 => DataType::Write,
            3 => DataType::Request,
            4 => DataType::Notification,
            5 => DataType::Response,
            6 => DataType::Ack,
            7 => DataType::Nack,
            other => DataType::Other(other),
        }
    }

    fn to_nibble(self) -> u8 {
        match self {
            DataType::Undefined => 0,
            DataType::Read => 1,
            DataType::Write => 2,
            DataType::Request => 3,
            DataType::Notification => 4,
            DataType::Response => 5,
            DataType::Ack => 6,
            DataType::Nack => 7,
            DataType::Other(n) => n & 0x0F,
        }
    }
}

/// Command header of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command {
    pub packet_information: bool,
    pub protocol_version: u8,
    pub retry_count: u8,
    pub packet_type: PacketType,
    pub data_type: DataType,
    pub packet_number: u8,
    /// Low three bits of byte 0, carried through unchanged
    pub reserved: u8,
}

impl Default for Command {
    fn default() -> Self {
        Self {
            packet_information: true,
            protocol_version: 2,
            retry_count: 0,
            packet_type: PacketType::StandBy,
            data_type: DataType::Undefined,
            packet_number: 0,
            reserved: 0,
        }
    }
}

impl Command {
    /// Encoded size in bytes
    pub const SIZE: usize = 3;

    /// A normal packet of the given data type
    pub fn normal(data_type: DataType, packet_number: u8) -> Self {
        Self {
            packet_type: PacketType::Normal,
            data_type,
            packet_number,
            ..Self::default()
        }
    }

    /// Decode from the first three bytes of `data`
    pub fn decode(data: &[u8]) -> Self {
        Self {
            packet_information: data[0] & 0x80 != 0,
            protocol_version: (data[0] & 0x60) >> 5,
            retry_count: (data[0] & 0x18) >> 3,
            packet_type: PacketType::from_nibble((data[1] & 0xF0) >> 4),
            data_type: DataType::from_nibble(data[1] & 0x0F),
            packet_number: data[2],
            reserved: data[0] & 0x07,
        }
    }

    /// Wire bytes
    pub fn to_bytes(&self) -> [u8; 3] {
        let mut b0 = 0u8;
        if self.packet_information {
            b0 |= 0x80;
        }
        b0 |= (self.protocol_version & 0x03) << 5;
        b0 |= (self.retry_count & 0x03) << 3;
        b0 |= self.reserved & 0x07;

        let b1 = (self.packet_type.to_nibble() << 4) | self.data_type.to_nibble();
        [b0, b1, self.packet_number]
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{PacketInformation: {}; ProtocolVersion: {}; RetryCount: {}; PacketType: {:?}; DataType: {:?}; PacketNumber: {}}}",
            self.packet_information,
            self.protocol_version,
            self.retry_count,
            self.packet_type,
            self.data_type,
            self.packet_number
        )
    }
}
