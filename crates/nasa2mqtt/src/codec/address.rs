//! NASA bus addresses
//!
//! Every device on the bus is identified by three bytes: an address class
//! (outdoor unit, indoor unit, remote controller, ...), a channel and an
//! address within that channel. The text form is `cc.hh.aa` in lower-case
//! hex, e.g. `20.00.00` for the first indoor unit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Known address classes
///
/// Unknown class bytes are kept in [`AddressClass::Other`] so that a decoded
/// frame always re-encodes to the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressClass {
    Outdoor,
    Htu,
    Indoor,
    Erv,
    Diffuser,
    Mcu,
    Rmc,
    WiredRemote,
    Pim,
    Sim,
    Peak,
    PowerDivider,
    OnOffController,
    WiFiKit,
    CentralController,
    Dms,
    JigTester,
    BroadcastSelfLayer,
    BroadcastControlLayer,
    BroadcastSetLayer,
    BroadcastControlAndSetLayer,
    BroadcastModuleLayer,
    BroadcastCsm,
    BroadcastLocalLayer,
    BroadcastCsml,
    Undefined,
    /// Class byte not in the known table
    Other(u8),
}

impl AddressClass {
    /// Wire byte for this class
    pub fn to_byte(self) -> u8 {
        match self {
            AddressClass::Outdoor => 0x10,
            AddressClass::Htu => 0x11,
            AddressClass::Indoor => 0x20,
            AddressClass::Erv => 0x30,
            AddressClass::Diffuser => 0x35,
            AddressClass::Mcu => 0x38,
            AddressClass::Rmc => 0x40,
            AddressClass::WiredRemote => 0x50,
            AddressClass::Pim => 0x58,
            AddressClass::Sim => 0x59,
            AddressClass::Peak => 0x5A,
            AddressClass::PowerDivider => 0x5B,
            AddressClass::OnOffController => 0x60,
            AddressClass::WiFiKit => 0x62,
            AddressClass::CentralController => 0x65,
            AddressClass::Dms => 0x6A,
            AddressClass::JigTester => 0x80,
            AddressClass::BroadcastSelfLayer => 0xB0,
            AddressClass::BroadcastControlLayer => 0xB1,
            AddressClass::BroadcastSetLayer => 0xB2,
            AddressClass::BroadcastControlAndSetLayer => 0xB3,
            AddressClass::BroadcastModuleLayer => 0xB4,
            AddressClass::BroadcastCsm => 0xB7,
            AddressClass::BroadcastLocalLayer => 0xB8,
            AddressClass::BroadcastCsml => 0xBF,
            AddressClass::Undefined => 0xFF,
            AddressClass::Other(b) => b,
        }
    }

    /// Class for a wire byte
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x10 => AddressClass::Outdoor,
            0x11 => AddressClass::Htu,
            0x20 => AddressClass::Indoor,
            0x30 => AddressClass::Erv,
            0x35 => AddressClass::Diffuser,
            0x38 => AddressClass::Mcu,
            0x40 => AddressClass::Rmc,
            0x50 => AddressClass::WiredRemote,
            0x58 => AddressClass::Pim,
            0x59 => AddressClass::Sim,
            0x5A => AddressClass::Peak,
            0x5B => AddressClass::PowerDivider,
            0x60 => AddressClass::OnOffController,
            0x62 => AddressClass::WiFiKit,
            0x65 => AddressClass::CentralController,
            0x6A => AddressClass::Dms,
            0x80 => AddressClass::JigTester,
            0xB0 => AddressClass::BroadcastSelfLayer,
            0xB1 => AddressClass::BroadcastControlLayer,
            0xB2 => AddressClass::BroadcastSetLayer,
            0xB3 => AddressClass::BroadcastControlAndSetLayer,
            0xB4 => AddressClass::BroadcastModuleLayer,
            0xB7 => AddressClass::BroadcastCsm,
            0xB8 => AddressClass::BroadcastLocalLayer,
            0xBF => AddressClass::BroadcastCsml,
            0xFF => AddressClass::Undefined,
            other => AddressClass::Other(other),
        }
    }

    /// Whether this is one of the broadcast layers
    pub fn is_broadcast(self) -> bool {
        (0xB0..=0xBF).contains(&self.to_byte())
    }
}

/// Device address on the NASA bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    /// Address class
    pub class: AddressClass,
    /// Channel
    pub channel: u8,
    /// Address within the channel
    pub address: u8,
}

impl Address {
    /// Encoded size in bytes
    pub const SIZE: usize = 3;

    /// Create an address
    pub const fn new(class: AddressClass, channel: u8, address: u8) -> Self {
        Self {
            class,
            channel,
            address,
        }
    }

    /// The address this bridge uses as frame source
    pub const fn bridge() -> Self {
        Self::new(AddressClass::JigTester, 0xFF, 0x00)
    }

    /// Decode from the first three bytes of `data`
    pub fn decode(data: &[u8]) -> Self {
        Self {
            class: AddressClass::from_byte(data[0]),
            channel: data[1],
            address: data[2],
        }
    }

    /// Append the wire form to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bytes());
    }

    /// Wire bytes
    pub fn to_bytes(&self) -> [u8; 3] {
        [self.class.to_byte(), self.channel, self.address]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}.{:02x}.{:02x}",
            self.class.to_byte(),
            self.channel,
            self.address
        )
    }
}

impl FromStr for Address {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(BridgeError::InvalidConfig(format!(
                "address '{}' must have the form cc.hh.aa",
                s
            )));
        }

        let mut bytes = [0u8; 3];
        for (slot, part) in bytes.iter_mut().zip(&parts) {
            let invalid =
                || BridgeError::InvalidConfig(format!("address '{}' has invalid byte '{}'", s, part));
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        Ok(Self::decode(&bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}
