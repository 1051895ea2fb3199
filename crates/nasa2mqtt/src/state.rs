//! Device state store
//!
//! Last-known value of every (device, capability) pair seen on the bus.
//!
//! Devices live in a fixed arena of [`MAX_DEVICES`] slots; each slot holds
//! one entry per catalogued capability, indexed by the capability's position
//! in [`crate::catalog`]. A small address index maps a device address to its
//! slot. Entries are created on first observation and never evicted.
//!
//! The store is pure data transformation: it never performs I/O and returns
//! [`StateDelta`]s for the caller to publish.

use std::collections::HashMap;
use std::time::Instant;
use tracing::{trace, warn};

use crate::catalog;
use crate::codec::{Address, Frame, MessageNumber, MessageValue};

/// Maximum number of devices tracked at once
pub const MAX_DEVICES: usize = 64;

/// Last observed value of a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Raw integer value as carried on the wire
    pub value: i64,
    /// When the value was last seen
    pub updated_at: Instant,
    /// Resync generation this entry was last reported in
    epoch: u64,
}

/// A detected change of a capability's value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDelta {
    pub address: Address,
    pub capability: MessageNumber,
    /// Previous value, `None` on first observation
    pub old: Option<i64>,
    pub new: i64,
    pub at: Instant,
}

impl StateDelta {
    /// Capability name from the catalog
    pub fn capability_name(&self) -> &'static str {
        catalog::name_of(self.capability).unwrap_or("unknown")
    }
}

#[derive(Debug)]
struct DeviceSlot {
    address: Address,
    entries: Vec<Option<Observation>>,
}

impl DeviceSlot {
    fn new(address: Address) -> Self {
        Self {
            address,
            entries: vec![None; catalog::LEN],
        }
    }
}

/// Store statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Values applied
    pub observations: u64,
    /// Deltas emitted
    pub deltas: u64,
    /// Values for message numbers outside the catalog
    pub unknown_messages: u64,
    /// Values dropped because the arena was full
    pub dropped_arena_full: u64,
}

/// Arena-backed device state store
#[derive(Debug)]
pub struct DeviceStateStore {
    slots: Vec<DeviceSlot>,
    index: HashMap<Address, usize>,
    epoch: u64,
    stats: StoreStats,
}

impl DeviceStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(MAX_DEVICES),
            index: HashMap::with_capacity(MAX_DEVICES),
            epoch: 0,
            stats: StoreStats::default(),
        }
    }

    /// Apply every numeric message set of a frame, returning one delta per
    /// changed value
    ///
    /// Values are attributed to the frame's source address. Structure
    /// messages are not stored.
    pub fn apply(&mut self, frame: &Frame, now: Instant) -> Vec<StateDelta> {
        frame
            .messages
            .iter()
            .filter_map(|set| match &set.value {
                MessageValue::Structure(_) => None,
                value => value
                    .as_i64()
                    .and_then(|v| self.apply_value(frame.source, set.number, v, now)),
            })
            .collect()
    }

    /// Apply a single observed value
    ///
    /// Returns a delta on first observation, when the value changed, or when
    /// a full resync was requested since the entry was last reported.
    pub fn apply_value(
        &mut self,
        address: Address,
        number: MessageNumber,
        value: i64,
        now: Instant,
    ) -> Option<StateDelta> {
        let Some(capability) = catalog::index_of(number) else {
            trace!(%address, message = %number, "Ignoring uncatalogued message");
            self.stats.unknown_messages += 1;
            return None;
        };

        let slot = self.slot_for(address)?;
        self.stats.observations += 1;

        let epoch = self.epoch;
        let entry = &mut self.slots[slot].entries[capability];
        let old = entry.map(|o| o.value);
        let forced = entry.is_some_and(|o| o.epoch < epoch);

        *entry = Some(Observation {
            value,
            updated_at: now,
            epoch,
        });

        if old == Some(value) && !forced {
            return None;
        }

        self.stats.deltas += 1;
        Some(StateDelta {
            address,
            capability: number,
            old,
            new: value,
            at: now,
        })
    }

    /// Force every entry to report its next observation even if unchanged
    pub fn request_full_resync(&mut self) {
        self.epoch += 1;
    }

    /// Last observation of a capability
    pub fn get(&self, address: &Address, number: MessageNumber) -> Option<Observation> {
        let slot = *self.index.get(address)?;
        let capability = catalog::index_of(number)?;
        self.slots[slot].entries[capability]
    }

    /// Addresses with at least one stored value, in arrival order
    pub fn devices(&self) -> impl Iterator<Item = Address> + '_ {
        self.slots.iter().map(|s| s.address)
    }

    /// Number of tracked devices
    pub fn device_count(&self) -> usize {
        self.slots.len()
    }

    /// Store statistics
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    fn slot_for(&mut self, address: Address) -> Option<usize> {
        if let Some(&slot) = self.index.get(&address) {
            return Some(slot);
        }
        if self.slots.len() >= MAX_DEVICES {
            warn!(%address, max = MAX_DEVICES, "Device arena full, dropping value");
            self.stats.dropped_arena_full += 1;
            return None;
        }
        let slot = self.slots.len();
        self.slots.push(DeviceSlot::new(address));
        self.index.insert(address, slot);
        Some(slot)
    }
}

impl Default for DeviceStateStore {
    fn default() -> Self {
        Self::new()
    }
}
