//! # Device Contracts
//!
//! The engine does not implement device personalities. A device (a central,
//! a virtual actor, a test double) plugs in through the [`Device`] trait and
//! binds its message handlers when it registers [`MessageDescriptor`]s.
//!
//! [`MessageDescriptor`]: crate::protocol::message::MessageDescriptor

use crate::core::address::Address;
use crate::core::packet::Packet;
use crate::queue::pending::VariableReset;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A remote device paired with the local device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub address: Address,
    pub serial_number: String,
    /// Peer only listens after it sent something itself (battery devices).
    pub wake_up: bool,
}

impl Peer {
    pub fn new(address: Address, serial_number: impl Into<String>) -> Self {
        Self {
            address,
            serial_number: serial_number.into(),
            wake_up: false,
        }
    }

    pub fn with_wake_up(mut self, wake_up: bool) -> Self {
        self.wake_up = wake_up;
        self
    }
}

/// Per-peer message counters of the local device.
#[derive(Debug, Default)]
pub struct MessageCounters {
    counters: Mutex<HashMap<Address, u8>>,
}

impl MessageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the counter for `address` and return the new value.
    ///
    /// Unknown addresses start at 0, so the first value handed out is 1.
    pub fn increment(&self, address: Address) -> u8 {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = counters.entry(address).or_insert(0);
        *counter = counter.wrapping_add(1);
        *counter
    }

    pub fn get(&self, address: Address) -> Option<u8> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&address)
            .copied()
    }

    pub fn set(&self, address: Address, value: u8) {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address, value);
    }
}

/// The local device the engine works for.
///
/// Implementations must be cheap to call from any thread; `send_packet` is
/// invoked from the dispatch executor, never while the engine holds a lock.
pub trait Device: Send + Sync {
    /// Radio address of this device.
    fn address(&self) -> Address;

    /// Address of the central this device is paired to.
    fn central_address(&self) -> Address;

    fn is_in_pairing_mode(&self) -> bool;

    /// Persisted peer table lookup.
    fn peer(&self, address: Address) -> Option<Arc<Peer>>;

    /// Hand a packet to the transport.
    fn send_packet(&self, packet: Arc<Packet>);

    fn message_counters(&self) -> &MessageCounters;

    /// A queue for `peer` expired with `remaining` entries still unsent.
    fn on_queue_expired(&self, _peer: &Arc<Peer>, _remaining: usize) {}

    /// A spliced sub-queue that carried a variable reset has drained.
    fn on_variable_reset(&self, _peer: Option<&Arc<Peer>>, _reset: &VariableReset) {}
}
