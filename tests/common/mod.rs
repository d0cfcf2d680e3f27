//! Shared test device for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use bidcos_engine::config::{ExecutorConfig, TimingConfig};
use bidcos_engine::core::address::Address;
use bidcos_engine::core::packet::Packet;
use bidcos_engine::device::{Device, MessageCounters, Peer};
use bidcos_engine::protocol::message::{Access, MessageDescriptor};
use bidcos_engine::queue::{QueueContext, QueueType, SendQueue, VariableReset};
use bidcos_engine::runtime::Executor;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

pub const ME: Address = Address::new(0x1D8A4C);
pub const CENTRAL: Address = Address::new(0x0A0B0C);
pub const PEER: Address = Address::new(0x200A1B);
pub const STRANGER: Address = Address::new(0x3F0001);

/// Records everything the engine asks it to do.
pub struct TestDevice {
    pairing: AtomicBool,
    peers: Mutex<HashMap<Address, Arc<Peer>>>,
    counters: MessageCounters,
    pub sent: Mutex<Vec<(Instant, Arc<Packet>)>>,
    pub expired: Mutex<Vec<(Address, usize)>>,
    pub resets: Mutex<Vec<VariableReset>>,
}

impl TestDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pairing: AtomicBool::new(false),
            peers: Mutex::new(HashMap::new()),
            counters: MessageCounters::new(),
            sent: Mutex::new(Vec::new()),
            expired: Mutex::new(Vec::new()),
            resets: Mutex::new(Vec::new()),
        })
    }

    pub fn with_peer(address: Address) -> Arc<Self> {
        let device = Self::new();
        device.add_peer(address);
        device
    }

    pub fn add_peer(&self, address: Address) {
        self.peers
            .lock()
            .unwrap()
            .insert(address, Arc::new(Peer::new(address, format!("TST{:07X}", address.value()))));
    }

    pub fn set_pairing(&self, pairing: bool) {
        self.pairing.store(pairing, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent_packets(&self) -> Vec<Arc<Packet>> {
        self.sent.lock().unwrap().iter().map(|(_, p)| Arc::clone(p)).collect()
    }

    pub fn weak(self: &Arc<Self>) -> Weak<dyn Device> {
        let weak: Weak<dyn Device> = Arc::downgrade(self) as Weak<TestDevice>;
        weak
    }

    pub fn incoming(self: &Arc<Self>, message_type: u8, access: Access) -> MessageDescriptor {
        MessageDescriptor::incoming(message_type, self.weak(), access, |_: u8, _: &Arc<Packet>| {})
    }

    pub fn context(self: &Arc<Self>) -> QueueContext {
        QueueContext {
            device: self.weak(),
            executor: Executor::current(&ExecutorConfig::default()).unwrap(),
            timing: TimingConfig::default(),
        }
    }

    pub fn queue(self: &Arc<Self>, queue_type: QueueType) -> SendQueue {
        SendQueue::new(self.context(), queue_type)
    }
}

impl Device for TestDevice {
    fn address(&self) -> Address {
        ME
    }

    fn central_address(&self) -> Address {
        CENTRAL
    }

    fn is_in_pairing_mode(&self) -> bool {
        self.pairing.load(Ordering::SeqCst)
    }

    fn peer(&self, address: Address) -> Option<Arc<Peer>> {
        self.peers.lock().unwrap().get(&address).cloned()
    }

    fn send_packet(&self, packet: Arc<Packet>) {
        self.sent.lock().unwrap().push((Instant::now(), packet));
    }

    fn message_counters(&self) -> &MessageCounters {
        &self.counters
    }

    fn on_queue_expired(&self, peer: &Arc<Peer>, remaining: usize) {
        self.expired.lock().unwrap().push((peer.address, remaining));
    }

    fn on_variable_reset(&self, _peer: Option<&Arc<Peer>>, reset: &VariableReset) {
        self.resets.lock().unwrap().push(reset.clone());
    }
}

/// A packet from `sender` to `destination`.
pub fn packet(control_byte: u8, message_type: u8, sender: Address, destination: Address, payload: Vec<u8>) -> Arc<Packet> {
    Arc::new(Packet::new(0x1A, control_byte, message_type, sender, destination, payload))
}

/// A config request from the local device that expects an answer.
pub fn request(counter: u8) -> Arc<Packet> {
    Arc::new(Packet::new(counter, 0xA0, 0x01, ME, PEER, vec![0x01, 0x05]))
}
