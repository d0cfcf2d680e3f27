use crate::config::TimingConfig;
use crate::core::address::Address;
use crate::core::packet::Packet;
use crate::manager::keyed::{KeyedLifetimeManager, LifetimeSettings, RecordInfo};
use crate::runtime::Executor;
use crate::utils::metrics::global_metrics;
use std::sync::Arc;

/// Last packet received from each peer.
#[derive(Debug, Clone)]
pub struct PacketManager {
    records: KeyedLifetimeManager<Arc<Packet>>,
}

impl PacketManager {
    pub fn new(timing: &TimingConfig, executor: Executor) -> Self {
        let settings = LifetimeSettings {
            ttl: timing.packet_ttl,
            poll: timing.packet_poll,
        };
        Self {
            records: KeyedLifetimeManager::with_evict_hook("packets", settings, executor, |_, _, _| {
                global_metrics().packet_expired();
            }),
        }
    }

    /// Record `packet` as the latest one from `address`, replacing the
    /// previous record. Returns the generation id, or `None` once disposed.
    pub fn set(&self, address: Address, packet: Arc<Packet>) -> Option<u64> {
        let mut id = 0;
        self.records.insert_with(address, |generation, _| {
            id = generation;
            packet
        })?;
        Some(id)
    }

    pub fn get(&self, address: Address) -> Option<Arc<Packet>> {
        self.records.get(address)
    }

    pub fn get_info(&self, address: Address) -> Option<RecordInfo<Arc<Packet>>> {
        self.records.info(address)
    }

    pub fn keep_alive(&self, address: Address) -> bool {
        self.records.keep_alive(address)
    }

    pub fn active_watchers(&self) -> usize {
        self.records.active_watchers()
    }

    pub fn dispose(&self) {
        self.records.dispose();
    }
}
