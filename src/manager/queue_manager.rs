use crate::core::address::Address;
use crate::manager::keyed::{KeyedLifetimeManager, LifetimeSettings, RecordInfo};
use crate::queue::entry::QueueType;
use crate::queue::send_queue::{QueueContext, SendQueue};
use crate::utils::metrics::global_metrics;
use tracing::{debug, info};

/// Send queue of each peer.
///
/// Evicted and replaced queues are disposed, which cancels their timers. When
/// a queue expires with entries left, the device is told through
/// [`Device::on_queue_expired`](crate::device::Device::on_queue_expired).
#[derive(Debug, Clone)]
pub struct QueueManager {
    records: KeyedLifetimeManager<SendQueue>,
    context: QueueContext,
}

impl QueueManager {
    pub fn new(context: QueueContext) -> Self {
        let settings = LifetimeSettings {
            ttl: context.timing.queue_ttl,
            poll: context.timing.queue_poll,
        };
        let device = context.device.clone();
        let records = KeyedLifetimeManager::with_evict_hook(
            "queues",
            settings,
            context.executor.clone(),
            move |address, id, queue: SendQueue| {
                queue.dispose();
                global_metrics().queue_expired();

                let remaining = queue.len();
                if remaining == 0 {
                    return;
                }
                let Some(device) = device.upgrade() else {
                    return;
                };
                let peer = queue
                    .peer()
                    .filter(|peer| peer.address == address)
                    .or_else(|| device.peer(address));
                match peer {
                    Some(peer) => {
                        info!(%address, queue_id = id, remaining, "Queue expired with unsent entries");
                        device.on_queue_expired(&peer, remaining);
                    }
                    None => debug!(%address, queue_id = id, remaining, "Queue of unknown peer expired"),
                }
            },
        );
        Self { records, context }
    }

    /// Create a fresh queue for `address`, disposing the one it replaces.
    ///
    /// The queue id is the record's generation id. Returns `None` once the
    /// manager has been disposed.
    pub fn create_queue(&self, address: Address, queue_type: QueueType) -> Option<SendQueue> {
        let (queue, replaced) = self.records.insert_with(address, |id, touch| {
            SendQueue::with_record(self.context.clone(), queue_type, id, Some(touch))
        })?;
        if let Some(old) = replaced {
            debug!(%address, old_id = old.id(), new_id = queue.id(), "Replaced send queue");
            old.dispose();
        }
        global_metrics().queue_created();
        Some(queue)
    }

    pub fn get(&self, address: Address) -> Option<SendQueue> {
        self.records.get(address)
    }

    pub fn get_info(&self, address: Address) -> Option<RecordInfo<SendQueue>> {
        self.records.info(address)
    }

    pub fn keep_alive(&self, address: Address) -> bool {
        self.records.keep_alive(address)
    }

    /// Drop the queue of `address` right away.
    pub fn remove(&self, address: Address) -> Option<SendQueue> {
        let queue = self.records.remove(address)?;
        queue.dispose();
        Some(queue)
    }

    pub fn active_watchers(&self) -> usize {
        self.records.active_watchers()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dispose(&self) {
        for queue in self.records.dispose() {
            queue.dispose();
        }
    }
}
