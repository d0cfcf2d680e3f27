use crate::core::packet::Packet;
use crate::error::constants::{ERR_REGISTRY_READ_LOCK, ERR_REGISTRY_WRITE_LOCK};
use crate::error::{BidCoSError, Result};
use crate::protocol::message::{Direction, MessageDescriptor, Subtype};
use crate::queue::send_queue::SendQueue;
use crate::runtime::Executor;
use crate::utils::metrics::global_metrics;
use std::sync::{Arc, RwLock, RwLockReadGuard};
use tracing::{error, warn};

/// Insertion-ordered set of message descriptors with best-match lookup.
#[derive(Debug, Default)]
pub struct MessageRegistry {
    descriptors: RwLock<Vec<Arc<MessageDescriptor>>>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, descriptor: MessageDescriptor) -> Result<Arc<MessageDescriptor>> {
        let descriptor = Arc::new(descriptor);
        let mut descriptors = self
            .descriptors
            .write()
            .map_err(|_| BidCoSError::Custom(ERR_REGISTRY_WRITE_LOCK.to_string()))?;
        descriptors.push(Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Best match for `packet`: the matching descriptor with the most subtype
    /// constraints, the earliest registered one on ties.
    pub fn find(&self, direction: Direction, packet: &Packet) -> Option<Arc<MessageDescriptor>> {
        let descriptors = self.read();
        let mut best: Option<&Arc<MessageDescriptor>> = None;
        for descriptor in descriptors.iter() {
            if descriptor.direction() != direction || !descriptor.matches_packet(packet) {
                continue;
            }
            if best.map_or(true, |b| descriptor.subtype_count() > b.subtype_count()) {
                best = Some(descriptor);
            }
        }
        best.cloned()
    }

    /// First descriptor structurally equal to `(message_type, subtypes)`.
    pub fn find_by_type(
        &self,
        direction: Direction,
        message_type: u8,
        subtypes: &[Subtype],
    ) -> Option<Arc<MessageDescriptor>> {
        self.read()
            .iter()
            .find(|d| d.direction() == direction && d.matches_type(message_type, subtypes))
            .cloned()
    }

    /// Resolve, authorize and hand an incoming packet to its handler.
    ///
    /// The handler runs on `executor`; the returned descriptor is the one that
    /// was dispatched.
    pub fn dispatch_incoming(
        &self,
        packet: &Arc<Packet>,
        queue: Option<&SendQueue>,
        executor: &Executor,
    ) -> Result<Arc<MessageDescriptor>> {
        let descriptor = self
            .find(Direction::In, packet)
            .ok_or(BidCoSError::UnknownMessage(packet.message_type()))?;

        if !descriptor.check_access(packet, queue) {
            return Err(BidCoSError::AccessDenied(packet.sender().to_string()));
        }

        let handler = Arc::clone(&descriptor);
        let packet = Arc::clone(packet);
        executor.dispatch(move || {
            if let Err(e) = handler.invoke_incoming(&packet) {
                global_metrics().handler_error();
                error!(error = %e, packet = %packet, "Incoming handler failed");
            }
        });
        Ok(descriptor)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<MessageDescriptor>>> {
        self.descriptors.read().unwrap_or_else(|poisoned| {
            warn!("{}", ERR_REGISTRY_READ_LOCK);
            poisoned.into_inner()
        })
    }
}
