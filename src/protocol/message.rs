//! Message descriptors: one recognized packet shape bound to a handler.

use crate::core::packet::Packet;
use crate::device::Device;
use crate::error::{BidCoSError, Result};
use crate::queue::entry::{QueueEntry, QueueType};
use crate::queue::send_queue::SendQueue;
use std::fmt;
use std::ops::BitOr;
use std::sync::{Arc, Weak};
use tracing::{debug, instrument};

/// Access policy bitmask of an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Access(u8);

impl Access {
    pub const NONE: Access = Access(0x00);
    pub const PAIRED_TO_SENDER: Access = Access(0x01);
    pub const DEST_IS_ME: Access = Access(0x02);
    pub const CENTRAL: Access = Access(0x04);
    pub const UNPAIRING: Access = Access(0x08);
    pub const FULL: Access = Access(0x80);

    pub const fn from_bits(bits: u8) -> Self {
        Access(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Access) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Access {
    type Output = Access;

    fn bitor(self, rhs: Access) -> Access {
        Access(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    In = 0,
    Out = 1,
}

impl Direction {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Direction::In),
            1 => Some(Direction::Out),
            _ => None,
        }
    }
}

/// A `payload[position] == value` constraint narrowing a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subtype {
    pub position: u8,
    pub value: u8,
}

impl Subtype {
    pub const fn new(position: u8, value: u8) -> Self {
        Self { position, value }
    }
}

/// Handler for a received packet: `(message_counter, packet)`.
pub trait IncomingHandler: Send + Sync {
    fn handle(&self, message_counter: u8, packet: &Arc<Packet>);
}

impl<F> IncomingHandler for F
where
    F: Fn(u8, &Arc<Packet>) + Send + Sync,
{
    fn handle(&self, message_counter: u8, packet: &Arc<Packet>) {
        self(message_counter, packet)
    }
}

/// Handler composing an answer: `(message_counter, control_byte, request)`.
pub trait OutgoingHandler: Send + Sync {
    fn handle(&self, message_counter: u8, control_byte: u8, packet: &Arc<Packet>);
}

impl<F> OutgoingHandler for F
where
    F: Fn(u8, u8, &Arc<Packet>) + Send + Sync,
{
    fn handle(&self, message_counter: u8, control_byte: u8, packet: &Arc<Packet>) {
        self(message_counter, control_byte, packet)
    }
}

#[derive(Clone)]
enum Handler {
    Incoming(Arc<dyn IncomingHandler>),
    Outgoing(Arc<dyn OutgoingHandler>),
}

/// A recognized packet shape (type plus optional subtype constraints) with
/// its direction, access policy and bound handler.
///
/// Descriptors are created once while a device registers its messages and are
/// shared as `Arc<MessageDescriptor>` afterwards.
#[derive(Clone)]
pub struct MessageDescriptor {
    message_type: u8,
    control_byte: u8,
    direction: Direction,
    access: Access,
    pairing_access: Access,
    subtypes: Vec<Subtype>,
    device: Weak<dyn Device>,
    handler: Handler,
}

impl MessageDescriptor {
    /// Incoming message with the same access in and out of pairing mode.
    pub fn incoming<H>(message_type: u8, device: Weak<dyn Device>, access: Access, handler: H) -> Self
    where
        H: IncomingHandler + 'static,
    {
        Self::incoming_with_pairing(message_type, device, access, access, handler)
    }

    /// Incoming message with a separate access policy while pairing.
    pub fn incoming_with_pairing<H>(
        message_type: u8,
        device: Weak<dyn Device>,
        access: Access,
        pairing_access: Access,
        handler: H,
    ) -> Self
    where
        H: IncomingHandler + 'static,
    {
        Self {
            message_type,
            control_byte: 0,
            direction: Direction::In,
            access,
            pairing_access,
            subtypes: Vec::new(),
            device,
            handler: Handler::Incoming(Arc::new(handler)),
        }
    }

    /// Outgoing message sent with `control_byte`.
    pub fn outgoing<H>(message_type: u8, control_byte: u8, device: Weak<dyn Device>, handler: H) -> Self
    where
        H: OutgoingHandler + 'static,
    {
        Self {
            message_type,
            control_byte,
            direction: Direction::Out,
            access: Access::NONE,
            pairing_access: Access::NONE,
            subtypes: Vec::new(),
            device,
            handler: Handler::Outgoing(Arc::new(handler)),
        }
    }

    pub fn with_subtype(mut self, position: u8, value: u8) -> Self {
        self.subtypes.push(Subtype::new(position, value));
        self
    }

    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    pub fn control_byte(&self) -> u8 {
        self.control_byte
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn pairing_access(&self) -> Access {
        self.pairing_access
    }

    pub fn subtypes(&self) -> &[Subtype] {
        &self.subtypes
    }

    pub fn subtype_count(&self) -> usize {
        self.subtypes.len()
    }

    /// Type matches and every subtype constraint holds inside the payload.
    pub fn matches_packet(&self, packet: &Packet) -> bool {
        if self.message_type != packet.message_type() {
            return false;
        }
        let payload = packet.payload();
        self.subtypes.iter().all(|subtype| {
            payload
                .get(subtype.position as usize)
                .is_some_and(|value| *value == subtype.value)
        })
    }

    /// Structural equality of type and ordered subtype list.
    pub fn matches_descriptor(&self, other: &MessageDescriptor) -> bool {
        self.matches_type(other.message_type, &other.subtypes)
    }

    pub fn matches_type(&self, message_type: u8, subtypes: &[Subtype]) -> bool {
        self.message_type == message_type && self.subtypes == subtypes
    }

    /// Decide whether `packet` may be processed by this message.
    ///
    /// When `queue` is given and its head is a packet or a different message,
    /// the head is popped first so that a resent request from the peer does not
    /// stall the exchange. A remaining non-matching message head denies access.
    #[instrument(level = "trace", skip_all, fields(packet = %packet))]
    pub fn check_access(&self, packet: &Packet, queue: Option<&SendQueue>) -> bool {
        let Some(device) = self.device.upgrade() else {
            debug!("Access denied: device dropped");
            return false;
        };

        let pairing = device.is_in_pairing_mode();
        let access = if pairing {
            self.pairing_access
        } else {
            self.access
        };
        let sender = packet.sender();
        let peer = pairing
            .then(|| queue.and_then(SendQueue::peer))
            .flatten()
            .filter(|peer| peer.address == sender)
            .or_else(|| device.peer(sender));

        if access == Access::NONE {
            debug!(%sender, "Access denied: no access");
            return false;
        }

        if let Some(queue) = queue {
            if !queue.pop_stale_head(self) {
                debug!(%sender, "Access denied: queue waits for another message");
                return false;
            }
        }

        if access.contains(Access::FULL) {
            return true;
        }
        if access.contains(Access::DEST_IS_ME) && packet.destination() != device.address() {
            debug!(%sender, destination = %packet.destination(), "Access denied: destination is not me");
            return false;
        }
        if access.contains(Access::UNPAIRING)
            && queue.is_some_and(|queue| queue.queue_type() == QueueType::Unpairing)
        {
            return true;
        }
        if access.contains(Access::PAIRED_TO_SENDER) && peer.is_none() {
            debug!(%sender, "Access denied: not paired to sender");
            return false;
        }
        if access.contains(Access::CENTRAL) && device.central_address() != sender {
            debug!(%sender, "Access denied: sender is not the central");
            return false;
        }
        true
    }

    /// Invoke the incoming handler with the packet's own counter.
    pub fn invoke_incoming(&self, packet: &Arc<Packet>) -> Result<()> {
        let Handler::Incoming(handler) = &self.handler else {
            return Err(BidCoSError::HandlerMismatch);
        };
        if self.device.strong_count() == 0 {
            return Err(BidCoSError::DeviceDropped);
        }
        handler.handle(packet.message_counter(), packet);
        Ok(())
    }

    /// Invoke the outgoing handler for the request `packet`.
    ///
    /// The device's counter for `packet.sender()` is advanced before it is
    /// handed to the handler.
    pub fn invoke_outgoing(&self, packet: Option<&Arc<Packet>>) -> Result<()> {
        let Handler::Outgoing(handler) = &self.handler else {
            return Err(BidCoSError::HandlerMismatch);
        };
        let packet = packet.ok_or(BidCoSError::MissingRequestPacket)?;
        let device = self.device.upgrade().ok_or(BidCoSError::DeviceDropped)?;
        let counter = device.message_counters().increment(packet.sender());
        handler.handle(counter, self.control_byte, packet);
        Ok(())
    }

    /// Whether a queue entry carries a message structurally equal to this one.
    pub(crate) fn matches_entry(&self, entry: &QueueEntry) -> bool {
        match entry {
            QueueEntry::Message { message, .. } => self.matches_descriptor(message),
            QueueEntry::Packet(_) => false,
        }
    }
}

impl fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDescriptor")
            .field("message_type", &format_args!("0x{:02X}", self.message_type))
            .field("direction", &self.direction)
            .field("control_byte", &format_args!("0x{:02X}", self.control_byte))
            .field("access", &self.access)
            .field("pairing_access", &self.pairing_access)
            .field("subtypes", &self.subtypes)
            .finish()
    }
}
