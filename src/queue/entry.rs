use crate::core::packet::Packet;
use crate::protocol::message::{Direction, MessageDescriptor};
use std::sync::Arc;

/// Purpose of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum QueueType {
    #[default]
    Empty = 0,
    Default = 1,
    Config = 2,
    Pairing = 3,
    PairingCentral = 4,
    Unpairing = 5,
}

impl QueueType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(QueueType::Empty),
            1 => Some(QueueType::Default),
            2 => Some(QueueType::Config),
            3 => Some(QueueType::Pairing),
            4 => Some(QueueType::PairingCentral),
            5 => Some(QueueType::Unpairing),
            _ => None,
        }
    }
}

/// Persisted entry tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryTag {
    Undefined = 0,
    Message = 1,
    Packet = 2,
}

impl EntryTag {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EntryTag::Undefined),
            1 => Some(EntryTag::Message),
            2 => Some(EntryTag::Packet),
            _ => None,
        }
    }
}

/// One step of a queue: a packet to transmit, or a message to send or await.
///
/// The packet of a `Message` entry is the request an outgoing handler answers.
#[derive(Debug, Clone)]
pub enum QueueEntry {
    Packet(Arc<Packet>),
    Message {
        message: Arc<MessageDescriptor>,
        packet: Option<Arc<Packet>>,
    },
}

impl QueueEntry {
    pub fn tag(&self) -> EntryTag {
        match self {
            QueueEntry::Packet(_) => EntryTag::Packet,
            QueueEntry::Message { .. } => EntryTag::Message,
        }
    }

    pub fn packet(&self) -> Option<&Arc<Packet>> {
        match self {
            QueueEntry::Packet(packet) => Some(packet),
            QueueEntry::Message { packet, .. } => packet.as_ref(),
        }
    }

    pub fn message(&self) -> Option<&Arc<MessageDescriptor>> {
        match self {
            QueueEntry::Packet(_) => None,
            QueueEntry::Message { message, .. } => Some(message),
        }
    }

    /// Control byte the entry is transmitted with.
    pub fn control_byte(&self) -> u8 {
        match self {
            QueueEntry::Packet(packet) => packet.control_byte(),
            QueueEntry::Message { message, .. } => message.control_byte(),
        }
    }

    /// Packets and outgoing messages are transmitted; incoming messages are awaited.
    pub fn is_sendable(&self) -> bool {
        match self {
            QueueEntry::Packet(_) => true,
            QueueEntry::Message { message, .. } => message.direction() == Direction::Out,
        }
    }

    pub fn is_incoming_message(&self) -> bool {
        matches!(self, QueueEntry::Message { message, .. } if message.direction() == Direction::In)
    }
}
