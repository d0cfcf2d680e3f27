//! Persistence format of queues.
//!
//! A queue is stored as dense uppercase hex text:
//!
//! ```text
//! queue   := TYPE(2) COUNT(4) entry*
//! entry   := TAG(1) packet message
//! packet  := "0" | "1" LEN(2) PACKET_HEX(LEN)
//! message := "0" | "1" DIRECTION(1) TYPE(2) SUBTYPES(2) (POSITION(2) VALUE(2))*
//! ```
//!
//! The layout carries no version marker, so the version is selected by the
//! caller through [`QueueFormat`].

use crate::core::packet::Packet;
use crate::error::constants::{ERR_PACKET_TOO_LONG, ERR_TRUNCATED_QUEUE};
use crate::error::{BidCoSError, Result};
use crate::protocol::message::{Direction, Subtype};
use crate::protocol::registry::MessageRegistry;
use crate::queue::entry::{EntryTag, QueueEntry, QueueType};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::warn;

/// Length of the `TYPE COUNT` header; shorter serializations hold no entries.
pub const QUEUE_HEADER_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueFormat {
    #[default]
    V1,
}

/// Result of decoding one queue.
#[derive(Debug, Clone, Default)]
pub struct DecodedQueue {
    pub queue_type: QueueType,
    pub entries: VecDeque<QueueEntry>,
    /// Entries skipped because they could not be re-resolved.
    pub dropped: usize,
}

impl QueueFormat {
    pub const CURRENT: QueueFormat = QueueFormat::V1;

    pub fn encode<'a, I>(&self, queue_type: QueueType, entries: I) -> Result<String>
    where
        I: ExactSizeIterator<Item = &'a QueueEntry>,
    {
        match self {
            QueueFormat::V1 => {
                let mut writer = HexWriter::default();
                writer.put(queue_type as u64, 2, "queue type")?;
                writer.put(entries.len() as u64, 4, "entry count")?;
                for entry in entries {
                    encode_entry_v1(&mut writer, entry)?;
                }
                Ok(writer.finish())
            }
        }
    }

    /// Decode a queue, re-resolving its messages through `registry`.
    ///
    /// Entries whose message is no longer registered are dropped with a
    /// warning; malformed text is an error.
    pub fn decode(&self, text: &str, registry: &MessageRegistry) -> Result<DecodedQueue> {
        match self {
            QueueFormat::V1 => decode_v1(text, registry),
        }
    }
}

fn encode_entry_v1(writer: &mut HexWriter, entry: &QueueEntry) -> Result<()> {
    writer.put(entry.tag() as u64, 1, "entry tag")?;

    match entry.packet() {
        None => writer.put(0, 1, "packet flag")?,
        Some(packet) => {
            let hex = packet.serialize();
            if hex.len() > 0xFF {
                return Err(BidCoSError::PersistenceEncode(format!(
                    "{ERR_PACKET_TOO_LONG}: {} characters",
                    hex.len()
                )));
            }
            writer.put(1, 1, "packet flag")?;
            writer.put(hex.len() as u64, 2, "packet length")?;
            writer.put_str(&hex);
        }
    }

    match entry.message() {
        None => writer.put(0, 1, "message flag")?,
        Some(message) => {
            writer.put(1, 1, "message flag")?;
            writer.put(message.direction() as u64, 1, "direction")?;
            writer.put(message.message_type() as u64, 2, "message type")?;
            writer.put(message.subtype_count() as u64, 2, "subtype count")?;
            for subtype in message.subtypes() {
                writer.put(subtype.position as u64, 2, "subtype position")?;
                writer.put(subtype.value as u64, 2, "subtype value")?;
            }
        }
    }
    Ok(())
}

fn decode_v1(text: &str, registry: &MessageRegistry) -> Result<DecodedQueue> {
    let mut reader = HexReader::new(text);
    let raw_type = reader.take(2)?;
    let queue_type = QueueType::from_u8(raw_type as u8)
        .ok_or_else(|| BidCoSError::persistence_at(0, format!("unknown queue type {raw_type}")))?;
    let count = reader.take(4)?;

    let mut decoded = DecodedQueue {
        queue_type,
        entries: VecDeque::with_capacity(count as usize),
        dropped: 0,
    };

    for index in 0..count {
        let tag_offset = reader.position();
        let raw_tag = reader.take(1)?;

        let packet = if reader.take(1)? != 0 {
            let len = reader.take(2)? as usize;
            let offset = reader.position();
            let hex = reader.take_str(len)?;
            let parsed = Packet::parse(hex, false);
            if !parsed.is_clean() {
                let problems: Vec<String> = parsed.warnings.iter().map(ToString::to_string).collect();
                return Err(BidCoSError::persistence_at(
                    offset,
                    format!("corrupt packet: {}", problems.join(", ")),
                ));
            }
            Some(Arc::new(parsed.value))
        } else {
            None
        };

        let message = if reader.take(1)? != 0 {
            let offset = reader.position();
            let raw_direction = reader.take(1)?;
            let direction = Direction::from_u8(raw_direction as u8).ok_or_else(|| {
                BidCoSError::persistence_at(offset, format!("unknown direction {raw_direction}"))
            })?;
            let message_type = reader.take(2)? as u8;
            let subtype_count = reader.take(2)?;
            let mut subtypes = Vec::with_capacity(subtype_count as usize);
            for _ in 0..subtype_count {
                let position = reader.take(2)? as u8;
                let value = reader.take(2)? as u8;
                subtypes.push(Subtype::new(position, value));
            }
            Some((direction, message_type, subtypes))
        } else {
            None
        };

        let tag = EntryTag::from_u8(raw_tag as u8).ok_or_else(|| {
            BidCoSError::persistence_at(tag_offset, format!("unknown entry tag {raw_tag}"))
        })?;

        let entry = match (tag, packet, message) {
            (EntryTag::Packet, Some(packet), _) => Some(QueueEntry::Packet(packet)),
            (EntryTag::Message, packet, Some((direction, message_type, subtypes))) => registry
                .find_by_type(direction, message_type, &subtypes)
                .map(|message| QueueEntry::Message { message, packet })
                .or_else(|| {
                    warn!(
                        index,
                        message_type,
                        "Persisted message no longer registered, dropping entry"
                    );
                    None
                }),
            (tag, _, _) => {
                warn!(index, ?tag, "Persisted entry is incomplete, dropping it");
                None
            }
        };

        match entry {
            Some(entry) => decoded.entries.push_back(entry),
            None => decoded.dropped += 1,
        }
    }

    Ok(decoded)
}

/// Fixed-width uppercase hex writer.
#[derive(Debug, Default)]
pub(crate) struct HexWriter {
    out: String,
}

impl HexWriter {
    pub(crate) fn put(&mut self, value: u64, width: usize, field: &str) -> Result<()> {
        if width < 16 && value >> (width * 4) != 0 {
            return Err(BidCoSError::PersistenceEncode(format!(
                "{field} {value} does not fit into {width} hex digits"
            )));
        }
        // Writing into a String cannot fail.
        let _ = write!(self.out, "{value:0width$X}");
        Ok(())
    }

    pub(crate) fn put_str(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }
}

/// Cursor over fixed-width hex fields.
#[derive(Debug)]
pub(crate) struct HexReader<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> HexReader<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    pub(crate) fn take(&mut self, width: usize) -> Result<u32> {
        let offset = self.pos;
        let digits = self.take_str(width)?;
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(BidCoSError::persistence_at(
                offset,
                format!("invalid hex digits {digits:?}"),
            ));
        }
        u32::from_str_radix(digits, 16)
            .map_err(|e| BidCoSError::persistence_at(offset, e.to_string()))
    }

    pub(crate) fn take_str(&mut self, len: usize) -> Result<&'a str> {
        let text = self
            .text
            .get(self.pos..self.pos + len)
            .ok_or_else(|| BidCoSError::persistence_at(self.pos, ERR_TRUNCATED_QUEUE))?;
        self.pos += len;
        Ok(text)
    }
}
