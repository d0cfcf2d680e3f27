//! Sub-queues and the chain of sub-queues a send queue works through.
//!
//! Multi-step transactions (pairing, configuration writes) are composed of
//! sub-queues. Once the live queue of a peer drains, the next non-empty
//! sub-queue of its chain is spliced in.

use crate::core::packet::Packet;
use crate::error::Result;
use crate::protocol::message::MessageDescriptor;
use crate::protocol::registry::MessageRegistry;
use crate::queue::entry::{QueueEntry, QueueType};
use crate::queue::format::{HexReader, HexWriter, QueueFormat, QUEUE_HEADER_LEN};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A device variable to reset once a sub-queue has been delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableReset {
    pub channel: u16,
    pub key: String,
    pub value: u32,
    pub reset_after: Duration,
}

/// An ordered group of entries executed as one unit of a chain.
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    queue_type: QueueType,
    entries: VecDeque<QueueEntry>,
    variable_reset: Option<VariableReset>,
}

impl PendingQueue {
    pub fn new(queue_type: QueueType) -> Self {
        Self {
            queue_type,
            ..Self::default()
        }
    }

    pub fn with_variable_reset(mut self, reset: VariableReset) -> Self {
        self.variable_reset = Some(reset);
        self
    }

    pub fn push_packet(&mut self, packet: Arc<Packet>) {
        self.entries.push_back(QueueEntry::Packet(packet));
    }

    pub fn push_message(&mut self, message: Arc<MessageDescriptor>, packet: Option<Arc<Packet>>) {
        self.entries.push_back(QueueEntry::Message { message, packet });
    }

    pub fn push_entry(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    pub fn entries(&self) -> &VecDeque<QueueEntry> {
        &self.entries
    }

    pub fn variable_reset(&self) -> Option<&VariableReset> {
        self.variable_reset.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empty sub-queues serialize to an empty string.
    pub fn serialize(&self) -> Result<String> {
        if self.entries.is_empty() {
            return Ok(String::new());
        }
        QueueFormat::CURRENT.encode(self.queue_type, self.entries.iter())
    }

    pub fn deserialize(text: &str, registry: &MessageRegistry) -> Result<Self> {
        if text.len() <= QUEUE_HEADER_LEN {
            return Ok(Self::default());
        }
        let decoded = QueueFormat::CURRENT.decode(text, registry)?;
        Ok(Self {
            queue_type: decoded.queue_type,
            entries: decoded.entries,
            variable_reset: None,
        })
    }
}

/// FIFO of sub-queues.
#[derive(Debug, Clone, Default)]
pub struct PendingQueues {
    queues: VecDeque<PendingQueue>,
}

impl PendingQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, queue: PendingQueue) {
        self.queues.push_back(queue);
    }

    pub fn pop(&mut self) -> Option<PendingQueue> {
        self.queues.pop_front()
    }

    pub fn front(&self) -> Option<&PendingQueue> {
        self.queues.front()
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingQueue> {
        self.queues.iter()
    }

    /// Drop empty sub-queues at the head of the chain.
    pub(crate) fn skip_empty(&mut self) {
        while self.queues.front().is_some_and(PendingQueue::is_empty) {
            debug!("Skipping empty pending queue");
            self.queues.pop_front();
        }
    }

    /// `COUNT(8)` then per sub-queue `LEN(8) QUEUE FLAG(1) [RESET]`, where
    /// `RESET := CHANNEL(4) KEYLEN(4) KEY VALUE(8) SECONDS(8)`.
    pub fn serialize(&self) -> Result<String> {
        let mut writer = HexWriter::default();
        writer.put(self.queues.len() as u64, 8, "pending queue count")?;
        for queue in &self.queues {
            let text = queue.serialize()?;
            writer.put(text.len() as u64, 8, "queue length")?;
            writer.put_str(&text);
            match &queue.variable_reset {
                None => writer.put(0, 1, "reset flag")?,
                Some(reset) => {
                    writer.put(1, 1, "reset flag")?;
                    writer.put(reset.channel as u64, 4, "reset channel")?;
                    writer.put(reset.key.len() as u64, 4, "reset key length")?;
                    writer.put_str(&reset.key);
                    writer.put(reset.value as u64, 8, "reset value")?;
                    writer.put(reset.reset_after.as_secs(), 8, "reset delay")?;
                }
            }
        }
        Ok(writer.finish())
    }

    /// Restore a chain; empty sub-queues are not restored.
    pub fn deserialize(text: &str, registry: &MessageRegistry) -> Result<Self> {
        let mut chain = Self::default();
        if text.is_empty() {
            return Ok(chain);
        }

        let mut reader = HexReader::new(text);
        let count = reader.take(8)?;
        for _ in 0..count {
            let len = reader.take(8)? as usize;
            let queue_text = reader.take_str(len)?;
            let mut queue = PendingQueue::deserialize(queue_text, registry)?;

            if reader.take(1)? != 0 {
                let channel = reader.take(4)? as u16;
                let key_len = reader.take(4)? as usize;
                let key = reader.take_str(key_len)?.to_string();
                let value = reader.take(8)?;
                let seconds = reader.take(8)?;
                queue.variable_reset = Some(VariableReset {
                    channel,
                    key,
                    value,
                    reset_after: Duration::from_secs(seconds as u64),
                });
            }

            if queue.is_empty() {
                continue;
            }
            chain.push(queue);
        }

        if !reader.is_at_end() {
            warn!(
                offset = reader.position(),
                "Trailing data after pending queue chain"
            );
        }
        Ok(chain)
    }
}

impl FromIterator<PendingQueue> for PendingQueues {
    fn from_iter<T: IntoIterator<Item = PendingQueue>>(iter: T) -> Self {
        Self {
            queues: iter.into_iter().collect(),
        }
    }
}

impl From<PendingQueue> for PendingQueues {
    fn from(queue: PendingQueue) -> Self {
        let mut chain = Self::default();
        chain.push(queue);
        chain
    }
}
