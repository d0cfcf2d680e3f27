//! # Send Queues
//!
//! Per-peer outbound pipelines. A [`SendQueue`] holds the live entries of a
//! peer plus a chain of [`PendingQueue`]s that are spliced in once the live
//! entries have drained. Queues persist to a dense hex text through
//! [`QueueFormat`].

pub mod entry;
pub mod format;
pub mod pending;
pub mod send_queue;

pub use entry::{EntryTag, QueueEntry, QueueType};
pub use format::{DecodedQueue, QueueFormat};
pub use pending::{PendingQueue, PendingQueues, VariableReset};
pub use send_queue::{QueueContext, SendQueue};
