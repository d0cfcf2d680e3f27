//! # Lifetime Managers
//!
//! One record per peer address, dropped after it has been idle for its TTL.
//! [`PacketManager`] keeps the last packet received from each peer,
//! [`QueueManager`] owns each peer's [`SendQueue`](crate::queue::SendQueue).

pub mod keyed;
pub mod packet_manager;
pub mod queue_manager;

pub use keyed::{KeyedLifetimeManager, LifetimeSettings, RecordInfo, TouchStamp};
pub use packet_manager::PacketManager;
pub use queue_manager::QueueManager;
