//! # Error Types
//!
//! Error handling for the BidCoS protocol engine.
//!
//! This module defines the error variants that can occur while decoding packets,
//! resolving message descriptors, authorizing incoming traffic and persisting queues.
//!
//! ## Error Categories
//! - **I/O Errors**: Transport stream failures
//! - **Bit-field Errors**: Out-of-range `get_position` / `set_position` requests
//! - **Dispatch Errors**: Unknown messages, access denials, handler mismatches
//! - **Persistence Errors**: Malformed or oversized queue serializations
//! - **Configuration Errors**: Invalid or unreadable configuration
//!
//! Hex packet parsing itself never fails; degraded fields are reported as
//! [`ParseWarning`](crate::core::packet::ParseWarning)s next to the packet.
//!
//! ## Example Usage
//! ```rust
//! use bidcos_engine::core::packet::Packet;
//! use bidcos_engine::error::{BidCoSError, Result};
//!
//! fn first_payload_byte(packet: &Packet) -> Result<i64> {
//!     packet.get_position(9.0, 1.0, false).map_err(BidCoSError::from)
//! }
//!
//! let packet = Packet::parse("0A01A0410102031A2B3C", false).value;
//! assert!(first_payload_byte(&packet).is_err());
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Lock-related error messages
    pub const ERR_REGISTRY_WRITE_LOCK: &str = "Failed to acquire write lock on message registry";
    pub const ERR_REGISTRY_READ_LOCK: &str = "Failed to acquire read lock on message registry";
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";

    /// Dispatch errors
    pub const ERR_DEVICE_DROPPED: &str = "Owning device has been dropped";

    /// Persistence errors
    pub const ERR_TRUNCATED_QUEUE: &str = "Serialized queue ended unexpectedly";
    pub const ERR_PACKET_TOO_LONG: &str = "Packet hex exceeds two-digit length field";
}

/// Errors raised by the bit-field accessors of a packet.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum PositionError {
    #[error("Packet index {0} is before the payload (minimum 9)")]
    IndexBeforePayload(f64),

    #[error("Payload position {byte} out of range (payload length {len})")]
    OutOfBounds { byte: usize, len: usize },

    #[error("Partial byte index requested with size {0} > 1")]
    PartialByteTooWide(f64),

    #[error("Signed partial byte index requested")]
    SignedPartialByte,

    #[error("Negative size {0} not allowed")]
    NegativeSize(f64),

    #[error("Field of {0} bytes does not fit into 64 bits")]
    TooWide(usize),

    #[error("Non-finite position or size {0}")]
    NonFinite(f64),
}

/// BidCoSError is the primary error type for all engine operations
#[derive(Error, Debug)]
pub enum BidCoSError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    #[error("Binary packet too short: {0} bytes (minimum 10)")]
    ShortPacket(usize),

    #[error("Persistence error at offset {offset}: {message}")]
    Persistence { offset: usize, message: String },

    #[error("Persistence encode error: {0}")]
    PersistenceEncode(String),

    #[error("No message descriptor matches packet type 0x{0:02X}")]
    UnknownMessage(u8),

    #[error("Access denied for packet from {0}")]
    AccessDenied(String),

    #[error("Owning device has been dropped")]
    DeviceDropped,

    #[error("Outgoing message requires the triggering request packet")]
    MissingRequestPacket,

    #[error("Handler kind does not match message direction")]
    HandlerMismatch,

    #[error("Engine component has been disposed")]
    Disposed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl BidCoSError {
    /// Create a persistence decode error at a specific offset.
    pub fn persistence_at(offset: usize, message: impl Into<String>) -> Self {
        BidCoSError::Persistence {
            offset,
            message: message.into(),
        }
    }
}

/// Type alias for Results using BidCoSError
pub type Result<T> = std::result::Result<T, BidCoSError>;
