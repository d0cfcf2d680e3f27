//! # bidcos-engine
//!
//! Protocol engine for BidCoS, the radio protocol spoken by HomeMatic devices.
//!
//! The crate turns ASCII-hex lines from a radio stick into packets, matches
//! them against registered message descriptors, authorizes them against the
//! pairing state of the local device and hands them to device handlers. In
//! the other direction it keeps one send queue per peer, resends unanswered
//! packets and works through chains of sub-queues for multi-step exchanges
//! such as pairing or configuration writes.
//!
//! ## Layout
//! - [`core`]: packet model, hex wire format, line codec
//! - [`protocol`]: message descriptors, access control, registry
//! - [`queue`]: send queues, pending chains, persistence format
//! - [`manager`]: per-address lifetime managers for packets and queues
//! - [`engine`]: the context object wiring everything to one device
//! - [`device`]: what a device must provide to the engine
//! - [`runtime`]: bounded dispatch executor and cancellable timers
//! - [`config`], [`error`], [`utils`]: ambient plumbing
//!
//! ## Quick Start
//! ```rust
//! use bidcos_engine::core::address::Address;
//! use bidcos_engine::core::packet::Packet;
//!
//! let parsed = Packet::parse("A0B1AA0011D8A4C200A1B0105", true);
//! assert!(parsed.is_clean());
//! let packet = parsed.value;
//! assert_eq!(packet.sender(), Address::new(0x1D8A4C));
//! assert_eq!(packet.payload(), &[0x01, 0x05]);
//! assert_eq!(packet.serialize(), "0B1AA0011D8A4C200A1B0105");
//! ```

pub mod config;
pub mod core;
pub mod device;
pub mod engine;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod queue;
pub mod runtime;
pub mod utils;

pub use crate::core::address::Address;
pub use crate::core::packet::Packet;
pub use crate::engine::BidCoSEngine;
pub use crate::error::{BidCoSError, Result};
