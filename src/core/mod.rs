//! # Core Protocol Components
//!
//! Packet model, hex wire format and stream framing.
//!
//! This module provides the foundation of the engine: the BidCoS packet, its
//! ASCII-hex encoding as exchanged with the radio stick, and bit-level field
//! access used by description-driven decoding.
//!
//! ## Components
//! - **Address**: 24-bit radio address
//! - **Packet**: Header fields plus payload, hex/binary conversion, bit fields
//! - **Codec**: Tokio codec for line framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [Prefix(0|1)] LEN(2) CTR(2) CTRL(2) TYPE(2) SRC(6) DST(6) PAYLOAD(2*n) [RSSI(2)] [\r\n]
//! ```

pub mod address;
pub mod codec;
pub mod packet;
