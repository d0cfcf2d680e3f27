//! # Message Layer
//!
//! Recognition, authorization and dispatch of BidCoS messages.
//!
//! A device describes every packet shape it understands as a
//! [`MessageDescriptor`](message::MessageDescriptor) and collects them in a
//! [`MessageRegistry`](registry::MessageRegistry). Incoming packets are
//! resolved to the most specific descriptor, checked against its access policy
//! and handed to the bound handler.
//!
//! ## Access policy
//! - `FULL`: always allowed
//! - `DEST_IS_ME`: destination must be the local device
//! - `UNPAIRING`: allowed while the sender's queue is an unpairing queue
//! - `PAIRED_TO_SENDER`: sender must be a known peer
//! - `CENTRAL`: sender must be the paired central
//!
//! An empty mask denies everything.

pub mod message;
pub mod registry;
