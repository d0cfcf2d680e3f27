//! Property-based tests using proptest
//!
//! Packet hex encoding, queue persistence and the tolerant line parser are
//! checked against randomly generated inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bidcos_engine::core::address::Address;
use bidcos_engine::core::packet::{Packet, MAX_PAYLOAD_LEN};
use bidcos_engine::protocol::registry::MessageRegistry;
use bidcos_engine::queue::{QueueEntry, QueueFormat, QueueType};
use proptest::prelude::*;
use std::sync::Arc;

fn arb_packet(max_payload: usize) -> impl Strategy<Value = Packet> {
    (
        any::<u8>(),
        any::<u8>(),
        any::<u8>(),
        0u32..=0xFF_FFFF,
        0u32..=0xFF_FFFF,
        prop::collection::vec(any::<u8>(), 0..=max_payload),
    )
        .prop_map(|(counter, control, message_type, sender, destination, payload)| {
            Packet::new(
                counter,
                control,
                message_type,
                Address::new(sender),
                Address::new(destination),
                payload,
            )
        })
}

fn arb_queue_type() -> impl Strategy<Value = QueueType> {
    (0u8..=5).prop_map(|raw| QueueType::from_u8(raw).unwrap())
}

// Property: Any packet survives a hex round trip without warnings
proptest! {
    #[test]
    fn prop_packet_hex_roundtrip(packet in arb_packet(MAX_PAYLOAD_LEN)) {
        let hex = packet.serialize();
        prop_assert_eq!(hex.len(), 20 + packet.payload().len() * 2);

        let parsed = Packet::parse(&hex, false);
        prop_assert!(parsed.is_clean(), "warnings: {:?}", parsed.warnings);
        prop_assert_eq!(parsed.value, packet);
    }
}

// Property: The frame marker is skipped regardless of which character it is
proptest! {
    #[test]
    fn prop_frame_marker_is_skipped(packet in arb_packet(32), marker in any::<char>()) {
        let line = format!("{marker}{}\r\n", packet.serialize());
        let parsed = Packet::parse(&line, true);
        prop_assert!(parsed.is_clean());
        prop_assert_eq!(parsed.value, packet);
    }
}

// Property: Two trailing digits become the RSSI
proptest! {
    #[test]
    fn prop_trailing_byte_is_rssi(packet in arb_packet(32), rssi in any::<u8>()) {
        let line = format!("{}{rssi:02X}", packet.serialize());
        let parsed = Packet::parse(&line, false);
        prop_assert_eq!(parsed.value.rssi(), Some(rssi));
        prop_assert_eq!(parsed.value.payload(), packet.payload());
    }
}

// Property: Hex and binary encodings describe the same packet
proptest! {
    #[test]
    fn prop_binary_matches_hex(packet in arb_packet(64)) {
        let bytes = packet.to_bytes();
        prop_assert_eq!(bytes[0], packet.length());
        let decoded = Packet::from_bytes(&bytes, false).unwrap();
        prop_assert_eq!(decoded.serialize(), packet.serialize());
    }
}

// Property: Parsing never panics on arbitrary input
proptest! {
    #[test]
    fn prop_parse_never_panics(text in ".{0,80}", skip in any::<bool>()) {
        let parsed = Packet::parse(&text, skip);
        // whatever came out can still be written back
        let _ = parsed.value.serialize();
    }
}

// Property: Lines made of hex digits of any length parse without panicking
proptest! {
    #[test]
    fn prop_hex_garbage_is_degraded(text in "[0-9A-F]{0,64}") {
        let parsed = Packet::parse(&text, false);
        prop_assert!(parsed.value.payload().len() <= MAX_PAYLOAD_LEN);
        if text.len() < 20 {
            prop_assert!(!parsed.is_clean());
        }
    }
}

// Property: Persisted packet queues decode to the same packets
proptest! {
    #[test]
    fn prop_queue_format_roundtrip(
        queue_type in arb_queue_type(),
        packets in prop::collection::vec(arb_packet(100), 0..12),
    ) {
        let entries: Vec<QueueEntry> = packets
            .iter()
            .cloned()
            .map(|packet| QueueEntry::Packet(Arc::new(packet)))
            .collect();
        let text = QueueFormat::CURRENT.encode(queue_type, entries.iter()).unwrap();

        let decoded = QueueFormat::CURRENT.decode(&text, &MessageRegistry::new()).unwrap();
        prop_assert_eq!(decoded.queue_type, queue_type);
        prop_assert_eq!(decoded.dropped, 0);
        let restored: Vec<Packet> = decoded
            .entries
            .iter()
            .map(|entry| entry.packet().unwrap().as_ref().clone())
            .collect();
        prop_assert_eq!(restored, packets);
    }
}

// Property: Decoding arbitrary text reports errors instead of panicking
proptest! {
    #[test]
    fn prop_queue_decode_never_panics(text in "[0-9A-F]{0,120}|.{0,40}") {
        let _ = QueueFormat::CURRENT.decode(&text, &MessageRegistry::new());
    }
}
