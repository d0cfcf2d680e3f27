//! Access decisions over every policy bit, pairing mode and peer knowledge.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use bidcos_engine::core::address::Address;
use bidcos_engine::protocol::message::Access;
use bidcos_engine::queue::QueueType;
use common::{packet, TestDevice, CENTRAL, ME, PEER, STRANGER};
use std::sync::Arc;

struct Case {
    access: Access,
    pairing: bool,
    peer_known: bool,
    sender: Address,
    destination: Address,
    expected: bool,
}

const OTHER: Address = Address::new(0x454545);

fn cases() -> Vec<Case> {
    let mut cases = Vec::new();
    for pairing in [false, true] {
        for peer_known in [false, true] {
            let sender = PEER;
            // FULL wins regardless of peer, destination or sender
            cases.push(Case {
                access: Access::FULL,
                pairing,
                peer_known,
                sender,
                destination: OTHER,
                expected: true,
            });
            cases.push(Case {
                access: Access::DEST_IS_ME,
                pairing,
                peer_known,
                sender,
                destination: ME,
                expected: true,
            });
            cases.push(Case {
                access: Access::DEST_IS_ME,
                pairing,
                peer_known,
                sender,
                destination: OTHER,
                expected: false,
            });
            // no unpairing queue: falls through to the paired check
            cases.push(Case {
                access: Access::UNPAIRING | Access::PAIRED_TO_SENDER,
                pairing,
                peer_known,
                sender,
                destination: ME,
                expected: peer_known,
            });
            cases.push(Case {
                access: Access::PAIRED_TO_SENDER,
                pairing,
                peer_known,
                sender,
                destination: ME,
                expected: peer_known,
            });
            cases.push(Case {
                access: Access::CENTRAL,
                pairing,
                peer_known,
                sender: CENTRAL,
                destination: ME,
                expected: true,
            });
            cases.push(Case {
                access: Access::CENTRAL,
                pairing,
                peer_known,
                sender,
                destination: ME,
                expected: false,
            });
            // destination is checked before the peer
            cases.push(Case {
                access: Access::DEST_IS_ME | Access::PAIRED_TO_SENDER,
                pairing,
                peer_known,
                sender,
                destination: OTHER,
                expected: false,
            });
            cases.push(Case {
                access: Access::NONE,
                pairing,
                peer_known,
                sender,
                destination: ME,
                expected: false,
            });
            cases.push(Case {
                access: Access::FULL | Access::CENTRAL,
                pairing,
                peer_known,
                sender: STRANGER,
                destination: OTHER,
                expected: true,
            });
        }
    }
    cases
}

#[test]
fn test_access_table_without_queue() {
    for (index, case) in cases().into_iter().enumerate() {
        let device = if case.peer_known {
            TestDevice::with_peer(case.sender)
        } else {
            TestDevice::new()
        };
        device.set_pairing(case.pairing);
        let descriptor = device.incoming(0x10, case.access);
        let received = packet(0xA0, 0x10, case.sender, case.destination, vec![0x06, 0x01]);

        assert_eq!(
            descriptor.check_access(&received, None),
            case.expected,
            "case {index}: access {:#04x}, pairing {}, peer known {}",
            case.access.bits(),
            case.pairing,
            case.peer_known
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pairing_access_only_applies_while_pairing() {
    let device = TestDevice::new();
    let descriptor = bidcos_engine::protocol::message::MessageDescriptor::incoming_with_pairing(
        0x00,
        device.weak(),
        Access::NONE,
        Access::DEST_IS_ME,
        |_: u8, _: &Arc<bidcos_engine::core::packet::Packet>| {},
    );
    let pairing_request = packet(0x84, 0x00, STRANGER, ME, vec![0x00, 0x12, 0x34]);

    assert!(!descriptor.check_access(&pairing_request, None));
    device.set_pairing(true);
    assert!(descriptor.check_access(&pairing_request, None));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unpairing_queue_and_transient_peer() {
    let device = TestDevice::new();
    let descriptor = device.incoming(0x02, Access::UNPAIRING | Access::PAIRED_TO_SENDER);
    let ack = packet(0x80, 0x02, PEER, ME, vec![0x00]);

    let default_queue = device.queue(QueueType::Default);
    assert!(!descriptor.check_access(&ack, Some(&default_queue)));

    let unpairing_queue = device.queue(QueueType::Unpairing);
    assert!(descriptor.check_access(&ack, Some(&unpairing_queue)));

    // a pairing queue whose peer is the sender authorizes while pairing
    device.set_pairing(true);
    let pairing_queue = device.queue(QueueType::Pairing);
    pairing_queue.set_peer(Some(Arc::new(bidcos_engine::device::Peer::new(PEER, "TST0000001"))));
    assert!(descriptor.check_access(&ack, Some(&pairing_queue)));

    // the transient peer must be the sender
    let from_stranger = packet(0x80, 0x02, STRANGER, ME, vec![0x00]);
    assert!(!descriptor.check_access(&from_stranger, Some(&pairing_queue)));
}
