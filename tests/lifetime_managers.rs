//! Packet and queue managers: generation guard, expiry, keep-alive.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use bidcos_engine::manager::{PacketManager, QueueManager};
use bidcos_engine::queue::QueueType;
use common::{packet, request, TestDevice, ME, PEER, STRANGER};
use serial_test::serial;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_replaced_queue_survives_first_watcher() {
    let device = TestDevice::with_peer(PEER);
    let queues = QueueManager::new(device.context());

    let first = queues.create_queue(PEER, QueueType::Default).unwrap();
    let second = queues.create_queue(PEER, QueueType::Config).unwrap();
    assert_eq!(first.id(), 1);
    assert_eq!(second.id(), 2);
    assert!(first.is_disposed());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queues.active_watchers(), 1);

    // outlive the first record's TTL while keeping the second one busy
    for _ in 0..7 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(queues.keep_alive(PEER));
    }
    let survivor = queues.get(PEER).unwrap();
    assert_eq!(survivor.id(), 2);
    assert_eq!(queues.get_info(PEER).unwrap().id, 2);
    assert_eq!(queues.active_watchers(), 1);

    tokio::time::sleep(Duration::from_millis(1700)).await;
    assert!(queues.get(PEER).is_none());
    assert_eq!(queues.active_watchers(), 0);
    assert!(survivor.is_disposed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_expired_queue_with_entries_notifies_device() {
    let device = TestDevice::with_peer(PEER);
    let queues = QueueManager::new(device.context());

    let busy = queues.create_queue(PEER, QueueType::Config).unwrap();
    busy.push_packet(request(1));
    busy.push_packet(request(2));
    queues.create_queue(STRANGER, QueueType::Default).unwrap();

    tokio::time::sleep(Duration::from_millis(1800)).await;
    assert!(queues.is_empty());
    assert_eq!(*device.expired.lock().unwrap(), vec![(PEER, 2)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_long_keep_alive_extends_lifetime() {
    let device = TestDevice::with_peer(PEER);
    let queues = QueueManager::new(device.context());

    let queue = queues.create_queue(PEER, QueueType::Pairing).unwrap();
    queue.long_keep_alive();

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(queues.get(PEER).unwrap().id(), queue.id());
    queues.dispose();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_last_packet_expires() {
    let device = TestDevice::new();
    let packets = PacketManager::new(&device.context().timing, device.context().executor);

    let first = packet(0xA0, 0x10, PEER, ME, vec![0x06]);
    let second = packet(0xA0, 0x10, PEER, ME, vec![0x06, 0x01]);
    let first_id = packets.set(PEER, first).unwrap();
    let second_id = packets.set(PEER, second.clone()).unwrap();
    assert!(second_id > first_id);
    assert_eq!(packets.get(PEER).unwrap(), second);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(packets.keep_alive(PEER));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(packets.get(PEER).is_some(), "keep-alive refreshed the record");

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(packets.get(PEER).is_none());
    assert!(!packets.keep_alive(PEER));
    assert_eq!(packets.active_watchers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_disposed_managers_reject_records() {
    let device = TestDevice::with_peer(PEER);
    let queues = QueueManager::new(device.context());
    let packets = PacketManager::new(&device.context().timing, device.context().executor);

    let queue = queues.create_queue(PEER, QueueType::Default).unwrap();
    packets.set(PEER, packet(0x80, 0x02, PEER, ME, vec![0x00])).unwrap();

    queues.dispose();
    packets.dispose();
    assert!(queue.is_disposed());
    assert!(queues.create_queue(PEER, QueueType::Default).is_none());
    assert!(queues.get(PEER).is_none());
    assert!(packets.set(PEER, packet(0x80, 0x02, PEER, ME, vec![0x00])).is_none());
    assert!(packets.get(PEER).is_none());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queues.active_watchers(), 0);
    assert_eq!(packets.active_watchers(), 0);
}
