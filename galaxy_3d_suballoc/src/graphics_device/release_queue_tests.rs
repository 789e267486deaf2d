//! Unit tests for release_queue.rs

use std::sync::Arc;
use crate::graphics_device::mock_graphics_device::MockBuffer;
use crate::graphics_device::{Buffer, DeviceResource, QueueMask, ReleaseQueue};

fn buffer(size: u64) -> (DeviceResource, Arc<dyn Buffer>) {
    let buffer: Arc<dyn Buffer> = Arc::new(MockBuffer::new(size, format!("buffer_{}", size)));
    (DeviceResource::Buffer(buffer.clone()), buffer)
}

#[test]
fn test_resource_survives_until_fence_completes() {
    let mut queue = ReleaseQueue::new();
    let (resource, observer) = buffer(64);
    queue.defer(resource, QueueMask::GRAPHICS, 5);

    // Only the queue's copy and ours are alive
    assert_eq!(Arc::strong_count(&observer), 2);

    queue.signal_completed(QueueMask::GRAPHICS, 4);
    assert_eq!(queue.purge(), 0);
    assert_eq!(Arc::strong_count(&observer), 2);

    queue.signal_completed(QueueMask::GRAPHICS, 5);
    assert_eq!(queue.purge(), 1);
    assert_eq!(Arc::strong_count(&observer), 1);
    assert!(queue.is_empty());
}

#[test]
fn test_every_queue_in_mask_must_retire() {
    let mut queue = ReleaseQueue::new();
    let (resource, _observer) = buffer(16);
    queue.defer(resource, QueueMask::GRAPHICS | QueueMask::TRANSFER, 3);

    queue.signal_completed(QueueMask::GRAPHICS, 10);
    assert_eq!(queue.retired_count(), 0);
    assert_eq!(queue.purge(), 0);

    queue.signal_completed(QueueMask::TRANSFER, 3);
    assert_eq!(queue.retired_count(), 1);
    assert_eq!(queue.purge(), 1);
}

#[test]
fn test_completed_value_never_moves_backwards() {
    let mut queue = ReleaseQueue::new();
    queue.signal_completed(QueueMask::COMPUTE, 8);
    queue.signal_completed(QueueMask::COMPUTE, 2);

    let (resource, _observer) = buffer(16);
    queue.defer(resource, QueueMask::COMPUTE, 7);
    assert_eq!(queue.purge(), 1);
}

#[test]
fn test_out_of_order_entries_are_released_independently() {
    let mut queue = ReleaseQueue::new();
    let (late, _a) = buffer(32);
    let (early, _b) = buffer(128);
    queue.defer(late, QueueMask::GRAPHICS, 9);
    queue.defer(early, QueueMask::GRAPHICS, 2);
    assert_eq!(queue.pending_bytes(), 160);

    queue.signal_completed(QueueMask::GRAPHICS, 2);
    assert_eq!(queue.purge(), 1);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.pending_bytes(), 32);
}

#[test]
fn test_release_all() {
    let mut queue = ReleaseQueue::default();
    let (a, _) = buffer(8);
    let (b, _) = buffer(8);
    queue.defer(a, QueueMask::all(), 100);
    queue.defer(b, QueueMask::all(), 200);
    assert_eq!(queue.release_all(), 2);
    assert!(queue.is_empty());
}
