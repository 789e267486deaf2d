/// Fence-keyed deferred release queue
///
/// Backends stamp every released resource with the value the device fence will
/// reach once all work submitted so far completes, and drop the resource only
/// after each queue in its mask has signalled at least that value.

use std::collections::VecDeque;
use crate::graphics_device::{DeviceResource, QueueMask};

const QUEUE_COUNT: usize = 3;

struct PendingRelease {
    fence_value: u64,
    queue_mask: QueueMask,
    resource: DeviceResource,
}

/// Deferred-destruction queue (epoch based reclamation by fence value)
pub struct ReleaseQueue {
    pending: VecDeque<PendingRelease>,
    completed: [u64; QUEUE_COUNT],
}

fn queue_indices(mask: QueueMask) -> impl Iterator<Item = usize> {
    [QueueMask::GRAPHICS, QueueMask::COMPUTE, QueueMask::TRANSFER]
        .into_iter()
        .enumerate()
        .filter(move |(_, queue)| mask.contains(*queue))
        .map(|(index, _)| index)
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            completed: [0; QUEUE_COUNT],
        }
    }

    /// Queue `resource` for release after `fence_value` completes on every queue of `queue_mask`
    pub fn defer(&mut self, resource: DeviceResource, queue_mask: QueueMask, fence_value: u64) {
        self.pending.push_back(PendingRelease {
            fence_value,
            queue_mask,
            resource,
        });
    }

    /// Record the completed fence value of the given queues
    ///
    /// Completed values never move backwards.
    pub fn signal_completed(&mut self, queues: QueueMask, fence_value: u64) {
        for index in queue_indices(queues) {
            self.completed[index] = self.completed[index].max(fence_value);
        }
    }

    fn is_retired(&self, entry: &PendingRelease) -> bool {
        queue_indices(entry.queue_mask).all(|index| self.completed[index] >= entry.fence_value)
    }

    /// Drop every resource whose fence has retired; returns how many were released
    pub fn purge(&mut self) -> usize {
        let before = self.pending.len();
        let completed = self.completed;
        self.pending.retain(|entry| {
            !queue_indices(entry.queue_mask).all(|index| completed[index] >= entry.fence_value)
        });
        before - self.pending.len()
    }

    /// Drop everything regardless of fences (device idle)
    pub fn release_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// Number of resources still waiting
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total bytes held by resources still waiting
    pub fn pending_bytes(&self) -> u64 {
        self.pending.iter().map(|entry| entry.resource.size_bytes()).sum()
    }

    /// Number of entries the next `purge()` would release
    pub fn retired_count(&self) -> usize {
        self.pending.iter().filter(|entry| self.is_retired(entry)).count()
    }
}

impl Default for ReleaseQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "release_queue_tests.rs"]
mod tests;
