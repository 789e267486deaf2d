/// Slice lifecycle of the texture atlas
///
/// A `SliceBatch` groups the active slices of one alignment, each one owning
/// a `SpaceAllocator` behind its own mutex. Threads pin a slice with a
/// `SliceGuard` before touching its allocator:
///
/// - the use count is incremented while the batch mutex is held, so a slice
///   found by a lookup cannot be purged before it is pinned
/// - slice-local allocate/free then runs without the batch mutex, so
///   different slices are mutated in parallel
/// - `purge` removes a slice only when nobody pins it and its allocator is
///   empty, both checked under the batch mutex
///
/// Slices go Unused -> Active (`add_slice`) -> Unused (`purge`).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use crate::allocator::{SpaceAllocator, SpaceRegion};

/// One active slice: its space allocator and the number of threads pinning it
pub struct SliceManager {
    allocator: Mutex<SpaceAllocator>,
    use_count: AtomicI32,
}

impl SliceManager {
    fn new(width: u32, height: u32) -> Self {
        Self {
            allocator: Mutex::new(SpaceAllocator::new(width, height)),
            use_count: AtomicI32::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SpaceAllocator> {
        self.allocator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn use_count(&self) -> i32 {
        self.use_count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Pins one slice against purge until dropped
pub struct SliceGuard {
    slice: u32,
    manager: Arc<SliceManager>,
}

impl SliceGuard {
    fn new(slice: u32, manager: Arc<SliceManager>) -> Self {
        manager.use_count.fetch_add(1, Ordering::AcqRel);
        Self { slice, manager }
    }

    pub fn slice(&self) -> u32 {
        self.slice
    }

    /// Place a `width` x `height` cell region in this slice
    pub fn allocate(&self, width: u32, height: u32) -> Option<SpaceRegion> {
        self.manager.lock().allocate(width, height)
    }

    pub fn free(&self, region: SpaceRegion) {
        self.manager.lock().free(region);
    }

    pub fn is_empty(&self) -> bool {
        self.manager.is_empty()
    }

    /// Self-check of the slice allocator
    pub fn validate(&self) -> bool {
        self.manager.lock().validate()
    }
}

impl Drop for SliceGuard {
    fn drop(&mut self) {
        let previous = self.manager.use_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "use count of slice {} dropped below zero", self.slice);
    }
}

/// Active slices of one alignment, ordered by slice index
pub struct SliceBatch {
    /// Slice size in cells
    width: u32,
    height: u32,
    slices: Mutex<BTreeMap<u32, Arc<SliceManager>>>,
}

impl SliceBatch {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            slices: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u32, Arc<SliceManager>>> {
        self.slices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pin active slice `slice`
    pub fn lock_slice(&self, slice: u32) -> Option<SliceGuard> {
        let slices = self.lock();
        slices
            .get(&slice)
            .map(|manager| SliceGuard::new(slice, Arc::clone(manager)))
    }

    /// Pin the first active slice with an index of at least `slice`
    pub fn lock_slice_after(&self, slice: u32) -> Option<SliceGuard> {
        let slices = self.lock();
        slices
            .range(slice..)
            .next()
            .map(|(&index, manager)| SliceGuard::new(index, Arc::clone(manager)))
    }

    /// Activate `slice` with an empty space allocator and pin it
    ///
    /// The slice index must come from the owner's pool of unused slices.
    pub fn add_slice(&self, slice: u32) -> SliceGuard {
        let mut slices = self.lock();
        debug_assert!(!slices.contains_key(&slice), "slice {} is already active", slice);
        let manager = slices
            .entry(slice)
            .or_insert_with(|| Arc::new(SliceManager::new(self.width, self.height)));
        SliceGuard::new(slice, Arc::clone(manager))
    }

    /// Deactivate `slice` if it is unpinned and empty
    ///
    /// Returns true when the slice was removed and its index may be reused.
    pub fn purge(&self, slice: u32) -> bool {
        let mut slices = self.lock();
        let Some(manager) = slices.get(&slice) else {
            return false;
        };
        // Pins are only taken under the batch mutex, so zero stays zero here
        if manager.use_count() != 0 || !manager.is_empty() {
            return false;
        }
        slices.remove(&slice);
        true
    }

    /// Number of active slices
    pub fn slice_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Indices of the active slices
    pub fn active_slices(&self) -> Vec<u32> {
        self.lock().keys().copied().collect()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

#[cfg(test)]
#[path = "slice_manager_tests.rs"]
mod tests;
