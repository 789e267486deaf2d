/// Variable-size free-list allocator over an abstract 1-D index space
///
/// Free ranges are indexed twice: by offset (to coalesce neighbors on free)
/// and by `(size, offset)` (to find the best fitting block). Allocation picks
/// the smallest free block that can hold the aligned request, lowest offset
/// first among equal sizes. The padding needed to align the start stays
/// inside the allocated block, so `used_size() + free space == max_size()`
/// holds at all times.
///
/// The allocator never grows by itself: `allocate` returning `None` tells the
/// caller to `extend` and retry.

use std::collections::{BTreeMap, BTreeSet};
use crate::utils::{align_up, is_power_of_two, round_up_to_multiple};
use crate::engine_error;

const LOG_SOURCE: &str = "galaxy3d::RangeAllocator";

/// One range carved out by [`RangeAllocator::allocate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeAllocation {
    /// Aligned start of the usable range
    pub offset: u64,
    /// Requested size
    pub size: u64,
    /// Start of the block taken from the free list (before alignment)
    pub unaligned_offset: u64,
    /// Size of the block taken from the free list (padding included)
    pub block_size: u64,
}

impl RangeAllocation {
    /// End of the usable range
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Bytes skipped in front of `offset` to satisfy the alignment
    pub fn padding(&self) -> u64 {
        self.offset - self.unaligned_offset
    }
}

/// Best-fit range allocator
#[derive(Debug, Clone, Default)]
pub struct RangeAllocator {
    max_size: u64,
    used_size: u64,
    allocation_count: usize,
    /// offset -> size
    free_by_offset: BTreeMap<u64, u64>,
    /// (size, offset)
    free_by_size: BTreeSet<(u64, u64)>,
}

impl RangeAllocator {
    /// Create an allocator managing `[0, max_size)`, entirely free
    pub fn new(max_size: u64) -> Self {
        let mut allocator = Self {
            max_size,
            ..Default::default()
        };
        if max_size > 0 {
            allocator.insert_free(0, max_size);
        }
        allocator
    }

    fn insert_free(&mut self, offset: u64, size: u64) {
        self.free_by_offset.insert(offset, size);
        self.free_by_size.insert((size, offset));
    }

    fn remove_free(&mut self, offset: u64, size: u64) {
        self.free_by_offset.remove(&offset);
        self.free_by_size.remove(&(size, offset));
    }

    /// Carve `size` units aligned to `alignment` (power of two)
    ///
    /// Returns `None` if no free block is large enough.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> Option<RangeAllocation> {
        debug_assert!(size > 0, "allocation size must not be zero");
        debug_assert!(is_power_of_two(alignment), "alignment {} is not a power of two", alignment);
        if size == 0 || !is_power_of_two(alignment) {
            return None;
        }

        let (block_offset, block_len, aligned) = self
            .free_by_size
            .range((size, 0)..)
            .find_map(|&(len, offset)| {
                let aligned = align_up(offset, alignment);
                (aligned + size <= offset + len).then_some((offset, len, aligned))
            })?;

        self.remove_free(block_offset, block_len);
        let taken = aligned + size - block_offset;
        if block_len > taken {
            self.insert_free(block_offset + taken, block_len - taken);
        }

        self.used_size += taken;
        self.allocation_count += 1;
        Some(RangeAllocation {
            offset: aligned,
            size,
            unaligned_offset: block_offset,
            block_size: taken,
        })
    }

    /// Return a range obtained from `allocate`, coalescing with free neighbors
    ///
    /// A range that is outside the allocator or already (partly) free is
    /// rejected with an error log and `false`; nothing changes.
    pub fn free(&mut self, allocation: &RangeAllocation) -> bool {
        let mut offset = allocation.unaligned_offset;
        let mut size = allocation.block_size;
        let outside = offset.checked_add(size).map_or(true, |end| end > self.max_size);
        if size == 0 || outside || size > self.used_size || self.overlaps_free(offset, size) {
            engine_error!(LOG_SOURCE,
                "Rejected free of range {}..+{}: not allocated from this allocator",
                offset, size);
            return false;
        }

        self.used_size -= size;
        self.allocation_count -= 1;

        let previous = self
            .free_by_offset
            .range(..offset)
            .next_back()
            .map(|(&prev_offset, &prev_size)| (prev_offset, prev_size));
        if let Some((prev_offset, prev_size)) = previous {
            if prev_offset + prev_size == offset {
                self.remove_free(prev_offset, prev_size);
                offset = prev_offset;
                size += prev_size;
            }
        }

        let next = self.free_by_offset.get(&(offset + size)).copied();
        if let Some(next_size) = next {
            self.remove_free(offset + size, next_size);
            size += next_size;
        }

        self.insert_free(offset, size);
        true
    }

    fn overlaps_free(&self, offset: u64, size: u64) -> bool {
        let end = offset + size;
        self.free_by_offset
            .range(..end)
            .next_back()
            .is_some_and(|(&free_offset, &free_size)| free_offset + free_size > offset)
    }

    /// Append `extra_size` free units at the end of the index space
    ///
    /// Existing ranges keep their offsets.
    pub fn extend(&mut self, extra_size: u64) {
        if extra_size == 0 {
            return;
        }
        let old_max = self.max_size;
        self.max_size += extra_size;

        let trailing = self
            .free_by_offset
            .iter()
            .next_back()
            .map(|(&offset, &size)| (offset, size))
            .filter(|(offset, size)| offset + size == old_max);
        match trailing {
            Some((offset, size)) => {
                self.remove_free(offset, size);
                self.insert_free(offset, size + extra_size);
            }
            None => self.insert_free(old_max, extra_size),
        }
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Units held by live allocations, alignment padding included
    pub fn used_size(&self) -> u64 {
        self.used_size
    }

    pub fn free_size(&self) -> u64 {
        self.max_size - self.used_size
    }

    /// Size of the largest free block
    pub fn max_free_block_size(&self) -> u64 {
        self.free_by_size.iter().next_back().map_or(0, |&(size, _)| size)
    }

    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    pub fn free_block_count(&self) -> usize {
        self.free_by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used_size == 0
    }

    pub fn is_full(&self) -> bool {
        self.used_size == self.max_size
    }

    /// Free blocks as `(offset, size)` in address order
    pub fn free_blocks(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.free_by_offset.iter().map(|(&offset, &size)| (offset, size))
    }

    /// Structural self-check
    ///
    /// Free blocks must be sorted, non-empty, non-overlapping and
    /// non-adjacent, both indices must agree, and free + used must cover
    /// exactly `max_size`.
    pub fn validate(&self) -> bool {
        if self.free_by_offset.len() != self.free_by_size.len() {
            return false;
        }
        let mut free_total = 0;
        let mut previous_end: Option<u64> = None;
        for (&offset, &size) in &self.free_by_offset {
            if size == 0 || !self.free_by_size.contains(&(size, offset)) {
                return false;
            }
            if previous_end.is_some_and(|end| end >= offset) {
                return false;
            }
            previous_end = Some(offset + size);
            free_total += size;
        }
        previous_end.map_or(true, |end| end <= self.max_size)
            && free_total + self.used_size == self.max_size
    }
}

/// Size a range should grow to so that `request` more units can fit
///
/// With a non-zero `increment` the growth is `request` rounded up to a
/// multiple of it, otherwise the current size doubles (at least `request`).
/// The result is clamped to `ceiling` (0 = unbounded); `None` means the
/// ceiling is already reached.
pub(crate) fn growth_target(current: u64, request: u64, increment: u64, ceiling: u64) -> Option<u64> {
    if ceiling != 0 && current >= ceiling {
        return None;
    }
    let extra = if increment != 0 {
        round_up_to_multiple(request, increment)
    } else {
        current.max(request)
    };
    let target = current + extra;
    Some(if ceiling != 0 { target.min(ceiling) } else { target })
}

#[cfg(test)]
#[path = "range_allocator_tests.rs"]
mod tests;
