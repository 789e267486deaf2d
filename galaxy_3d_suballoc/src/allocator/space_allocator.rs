/// 2-D shelf allocator for rectangular regions of a fixed-size plane
///
/// The plane is cut into horizontal shelves. Shelf rows are carved from a
/// `RangeAllocator` over the plane height, and each shelf owns a second
/// `RangeAllocator` over the plane width for the regions placed on it. A
/// shelf is returned to the row allocator as soon as its last region is
/// freed, so an empty allocator is a single free row range again.
///
/// Units are abstract cells: the texture atlas works in alignment-sized cells.

use crate::allocator::{RangeAllocation, RangeAllocator};
use crate::utils::{BlockAllocatorConfig, BlockHandle, FixedBlockAllocator};

/// Rectangle placed by [`SpaceAllocator::allocate`]
#[derive(Debug, PartialEq, Eq)]
pub struct SpaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    shelf: BlockHandle,
    columns: RangeAllocation,
}

impl SpaceRegion {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

struct Shelf {
    y: u32,
    height: u32,
    rows: RangeAllocation,
    columns: RangeAllocator,
}

pub struct SpaceAllocator {
    width: u32,
    height: u32,
    rows: RangeAllocator,
    shelves: FixedBlockAllocator<Shelf>,
    /// Live shelves sorted by (height, y)
    shelf_order: Vec<BlockHandle>,
    region_count: usize,
    used_area: u64,
}

impl SpaceAllocator {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rows: RangeAllocator::new(height as u64),
            shelves: FixedBlockAllocator::new(BlockAllocatorConfig { blocks_per_page: 16 }),
            shelf_order: Vec::new(),
            region_count: 0,
            used_area: 0,
        }
    }

    fn place_on_shelf(&mut self, handle: BlockHandle, width: u32, height: u32) -> Option<SpaceRegion> {
        let shelf = self.shelves.get_mut(handle)?;
        if shelf.height < height {
            return None;
        }
        let columns = shelf.columns.allocate(width as u64, 1)?;
        let region = SpaceRegion {
            x: columns.offset as u32,
            y: shelf.y,
            width,
            height,
            shelf: handle,
            columns,
        };
        self.region_count += 1;
        self.used_area += region.area();
        Some(region)
    }

    fn add_shelf(&mut self, height: u32) -> Option<BlockHandle> {
        let rows = self.rows.allocate(height as u64, 1)?;
        let shelf = Shelf {
            y: rows.offset as u32,
            height,
            rows,
            columns: RangeAllocator::new(self.width as u64),
        };
        let key = (shelf.height, shelf.y);
        let handle = self.shelves.insert(shelf);
        let shelves = &self.shelves;
        let position = self.shelf_order.partition_point(|existing| {
            shelves.get(*existing).is_some_and(|s| (s.height, s.y) < key)
        });
        self.shelf_order.insert(position, handle);
        Some(handle)
    }

    /// Place a `width` x `height` region
    ///
    /// Shelves up to twice the requested height are tried first, then a new
    /// shelf of exactly `height`, and finally any taller shelf.
    pub fn allocate(&mut self, width: u32, height: u32) -> Option<SpaceRegion> {
        debug_assert!(width > 0 && height > 0, "region size must not be zero");
        if width == 0 || height == 0 || width > self.width || height > self.height {
            return None;
        }

        // Shelves shorter than twice the request first
        if let Some(region) = self.place_on_existing(width, height, true) {
            return Some(region);
        }
        if let Some(handle) = self.add_shelf(height) {
            if let Some(region) = self.place_on_shelf(handle, width, height) {
                return Some(region);
            }
        }
        self.place_on_existing(width, height, false)
    }

    /// Try the live shelves in order, keeping those whose snugness matches `snug`
    fn place_on_existing(&mut self, width: u32, height: u32, snug: bool) -> Option<SpaceRegion> {
        for index in 0..self.shelf_order.len() {
            let handle = self.shelf_order[index];
            let is_snug = self
                .shelves
                .get(handle)
                .is_some_and(|shelf| (shelf.height as u64) < height as u64 * 2);
            if is_snug != snug {
                continue;
            }
            if let Some(region) = self.place_on_shelf(handle, width, height) {
                return Some(region);
            }
        }
        None
    }

    /// Return a region; an emptied shelf gives its rows back
    pub fn free(&mut self, region: SpaceRegion) {
        let Some(shelf) = self.shelves.get_mut(region.shelf) else {
            debug_assert!(false, "region {}x{} at ({}, {}) does not belong to this allocator",
                region.width, region.height, region.x, region.y);
            return;
        };
        if !shelf.columns.free(&region.columns) {
            return;
        }
        let shelf_empty = shelf.columns.is_empty();

        self.region_count -= 1;
        self.used_area -= region.area();

        if shelf_empty {
            if let Some(shelf) = self.shelves.remove(region.shelf) {
                self.rows.free(&shelf.rows);
            }
            self.shelf_order.retain(|handle| *handle != region.shelf);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.region_count == 0
    }

    pub fn region_count(&self) -> usize {
        self.region_count
    }

    pub fn shelf_count(&self) -> usize {
        self.shelf_order.len()
    }

    /// Cells covered by live regions
    pub fn used_area(&self) -> u64 {
        self.used_area
    }

    pub fn total_area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Structural self-check of the row allocator and every shelf
    pub fn validate(&self) -> bool {
        let shelves_valid = self.shelf_order.iter().all(|handle| {
            self.shelves
                .get(*handle)
                .is_some_and(|shelf| shelf.columns.validate() && !shelf.columns.is_empty())
        });
        let rows_used: u64 = self
            .shelf_order
            .iter()
            .filter_map(|handle| self.shelves.get(*handle))
            .map(|shelf| shelf.rows.block_size)
            .sum();
        shelves_valid
            && self.rows.validate()
            && rows_used == self.rows.used_size()
            && self.shelves.len() == self.shelf_order.len()
    }
}

#[cfg(test)]
#[path = "space_allocator_tests.rs"]
mod tests;
