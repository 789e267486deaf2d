/// Thread-safe suballocator carving ranges out of one growable buffer
///
/// `allocate` may be called from any thread. It only grows the logical
/// range allocator; the physical buffer follows on the next `get_buffer`
/// call, which belongs to the rendering thread.
///
/// # Example
///
/// ```ignore
/// let suballocator = BufferSuballocator::new(Some(&mut device), BufferSuballocatorCreateInfo {
///     desc: BufferDesc { size: 1024, ..Default::default() },
///     ..Default::default()
/// })?;
///
/// let allocation = suballocator.allocate(256, 16).ok_or(Error::OutOfMemory)?;
/// let buffer = suballocator.get_buffer(Some(&mut device), Some(&mut cmd))?;
/// ```

use std::any::Any;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use crate::allocator::range_allocator::growth_target;
use crate::allocator::{DynamicBuffer, DynamicBufferCreateInfo, RangeAllocation, RangeAllocator};
use crate::error::{Error, Result};
use crate::graphics_device::{Buffer, BufferDesc, CommandList, GraphicsDevice};
use crate::utils::is_power_of_two;
use crate::{engine_error, engine_trace};

const LOG_SOURCE: &str = "galaxy3d::BufferSuballocator";

/// Buffer suballocator create information
#[derive(Debug, Clone, Default)]
pub struct BufferSuballocatorCreateInfo {
    /// Debug name
    pub name: String,
    /// Buffer description; `desc.size` is the initial size
    pub desc: BufferDesc,
    /// Growth increment in bytes (0 = double the current size)
    pub expansion_size: u64,
    /// Size ceiling in bytes (0 = unbounded)
    pub max_size: u64,
    /// Skip allocator self-checks after every operation (debug builds only)
    pub disable_debug_validation: bool,
}

/// Snapshot of the suballocator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferSuballocatorUsageStats {
    /// Size of the physical buffer
    pub committed_size: u64,
    /// Bytes held by live allocations (alignment padding included)
    pub used_size: u64,
    /// Largest free block of the logical range
    pub max_free_chunk_size: u64,
    pub allocation_count: u32,
}

pub struct BufferSuballocator {
    name: String,
    expansion_size: u64,
    max_size: u64,
    debug_validation: bool,

    allocator: Mutex<RangeAllocator>,
    buffer: Mutex<DynamicBuffer>,

    /// Physical size last seen by `get_buffer`
    committed_size: AtomicU64,
    /// Logical size of the range allocator
    logical_size: AtomicU64,
    used_size: AtomicU64,
    max_free_chunk_size: AtomicU64,
    allocation_count: AtomicU32,
}

impl BufferSuballocator {
    pub fn new(
        device: Option<&mut dyn GraphicsDevice>,
        create_info: BufferSuballocatorCreateInfo,
    ) -> Result<Arc<Self>> {
        let initial_size = create_info.desc.size;
        if create_info.max_size != 0 && initial_size > create_info.max_size {
            return Err(Error::InitializationFailed(format!(
                "Initial size ({}) exceeds maximum size ({})",
                initial_size, create_info.max_size
            )));
        }
        let name = if create_info.name.is_empty() {
            "Buffer suballocator".to_string()
        } else {
            create_info.name
        };

        let buffer = DynamicBuffer::new(device, DynamicBufferCreateInfo {
            name: name.clone(),
            desc: create_info.desc,
            memory_page_size: create_info.expansion_size,
        })?;
        let committed_size = buffer.size();

        Ok(Arc::new(Self {
            name,
            expansion_size: create_info.expansion_size,
            max_size: create_info.max_size,
            debug_validation: cfg!(debug_assertions) && !create_info.disable_debug_validation,
            allocator: Mutex::new(RangeAllocator::new(initial_size)),
            buffer: Mutex::new(buffer),
            committed_size: AtomicU64::new(committed_size),
            logical_size: AtomicU64::new(initial_size),
            used_size: AtomicU64::new(0),
            max_free_chunk_size: AtomicU64::new(initial_size),
            allocation_count: AtomicU32::new(0),
        }))
    }

    fn lock_allocator(&self) -> MutexGuard<'_, RangeAllocator> {
        self.allocator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_buffer(&self) -> MutexGuard<'_, DynamicBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_stats(&self, allocator: &RangeAllocator) {
        self.logical_size.store(allocator.max_size(), Ordering::Release);
        self.used_size.store(allocator.used_size(), Ordering::Relaxed);
        self.max_free_chunk_size.store(allocator.max_free_block_size(), Ordering::Relaxed);
        if self.debug_validation {
            debug_assert!(allocator.validate(), "range allocator of '{}' is corrupted", self.name);
        }
    }

    /// Grow the logical range; returns false at the size ceiling
    fn grow(&self, allocator: &mut RangeAllocator, size: u64) -> bool {
        let current = allocator.max_size();
        match growth_target(current, size, self.expansion_size, self.max_size) {
            Some(target) => {
                allocator.extend(target - current);
                true
            }
            None => false,
        }
    }

    /// Carve `size` bytes aligned to `alignment` (power of two)
    ///
    /// Returns `None` once the size ceiling is reached.
    pub fn allocate(self: &Arc<Self>, size: u64, alignment: u64) -> Option<Arc<BufferSuballocation>> {
        debug_assert!(size > 0, "allocation size must not be zero");
        debug_assert!(is_power_of_two(alignment), "alignment {} is not a power of two", alignment);
        if size == 0 || !is_power_of_two(alignment) {
            engine_error!(LOG_SOURCE, "Invalid allocation request: {} bytes, alignment {}", size, alignment);
            return None;
        }

        let committed_size = self.committed_size.load(Ordering::Acquire);
        let mut allocator = self.lock_allocator();

        // The physical buffer may be larger than requested (page rounding)
        if committed_size > allocator.max_size() {
            let extra = committed_size - allocator.max_size();
            allocator.extend(extra);
        }

        let allocation = loop {
            if let Some(allocation) = allocator.allocate(size, alignment) {
                break allocation;
            }
            if !self.grow(&mut allocator, size) {
                engine_error!(LOG_SOURCE,
                    "Failed to allocate {} bytes from '{}': maximum size ({}) reached",
                    size, self.name, self.max_size);
                self.update_stats(&allocator);
                return None;
            }
        };

        self.update_stats(&allocator);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        drop(allocator);

        engine_trace!(LOG_SOURCE, "'{}': allocated {} bytes at offset {}", self.name, size, allocation.offset);

        Some(Arc::new(BufferSuballocation {
            allocator: Arc::clone(self),
            allocation,
            user_data: Mutex::new(None),
        }))
    }

    fn free(&self, allocation: &RangeAllocation) {
        let mut allocator = self.lock_allocator();
        if !allocator.free(allocation) {
            debug_assert!(false, "'{}': range at offset {} was not allocated here", self.name, allocation.offset);
            return;
        }
        self.update_stats(&allocator);
        self.allocation_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Bring the physical buffer up to the logical size and return it
    ///
    /// Must not be called concurrently with itself. Returns `Ok(None)` when a
    /// resize is pending and `device` is missing.
    pub fn get_buffer(
        &self,
        device: Option<&mut dyn GraphicsDevice>,
        context: Option<&mut dyn CommandList>,
    ) -> Result<Option<Arc<dyn Buffer>>> {
        let mut buffer = self.lock_buffer();
        // Read without the allocation mutex: a stale value only delays growth to the next call
        let required = self.logical_size.load(Ordering::Acquire);
        let result = if required > buffer.pending_size() {
            buffer.resize(device, context, required, false)
        } else {
            buffer.get_buffer(device, context)
        };
        self.committed_size.store(buffer.size(), Ordering::Release);
        result
    }

    /// Whether the next `get_buffer` call will replace the physical buffer
    pub fn pending_update(&self) -> bool {
        let buffer = self.lock_buffer();
        self.logical_size.load(Ordering::Acquire) > buffer.size() || buffer.pending_update()
    }

    pub fn version(&self) -> u32 {
        self.lock_buffer().version()
    }

    pub fn usage_stats(&self) -> BufferSuballocatorUsageStats {
        BufferSuballocatorUsageStats {
            committed_size: self.committed_size.load(Ordering::Relaxed),
            used_size: self.used_size.load(Ordering::Relaxed),
            max_free_chunk_size: self.max_free_chunk_size.load(Ordering::Relaxed),
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
        }
    }

    /// Logical size of the managed range
    pub fn max_size(&self) -> u64 {
        self.lock_allocator().max_size()
    }

    pub fn used_size(&self) -> u64 {
        self.lock_allocator().used_size()
    }

    pub fn max_free_block_size(&self) -> u64 {
        self.lock_allocator().max_free_block_size()
    }

    pub fn allocation_count(&self) -> u32 {
        self.allocation_count.load(Ordering::Relaxed)
    }

    /// Run the range allocator self-check
    pub fn validate(&self) -> bool {
        self.lock_allocator().validate()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the physical buffer through the device
    ///
    /// The next `get_buffer` call with a device creates it again.
    pub fn release_resources(&self, device: &mut dyn GraphicsDevice) {
        let mut buffer = self.lock_buffer();
        buffer.release_resources(device);
        self.committed_size.store(0, Ordering::Release);
    }
}

impl Drop for BufferSuballocator {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.allocation_count.load(Ordering::Relaxed), 0,
            "Buffer suballocator '{}' destroyed with live allocations", self.name
        );
    }
}

// ============================================================================
// Suballocation handle
// ============================================================================

/// One range of a `BufferSuballocator`; dropping the last reference frees it
pub struct BufferSuballocation {
    allocator: Arc<BufferSuballocator>,
    allocation: RangeAllocation,
    user_data: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

impl BufferSuballocation {
    /// Aligned byte offset into the buffer
    pub fn offset(&self) -> u64 {
        self.allocation.offset
    }

    pub fn size(&self) -> u64 {
        self.allocation.size
    }

    pub fn allocator(&self) -> &Arc<BufferSuballocator> {
        &self.allocator
    }

    pub fn user_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.user_data.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_user_data(&self, user_data: Option<Arc<dyn Any + Send + Sync>>) {
        *self.user_data.lock().unwrap_or_else(PoisonError::into_inner) = user_data;
    }

    /// Upload `data` at the start of this range of `buffer`
    pub fn write<T: bytemuck::Pod>(&self, buffer: &Arc<dyn Buffer>, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as u64 > self.allocation.size {
            return Err(Error::InvalidParameter(format!(
                "{} bytes do not fit in a {}-byte suballocation",
                bytes.len(),
                self.allocation.size
            )));
        }
        buffer.update(self.allocation.offset, bytes)
    }
}

impl Drop for BufferSuballocation {
    fn drop(&mut self) {
        self.allocator.free(&self.allocation);
    }
}

#[cfg(test)]
#[path = "buffer_suballocator_tests.rs"]
mod tests;
