/// Vertex pool - one vertex range shared by several per-attribute buffers
///
/// Each element (position, normal, UV stream, ...) lives in its own growable
/// buffer of `element.size * vertex_count` bytes. A single range allocator
/// over vertex indices hands out `[start_vertex, start_vertex + count)`,
/// which is valid in every element buffer at once.

use std::any::Any;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use crate::allocator::range_allocator::growth_target;
use crate::allocator::{DynamicBuffer, DynamicBufferCreateInfo, RangeAllocation, RangeAllocator};
use crate::error::{Error, Result};
use crate::graphics_device::{
    reborrow_context, reborrow_device, Buffer, BufferDesc, BufferUsage, CommandList, GraphicsDevice,
};
use crate::{engine_error, engine_trace};

const LOG_SOURCE: &str = "galaxy3d::VertexPool";

/// One vertex stream of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexPoolElementDesc {
    /// Bytes per vertex
    pub size: u32,
    pub usage: BufferUsage,
}

impl Default for VertexPoolElementDesc {
    fn default() -> Self {
        Self {
            size: 0,
            usage: BufferUsage::VERTEX | BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
        }
    }
}

/// Vertex pool create information
#[derive(Debug, Clone, Default)]
pub struct VertexPoolCreateInfo {
    /// Debug name
    pub name: String,
    pub elements: Vec<VertexPoolElementDesc>,
    /// Initial vertex count
    pub vertex_count: u64,
    /// Growth increment in vertices (0 = double the current count)
    pub extra_vertex_count: u64,
    /// Vertex count ceiling (0 = unbounded)
    pub max_vertex_count: u64,
    /// Skip allocator self-checks after every operation (debug builds only)
    pub disable_debug_validation: bool,
}

/// Snapshot of the vertex pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VertexPoolUsageStats {
    /// Logical vertex capacity
    pub total_vertex_count: u64,
    pub allocated_vertex_count: u64,
    /// Sum of the physical element buffer sizes
    pub committed_memory_size: u64,
    /// Bytes held by live allocations across all elements
    pub used_memory_size: u64,
    pub allocation_count: u32,
}

pub struct VertexPool {
    name: String,
    elements: Vec<VertexPoolElementDesc>,
    /// Sum of element sizes
    vertex_size: u64,
    extra_vertex_count: u64,
    max_vertex_count: u64,
    debug_validation: bool,

    allocator: Mutex<RangeAllocator>,
    buffers: Vec<Mutex<DynamicBuffer>>,

    /// Smallest vertex count every element buffer can hold
    committed_vertex_count: AtomicU64,
    committed_memory_size: AtomicU64,
    /// Logical size of the range allocator
    logical_vertex_count: AtomicU64,
    allocated_vertex_count: AtomicU64,
    allocation_count: AtomicU32,
}

impl VertexPool {
    pub fn new(
        mut device: Option<&mut dyn GraphicsDevice>,
        create_info: VertexPoolCreateInfo,
    ) -> Result<Arc<Self>> {
        if create_info.elements.is_empty() {
            return Err(Error::InitializationFailed(
                "Vertex pool must have at least one element".to_string(),
            ));
        }
        if let Some(index) = create_info.elements.iter().position(|element| element.size == 0) {
            return Err(Error::InitializationFailed(format!(
                "Size of vertex pool element {} must not be zero",
                index
            )));
        }
        if create_info.max_vertex_count != 0 && create_info.vertex_count > create_info.max_vertex_count {
            return Err(Error::InitializationFailed(format!(
                "Initial vertex count ({}) exceeds maximum vertex count ({})",
                create_info.vertex_count, create_info.max_vertex_count
            )));
        }
        let name = if create_info.name.is_empty() {
            "Vertex pool".to_string()
        } else {
            create_info.name
        };

        let mut buffers = Vec::with_capacity(create_info.elements.len());
        for (index, element) in create_info.elements.iter().enumerate() {
            let buffer = DynamicBuffer::new(reborrow_device(&mut device), DynamicBufferCreateInfo {
                name: format!("{} - element {}", name, index),
                desc: BufferDesc {
                    size: element.size as u64 * create_info.vertex_count,
                    usage: element.usage,
                },
                memory_page_size: element.size as u64 * create_info.extra_vertex_count,
            })?;
            buffers.push(Mutex::new(buffer));
        }

        let pool = Self {
            name,
            vertex_size: create_info.elements.iter().map(|element| element.size as u64).sum(),
            elements: create_info.elements,
            extra_vertex_count: create_info.extra_vertex_count,
            max_vertex_count: create_info.max_vertex_count,
            debug_validation: cfg!(debug_assertions) && !create_info.disable_debug_validation,
            allocator: Mutex::new(RangeAllocator::new(create_info.vertex_count)),
            buffers,
            committed_vertex_count: AtomicU64::new(0),
            committed_memory_size: AtomicU64::new(0),
            logical_vertex_count: AtomicU64::new(create_info.vertex_count),
            allocated_vertex_count: AtomicU64::new(0),
            allocation_count: AtomicU32::new(0),
        };
        pool.refresh_committed();
        Ok(Arc::new(pool))
    }

    fn lock_allocator(&self) -> MutexGuard<'_, RangeAllocator> {
        self.allocator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_buffer(&self, index: usize) -> MutexGuard<'_, DynamicBuffer> {
        self.buffers[index].lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh_committed(&self) {
        let mut vertex_count = u64::MAX;
        let mut memory_size = 0;
        for (index, element) in self.elements.iter().enumerate() {
            let size = self.lock_buffer(index).size();
            vertex_count = vertex_count.min(size / element.size as u64);
            memory_size += size;
        }
        self.committed_vertex_count.store(vertex_count, Ordering::Release);
        self.committed_memory_size.store(memory_size, Ordering::Relaxed);
    }

    fn update_stats(&self, allocator: &RangeAllocator) {
        self.logical_vertex_count.store(allocator.max_size(), Ordering::Release);
        self.allocated_vertex_count.store(allocator.used_size(), Ordering::Relaxed);
        if self.debug_validation {
            debug_assert!(allocator.validate(), "range allocator of '{}' is corrupted", self.name);
        }
    }

    /// Reserve `vertex_count` consecutive vertices in every element buffer
    ///
    /// Returns `None` once the vertex count ceiling is reached.
    pub fn allocate(self: &Arc<Self>, vertex_count: u64) -> Option<Arc<VertexPoolAllocation>> {
        debug_assert!(vertex_count > 0, "vertex count must not be zero");
        if vertex_count == 0 {
            engine_error!(LOG_SOURCE, "Invalid allocation request of zero vertices from '{}'", self.name);
            return None;
        }

        let committed_vertex_count = self.committed_vertex_count.load(Ordering::Acquire);
        let mut allocator = self.lock_allocator();
        if committed_vertex_count > allocator.max_size() {
            let extra = committed_vertex_count - allocator.max_size();
            allocator.extend(extra);
        }

        let allocation = loop {
            if let Some(allocation) = allocator.allocate(vertex_count, 1) {
                break allocation;
            }
            let current = allocator.max_size();
            match growth_target(current, vertex_count, self.extra_vertex_count, self.max_vertex_count) {
                Some(target) => allocator.extend(target - current),
                None => {
                    engine_error!(LOG_SOURCE,
                        "Failed to allocate {} vertices from '{}': maximum vertex count ({}) reached",
                        vertex_count, self.name, self.max_vertex_count);
                    self.update_stats(&allocator);
                    return None;
                }
            }
        };

        self.update_stats(&allocator);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        drop(allocator);

        engine_trace!(LOG_SOURCE, "'{}': allocated {} vertices at {}", self.name, vertex_count, allocation.offset);

        Some(Arc::new(VertexPoolAllocation {
            pool: Arc::clone(self),
            allocation,
            user_data: Mutex::new(None),
        }))
    }

    fn free(&self, allocation: &RangeAllocation) {
        let mut allocator = self.lock_allocator();
        if !allocator.free(allocation) {
            debug_assert!(false, "'{}': vertex range at {} was not allocated here", self.name, allocation.offset);
            return;
        }
        self.update_stats(&allocator);
        self.allocation_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Bring element buffer `index` up to the logical vertex count and return it
    ///
    /// Only this element is resized. Must not be called concurrently with
    /// other `update` calls.
    pub fn update(
        &self,
        index: usize,
        device: Option<&mut dyn GraphicsDevice>,
        context: Option<&mut dyn CommandList>,
    ) -> Result<Option<Arc<dyn Buffer>>> {
        let element = self.element(index)?;
        let required = self.logical_vertex_count.load(Ordering::Acquire) * element.size as u64;
        let result = {
            let mut buffer = self.lock_buffer(index);
            if required > buffer.pending_size() {
                buffer.resize(device, context, required, false)
            } else {
                buffer.get_buffer(device, context)
            }
        };
        self.refresh_committed();
        result
    }

    /// Update every element buffer
    pub fn update_all(
        &self,
        mut device: Option<&mut dyn GraphicsDevice>,
        mut context: Option<&mut dyn CommandList>,
    ) -> Result<()> {
        for index in 0..self.elements.len() {
            self.update(index, reborrow_device(&mut device), reborrow_context(&mut context))?;
        }
        Ok(())
    }

    /// Current buffer of element `index` without applying pending growth
    pub fn get_buffer(&self, index: usize) -> Result<Option<Arc<dyn Buffer>>> {
        self.element(index)?;
        Ok(self.lock_buffer(index).current_buffer().cloned())
    }

    fn element(&self, index: usize) -> Result<VertexPoolElementDesc> {
        self.elements.get(index).copied().ok_or_else(|| {
            Error::InvalidParameter(format!(
                "Element index {} is out of range for vertex pool '{}' ({} elements)",
                index,
                self.name,
                self.elements.len()
            ))
        })
    }

    /// Sum of the element buffer versions
    ///
    /// Changes whenever any element buffer is replaced.
    pub fn version(&self) -> u32 {
        (0..self.buffers.len()).fold(0u32, |version, index| {
            version.wrapping_add(self.lock_buffer(index).version())
        })
    }

    /// Whether any element buffer would be replaced by `update_all`
    pub fn pending_update(&self) -> bool {
        let logical = self.logical_vertex_count.load(Ordering::Acquire);
        self.elements.iter().enumerate().any(|(index, element)| {
            let buffer = self.lock_buffer(index);
            logical * element.size as u64 > buffer.size() || buffer.pending_update()
        })
    }

    pub fn usage_stats(&self) -> VertexPoolUsageStats {
        let allocated_vertex_count = self.allocated_vertex_count.load(Ordering::Relaxed);
        VertexPoolUsageStats {
            total_vertex_count: self.logical_vertex_count.load(Ordering::Relaxed),
            allocated_vertex_count,
            committed_memory_size: self.committed_memory_size.load(Ordering::Relaxed),
            used_memory_size: allocated_vertex_count * self.vertex_size,
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
        }
    }

    pub fn elements(&self) -> &[VertexPoolElementDesc] {
        &self.elements
    }

    /// Logical vertex capacity
    pub fn vertex_count(&self) -> u64 {
        self.lock_allocator().max_size()
    }

    pub fn allocation_count(&self) -> u32 {
        self.allocation_count.load(Ordering::Relaxed)
    }

    pub fn validate(&self) -> bool {
        self.lock_allocator().validate()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release every element buffer through the device
    pub fn release_resources(&self, device: &mut dyn GraphicsDevice) {
        for index in 0..self.buffers.len() {
            self.lock_buffer(index).release_resources(device);
        }
        self.refresh_committed();
    }
}

impl Drop for VertexPool {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.allocation_count.load(Ordering::Relaxed), 0,
            "Vertex pool '{}' destroyed with live allocations", self.name
        );
    }
}

// ============================================================================
// Vertex pool allocation handle
// ============================================================================

/// Vertex range of a `VertexPool`; dropping the last reference frees it
pub struct VertexPoolAllocation {
    pool: Arc<VertexPool>,
    allocation: RangeAllocation,
    user_data: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

impl VertexPoolAllocation {
    pub fn start_vertex(&self) -> u64 {
        self.allocation.offset
    }

    pub fn vertex_count(&self) -> u64 {
        self.allocation.size
    }

    pub fn pool(&self) -> &Arc<VertexPool> {
        &self.pool
    }

    pub fn user_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.user_data.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_user_data(&self, user_data: Option<Arc<dyn Any + Send + Sync>>) {
        *self.user_data.lock().unwrap_or_else(PoisonError::into_inner) = user_data;
    }

    /// Upload per-vertex `data` for element `index` starting at `start_vertex`
    pub fn write<T: bytemuck::Pod>(&self, index: usize, buffer: &Arc<dyn Buffer>, data: &[T]) -> Result<()> {
        let element = self.pool.element(index)?;
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let capacity = self.allocation.size * element.size as u64;
        if bytes.len() as u64 > capacity {
            return Err(Error::InvalidParameter(format!(
                "{} bytes do not fit in {} vertices of element {}",
                bytes.len(),
                self.allocation.size,
                index
            )));
        }
        buffer.update(self.allocation.offset * element.size as u64, bytes)
    }
}

impl Drop for VertexPoolAllocation {
    fn drop(&mut self) {
        self.pool.free(&self.allocation);
    }
}

#[cfg(test)]
#[path = "vertex_pool_tests.rs"]
mod tests;
