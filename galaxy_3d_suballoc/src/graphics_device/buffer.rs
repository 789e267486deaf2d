/// Buffer trait and buffer descriptor

use bitflags::bitflags;
use crate::error::{Error, Result};

bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Vertex buffer
        const VERTEX = 1 << 0;
        /// Index buffer
        const INDEX = 1 << 1;
        /// Uniform/constant buffer
        const UNIFORM = 1 << 2;
        /// Storage buffer
        const STORAGE = 1 << 3;
        /// Source of copy operations (required to migrate content out)
        const TRANSFER_SRC = 1 << 4;
        /// Destination of copy operations (required to migrate content in)
        const TRANSFER_DST = 1 << 5;
    }
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    /// Buffer usage
    pub usage: BufferUsage,
}

impl Default for BufferDesc {
    fn default() -> Self {
        Self {
            size: 0,
            usage: BufferUsage::VERTEX | BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
        }
    }
}

/// Buffer resource trait
///
/// Implemented by backend-specific buffer types. The buffer is destroyed when
/// the last `Arc` is dropped; allocators route that last drop through
/// `GraphicsDevice::release_deferred`.
pub trait Buffer: Send + Sync {
    /// Size in bytes
    fn size(&self) -> u64;

    /// Update buffer data
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset into the buffer in bytes
    /// * `data` - Data to write
    fn update(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Read buffer data back (host-visible buffers only)
    fn read(&self, _offset: u64, _data: &mut [u8]) -> Result<()> {
        Err(Error::InvalidResource("buffer is not host readable".to_string()))
    }

    /// Raw pointer to persistently mapped memory
    ///
    /// Returns None if the buffer is not CPU-accessible (device-local only).
    fn mapped_ptr(&self) -> Option<*mut u8> {
        None
    }
}

/// Check that `offset..offset + len` lies inside a buffer of `size` bytes
pub fn check_buffer_range(size: u64, offset: u64, len: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::InvalidParameter(format!(
            "range {}..{} exceeds buffer size {}",
            offset,
            offset.saturating_add(len),
            size
        ))),
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
