/// GraphicsDevice trait - resource factory and deferred-destruction sink

use std::fmt;
use std::sync::Arc;
use bitflags::bitflags;

use crate::error::Result;
use crate::graphics_device::{Buffer, BufferDesc, Texture, TextureDesc};

bitflags! {
    /// Set of device queues whose in-flight work may reference a resource
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueMask: u8 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
    }
}

impl Default for QueueMask {
    fn default() -> Self {
        QueueMask::all()
    }
}

/// A physical resource handed back to the device for deferred destruction
#[derive(Clone)]
pub enum DeviceResource {
    Buffer(Arc<dyn Buffer>),
    Texture(Arc<dyn Texture>),
}

impl DeviceResource {
    /// Memory footprint in bytes (mips included for textures)
    pub fn size_bytes(&self) -> u64 {
        match self {
            DeviceResource::Buffer(buffer) => buffer.size(),
            DeviceResource::Texture(texture) => {
                let info = texture.info();
                let desc = TextureDesc {
                    width: info.width,
                    height: info.height,
                    format: info.format,
                    usage: info.usage,
                    array_layers: info.array_layers,
                    mip_levels: info.mip_levels,
                    texture_type: info.texture_type,
                };
                desc.layer_size_bytes() * info.array_layers as u64
            }
        }
    }
}

impl fmt::Debug for DeviceResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceResource::Buffer(buffer) => write!(f, "Buffer({} bytes)", buffer.size()),
            DeviceResource::Texture(texture) => {
                let info = texture.info();
                write!(f, "Texture({}x{}x{})", info.width, info.height, info.array_layers)
            }
        }
    }
}

/// Device capability required by the allocators
///
/// Implemented by backend-specific devices (e.g., a Vulkan device wrapper).
pub trait GraphicsDevice: Send + Sync {
    /// Create a buffer
    fn create_buffer(&mut self, desc: BufferDesc) -> Result<Arc<dyn Buffer>>;

    /// Create a texture or texture array
    fn create_texture(&mut self, desc: TextureDesc) -> Result<Arc<dyn Texture>>;

    /// Release a resource once GPU work on `queue_mask` submitted so far has retired
    ///
    /// The resource must not be destroyed immediately: command buffers still
    /// in flight may reference it.
    fn release_deferred(&mut self, resource: DeviceResource, queue_mask: QueueMask);
}

/// Reborrow an optional device for one more call
pub fn reborrow_device<'a>(device: &'a mut Option<&mut dyn GraphicsDevice>) -> Option<&'a mut dyn GraphicsDevice> {
    match device {
        Some(device) => Some(&mut **device),
        None => None,
    }
}
