/// Growable buffer backed by one physical device buffer
///
/// `resize` only records a pending size. The physical buffer is replaced when
/// a device is available, and the overlapping prefix of the old content is
/// copied when a command list is available too. Every replacement bumps the
/// version, so users holding a cached buffer can tell it went stale.
///
/// Replaced buffers are handed to `GraphicsDevice::release_deferred`, never
/// dropped while GPU work may still read them.

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{
    Buffer, BufferDesc, CommandList, DeviceResource, GraphicsDevice, QueueMask,
};
use crate::utils::round_up_to_multiple;
use crate::engine_info;

/// Dynamic buffer create information
#[derive(Debug, Clone, Default)]
pub struct DynamicBufferCreateInfo {
    /// Debug name
    pub name: String,
    /// Buffer description; `desc.size` is the initial size
    pub desc: BufferDesc,
    /// Physical sizes are rounded up to a multiple of this value (0 = exact)
    pub memory_page_size: u64,
}

pub struct DynamicBuffer {
    name: String,
    desc: BufferDesc,
    memory_page_size: u64,
    pending_size: u64,
    buffer: Option<Arc<dyn Buffer>>,
    version: u32,
}

impl DynamicBuffer {
    /// Create the dynamic buffer
    ///
    /// The initial buffer is created right away when `device` is given,
    /// otherwise on the first `get_buffer` call with a device.
    pub fn new(device: Option<&mut dyn GraphicsDevice>, create_info: DynamicBufferCreateInfo) -> Result<Self> {
        let name = if create_info.name.is_empty() {
            "Dynamic buffer".to_string()
        } else {
            create_info.name
        };
        let mut buffer = Self {
            name,
            desc: BufferDesc {
                size: 0,
                usage: create_info.desc.usage,
            },
            memory_page_size: create_info.memory_page_size,
            pending_size: create_info.desc.size,
            buffer: None,
            version: 0,
        };
        if device.is_some() && buffer.pending_size > 0 {
            buffer.commit(device, None, false)?;
        }
        Ok(buffer)
    }

    fn release(device: &mut dyn GraphicsDevice, buffer: Arc<dyn Buffer>) {
        device.release_deferred(DeviceResource::Buffer(buffer), QueueMask::all());
    }

    fn commit(
        &mut self,
        device: Option<&mut dyn GraphicsDevice>,
        context: Option<&mut dyn CommandList>,
        discard_content: bool,
    ) -> Result<Option<Arc<dyn Buffer>>> {
        if !self.pending_update() {
            return Ok(self.buffer.clone());
        }
        let Some(device) = device else {
            return Ok(None);
        };

        if self.pending_size == 0 {
            if let Some(old) = self.buffer.take() {
                Self::release(device, old);
                self.version += 1;
            }
            self.desc.size = 0;
            return Ok(None);
        }

        let new_size = round_up_to_multiple(self.pending_size, self.memory_page_size);
        let new_buffer = device.create_buffer(BufferDesc {
            size: new_size,
            usage: self.desc.usage,
        })?;

        if let Some(old) = self.buffer.take() {
            if let (Some(context), false) = (context, discard_content) {
                let copy_size = old.size().min(new_size);
                if let Err(err) = context.copy_buffer_region(&old, 0, &new_buffer, 0, copy_size) {
                    self.buffer = Some(old);
                    Self::release(device, new_buffer);
                    return Err(err);
                }
            }
            Self::release(device, old);
        }

        let old_size = self.desc.size;
        self.buffer = Some(new_buffer);
        self.desc.size = new_size;
        self.pending_size = new_size;
        self.version += 1;

        engine_info!("galaxy3d::DynamicBuffer",
            "Expanding dynamic buffer '{}' from {} to {} bytes. Version: {}",
            self.name, old_size, new_size, self.version);

        Ok(self.buffer.clone())
    }

    /// Request a new size and apply it if possible
    ///
    /// Returns `Ok(None)` when a device is required but missing, or the new
    /// size is zero.
    pub fn resize(
        &mut self,
        device: Option<&mut dyn GraphicsDevice>,
        context: Option<&mut dyn CommandList>,
        new_size: u64,
        discard_content: bool,
    ) -> Result<Option<Arc<dyn Buffer>>> {
        self.pending_size = new_size;
        self.commit(device, context, discard_content)
    }

    /// Apply any pending resize and return the current buffer
    pub fn get_buffer(
        &mut self,
        device: Option<&mut dyn GraphicsDevice>,
        context: Option<&mut dyn CommandList>,
    ) -> Result<Option<Arc<dyn Buffer>>> {
        self.commit(device, context, false)
    }

    /// Release the physical buffer through the device
    pub fn release_resources(&mut self, device: &mut dyn GraphicsDevice) {
        self.pending_size = 0;
        if let Some(old) = self.buffer.take() {
            Self::release(device, old);
            self.version += 1;
        }
        self.desc.size = 0;
    }

    /// Whether the physical buffer does not match the requested size
    pub fn pending_update(&self) -> bool {
        self.pending_size != self.desc.size || (self.pending_size > 0 && self.buffer.is_none())
    }

    /// Committed size in bytes
    pub fn size(&self) -> u64 {
        self.desc.size
    }

    /// Requested size in bytes
    pub fn pending_size(&self) -> u64 {
        self.pending_size
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn memory_usage(&self) -> u64 {
        self.buffer.as_ref().map_or(0, |buffer| buffer.size())
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current buffer without applying pending resizes
    pub fn current_buffer(&self) -> Option<&Arc<dyn Buffer>> {
        self.buffer.as_ref()
    }
}

#[cfg(test)]
#[path = "dynamic_buffer_tests.rs"]
mod tests;
