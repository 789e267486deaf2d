/// Mock GraphicsDevice for unit tests (no GPU required)
///
/// Buffers and textures keep their bytes in host memory so that tests can
/// observe content migrations, and released resources go through a real
/// `ReleaseQueue` so deferred destruction can be checked.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::graphics_device::{
    Buffer, BufferDesc, CommandList, DeviceResource, GraphicsDevice, QueueMask,
    ReleaseQueue, Texture, TextureDesc, TextureInfo, TextureRegion, check_buffer_range,
};

// ============================================================================
// Mock Buffer
// ============================================================================

#[derive(Debug)]
pub struct MockBuffer {
    pub size: u64,
    pub name: String,
    data: Mutex<Vec<u8>>,
}

impl MockBuffer {
    pub fn new(size: u64, name: String) -> Self {
        Self {
            size,
            name,
            data: Mutex::new(vec![0; size as usize]),
        }
    }
}

impl Buffer for MockBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        check_buffer_range(self.size, offset, data.len() as u64)?;
        let start = offset as usize;
        self.data.lock().unwrap()[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: u64, data: &mut [u8]) -> Result<()> {
        check_buffer_range(self.size, offset, data.len() as u64)?;
        let start = offset as usize;
        data.copy_from_slice(&self.data.lock().unwrap()[start..start + data.len()]);
        Ok(())
    }
}

// ============================================================================
// Mock Texture
// ============================================================================

/// Texture keeping mip 0 of every layer in host memory
#[derive(Debug)]
pub struct MockTexture {
    pub info: TextureInfo,
    pub name: String,
    layers: Mutex<Vec<Vec<u8>>>,
}

impl MockTexture {
    pub fn new(desc: &TextureDesc, name: String) -> Self {
        let layer_size = desc.mip_size_bytes(0) as usize;
        Self {
            info: TextureInfo::from(desc),
            name,
            layers: Mutex::new(vec![vec![0; layer_size]; desc.array_layers as usize]),
        }
    }

    fn check_layer(&self, layer: u32, len: usize) -> Result<()> {
        let expected = (self.info.width * self.info.height * self.info.format.bytes_per_pixel()) as usize;
        if layer >= self.info.array_layers || len != expected {
            return Err(Error::InvalidParameter(format!(
                "layer {} / {} bytes does not match texture '{}'",
                layer, len, self.name
            )));
        }
        Ok(())
    }
}

impl Texture for MockTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }

    fn update_layer(&self, layer: u32, mip_level: u32, data: &[u8]) -> Result<()> {
        if mip_level != 0 {
            return Ok(());
        }
        self.check_layer(layer, data.len())?;
        self.layers.lock().unwrap()[layer as usize].copy_from_slice(data);
        Ok(())
    }

    fn read_layer(&self, layer: u32, mip_level: u32, data: &mut [u8]) -> Result<()> {
        if mip_level != 0 {
            return Err(Error::InvalidParameter("mock textures only store mip 0".to_string()));
        }
        self.check_layer(layer, data.len())?;
        data.copy_from_slice(&self.layers.lock().unwrap()[layer as usize]);
        Ok(())
    }
}

// ============================================================================
// Mock CommandList
// ============================================================================

/// Records every command and performs copies through `read`/`update`
#[derive(Debug, Default)]
pub struct MockCommandList {
    pub commands: Vec<String>,
}

impl MockCommandList {
    pub fn new() -> Self {
        Self { commands: Vec::new() }
    }
}

impl CommandList for MockCommandList {
    fn copy_buffer_region(
        &mut self,
        src: &Arc<dyn Buffer>,
        src_offset: u64,
        dst: &Arc<dyn Buffer>,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        let mut bytes = vec![0u8; size as usize];
        src.read(src_offset, &mut bytes)?;
        dst.update(dst_offset, &bytes)?;
        self.commands.push(format!("copy_buffer_region {}", size));
        Ok(())
    }

    fn copy_texture_slice(
        &mut self,
        src: &Arc<dyn Texture>,
        src_slice: u32,
        dst: &Arc<dyn Texture>,
        dst_slice: u32,
        region: TextureRegion,
    ) -> Result<()> {
        if region.mip_level == 0 {
            let info = src.info();
            let mut bytes = vec![0u8; (info.width * info.height * info.format.bytes_per_pixel()) as usize];
            src.read_layer(src_slice, 0, &mut bytes)?;
            dst.update_layer(dst_slice, 0, &bytes)?;
        }
        self.commands.push(format!(
            "copy_texture_slice {}->{} mip {}",
            src_slice, dst_slice, region.mip_level
        ));
        Ok(())
    }
}

// ============================================================================
// Mock GraphicsDevice
// ============================================================================

pub struct MockGraphicsDevice {
    created_buffers: Vec<String>,
    created_textures: Vec<String>,
    release_queue: ReleaseQueue,
    next_fence_value: u64,
    /// Creation requests above this many bytes fail with OutOfMemory
    pub max_resource_size: Option<u64>,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self {
            created_buffers: Vec::new(),
            created_textures: Vec::new(),
            release_queue: ReleaseQueue::new(),
            next_fence_value: 1,
            max_resource_size: None,
        }
    }

    pub fn get_created_buffers(&self) -> Vec<String> {
        self.created_buffers.clone()
    }

    pub fn get_created_textures(&self) -> Vec<String> {
        self.created_textures.clone()
    }

    pub fn release_queue(&self) -> &ReleaseQueue {
        &self.release_queue
    }

    /// Pretend the GPU finished all submitted work and drop retired resources
    pub fn finish_frame(&mut self) -> usize {
        let completed = self.next_fence_value;
        self.next_fence_value += 1;
        self.release_queue.signal_completed(QueueMask::all(), completed);
        self.release_queue.purge()
    }

    fn check_size(&self, size: u64) -> Result<()> {
        match self.max_resource_size {
            Some(max) if size > max => Err(Error::OutOfMemory),
            _ => Ok(()),
        }
    }
}

impl Default for MockGraphicsDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_buffer(&mut self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        self.check_size(desc.size)?;
        let name = format!("buffer_{}", desc.size);
        self.created_buffers.push(name.clone());
        Ok(Arc::new(MockBuffer::new(desc.size, name)))
    }

    fn create_texture(&mut self, desc: TextureDesc) -> Result<Arc<dyn Texture>> {
        self.check_size(desc.layer_size_bytes() * desc.array_layers as u64)?;
        let name = format!("texture_{}x{}x{}", desc.width, desc.height, desc.array_layers);
        self.created_textures.push(name.clone());
        Ok(Arc::new(MockTexture::new(&desc, name)))
    }

    fn release_deferred(&mut self, resource: DeviceResource, queue_mask: QueueMask) {
        self.release_queue.defer(resource, queue_mask, self.next_fence_value);
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
