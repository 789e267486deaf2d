/// Growable 2-D texture array
///
/// Works like `DynamicBuffer` with array slices as the unit: the pending
/// slice count is applied when a device is available, existing slices are
/// copied mip by mip when a command list is available too, and each
/// replacement of the physical texture bumps the version.

use std::sync::Arc;
use crate::error::{Error, Result};
use crate::graphics_device::{
    CommandList, DeviceResource, GraphicsDevice, QueueMask, Texture, TextureDesc,
    TextureRegion, TextureType,
};
use crate::utils::round_up_to_multiple;
use crate::engine_info;

/// Dynamic texture array create information
#[derive(Debug, Clone)]
pub struct DynamicTextureArrayCreateInfo {
    /// Debug name
    pub name: String,
    /// Texture description; `desc.array_layers` is the initial slice count
    pub desc: TextureDesc,
    /// Slice counts are rounded up to a multiple of this value
    pub slices_per_page: u32,
}

impl Default for DynamicTextureArrayCreateInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            desc: TextureDesc {
                texture_type: TextureType::Array2D,
                ..Default::default()
            },
            slices_per_page: 1,
        }
    }
}

pub struct DynamicTextureArray {
    name: String,
    /// `desc.array_layers` is the committed slice count
    desc: TextureDesc,
    slices_per_page: u32,
    pending_size: u32,
    texture: Option<Arc<dyn Texture>>,
    version: u32,
}

impl DynamicTextureArray {
    pub fn new(
        device: Option<&mut dyn GraphicsDevice>,
        create_info: DynamicTextureArrayCreateInfo,
    ) -> Result<Self> {
        let mut desc = create_info.desc;
        if desc.texture_type != TextureType::Array2D {
            return Err(Error::InitializationFailed(format!(
                "{:?} is not a valid texture type for a dynamic texture array, only Array2D is allowed",
                desc.texture_type
            )));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::InitializationFailed(format!(
                "Texture size must not be zero ({} x {})",
                desc.width, desc.height
            )));
        }
        if desc.mip_levels == 0 {
            desc.mip_levels = desc.full_mip_chain();
        }

        let pending_size = desc.array_layers;
        desc.array_layers = 0;
        let name = if create_info.name.is_empty() {
            "Dynamic texture array".to_string()
        } else {
            create_info.name
        };

        let mut array = Self {
            name,
            desc,
            slices_per_page: create_info.slices_per_page.max(1),
            pending_size,
            texture: None,
            version: 0,
        };
        if device.is_some() && pending_size > 0 {
            array.commit(device, None, false)?;
        }
        Ok(array)
    }

    fn release(device: &mut dyn GraphicsDevice, texture: Arc<dyn Texture>) {
        device.release_deferred(DeviceResource::Texture(texture), QueueMask::all());
    }

    fn copy_slices(
        &self,
        context: &mut dyn CommandList,
        src: &Arc<dyn Texture>,
        dst: &Arc<dyn Texture>,
        slice_count: u32,
    ) -> Result<()> {
        for slice in 0..slice_count {
            for mip in 0..self.desc.mip_levels {
                let region = TextureRegion::full_mip(self.desc.width, self.desc.height, mip);
                context.copy_texture_slice(src, slice, dst, slice, region)?;
            }
        }
        Ok(())
    }

    fn commit(
        &mut self,
        device: Option<&mut dyn GraphicsDevice>,
        context: Option<&mut dyn CommandList>,
        discard_content: bool,
    ) -> Result<Option<Arc<dyn Texture>>> {
        if !self.pending_update() {
            return Ok(self.texture.clone());
        }
        let Some(device) = device else {
            return Ok(None);
        };

        if self.pending_size == 0 {
            if let Some(old) = self.texture.take() {
                Self::release(device, old);
                self.version += 1;
            }
            self.desc.array_layers = 0;
            return Ok(None);
        }

        let new_size = round_up_to_multiple(self.pending_size as u64, self.slices_per_page as u64) as u32;
        let new_texture = device.create_texture(TextureDesc {
            array_layers: new_size,
            ..self.desc.clone()
        })?;

        if let Some(old) = self.texture.take() {
            if let (Some(context), false) = (context, discard_content) {
                let slice_count = old.info().array_layers.min(new_size);
                if let Err(err) = self.copy_slices(context, &old, &new_texture, slice_count) {
                    self.texture = Some(old);
                    Self::release(device, new_texture);
                    return Err(err);
                }
            }
            Self::release(device, old);
        }

        self.texture = Some(new_texture);
        self.desc.array_layers = new_size;
        self.pending_size = new_size;
        self.version += 1;

        engine_info!("galaxy3d::DynamicTextureArray",
            "Expanding texture '{}' ({} x {} {}-mip {:?}) to {} slices. Version: {}",
            self.name, self.desc.width, self.desc.height, self.desc.mip_levels,
            self.desc.format, new_size, self.version);

        Ok(self.texture.clone())
    }

    /// Request a new slice count and apply it if possible
    pub fn resize(
        &mut self,
        device: Option<&mut dyn GraphicsDevice>,
        context: Option<&mut dyn CommandList>,
        new_array_size: u32,
        discard_content: bool,
    ) -> Result<Option<Arc<dyn Texture>>> {
        self.pending_size = new_array_size;
        self.commit(device, context, discard_content)
    }

    /// Apply any pending resize and return the current texture
    pub fn get_texture(
        &mut self,
        device: Option<&mut dyn GraphicsDevice>,
        context: Option<&mut dyn CommandList>,
    ) -> Result<Option<Arc<dyn Texture>>> {
        self.commit(device, context, false)
    }

    /// Release the physical texture through the device
    pub fn release_resources(&mut self, device: &mut dyn GraphicsDevice) {
        self.pending_size = 0;
        if let Some(old) = self.texture.take() {
            Self::release(device, old);
            self.version += 1;
        }
        self.desc.array_layers = 0;
    }

    pub fn pending_update(&self) -> bool {
        self.pending_size != self.desc.array_layers || (self.pending_size > 0 && self.texture.is_none())
    }

    /// Committed slice count
    pub fn array_size(&self) -> u32 {
        self.desc.array_layers
    }

    pub fn pending_size(&self) -> u32 {
        self.pending_size
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Bytes used by all committed slices and their mips
    pub fn memory_usage(&self) -> u64 {
        self.desc.layer_size_bytes() * self.desc.array_layers as u64
    }

    /// Description of the committed texture
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
#[path = "dynamic_texture_array_tests.rs"]
mod tests;
