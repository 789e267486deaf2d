/// Texture trait, texture descriptor, and texture info

use crate::error::{Error, Result};

/// Texture format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8_UNORM,
    R8G8B8A8_SRGB,
    R8G8B8A8_UNORM,
    B8G8R8A8_SRGB,
    B8G8R8A8_UNORM,
    R16G16B16A16_SFLOAT,
    R32_SFLOAT,
    R32G32B32A32_SFLOAT,
}

impl TextureFormat {
    /// Size of one texel in bytes
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8_UNORM => 1,
            TextureFormat::R8G8B8A8_SRGB
            | TextureFormat::R8G8B8A8_UNORM
            | TextureFormat::B8G8R8A8_SRGB
            | TextureFormat::B8G8R8A8_UNORM
            | TextureFormat::R32_SFLOAT => 4,
            TextureFormat::R16G16B16A16_SFLOAT => 8,
            TextureFormat::R32G32B32A32_SFLOAT => 16,
        }
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureUsage {
    /// Texture can be sampled in shaders
    Sampled,
    /// Texture can be used as render target
    RenderTarget,
    /// Texture can be used for both
    SampledAndRenderTarget,
}

/// Texture dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureType {
    /// Single 2D texture
    Tex2D,
    /// 2D texture array
    Array2D,
}

// ===== TEXTURE DESC =====

/// Descriptor for creating a texture
#[derive(Debug, Clone)]
pub struct TextureDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: TextureFormat,
    /// Usage flags
    pub usage: TextureUsage,
    /// Number of array layers
    pub array_layers: u32,
    /// Number of mip levels (0 = full chain)
    pub mip_levels: u32,
    /// Texture dimension
    pub texture_type: TextureType,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            format: TextureFormat::R8G8B8A8_UNORM,
            usage: TextureUsage::Sampled,
            array_layers: 1,
            mip_levels: 1,
            texture_type: TextureType::Tex2D,
        }
    }
}

impl TextureDesc {
    /// Number of mips in a full chain down to 1x1
    pub fn full_mip_chain(&self) -> u32 {
        32 - self.width.max(self.height).max(1).leading_zeros()
    }

    /// Size in bytes of one layer of the given mip level
    pub fn mip_size_bytes(&self, mip: u32) -> u64 {
        let width = (self.width >> mip).max(1) as u64;
        let height = (self.height >> mip).max(1) as u64;
        width * height * self.format.bytes_per_pixel() as u64
    }

    /// Size in bytes of one layer including all mips
    pub fn layer_size_bytes(&self) -> u64 {
        (0..self.mip_levels.max(1)).map(|mip| self.mip_size_bytes(mip)).sum()
    }
}

// ===== TEXTURE INFO =====

/// Read-only properties of a created texture
#[derive(Debug, Clone)]
pub struct TextureInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: TextureFormat,
    /// Usage flags
    pub usage: TextureUsage,
    /// Number of array layers
    pub array_layers: u32,
    /// Number of mip levels
    pub mip_levels: u32,
    /// Texture dimension
    pub texture_type: TextureType,
}

impl From<&TextureDesc> for TextureInfo {
    fn from(desc: &TextureDesc) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            usage: desc.usage,
            array_layers: desc.array_layers,
            mip_levels: desc.mip_levels,
            texture_type: desc.texture_type,
        }
    }
}

/// Rectangular part of one mip level, in texels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub mip_level: u32,
}

impl TextureRegion {
    /// The whole extent of `mip_level` for a texture with the given base size
    pub fn full_mip(width: u32, height: u32, mip_level: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width: (width >> mip_level).max(1),
            height: (height >> mip_level).max(1),
            mip_level,
        }
    }
}

// ===== TEXTURE TRAIT =====

/// Texture resource trait
///
/// Implemented by backend-specific texture types.
pub trait Texture: Send + Sync {
    /// Get the read-only properties of this texture
    fn info(&self) -> &TextureInfo;

    /// Upload tightly packed texels into one layer/mip
    fn update_layer(&self, layer: u32, mip_level: u32, data: &[u8]) -> Result<()>;

    /// Read one layer/mip back (host-visible textures only)
    fn read_layer(&self, _layer: u32, _mip_level: u32, _data: &mut [u8]) -> Result<()> {
        Err(Error::InvalidResource("texture is not host readable".to_string()))
    }
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
