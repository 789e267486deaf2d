//! Unit tests for texture.rs

use crate::graphics_device::{TextureDesc, TextureFormat, TextureInfo, TextureRegion, TextureType};

fn desc(width: u32, height: u32, mip_levels: u32) -> TextureDesc {
    TextureDesc {
        width,
        height,
        mip_levels,
        texture_type: TextureType::Array2D,
        ..Default::default()
    }
}

#[test]
fn test_bytes_per_pixel() {
    assert_eq!(TextureFormat::R8_UNORM.bytes_per_pixel(), 1);
    assert_eq!(TextureFormat::R8G8B8A8_UNORM.bytes_per_pixel(), 4);
    assert_eq!(TextureFormat::R16G16B16A16_SFLOAT.bytes_per_pixel(), 8);
    assert_eq!(TextureFormat::R32G32B32A32_SFLOAT.bytes_per_pixel(), 16);
}

#[test]
fn test_full_mip_chain() {
    assert_eq!(desc(512, 512, 0).full_mip_chain(), 10);
    assert_eq!(desc(512, 128, 0).full_mip_chain(), 10);
    assert_eq!(desc(1, 1, 0).full_mip_chain(), 1);
}

#[test]
fn test_mip_and_layer_sizes() {
    let d = desc(64, 32, 3);
    assert_eq!(d.mip_size_bytes(0), 64 * 32 * 4);
    assert_eq!(d.mip_size_bytes(1), 32 * 16 * 4);
    assert_eq!(d.mip_size_bytes(10), 4);
    assert_eq!(d.layer_size_bytes(), (64 * 32 + 32 * 16 + 16 * 8) * 4);
}

#[test]
fn test_region_full_mip_clamps_to_one() {
    let region = TextureRegion::full_mip(8, 2, 2);
    assert_eq!((region.width, region.height), (2, 1));
    assert_eq!(region.mip_level, 2);
}

#[test]
fn test_info_from_desc() {
    let info = TextureInfo::from(&desc(128, 64, 1));
    assert_eq!(info.width, 128);
    assert_eq!(info.height, 64);
    assert_eq!(info.texture_type, TextureType::Array2D);
}
