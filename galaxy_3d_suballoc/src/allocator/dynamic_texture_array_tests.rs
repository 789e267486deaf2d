//! Unit tests for dynamic_texture_array.rs

use crate::allocator::{DynamicTextureArray, DynamicTextureArrayCreateInfo};
use crate::error::Error;
use crate::graphics_device::mock_graphics_device::{MockCommandList, MockGraphicsDevice};
use crate::graphics_device::{CommandList, GraphicsDevice, Texture, TextureDesc, TextureType};

fn device(device: &mut MockGraphicsDevice) -> Option<&mut dyn GraphicsDevice> {
    Some(device)
}

fn context(context: &mut MockCommandList) -> Option<&mut dyn CommandList> {
    Some(context)
}

fn create_info(slices: u32, mip_levels: u32, slices_per_page: u32) -> DynamicTextureArrayCreateInfo {
    DynamicTextureArrayCreateInfo {
        name: "test array".to_string(),
        desc: TextureDesc {
            width: 4,
            height: 4,
            array_layers: slices,
            mip_levels,
            texture_type: TextureType::Array2D,
            ..Default::default()
        },
        slices_per_page,
    }
}

#[test]
fn test_rejects_non_array_texture() {
    let mut info = create_info(1, 1, 1);
    info.desc.texture_type = TextureType::Tex2D;
    assert!(matches!(DynamicTextureArray::new(None, info), Err(Error::InitializationFailed(_))));
}

#[test]
fn test_rejects_zero_extent() {
    let mut info = create_info(1, 1, 1);
    info.desc.height = 0;
    assert!(DynamicTextureArray::new(None, info).is_err());
}

#[test]
fn test_zero_mip_levels_means_full_chain() {
    let array = DynamicTextureArray::new(None, create_info(0, 0, 1)).unwrap();
    assert_eq!(array.desc().mip_levels, 3);
}

#[test]
fn test_created_immediately_with_device() {
    let mut dev = MockGraphicsDevice::new();
    let array = DynamicTextureArray::new(device(&mut dev), create_info(2, 1, 1)).unwrap();
    assert_eq!(array.array_size(), 2);
    assert_eq!(array.version(), 1);
    assert_eq!(dev.get_created_textures(), vec!["texture_4x4x2".to_string()]);
}

#[test]
fn test_empty_array_has_no_texture() {
    let mut dev = MockGraphicsDevice::new();
    let mut array = DynamicTextureArray::new(device(&mut dev), create_info(0, 1, 1)).unwrap();
    assert!(!array.pending_update());
    assert!(array.get_texture(device(&mut dev), None).unwrap().is_none());
    assert!(dev.get_created_textures().is_empty());
    assert_eq!(array.version(), 0);
}

#[test]
fn test_resize_copies_every_slice_and_mip() {
    let mut dev = MockGraphicsDevice::new();
    let mut cmd = MockCommandList::new();
    let mut array = DynamicTextureArray::new(device(&mut dev), create_info(2, 2, 1)).unwrap();

    let old = array.get_texture(None, None).unwrap().unwrap();
    old.update_layer(1, 0, &[3u8; 64]).unwrap();

    let new = array.resize(device(&mut dev), context(&mut cmd), 5, false).unwrap().unwrap();
    assert_eq!(new.info().array_layers, 5);
    assert_eq!(array.version(), 2);
    assert_eq!(cmd.commands, vec![
        "copy_texture_slice 0->0 mip 0".to_string(),
        "copy_texture_slice 0->0 mip 1".to_string(),
        "copy_texture_slice 1->1 mip 0".to_string(),
        "copy_texture_slice 1->1 mip 1".to_string(),
    ]);

    let mut texels = [0u8; 64];
    new.read_layer(1, 0, &mut texels).unwrap();
    assert_eq!(texels, [3u8; 64]);
    assert_eq!(dev.release_queue().len(), 1);
}

#[test]
fn test_slices_per_page_rounds_array_size() {
    let mut dev = MockGraphicsDevice::new();
    let mut array = DynamicTextureArray::new(device(&mut dev), create_info(1, 1, 4)).unwrap();
    assert_eq!(array.array_size(), 4);

    array.resize(device(&mut dev), None, 5, false).unwrap();
    assert_eq!(array.array_size(), 8);
    assert_eq!(array.memory_usage(), 8 * 4 * 4 * 4);
}

#[test]
fn test_pending_resize_needs_device() {
    let mut dev = MockGraphicsDevice::new();
    let mut array = DynamicTextureArray::new(device(&mut dev), create_info(1, 1, 1)).unwrap();

    assert!(array.resize(None, None, 3, false).unwrap().is_none());
    assert!(array.pending_update());
    assert_eq!(array.pending_size(), 3);
    assert_eq!(array.array_size(), 1);

    let texture = array.get_texture(device(&mut dev), None).unwrap().unwrap();
    assert_eq!(texture.info().array_layers, 3);
    assert!(!array.pending_update());
}

#[test]
fn test_same_size_resize_keeps_texture() {
    let mut dev = MockGraphicsDevice::new();
    let mut array = DynamicTextureArray::new(device(&mut dev), create_info(2, 1, 1)).unwrap();
    array.resize(device(&mut dev), None, 2, false).unwrap();
    assert_eq!(array.version(), 1);
    assert_eq!(dev.get_created_textures().len(), 1);
}

#[test]
fn test_resize_to_zero_releases_texture() {
    let mut dev = MockGraphicsDevice::new();
    let mut array = DynamicTextureArray::new(device(&mut dev), create_info(2, 1, 1)).unwrap();
    assert!(array.resize(device(&mut dev), None, 0, false).unwrap().is_none());
    assert_eq!(array.array_size(), 0);
    assert_eq!(array.memory_usage(), 0);
    assert_eq!(array.version(), 2);
    assert_eq!(dev.finish_frame(), 1);
}

#[test]
fn test_device_failure_is_reported() {
    let mut dev = MockGraphicsDevice::new();
    let mut array = DynamicTextureArray::new(device(&mut dev), create_info(1, 1, 1)).unwrap();
    dev.max_resource_size = Some(64);

    let result = array.resize(device(&mut dev), None, 16, false);
    assert!(matches!(result, Err(Error::OutOfMemory)));
    assert_eq!(array.array_size(), 1);
    assert!(array.pending_update());
}
