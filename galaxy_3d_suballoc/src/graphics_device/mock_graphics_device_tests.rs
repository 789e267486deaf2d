//! Unit tests for MockGraphicsDevice and associated mock types

use std::sync::Arc;
use crate::graphics_device::mock_graphics_device::*;
use crate::graphics_device::{
    Buffer, BufferDesc, CommandList, DeviceResource, GraphicsDevice, QueueMask,
    Texture, TextureDesc, TextureRegion, TextureType,
};
use crate::error::Error;

fn array_desc(width: u32, height: u32, layers: u32) -> TextureDesc {
    TextureDesc {
        width,
        height,
        array_layers: layers,
        texture_type: TextureType::Array2D,
        ..Default::default()
    }
}

#[test]
fn test_mock_buffer_update_and_read() {
    let buffer = MockBuffer::new(16, "test_buffer".to_string());
    buffer.update(4, &[1, 2, 3]).unwrap();

    let mut out = [0u8; 5];
    buffer.read(3, &mut out).unwrap();
    assert_eq!(out, [0, 1, 2, 3, 0]);

    assert!(buffer.update(15, &[1, 2]).is_err());
}

#[test]
fn test_mock_texture_layers() {
    let texture = MockTexture::new(&array_desc(2, 2, 3), "tex".to_string());
    let texels = [7u8; 16];
    texture.update_layer(2, 0, &texels).unwrap();

    let mut out = [0u8; 16];
    texture.read_layer(2, 0, &mut out).unwrap();
    assert_eq!(out, texels);
    texture.read_layer(0, 0, &mut out).unwrap();
    assert_eq!(out, [0u8; 16]);

    assert!(texture.update_layer(3, 0, &texels).is_err());
    assert!(texture.update_layer(0, 0, &texels[..4]).is_err());
}

#[test]
fn test_mock_command_list_copies_buffer_bytes() {
    let src: Arc<dyn Buffer> = Arc::new(MockBuffer::new(8, "src".to_string()));
    let dst: Arc<dyn Buffer> = Arc::new(MockBuffer::new(16, "dst".to_string()));
    src.update(0, &[9, 8, 7, 6, 5, 4, 3, 2]).unwrap();

    let mut cmd = MockCommandList::new();
    cmd.copy_buffer_region(&src, 2, &dst, 10, 4).unwrap();

    let mut out = [0u8; 4];
    dst.read(10, &mut out).unwrap();
    assert_eq!(out, [7, 6, 5, 4]);
    assert_eq!(cmd.commands, vec!["copy_buffer_region 4".to_string()]);
}

#[test]
fn test_mock_command_list_copies_texture_slice() {
    let src: Arc<dyn Texture> = Arc::new(MockTexture::new(&array_desc(1, 1, 2), "src".to_string()));
    let dst: Arc<dyn Texture> = Arc::new(MockTexture::new(&array_desc(1, 1, 4), "dst".to_string()));
    src.update_layer(1, 0, &[1, 2, 3, 4]).unwrap();

    let mut cmd = MockCommandList::new();
    cmd.copy_texture_slice(&src, 1, &dst, 1, TextureRegion::full_mip(1, 1, 0)).unwrap();

    let mut out = [0u8; 4];
    dst.read_layer(1, 0, &mut out).unwrap();
    assert_eq!(out, [1, 2, 3, 4]);
}

#[test]
fn test_mock_graphics_device_records_creations() {
    let mut device = MockGraphicsDevice::new();
    device.create_buffer(BufferDesc { size: 1024, ..Default::default() }).unwrap();
    device.create_texture(array_desc(256, 256, 2)).unwrap();

    assert_eq!(device.get_created_buffers(), vec!["buffer_1024".to_string()]);
    assert_eq!(device.get_created_textures(), vec!["texture_256x256x2".to_string()]);
}

#[test]
fn test_mock_graphics_device_size_limit() {
    let mut device = MockGraphicsDevice::new();
    device.max_resource_size = Some(512);
    let result = device.create_buffer(BufferDesc { size: 1024, ..Default::default() });
    assert!(matches!(result, Err(Error::OutOfMemory)));
    assert!(device.get_created_buffers().is_empty());
}

#[test]
fn test_mock_graphics_device_deferred_release() {
    let mut device = MockGraphicsDevice::new();
    let buffer = device.create_buffer(BufferDesc { size: 64, ..Default::default() }).unwrap();
    device.release_deferred(DeviceResource::Buffer(buffer.clone()), QueueMask::GRAPHICS);

    assert_eq!(device.release_queue().len(), 1);
    assert_eq!(Arc::strong_count(&buffer), 2);

    assert_eq!(device.finish_frame(), 1);
    assert_eq!(Arc::strong_count(&buffer), 1);
}
