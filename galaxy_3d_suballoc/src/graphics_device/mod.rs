/// Graphics device module - the narrow capability surface the allocators consume
///
/// Allocators never talk to a GPU API directly. They create resources through
/// `GraphicsDevice`, migrate content through `CommandList`, and hand replaced
/// resources back through `GraphicsDevice::release_deferred`.

// Module declarations
pub mod graphics_device;
pub mod buffer;
pub mod texture;
pub mod command_list;
pub mod release_queue;

// Re-export everything from graphics_device.rs
pub use graphics_device::*;

// Re-export from other modules
pub use buffer::*;
pub use texture::*;
pub use command_list::*;
pub use release_queue::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
