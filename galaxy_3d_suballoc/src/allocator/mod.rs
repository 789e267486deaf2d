/// Allocator module - range allocators, growable resources and suballocators
///
/// Leaf-first: `RangeAllocator` and `SpaceAllocator` manage abstract index
/// spaces, `DynamicBuffer` and `DynamicTextureArray` own growable physical
/// resources, and the suballocators combine one of each behind a mutex.

// Module declarations
pub mod range_allocator;
pub mod space_allocator;
pub mod dynamic_buffer;
pub mod dynamic_texture_array;
pub mod buffer_suballocator;
pub mod vertex_pool;
pub mod slice_manager;
pub mod dynamic_texture_atlas;

// Re-export everything
pub use range_allocator::*;
pub use space_allocator::*;
pub use dynamic_buffer::*;
pub use dynamic_texture_array::*;
pub use buffer_suballocator::*;
pub use vertex_pool::*;
pub use slice_manager::*;
pub use dynamic_texture_atlas::*;
