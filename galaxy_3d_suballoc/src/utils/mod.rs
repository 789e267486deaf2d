/// Utility module - small helpers shared by the allocators

pub mod align;
pub mod fixed_block_allocator;

pub use align::*;
pub use fixed_block_allocator::*;
