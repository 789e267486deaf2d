/*!
# Galaxy 3D Suballocation

GPU memory suballocation for the Galaxy 3D engine.

Many small logical allocations (per-mesh vertex ranges, per-object constant
blocks, atlas regions for glyphs or lightmaps) are carved out of a few large
physical resources that grow on demand. Allocation handles stay valid while
the physical resource is replaced underneath them.

## Architecture

- **RangeAllocator**: free-list allocator over a 1-D index space
- **SpaceAllocator**: 2-D shelf allocator over a fixed-size plane
- **DynamicBuffer / DynamicTextureArray**: growable physical resources with a version counter
- **BufferSuballocator**: byte ranges of one growable buffer
- **VertexPool**: vertex ranges shared by several per-attribute buffers
- **DynamicTextureAtlas**: rectangular regions of a growable texture array
- **FixedBlockAllocator**: paged arena for same-size CPU objects

Physical resources are created through the `GraphicsDevice` trait, migrated
through `CommandList`, and handed back with `GraphicsDevice::release_deferred`
so that in-flight GPU work never sees them disappear.
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod graphics_device;
pub mod utils;
pub mod allocator;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton
    pub use crate::engine::Engine;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
        // Note: engine_* macros are NOT re-exported here - they are internal only
    }

    // Device capability sub-module
    pub mod device {
        pub use crate::graphics_device::*;
    }

    // Allocator sub-module
    pub mod alloc {
        pub use crate::allocator::*;
    }

    // Utility sub-module
    pub mod utils {
        pub use crate::utils::*;
    }
}

// Re-export math library at crate root
pub use glam;
