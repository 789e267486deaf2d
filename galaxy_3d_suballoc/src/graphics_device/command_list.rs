/// Command list trait - the copy capability used while migrating resources

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{Buffer, Texture, TextureRegion};

/// Command recording interface used by resize migrations
///
/// Only copies are required: allocators never record draws or dispatches.
pub trait CommandList: Send {
    /// Copy `size` bytes from `src[src_offset..]` to `dst[dst_offset..]`
    fn copy_buffer_region(
        &mut self,
        src: &Arc<dyn Buffer>,
        src_offset: u64,
        dst: &Arc<dyn Buffer>,
        dst_offset: u64,
        size: u64,
    ) -> Result<()>;

    /// Copy `region` of one array slice into another texture's slice
    fn copy_texture_slice(
        &mut self,
        src: &Arc<dyn Texture>,
        src_slice: u32,
        dst: &Arc<dyn Texture>,
        dst_slice: u32,
        region: TextureRegion,
    ) -> Result<()>;
}

/// Reborrow an optional command list for one more call
pub fn reborrow_context<'a>(context: &'a mut Option<&mut dyn CommandList>) -> Option<&'a mut dyn CommandList> {
    match context {
        Some(context) => Some(&mut **context),
        None => None,
    }
}
