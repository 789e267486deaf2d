/// Dynamic texture atlas - rectangular regions suballocated from a texture array
///
/// Requests are rounded up to an alignment derived from the region size and
/// placed in alignment-sized cells. Regions of the same alignment share a
/// `SliceBatch`; a slice is taken from the pool of unused slice indices when
/// no active slice of the batch has room, and handed back once it is empty.
///
/// Handing out a slice index beyond the current array size grows the pending
/// array size; the physical array follows on the next `get_texture` call.
///
/// # Example
///
/// ```ignore
/// let atlas = DynamicTextureAtlas::new(Some(&mut device), DynamicTextureAtlasCreateInfo {
///     desc: TextureDesc { width: 512, height: 512, texture_type: TextureType::Array2D, ..Default::default() },
///     min_alignment: 16,
///     ..Default::default()
/// })?;
///
/// let region = atlas.allocate(100, 60).ok_or(Error::OutOfMemory)?;
/// let texture = atlas.get_texture(Some(&mut device), Some(&mut cmd))?;
/// ```

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use glam::{UVec2, Vec4};
use rustc_hash::FxHashMap;
use crate::allocator::{DynamicTextureArray, DynamicTextureArrayCreateInfo, SliceBatch, SpaceRegion};
use crate::error::{Error, Result};
use crate::graphics_device::{
    CommandList, DeviceResource, GraphicsDevice, QueueMask, Texture, TextureDesc, TextureType,
};
use crate::utils::{align_up_u32, is_power_of_two};
use crate::{engine_error, engine_trace};

const LOG_SOURCE: &str = "galaxy3d::DynamicTextureAtlas";

/// Slice count ceiling of atlas texture arrays
pub const MAX_ATLAS_SLICE_COUNT: u32 = 2048;

/// Dynamic texture atlas create information
#[derive(Debug, Clone)]
pub struct DynamicTextureAtlasCreateInfo {
    /// Debug name
    pub name: String,
    /// Atlas texture; `Tex2D` gives a single-slice atlas
    pub desc: TextureDesc,
    /// Smallest region alignment in texels (power of two, 0 = no alignment)
    pub min_alignment: u32,
    /// Slices added each time the array grows (0 = double the array)
    pub extra_slice_count: u32,
    /// Slice count ceiling (0 = `MAX_ATLAS_SLICE_COUNT`)
    pub max_slice_count: u32,
    /// Do not log allocation failures
    pub silent: bool,
}

impl Default for DynamicTextureAtlasCreateInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            desc: TextureDesc {
                texture_type: TextureType::Array2D,
                ..Default::default()
            },
            min_alignment: 64,
            extra_slice_count: 0,
            max_slice_count: MAX_ATLAS_SLICE_COUNT,
            silent: false,
        }
    }
}

/// Snapshot of the atlas counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DynamicTextureAtlasUsageStats {
    /// Memory used by the atlas texture
    pub size: u64,
    pub allocation_count: u32,
    /// Texels of all committed slices
    pub total_area: u64,
    /// Texels requested by live regions
    pub allocated_area: u64,
    /// Texels reserved by live regions after alignment
    pub used_area: u64,
}

enum AtlasTexture {
    Array(DynamicTextureArray),
    /// `version` counts creations and releases of the texture
    Single { texture: Option<Arc<dyn Texture>>, version: u32 },
}

pub struct DynamicTextureAtlas {
    name: String,
    desc: TextureDesc,
    min_alignment: u32,
    extra_slice_count: u32,
    max_slice_count: u32,
    silent: bool,

    texture: Mutex<AtlasTexture>,
    batches: Mutex<FxHashMap<u32, Arc<SliceBatch>>>,
    available_slices: Mutex<BTreeSet<u32>>,
    /// Slice count the texture array must reach on the next `get_texture`
    tex_array_size: AtomicU32,

    allocation_count: AtomicU32,
    allocated_area: AtomicU64,
    used_area: AtomicU64,
}

/// Alignment of a `width` x `height` region: `min_alignment` doubled until
/// it covers the smaller side
pub fn region_alignment(min_alignment: u32, width: u32, height: u32) -> u32 {
    if min_alignment == 0 {
        return 1;
    }
    let mut alignment = min_alignment;
    while width.min(height) > alignment {
        alignment *= 2;
    }
    alignment
}

impl DynamicTextureAtlas {
    pub fn new(
        device: Option<&mut dyn GraphicsDevice>,
        create_info: DynamicTextureAtlasCreateInfo,
    ) -> Result<Arc<Self>> {
        let mut desc = create_info.desc;
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::InitializationFailed(format!(
                "Atlas size must not be zero ({} x {})",
                desc.width, desc.height
            )));
        }
        let min_alignment = create_info.min_alignment;
        if min_alignment != 0 {
            if !is_power_of_two(min_alignment as u64) {
                return Err(Error::InitializationFailed(format!(
                    "Minimum alignment ({}) is not a power of two",
                    min_alignment
                )));
            }
            if desc.width % min_alignment != 0 || desc.height % min_alignment != 0 {
                return Err(Error::InitializationFailed(format!(
                    "Atlas size ({} x {}) is not a multiple of minimum alignment ({})",
                    desc.width, desc.height, min_alignment
                )));
            }
        }
        if desc.mip_levels == 0 {
            desc.mip_levels = desc.full_mip_chain();
        }
        let name = if create_info.name.is_empty() {
            "Dynamic texture atlas".to_string()
        } else {
            create_info.name
        };

        let (max_slice_count, texture) = match desc.texture_type {
            TextureType::Array2D => {
                let max_slice_count = match create_info.max_slice_count {
                    0 => MAX_ATLAS_SLICE_COUNT,
                    count => count.min(MAX_ATLAS_SLICE_COUNT),
                };
                let slices_per_page = if create_info.extra_slice_count != 0 {
                    create_info.extra_slice_count
                } else {
                    desc.array_layers
                };
                let array = DynamicTextureArray::new(device, DynamicTextureArrayCreateInfo {
                    name: name.clone(),
                    desc: desc.clone(),
                    slices_per_page,
                })?;
                (max_slice_count, AtlasTexture::Array(array))
            }
            TextureType::Tex2D => {
                desc.array_layers = 1;
                let texture = match device {
                    Some(device) => Some(device.create_texture(desc.clone())?),
                    None => None,
                };
                let version = texture.is_some() as u32;
                (1, AtlasTexture::Single { texture, version })
            }
        };

        Ok(Arc::new(Self {
            name,
            tex_array_size: AtomicU32::new(desc.array_layers),
            desc,
            min_alignment,
            extra_slice_count: create_info.extra_slice_count,
            max_slice_count,
            silent: create_info.silent,
            texture: Mutex::new(texture),
            batches: Mutex::new(FxHashMap::default()),
            available_slices: Mutex::new((0..max_slice_count).collect()),
            allocation_count: AtomicU32::new(0),
            allocated_area: AtomicU64::new(0),
            used_area: AtomicU64::new(0),
        }))
    }

    fn lock_texture(&self) -> MutexGuard<'_, AtlasTexture> {
        self.texture.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_available_slices(&self) -> MutexGuard<'_, BTreeSet<u32>> {
        self.available_slices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn batch(&self, alignment: u32) -> Arc<SliceBatch> {
        let mut batches = self.batches.lock().unwrap_or_else(PoisonError::into_inner);
        let batch = batches.entry(alignment).or_insert_with(|| {
            Arc::new(SliceBatch::new(self.desc.width / alignment, self.desc.height / alignment))
        });
        Arc::clone(batch)
    }

    fn existing_batch(&self, alignment: u32) -> Option<Arc<SliceBatch>> {
        let batches = self.batches.lock().unwrap_or_else(PoisonError::into_inner);
        batches.get(&alignment).cloned()
    }

    /// Take the lowest unused slice index, growing the array size to cover it
    fn next_available_slice(&self) -> Option<u32> {
        let mut available = self.lock_available_slices();
        let slice = available.pop_first()?;
        while self.tex_array_size.load(Ordering::Acquire) <= slice {
            let size = self.tex_array_size.load(Ordering::Acquire);
            let extra = if self.extra_slice_count != 0 {
                self.extra_slice_count
            } else {
                size.max(1)
            };
            self.tex_array_size.store((size + extra).min(self.max_slice_count), Ordering::Release);
        }
        Some(slice)
    }

    fn recycle_slice(&self, slice: u32) {
        let inserted = self.lock_available_slices().insert(slice);
        debug_assert!(inserted, "slice {} is already available", slice);
    }

    /// Suballocate a `width` x `height` texel region
    ///
    /// Active slices are searched by increasing index before a new slice is
    /// taken. Returns `None` when every slice up to the ceiling is full.
    pub fn allocate(self: &Arc<Self>, width: u32, height: u32) -> Option<Arc<TextureAtlasSuballocation>> {
        debug_assert!(width > 0 && height > 0, "region size must not be zero");
        if width == 0 || height == 0 {
            engine_error!(LOG_SOURCE, "Invalid region size {} x {} requested from '{}'", width, height, self.name);
            return None;
        }
        if width > self.desc.width || height > self.desc.height {
            engine_error!(LOG_SOURCE,
                "Requested region size {} x {} exceeds atlas dimensions {} x {}",
                width, height, self.desc.width, self.desc.height);
            return None;
        }

        let alignment = region_alignment(self.min_alignment, width, height);
        let aligned_width = align_up_u32(width, alignment);
        let aligned_height = align_up_u32(height, alignment);
        let batch = self.batch(alignment);
        // Rounding up can exceed the plane when the alignment does not divide it
        let cells = (aligned_width / alignment, aligned_height / alignment);
        if cells.0 > batch.width() || cells.1 > batch.height() {
            if !self.silent {
                engine_error!(LOG_SOURCE,
                    "Region {} x {} aligned to {} does not fit in atlas '{}' ({} x {})",
                    width, height, alignment, self.name, self.desc.width, self.desc.height);
            }
            return None;
        }

        let mut found = None;
        let mut slice = 0;
        while slice < self.max_slice_count {
            let guard = match batch.lock_slice_after(slice) {
                Some(guard) => guard,
                None => match self.next_available_slice() {
                    Some(new_slice) => batch.add_slice(new_slice),
                    // Another thread may have added a slice meanwhile
                    None => match batch.lock_slice_after(slice) {
                        Some(guard) => guard,
                        None => break,
                    },
                },
            };
            slice = guard.slice();
            if let Some(region) = guard.allocate(cells.0, cells.1) {
                found = Some((slice, region));
                break;
            }
            drop(guard);
            // Frees into this slice may have emptied it while it was pinned here
            if batch.purge(slice) {
                self.recycle_slice(slice);
            }
            slice += 1;
        }

        let Some((slice, region)) = found else {
            if !self.silent {
                engine_error!(LOG_SOURCE,
                    "Failed to suballocate texture region {} x {} from '{}'",
                    width, height, self.name);
            }
            return None;
        };

        self.allocated_area.fetch_add(width as u64 * height as u64, Ordering::Relaxed);
        self.used_area.fetch_add(aligned_width as u64 * aligned_height as u64, Ordering::Relaxed);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);

        let origin = UVec2::new(region.x * alignment, region.y * alignment);
        engine_trace!(LOG_SOURCE,
            "'{}': allocated {} x {} at ({}, {}) in slice {}",
            self.name, width, height, origin.x, origin.y, slice);

        Some(Arc::new(TextureAtlasSuballocation {
            atlas: Arc::clone(self),
            region: Some(region),
            slice,
            alignment,
            origin,
            size: UVec2::new(width, height),
            user_data: Mutex::new(None),
        }))
    }

    fn free(&self, slice: u32, alignment: u32, region: SpaceRegion, size: UVec2) {
        let used_area = region.area() * alignment as u64 * alignment as u64;
        let Some(batch) = self.existing_batch(alignment) else {
            debug_assert!(false, "no slices with alignment {} in '{}'", alignment, self.name);
            return;
        };
        match batch.lock_slice(slice) {
            // The batch mutex is not held while the region is returned
            Some(guard) => guard.free(region),
            None => {
                debug_assert!(false, "slice {} is not active for alignment {}", slice, alignment);
                return;
            }
        }
        // Always try: the slice may have been emptied by another thread
        if batch.purge(slice) {
            self.recycle_slice(slice);
            engine_trace!(LOG_SOURCE, "'{}': slice {} released", self.name, slice);
        }

        self.allocated_area.fetch_sub(size.x as u64 * size.y as u64, Ordering::Relaxed);
        self.used_area.fetch_sub(used_area, Ordering::Relaxed);
        self.allocation_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Bring the atlas texture up to the slice count in use and return it
    ///
    /// Must not be called concurrently with itself. Returns `Ok(None)` while
    /// the texture needs a device that is missing.
    pub fn get_texture(
        &self,
        device: Option<&mut dyn GraphicsDevice>,
        context: Option<&mut dyn CommandList>,
    ) -> Result<Option<Arc<dyn Texture>>> {
        let mut texture = self.lock_texture();
        match &mut *texture {
            AtlasTexture::Array(array) => {
                let array_size = self.tex_array_size.load(Ordering::Acquire);
                if array_size > array.pending_size() {
                    array.resize(device, context, array_size, false)
                } else {
                    array.get_texture(device, context)
                }
            }
            AtlasTexture::Single { texture, version } => {
                if texture.is_none() {
                    let Some(device) = device else {
                        return Ok(None);
                    };
                    *texture = Some(device.create_texture(self.desc.clone())?);
                    *version += 1;
                }
                Ok(texture.clone())
            }
        }
    }

    /// Changes every time the atlas texture is replaced
    pub fn version(&self) -> u32 {
        match &*self.lock_texture() {
            AtlasTexture::Array(array) => array.version(),
            AtlasTexture::Single { version, .. } => *version,
        }
    }

    /// Whether the next `get_texture` call will create or replace the texture
    pub fn pending_update(&self) -> bool {
        match &*self.lock_texture() {
            AtlasTexture::Array(array) => {
                self.tex_array_size.load(Ordering::Acquire) > array.array_size() || array.pending_update()
            }
            AtlasTexture::Single { texture, .. } => texture.is_none(),
        }
    }

    /// Description of the committed atlas texture
    pub fn atlas_desc(&self) -> TextureDesc {
        match &*self.lock_texture() {
            AtlasTexture::Array(array) => array.desc().clone(),
            AtlasTexture::Single { .. } => self.desc.clone(),
        }
    }

    pub fn usage_stats(&self) -> DynamicTextureAtlasUsageStats {
        let plane = self.desc.width as u64 * self.desc.height as u64;
        let (size, total_area) = match &*self.lock_texture() {
            AtlasTexture::Array(array) => (array.memory_usage(), plane * array.array_size() as u64),
            AtlasTexture::Single { .. } => (self.desc.layer_size_bytes(), plane),
        };
        DynamicTextureAtlasUsageStats {
            size,
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
            total_area,
            allocated_area: self.allocated_area.load(Ordering::Relaxed),
            used_area: self.used_area.load(Ordering::Relaxed),
        }
    }

    pub fn allocation_count(&self) -> u32 {
        self.allocation_count.load(Ordering::Relaxed)
    }

    /// Slice count the texture array grows to on the next `get_texture`
    pub fn pending_array_size(&self) -> u32 {
        self.tex_array_size.load(Ordering::Acquire)
    }

    /// Number of slices currently not used by any batch
    pub fn available_slice_count(&self) -> usize {
        self.lock_available_slices().len()
    }

    pub fn max_slice_count(&self) -> u32 {
        self.max_slice_count
    }

    pub fn min_alignment(&self) -> u32 {
        self.min_alignment
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the atlas texture through the device
    ///
    /// The next `get_texture` call with a device creates it again.
    pub fn release_resources(&self, device: &mut dyn GraphicsDevice) {
        match &mut *self.lock_texture() {
            AtlasTexture::Array(array) => array.release_resources(device),
            AtlasTexture::Single { texture, version } => {
                if let Some(texture) = texture.take() {
                    device.release_deferred(DeviceResource::Texture(texture), QueueMask::all());
                    *version += 1;
                }
            }
        }
    }
}

impl Drop for DynamicTextureAtlas {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.allocation_count.load(Ordering::Relaxed), 0,
            "Texture atlas '{}' destroyed with live allocations", self.name
        );
        debug_assert_eq!(self.allocated_area.load(Ordering::Relaxed), 0);
        debug_assert_eq!(self.used_area.load(Ordering::Relaxed), 0);
        debug_assert_eq!(
            self.available_slices.get_mut().unwrap_or_else(PoisonError::into_inner).len(),
            self.max_slice_count as usize,
            "Texture atlas '{}' destroyed with active slices", self.name
        );
    }
}

// ============================================================================
// Atlas suballocation handle
// ============================================================================

/// One region of a `DynamicTextureAtlas`; dropping the last reference frees it
pub struct TextureAtlasSuballocation {
    atlas: Arc<DynamicTextureAtlas>,
    region: Option<SpaceRegion>,
    slice: u32,
    alignment: u32,
    origin: UVec2,
    size: UVec2,
    user_data: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

impl TextureAtlasSuballocation {
    /// Top-left corner in texels
    pub fn origin(&self) -> UVec2 {
        self.origin
    }

    /// Requested size in texels
    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn slice(&self) -> u32 {
        self.slice
    }

    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    /// `(size / atlas size, origin / atlas size)` for texture coordinate transforms
    pub fn uv_scale_bias(&self) -> Vec4 {
        let atlas_size = UVec2::new(self.atlas.width(), self.atlas.height()).as_vec2();
        let scale = self.size.as_vec2() / atlas_size;
        let bias = self.origin.as_vec2() / atlas_size;
        Vec4::new(scale.x, scale.y, bias.x, bias.y)
    }

    pub fn atlas(&self) -> &Arc<DynamicTextureAtlas> {
        &self.atlas
    }

    pub fn user_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.user_data.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_user_data(&self, user_data: Option<Arc<dyn Any + Send + Sync>>) {
        *self.user_data.lock().unwrap_or_else(PoisonError::into_inner) = user_data;
    }
}

impl Drop for TextureAtlasSuballocation {
    fn drop(&mut self) {
        if let Some(region) = self.region.take() {
            self.atlas.free(self.slice, self.alignment, region, self.size);
        }
    }
}

#[cfg(test)]
#[path = "dynamic_texture_atlas_tests.rs"]
mod tests;
