/// Fixed-block object arena and the process-wide per-type registry
///
/// `FixedBlockAllocator<T>` hands out same-size blocks from pages of
/// `blocks_per_page` slots. Storage reservation and object construction are
/// separate steps (`allocate` then `construct`, `destroy` then `free`), and
/// every slot carries a generation counter so that a handle to a freed block
/// can never reach the object that reused its storage.
///
/// # Example
///
/// ```ignore
/// let mut arena = FixedBlockAllocator::<Node>::new(BlockAllocatorConfig::default());
/// let block = arena.allocate();
/// arena.construct(block, Node::default())?;
/// let node = arena.destroy(block);
/// arena.free(block)?;
/// ```

use std::any::{Any, TypeId};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};

/// Arena configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockAllocatorConfig {
    /// Number of blocks allocated at once when the arena runs out of slots
    pub blocks_per_page: u32,
}

impl Default for BlockAllocatorConfig {
    fn default() -> Self {
        Self { blocks_per_page: 64 }
    }
}

/// Generation-checked reference to one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    index: u32,
    generation: u32,
}

impl BlockHandle {
    /// Flat slot index (page * blocks_per_page + offset in page)
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

enum SlotState<T> {
    Free,
    Reserved,
    Occupied(T),
}

struct Slot<T> {
    generation: u32,
    state: SlotState<T>,
}

/// Paged arena of same-size blocks with an index free list
pub struct FixedBlockAllocator<T> {
    pages: Vec<Vec<Slot<T>>>,
    free_list: Vec<u32>,
    blocks_per_page: u32,
    live_blocks: usize,
}

impl<T> FixedBlockAllocator<T> {
    pub fn new(config: BlockAllocatorConfig) -> Self {
        Self {
            pages: Vec::new(),
            free_list: Vec::new(),
            blocks_per_page: config.blocks_per_page.max(1),
            live_blocks: 0,
        }
    }

    fn slot(&self, handle: BlockHandle) -> Option<&Slot<T>> {
        let page = (handle.index / self.blocks_per_page) as usize;
        let offset = (handle.index % self.blocks_per_page) as usize;
        self.pages
            .get(page)
            .and_then(|page| page.get(offset))
            .filter(|slot| slot.generation == handle.generation)
    }

    fn slot_mut(&mut self, handle: BlockHandle) -> Option<&mut Slot<T>> {
        let page = (handle.index / self.blocks_per_page) as usize;
        let offset = (handle.index % self.blocks_per_page) as usize;
        self.pages
            .get_mut(page)
            .and_then(|page| page.get_mut(offset))
            .filter(|slot| slot.generation == handle.generation)
    }

    fn add_page(&mut self) {
        let first = self.pages.len() as u32 * self.blocks_per_page;
        let page = (0..self.blocks_per_page)
            .map(|_| Slot { generation: 0, state: SlotState::Free })
            .collect();
        self.pages.push(page);
        // Reversed so that pop() hands out the lowest index first
        self.free_list.extend((first..first + self.blocks_per_page).rev());
    }

    /// Reserve storage for one object
    ///
    /// The block holds nothing until `construct` is called.
    pub fn allocate(&mut self) -> BlockHandle {
        if self.free_list.is_empty() {
            self.add_page();
        }
        let index = self.free_list.pop().unwrap_or_default();
        let page = (index / self.blocks_per_page) as usize;
        let offset = (index % self.blocks_per_page) as usize;
        let slot = &mut self.pages[page][offset];
        slot.state = SlotState::Reserved;
        self.live_blocks += 1;
        BlockHandle {
            index,
            generation: slot.generation,
        }
    }

    /// Place `value` into a reserved block
    pub fn construct(&mut self, handle: BlockHandle, value: T) -> Result<()> {
        match self.slot_mut(handle) {
            Some(slot) if matches!(slot.state, SlotState::Reserved) => {
                slot.state = SlotState::Occupied(value);
                Ok(())
            }
            Some(_) => Err(Error::InvalidParameter(format!(
                "block {} is not reserved",
                handle.index
            ))),
            None => Err(Error::InvalidResource(format!(
                "stale block handle {} (generation {})",
                handle.index, handle.generation
            ))),
        }
    }

    /// Move the object out of its block, leaving the storage reserved
    pub fn destroy(&mut self, handle: BlockHandle) -> Option<T> {
        let slot = self.slot_mut(handle)?;
        match std::mem::replace(&mut slot.state, SlotState::Reserved) {
            SlotState::Occupied(value) => Some(value),
            other => {
                slot.state = other;
                None
            }
        }
    }

    /// Return reserved storage to the free list
    ///
    /// The object must have been destroyed first.
    pub fn free(&mut self, handle: BlockHandle) -> Result<()> {
        let slot = self.slot_mut(handle).ok_or_else(|| {
            Error::InvalidResource(format!("stale block handle {}", handle.index))
        })?;
        match slot.state {
            SlotState::Reserved => {
                slot.state = SlotState::Free;
                slot.generation = slot.generation.wrapping_add(1);
            }
            SlotState::Occupied(_) => {
                debug_assert!(false, "block {} freed before its object was destroyed", handle.index);
                return Err(Error::InvalidParameter(format!(
                    "block {} still holds an object",
                    handle.index
                )));
            }
            SlotState::Free => {
                return Err(Error::InvalidParameter(format!(
                    "block {} is already free",
                    handle.index
                )));
            }
        }
        self.free_list.push(handle.index);
        self.live_blocks -= 1;
        Ok(())
    }

    /// Allocate and construct in one step
    pub fn insert(&mut self, value: T) -> BlockHandle {
        let handle = self.allocate();
        if let Some(slot) = self.slot_mut(handle) {
            slot.state = SlotState::Occupied(value);
        }
        handle
    }

    /// Destroy and free in one step
    pub fn remove(&mut self, handle: BlockHandle) -> Option<T> {
        let value = self.destroy(handle)?;
        self.free(handle).ok()?;
        Some(value)
    }

    pub fn get(&self, handle: BlockHandle) -> Option<&T> {
        match &self.slot(handle)?.state {
            SlotState::Occupied(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: BlockHandle) -> Option<&mut T> {
        match &mut self.slot_mut(handle)?.state {
            SlotState::Occupied(value) => Some(value),
            _ => None,
        }
    }

    /// Number of blocks currently reserved or occupied
    pub fn len(&self) -> usize {
        self.live_blocks
    }

    pub fn is_empty(&self) -> bool {
        self.live_blocks == 0
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Total number of blocks across all pages
    pub fn capacity(&self) -> usize {
        self.pages.len() * self.blocks_per_page as usize
    }

    pub fn blocks_per_page(&self) -> u32 {
        self.blocks_per_page
    }
}

impl<T> Default for FixedBlockAllocator<T> {
    fn default() -> Self {
        Self::new(BlockAllocatorConfig::default())
    }
}

// ============================================================================
// Registry
// ============================================================================

type SharedArena = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct RegistryState {
    configs: FxHashMap<TypeId, BlockAllocatorConfig>,
    arenas: FxHashMap<TypeId, SharedArena>,
}

static REGISTRY: OnceLock<Mutex<RegistryState>> = OnceLock::new();

fn registry() -> &'static Mutex<RegistryState> {
    REGISTRY.get_or_init(|| Mutex::new(RegistryState::default()))
}

/// Process-wide fixed-block allocators, one per element type
///
/// Arenas are created on first use. `configure::<T>` may only be called
/// before the first `with::<T, _>` call for that type; its configuration is
/// ignored afterwards, so it returns an error instead.
pub struct BlockAllocatorRegistry;

impl BlockAllocatorRegistry {
    /// Set the page size used when the arena for `T` is created
    pub fn configure<T: Send + 'static>(config: BlockAllocatorConfig) -> Result<()> {
        if config.blocks_per_page == 0 {
            return Err(Error::InvalidParameter("blocks_per_page must not be zero".to_string()));
        }
        let mut state = registry().lock().unwrap_or_else(PoisonError::into_inner);
        let type_id = TypeId::of::<T>();
        if state.arenas.contains_key(&type_id) {
            return Err(Error::InitializationFailed(format!(
                "block allocator for {} is already in use",
                std::any::type_name::<T>()
            )));
        }
        state.configs.insert(type_id, config);
        Ok(())
    }

    /// Whether the arena for `T` has been created
    pub fn is_initialized<T: Send + 'static>() -> bool {
        let state = registry().lock().unwrap_or_else(PoisonError::into_inner);
        state.arenas.contains_key(&TypeId::of::<T>())
    }

    fn arena<T: Send + 'static>() -> Arc<Mutex<FixedBlockAllocator<T>>> {
        let mut state = registry().lock().unwrap_or_else(PoisonError::into_inner);
        let type_id = TypeId::of::<T>();
        let config = state.configs.get(&type_id).copied().unwrap_or_default();
        let shared = state
            .arenas
            .entry(type_id)
            .or_insert_with(|| -> SharedArena {
                Arc::new(Mutex::new(FixedBlockAllocator::<T>::new(config)))
            })
            .clone();
        drop(state);
        match shared.downcast::<Mutex<FixedBlockAllocator<T>>>() {
            Ok(arena) => arena,
            // TypeId keys make a type mismatch impossible
            Err(_) => Arc::new(Mutex::new(FixedBlockAllocator::new(config))),
        }
    }

    /// Run `f` with exclusive access to the arena for `T`
    pub fn with<T: Send + 'static, R>(f: impl FnOnce(&mut FixedBlockAllocator<T>) -> R) -> R {
        let arena = Self::arena::<T>();
        let mut guard = arena.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

#[cfg(test)]
#[path = "fixed_block_allocator_tests.rs"]
mod tests;
