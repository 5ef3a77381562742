//! Memory Module - one object memory instance
//!
//! [`Memory`] owns everything a single interpreter instance needs: the heap,
//! the allocator, the collector with its epoch, the root set and the type
//! registry. Instances share nothing, so several can run on different
//! threads at once.
//!
//! ## Allocation Flow
//!
//! 1. Large object -> dedicated segment
//! 2. First fit in an existing normal segment
//! 3. No room and collection permitted -> collect, add a segment early if
//!    the free ratio stays below `expansion_free_ratio`, retry
//! 4. Still no room -> new segment; past `max_heap_size` this is the fatal
//!    `OutOfMemory`
//!
//! ## Rooting
//!
//! Any allocation may collect. A reference kept only in a Rust local across
//! an allocation must be rooted first ([`Memory::add_root`] or
//! [`Memory::hold`]); table and list operations do this for their own
//! intermediates.

use std::any::type_name;
use std::ops::{Deref, DerefMut};

use crate::allocator::{Allocator, AllocatorStats};
use crate::config::MemoryConfig;
use crate::error::{MemoryError, Result};
use crate::gc::{CollectionReason, Collector};
use crate::heap::Heap;
use crate::logging::{self, MemoryEvent};
use crate::marker::{GeneralMarker, MarkReason, RootHandle, RootKind, RootSet};
use crate::object::header::allocation_size;
use crate::object::{
    ArrayObject, BufferObject, HeapObject, ObjectHeader, ObjectRef, RestoreFn, StringObject,
    TypeInfo, TypeRegistry, TypeTag,
};
use crate::stats::{CycleStats, GcStats, MemoryStats};

/// One object memory instance
#[derive(Debug)]
pub struct Memory {
    config: MemoryConfig,
    heap: Heap,
    allocator: Allocator,
    collector: Collector,
    roots: RootSet,
    types: TypeRegistry,

    /// Nesting depth of collection inhibition
    inhibit: usize,
}

impl Memory {
    /// Create a new instance
    ///
    /// # Arguments
    /// * `config` - memory configuration, validated here
    ///
    /// # Examples
    /// ```rust
    /// use omem::{Memory, MemoryConfig, RootKind};
    ///
    /// let mut memory = Memory::new(MemoryConfig::default())?;
    /// let name = memory.allocate_string("main")?;
    /// memory.add_root(RootKind::Global, name, Some("entry"));
    /// memory.gc()?;
    /// assert!(memory.contains(name));
    /// # Ok::<(), omem::MemoryError>(())
    /// ```
    pub fn new(config: MemoryConfig) -> Result<Self> {
        config.validate()?;

        let heap = Heap::new(&config)?;
        Ok(Self {
            allocator: Allocator::new(&config),
            collector: Collector::new(&config),
            roots: RootSet::new(),
            types: TypeRegistry::with_builtins(),
            inhibit: 0,
            heap,
            config,
        })
    }

    /// Instance with the default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(MemoryConfig::default())
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub(crate) fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    // === Types ===

    /// Register a runtime-defined type for image restore
    pub fn register_type(
        &mut self,
        tag: TypeTag,
        name: &'static str,
        restore: RestoreFn,
    ) -> Option<TypeInfo> {
        self.types.register(tag, name, restore)
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    // === Allocation ===

    /// Store an object in a new slot
    ///
    /// The slot size is computed from `object.data_size()` once, here.
    pub fn allocate(&mut self, object: Box<dyn HeapObject>) -> Result<ObjectRef> {
        let size = allocation_size(object.data_size());
        let r = self.reserve(object.type_tag(), size)?;
        self.heap.install(r, object)?;
        Ok(r)
    }

    pub fn allocate_string(&mut self, value: impl Into<String>) -> Result<ObjectRef> {
        self.allocate(Box::new(StringObject::new(value)))
    }

    /// Array of `len` null elements
    pub fn allocate_array(&mut self, len: usize) -> Result<ObjectRef> {
        self.allocate(Box::new(ArrayObject::with_len(len)))
    }

    /// Zeroed byte buffer of `size` bytes
    pub fn allocate_buffer(&mut self, size: usize) -> Result<ObjectRef> {
        self.allocate(Box::new(BufferObject::zeroed(size)))
    }

    /// Reserve an empty slot of `size` bytes tagged `tag`
    ///
    /// The header carries the epoch current when the slot is finally
    /// placed, so a slot reserved after a collection is live in the new
    /// epoch.
    pub(crate) fn reserve(&mut self, tag: TypeTag, size: usize) -> Result<ObjectRef> {
        if self.allocator.is_large(size) {
            let header = ObjectHeader::new(tag, size, self.collector.epoch());
            match self.allocator.reserve_large(&mut self.heap, header) {
                Ok(r) => return Ok(r),
                Err(e) if e.is_fatal() && self.can_collect() => {
                    self.collect(CollectionReason::AllocationFailure)?;
                },
                Err(e) => return Err(self.allocation_failed(size, e)),
            }

            let header = ObjectHeader::new(tag, size, self.collector.epoch());
            return match self.allocator.reserve_large(&mut self.heap, header) {
                Ok(r) => Ok(r),
                Err(e) => Err(self.allocation_failed(size, e)),
            };
        }

        let header = ObjectHeader::new(tag, size, self.collector.epoch());
        if let Some(r) = self.allocator.try_reserve(&mut self.heap, header) {
            return Ok(r);
        }

        if self.can_collect() {
            self.collect(CollectionReason::AllocationFailure)?;

            if self.heap.normal_free_ratio() < self.config.expansion_free_ratio {
                if let Err(e) = self.heap.acquire_normal_segment() {
                    log::debug!("early expansion refused: {}", e);
                }
            }

            let header = ObjectHeader::new(tag, size, self.collector.epoch());
            if let Some(r) = self.allocator.try_reserve(&mut self.heap, header) {
                return Ok(r);
            }
        }

        let header = ObjectHeader::new(tag, size, self.collector.epoch());
        match self.allocator.reserve_in_new_segment(&mut self.heap, header) {
            Ok(r) => Ok(r),
            Err(e) => Err(self.allocation_failed(size, e)),
        }
    }

    fn allocation_failed(&self, size: usize, error: MemoryError) -> MemoryError {
        log::error!("allocation of {} bytes failed: {}", size, error);
        if self.config.verbose {
            logging::log_event(MemoryEvent::AllocationFailure {
                size,
                heap_used: self.heap.used_bytes(),
            });
        }
        error
    }

    pub fn allocator_stats(&self) -> AllocatorStats {
        self.allocator.stats()
    }

    // === Object Access ===

    pub fn object(&self, r: ObjectRef) -> Result<&dyn HeapObject> {
        self.heap.object(r)
    }

    pub fn object_mut(&mut self, r: ObjectRef) -> Result<&mut dyn HeapObject> {
        self.heap.object_mut(r)
    }

    /// Object at `r` as a concrete type
    pub fn get<T: HeapObject>(&self, r: ObjectRef) -> Result<&T> {
        let object = self.heap.object(r)?;
        let found = object.type_name();
        object
            .as_any()
            .downcast_ref::<T>()
            .ok_or(MemoryError::TypeMismatch {
                reference: r,
                expected: short_type_name::<T>(),
                found,
            })
    }

    /// Object at `r` as a concrete type, mutably
    pub fn get_mut<T: HeapObject>(&mut self, r: ObjectRef) -> Result<&mut T> {
        let object = self.heap.object_mut(r)?;
        let found = object.type_name();
        match object.as_any_mut().downcast_mut::<T>() {
            Some(object) => Ok(object),
            None => Err(MemoryError::TypeMismatch {
                reference: r,
                expected: short_type_name::<T>(),
                found,
            }),
        }
    }

    pub fn type_tag(&self, r: ObjectRef) -> Result<TypeTag> {
        Ok(self.heap.header(r)?.type_tag())
    }

    /// Slot size of the object at `r`, header included
    pub fn size_of(&self, r: ObjectRef) -> Result<usize> {
        Ok(self.heap.header(r)?.size())
    }

    pub fn contains(&self, r: ObjectRef) -> bool {
        self.heap.contains(r)
    }

    /// Objects directly owned by `r`, in report order
    pub fn children(&self, r: ObjectRef) -> Result<Vec<ObjectRef>> {
        let mut marker = GeneralMarker::new(MarkReason::Verify);
        self.heap
            .object(r)?
            .live_general(MarkReason::Verify, &mut marker);
        Ok(marker.take_pending())
    }

    // === Roots ===

    pub fn add_root(&mut self, kind: RootKind, target: ObjectRef, name: Option<&str>) -> RootHandle {
        self.roots.register(kind, target, name)
    }

    pub fn remove_root(&mut self, handle: RootHandle) -> Option<ObjectRef> {
        self.roots.unregister(handle)
    }

    pub fn update_root(&mut self, handle: RootHandle, target: ObjectRef) -> bool {
        self.roots.update(handle, target)
    }

    pub fn root(&self, handle: RootHandle) -> Option<ObjectRef> {
        self.roots.get(handle)
    }

    pub fn roots(&self) -> &RootSet {
        &self.roots
    }

    pub fn roots_mut(&mut self) -> &mut RootSet {
        &mut self.roots
    }

    /// Pin an object until the matching [`release`](Self::release)
    pub fn hold(&mut self, target: ObjectRef) {
        self.roots.hold(target);
    }

    pub fn release(&mut self, target: ObjectRef) -> bool {
        self.roots.release(target)
    }

    /// Run `f` with `held` pinned, releasing them whatever `f` returns
    pub(crate) fn with_held<T>(
        &mut self,
        held: &[ObjectRef],
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        for &r in held {
            self.roots.hold(r);
        }
        let result = f(self);
        for &r in held {
            self.roots.release(r);
        }
        result
    }

    // === Collection ===

    /// Run a collection now
    ///
    /// # Returns
    /// `InvalidState` while collection is inhibited
    pub fn collect(&mut self, reason: CollectionReason) -> Result<CycleStats> {
        if self.inhibit > 0 {
            return Err(MemoryError::InvalidState {
                expected: "collection permitted".to_string(),
                actual: format!("collection inhibited (depth {})", self.inhibit),
            });
        }
        self.collector.collect(&mut self.heap, &self.roots, reason)
    }

    /// Explicit collection
    pub fn gc(&mut self) -> Result<CycleStats> {
        self.collect(CollectionReason::Explicit)
    }

    fn can_collect(&self) -> bool {
        self.inhibit == 0 && !self.collector.is_collecting()
    }

    /// Block collection until the guard drops
    ///
    /// While inhibited, allocation extends the heap instead of collecting.
    pub fn inhibit_collection(&mut self) -> CollectionGuard<'_> {
        self.inhibit += 1;
        CollectionGuard { memory: self }
    }

    pub fn is_collection_inhibited(&self) -> bool {
        self.inhibit > 0
    }

    /// Number of objects reachable from the roots
    ///
    /// Walks `live_general` edges without touching mark words.
    pub fn reachable_count(&self, reason: MarkReason) -> usize {
        let mut marker = GeneralMarker::new(reason);
        self.roots.scan(|r| marker.visit(r));
        marker.walk(&self.heap)
    }

    pub fn epoch(&self) -> u64 {
        self.collector.epoch()
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn gc_stats(&self) -> &GcStats {
        self.collector.stats()
    }

    /// Drop every root and collect, returning what was reclaimed
    pub fn shutdown(mut self) -> Result<CycleStats> {
        for kind in [RootKind::Activation, RootKind::Global, RootKind::Pinned] {
            self.roots.clear_kind(kind);
        }
        self.roots.clear_holds();
        self.inhibit = 0;
        self.collect(CollectionReason::Shutdown)
    }

    // === Statistics ===

    /// Census of the heap in the current epoch
    pub fn statistics(&mut self) -> MemoryStats {
        let used = self.heap.used_bytes();
        self.collector.stats_mut().record_heap_used(used);
        MemoryStats::collect(&self.heap, &self.types, self.collector.epoch())
    }
}

/// Guard returned by [`Memory::inhibit_collection`]
///
/// Dereferences to the memory it guards.
pub struct CollectionGuard<'a> {
    memory: &'a mut Memory,
}

impl Deref for CollectionGuard<'_> {
    type Target = Memory;

    fn deref(&self) -> &Memory {
        self.memory
    }
}

impl DerefMut for CollectionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Memory {
        self.memory
    }
}

impl Drop for CollectionGuard<'_> {
    fn drop(&mut self) {
        self.memory.inhibit -= 1;
    }
}

fn short_type_name<T>() -> &'static str {
    let full = type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
