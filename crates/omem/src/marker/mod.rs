//! Marker Module - reachability traversals
//!
//! Two traversals walk the same edges:
//!
//! - [`Marker`] runs inside a collection. It stamps each reached header
//!   with the new epoch; an object already carrying the epoch is skipped,
//!   which terminates cycles.
//! - [`GeneralMarker`] never touches headers. It tracks visited objects in a
//!   side set and is used for censuses, verification and flatten
//!   preparation, tagged with a [`MarkReason`].
//!
//! Both use an explicit worklist, so deep object chains cannot exhaust the
//! native stack.

pub mod roots;

pub use roots::{RootDescriptor, RootHandle, RootKind, RootSet, RootStats};

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::heap::Heap;
use crate::object::ObjectRef;

/// Why a generalized traversal is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MarkReason {
    /// Counting reachable objects for statistics
    Census,
    /// Cross-checking the collector
    Verify,
    /// Collecting the object set an image will contain
    Flatten,
}

// ============================================================================
// COLLECTING MARKER
// ============================================================================

/// Marker for one collection cycle
#[derive(Debug)]
pub struct Marker {
    epoch: u64,
    worklist: Vec<ObjectRef>,
    marked: usize,
    stale: usize,
}

impl Marker {
    pub(crate) fn new(epoch: u64) -> Self {
        Self {
            epoch,
            worklist: Vec::new(),
            marked: 0,
            stale: 0,
        }
    }

    /// Report a directly owned object
    #[inline]
    pub fn mark(&mut self, target: ObjectRef) {
        self.worklist.push(target);
    }

    /// Epoch this marker stamps
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Objects newly marked so far
    pub fn marked_count(&self) -> usize {
        self.marked
    }

    /// References that named no slot
    pub fn stale_count(&self) -> usize {
        self.stale
    }

    /// Mark everything reachable from the pending worklist
    pub(crate) fn drain(&mut self, heap: &mut Heap) {
        while let Some(target) = self.worklist.pop() {
            let Ok(slot) = heap.slot_mut(target) else {
                log::warn!("stale reference {} reached during marking", target);
                self.stale += 1;
                continue;
            };

            if !slot.header.mark(self.epoch) {
                continue;
            }
            self.marked += 1;

            if let Some(object) = slot.object.as_deref() {
                object.live(self);
            }
        }
    }
}

// ============================================================================
// GENERAL MARKER
// ============================================================================

/// Non-collecting traversal
#[derive(Debug)]
pub struct GeneralMarker {
    reason: MarkReason,
    worklist: Vec<ObjectRef>,
    visited: FxHashSet<ObjectRef>,
}

impl GeneralMarker {
    pub fn new(reason: MarkReason) -> Self {
        Self {
            reason,
            worklist: Vec::new(),
            visited: FxHashSet::default(),
        }
    }

    /// Report a directly owned object
    #[inline]
    pub fn visit(&mut self, target: ObjectRef) {
        self.worklist.push(target);
    }

    pub fn reason(&self) -> MarkReason {
        self.reason
    }

    /// Visit everything reachable from the pending worklist
    ///
    /// # Returns
    /// Number of newly visited objects
    pub fn walk(&mut self, heap: &Heap) -> usize {
        let before = self.visited.len();
        while let Some(target) = self.worklist.pop() {
            if !self.visited.insert(target) {
                continue;
            }
            match heap.object(target) {
                Ok(object) => object.live_general(self.reason, self),
                Err(_) => {
                    self.visited.remove(&target);
                },
            }
        }
        self.visited.len() - before
    }

    /// Objects visited so far
    pub fn visited(&self) -> &FxHashSet<ObjectRef> {
        &self.visited
    }

    /// Pending, not yet walked references in report order
    pub fn take_pending(&mut self) -> Vec<ObjectRef> {
        std::mem::take(&mut self.worklist)
    }
}
