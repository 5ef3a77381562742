//! Root Set - starting points for marking
//!
//! All objects reachable from roots must be marked as live.
//!
//! # Root Kinds
//!
//! 1. **Activation** - references held by interpreter activation frames
//! 2. **Global** - globals and the base environment
//! 3. **Pinned** - objects held by native code for a bounded time
//!
//! Registered roots are named slots: the handle stays the same while the
//! referenced object may be replaced with [`RootSet::update`]. Holds are
//! lighter: a reference-counted pin on one object, used to keep
//! intermediate results alive across an allocation that may collect.

use std::fmt;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::object::ObjectRef;

/// Root kinds for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RootKind {
    Activation,
    Global,
    Pinned,
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootKind::Activation => write!(f, "Activation"),
            RootKind::Global => write!(f, "Global"),
            RootKind::Pinned => write!(f, "Pinned"),
        }
    }
}

/// Handle to a registered root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootHandle(u64);

impl RootHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// A registered root
#[derive(Debug, Clone)]
pub struct RootDescriptor {
    pub kind: RootKind,
    pub target: ObjectRef,
    /// Optional name for debugging
    pub name: Option<String>,
}

/// Root counts by kind
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RootStats {
    pub activation: usize,
    pub global: usize,
    pub pinned: usize,
    /// Distinct objects under a hold
    pub held: usize,
}

impl RootStats {
    pub fn total(&self) -> usize {
        self.activation + self.global + self.pinned + self.held
    }
}

/// Root set of one memory instance
#[derive(Debug, Default)]
pub struct RootSet {
    /// Registered roots in registration order
    roots: IndexMap<u64, RootDescriptor>,

    /// Hold counts per object
    holds: FxHashMap<ObjectRef, usize>,

    next_id: u64,
}

impl RootSet {
    pub fn new() -> Self {
        Self::default()
    }

    // === Registration ===

    /// Register a root
    ///
    /// # Arguments
    /// * `kind` - root kind
    /// * `target` - referenced object
    /// * `name` - optional name for debugging
    pub fn register(&mut self, kind: RootKind, target: ObjectRef, name: Option<&str>) -> RootHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.roots.insert(
            id,
            RootDescriptor {
                kind,
                target,
                name: name.map(str::to_string),
            },
        );
        RootHandle(id)
    }

    /// Remove a root, returning the object it referenced
    pub fn unregister(&mut self, handle: RootHandle) -> Option<ObjectRef> {
        self.roots.shift_remove(&handle.0).map(|root| root.target)
    }

    /// Point an existing root at another object
    pub fn update(&mut self, handle: RootHandle, target: ObjectRef) -> bool {
        match self.roots.get_mut(&handle.0) {
            Some(root) => {
                root.target = target;
                true
            },
            None => false,
        }
    }

    pub fn get(&self, handle: RootHandle) -> Option<ObjectRef> {
        self.roots.get(&handle.0).map(|root| root.target)
    }

    pub fn descriptor(&self, handle: RootHandle) -> Option<&RootDescriptor> {
        self.roots.get(&handle.0)
    }

    /// Drop every root of one kind (e.g. all activation frames on unwind)
    ///
    /// # Returns
    /// Number of roots removed
    pub fn clear_kind(&mut self, kind: RootKind) -> usize {
        let before = self.roots.len();
        self.roots.retain(|_, root| root.kind != kind);
        before - self.roots.len()
    }

    // === Holds ===

    /// Pin an object; holds nest
    pub fn hold(&mut self, target: ObjectRef) {
        *self.holds.entry(target).or_insert(0) += 1;
    }

    /// Undo one [`hold`](Self::hold)
    ///
    /// Returns `false` if the object was not held.
    pub fn release(&mut self, target: ObjectRef) -> bool {
        match self.holds.get_mut(&target) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            },
            Some(_) => {
                self.holds.remove(&target);
                true
            },
            None => {
                log::warn!("release of {} without a matching hold", target);
                false
            },
        }
    }

    /// Drop every hold
    pub fn clear_holds(&mut self) -> usize {
        let held = self.holds.len();
        self.holds.clear();
        held
    }

    pub fn is_held(&self, target: ObjectRef) -> bool {
        self.holds.contains_key(&target)
    }

    // === Scanning ===

    /// Visit every root and every held object
    ///
    /// # Returns
    /// Number of references visited
    pub fn scan<F>(&self, mut callback: F) -> usize
    where
        F: FnMut(ObjectRef),
    {
        let mut count = 0;
        for root in self.roots.values() {
            callback(root.target);
            count += 1;
        }
        for &target in self.holds.keys() {
            callback(target);
            count += 1;
        }
        count
    }

    /// Visit roots of one kind
    pub fn scan_kind<F>(&self, kind: RootKind, mut callback: F) -> usize
    where
        F: FnMut(ObjectRef),
    {
        let mut count = 0;
        for root in self.roots.values().filter(|root| root.kind == kind) {
            callback(root.target);
            count += 1;
        }
        count
    }

    /// Every root reference, holds included
    pub fn all(&self) -> Vec<ObjectRef> {
        let mut refs = Vec::with_capacity(self.len());
        self.scan(|r| refs.push(r));
        refs
    }

    /// Registered roots plus held objects
    pub fn len(&self) -> usize {
        self.roots.len() + self.holds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RootStats {
        let mut stats = RootStats {
            held: self.holds.len(),
            ..Default::default()
        };
        for root in self.roots.values() {
            match root.kind {
                RootKind::Activation => stats.activation += 1,
                RootKind::Global => stats.global += 1,
                RootKind::Pinned => stats.pinned += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{SegmentId, SlotId};

    fn obj(slot: u32) -> ObjectRef {
        ObjectRef::new(SegmentId(0), SlotId(slot))
    }

    #[test]
    fn test_register_and_unregister() {
        let mut roots = RootSet::new();
        let a = roots.register(RootKind::Global, obj(1), Some("env"));
        let b = roots.register(RootKind::Activation, obj(2), None);

        assert_eq!(roots.len(), 2);
        assert_eq!(roots.descriptor(a).unwrap().name.as_deref(), Some("env"));
        assert_eq!(roots.unregister(b), Some(obj(2)));
        assert_eq!(roots.unregister(b), None);
        assert_eq!(roots.all(), vec![obj(1)]);
    }

    #[test]
    fn test_update_replaces_target() {
        let mut roots = RootSet::new();
        let frame = roots.register(RootKind::Activation, obj(1), None);

        assert!(roots.update(frame, obj(5)));
        assert_eq!(roots.get(frame), Some(obj(5)));
    }

    #[test]
    fn test_holds_nest() {
        let mut roots = RootSet::new();
        roots.hold(obj(3));
        roots.hold(obj(3));

        assert!(roots.release(obj(3)));
        assert!(roots.is_held(obj(3)));
        assert!(roots.release(obj(3)));
        assert!(!roots.is_held(obj(3)));
        assert!(!roots.release(obj(3)));
    }

    #[test]
    fn test_clear_kind_and_stats() {
        let mut roots = RootSet::new();
        roots.register(RootKind::Activation, obj(1), None);
        roots.register(RootKind::Activation, obj(2), None);
        roots.register(RootKind::Global, obj(3), None);
        roots.hold(obj(4));

        let stats = roots.stats();
        assert_eq!((stats.activation, stats.global, stats.held), (2, 1, 1));
        assert_eq!(stats.total(), 4);

        assert_eq!(roots.clear_kind(RootKind::Activation), 2);
        assert_eq!(roots.scan_kind(RootKind::Activation, |_| {}), 0);
        assert_eq!(roots.scan(|_| {}), 2);
    }
}
