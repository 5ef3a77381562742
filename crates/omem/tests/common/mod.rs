//! Test Utilities for the omem Test Suite
//!
//! Fixtures build small memories with tight limits so collections and
//! segment growth happen within a handful of allocations. The graph helpers
//! compute reachability independently of the collector (plain BFS over
//! `Memory::children`) so tests can check one against the other.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};

use omem::{ArrayObject, Memory, MemoryConfig, ObjectRef, RootKind, StringObject};

/// Segment size used by small fixtures
pub const SMALL_SEGMENT: usize = 4 * 1024;

/// Heap limit used by small fixtures
pub const SMALL_HEAP: usize = 256 * 1024;

/// ============================================================================
/// MEMORY FIXTURE
/// ============================================================================

/// Test fixture owning one memory instance
pub struct MemoryFixture {
    pub memory: Memory,
}

impl MemoryFixture {
    /// Fixture with the default configuration
    pub fn with_defaults() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    /// Fixture with small segments and a small heap limit
    pub fn small() -> Self {
        Self::with_config(small_config())
    }

    pub fn with_config(config: MemoryConfig) -> Self {
        let memory = Memory::new(config).expect("memory initialization should succeed");
        Self { memory }
    }

    /// Allocate a string
    pub fn string(&mut self, value: &str) -> ObjectRef {
        self.memory
            .allocate_string(value)
            .unwrap_or_else(|e| panic!("allocation of {:?} failed: {}", value, e))
    }

    /// Allocate an array holding `refs`
    pub fn array(&mut self, refs: &[ObjectRef]) -> ObjectRef {
        self.memory
            .allocate(Box::new(ArrayObject::from_refs(refs.iter().copied())))
            .unwrap_or_else(|e| panic!("array allocation failed: {}", e))
    }

    /// Point element `index` of `array` at `target`
    pub fn link(&mut self, array: ObjectRef, index: usize, target: ObjectRef) {
        self.memory
            .get_mut::<ArrayObject>(array)
            .and_then(|a| a.set(index, Some(target)))
            .unwrap_or_else(|e| panic!("link {} -> {} failed: {}", array, target, e));
    }

    /// Register a global root
    pub fn root(&mut self, target: ObjectRef) {
        self.memory.add_root(RootKind::Global, target, None);
    }

    /// Text of a string object
    pub fn text(&self, r: ObjectRef) -> String {
        self.memory
            .get::<StringObject>(r)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|e| panic!("{} is not a string: {}", r, e))
    }

    /// Run an explicit collection
    pub fn collect(&mut self) -> omem::CycleStats {
        self.memory.gc().expect("collection should succeed")
    }

    /// Chain of `len` one-element arrays ending in a string
    ///
    /// Returns the head of the chain.
    pub fn chain(&mut self, len: usize) -> ObjectRef {
        let mut next = self.string("tail");
        for _ in 0..len {
            next = self.array(&[next]);
        }
        next
    }

    /// Cycle of `len` one-element arrays
    ///
    /// Returns every member, first one first.
    pub fn cycle(&mut self, len: usize) -> Vec<ObjectRef> {
        let members: Vec<ObjectRef> = (0..len)
            .map(|_| {
                self.memory
                    .allocate_array(1)
                    .expect("array allocation should succeed")
            })
            .collect();
        for (i, &member) in members.iter().enumerate() {
            self.link(member, 0, members[(i + 1) % len]);
        }
        members
    }
}

pub fn small_config() -> MemoryConfig {
    MemoryConfig {
        segment_size: SMALL_SEGMENT,
        large_object_threshold: 1024,
        max_heap_size: SMALL_HEAP,
        ..Default::default()
    }
}

/// ============================================================================
/// GRAPH HELPERS
/// ============================================================================

/// Objects reachable from `starts`, found by BFS over `children`
pub fn reachable_from(memory: &Memory, starts: &[ObjectRef]) -> HashSet<ObjectRef> {
    let mut seen: HashSet<ObjectRef> = HashSet::new();
    let mut queue: VecDeque<ObjectRef> = starts.iter().copied().collect();

    while let Some(r) = queue.pop_front() {
        if !seen.insert(r) {
            continue;
        }
        let children = memory
            .children(r)
            .unwrap_or_else(|e| panic!("reachable object {} has no children: {}", r, e));
        queue.extend(children);
    }
    seen
}

/// Objects reachable from the whole root set
pub fn reachable_from_roots(memory: &Memory) -> HashSet<ObjectRef> {
    reachable_from(memory, &memory.roots().all())
}

/// ============================================================================
/// ASSERTION HELPERS
/// ============================================================================

/// Assert the census agrees with an independent reachability walk
///
/// Only meaningful directly after a collection, when every live slot was
/// marked by it.
#[track_caller]
pub fn assert_live_matches_reachable(memory: &mut Memory, context: &str) {
    let expected = reachable_from_roots(memory).len();
    let census = memory.statistics();

    assert_eq!(
        census.live_objects(),
        expected,
        "{}: census counts {} live objects but {} are reachable",
        context,
        census.live_objects(),
        expected
    );
    assert!(
        census.normal.is_consistent() && census.large.is_consistent(),
        "{}: census identities broken: {:?} / {:?}",
        context,
        census.normal,
        census.large
    );
}

/// Assert two graphs have the same shape and leaf contents
///
/// Walks both graphs in lockstep from their roots and checks the identity
/// maps stay a bijection, so sharing and cycles must match. Edge order
/// must not depend on identity, so map buckets are out of scope here.
#[track_caller]
pub fn assert_isomorphic(memory: &Memory, left: ObjectRef, right: ObjectRef) {
    let mut forward = std::collections::HashMap::new();
    let mut backward = std::collections::HashMap::new();
    let mut queue = VecDeque::from([(left, right)]);

    while let Some((l, r)) = queue.pop_front() {
        match (forward.get(&l), backward.get(&r)) {
            (Some(&seen_r), Some(&seen_l)) => {
                assert_eq!(seen_r, r, "{} maps to both {} and {}", l, seen_r, r);
                assert_eq!(seen_l, l, "{} is the image of both {} and {}", r, seen_l, l);
                continue;
            },
            (None, None) => {
                forward.insert(l, r);
                backward.insert(r, l);
            },
            _ => panic!("sharing differs at {} / {}", l, r),
        }

        let l_tag = memory.type_tag(l).expect("left object exists");
        let r_tag = memory.type_tag(r).expect("right object exists");
        assert_eq!(l_tag, r_tag, "type differs at {} / {}", l, r);

        if let (Ok(ls), Ok(rs)) = (
            memory.get::<StringObject>(l),
            memory.get::<StringObject>(r),
        ) {
            assert_eq!(ls.as_str(), rs.as_str(), "string differs at {} / {}", l, r);
        }

        let l_children = memory.children(l).expect("left children");
        let r_children = memory.children(r).expect("right children");
        assert_eq!(
            l_children.len(),
            r_children.len(),
            "edge count differs at {} / {}",
            l,
            r
        );
        queue.extend(l_children.into_iter().zip(r_children));
    }
}
