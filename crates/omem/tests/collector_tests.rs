//! Collector Tests - reachability, reclamation and heap growth
//!
//! These tests verify that a collection:
//! - Keeps exactly the objects reachable from the roots
//! - Frees everything else, cycles included
//! - Grows the heap only when collection cannot make room
//! - Fails fatally at the heap limit
//!
//! Reachability is cross-checked against an independent BFS in `common`.

mod common;

use std::thread;

use common::{
    assert_live_matches_reachable, reachable_from, reachable_from_roots, small_config,
    MemoryFixture, SMALL_HEAP,
};
use omem::{
    CollectionReason, MarkReason, Memory, MemoryConfig, MemoryError, RootKind, TypeTag,
};

/// ============================================================================
/// REACHABILITY
/// ============================================================================

#[test]
fn test_empty_root_set_frees_everything() {
    let mut fixture = MemoryFixture::with_defaults();
    for i in 0..10 {
        fixture.string(&format!("garbage {}", i));
    }
    fixture.chain(3);

    let cycle = fixture.collect();

    assert_eq!(cycle.objects_marked, 0);
    assert_eq!(cycle.objects_reclaimed, 14);
    assert_eq!(fixture.memory.statistics().live_objects(), 0);
    assert_live_matches_reachable(&mut fixture.memory, "empty root set");
}

#[test]
fn test_single_root_keeps_its_closure() {
    let mut fixture = MemoryFixture::with_defaults();
    let head = fixture.chain(4);
    fixture.root(head);
    let stray = fixture.string("stray");

    let cycle = fixture.collect();

    assert_eq!(cycle.objects_marked, 5);
    assert_eq!(cycle.objects_reclaimed, 1);
    assert!(!fixture.memory.contains(stray));
    assert_eq!(reachable_from(&fixture.memory, &[head]).len(), 5);
    assert_live_matches_reachable(&mut fixture.memory, "single root");
}

#[test]
fn test_single_leaf_root_matches_reachable() {
    let mut fixture = MemoryFixture::with_defaults();
    let leaf = fixture.string("leaf");
    fixture.root(leaf);
    for i in 0..5 {
        fixture.string(&format!("garbage-{}", i));
    }

    let cycle = fixture.collect();

    assert_eq!(cycle.objects_marked, 1);
    assert_eq!(cycle.objects_reclaimed, 5);
    assert_eq!(reachable_from_roots(&fixture.memory).len(), 1);
    assert_live_matches_reachable(&mut fixture.memory, "single leaf root");
}

#[test]
fn test_unrooted_cycle_is_collected() {
    let mut fixture = MemoryFixture::with_defaults();
    let members = fixture.cycle(3);

    let cycle = fixture.collect();

    assert_eq!(cycle.objects_reclaimed, 3);
    for member in members {
        assert!(!fixture.memory.contains(member));
    }
}

#[test]
fn test_rooted_cycle_survives_repeated_collections() {
    let mut fixture = MemoryFixture::with_defaults();
    let members = fixture.cycle(3);
    fixture.root(members[1]);

    for _ in 0..3 {
        let cycle = fixture.collect();
        assert_eq!(cycle.objects_marked, 3);
        assert_eq!(cycle.objects_reclaimed, 0);
    }
    assert_live_matches_reachable(&mut fixture.memory, "rooted 3-cycle");
}

#[test]
fn test_reachable_count_matches_collector() {
    let mut fixture = MemoryFixture::with_defaults();
    let head = fixture.chain(5);
    let members = fixture.cycle(3);
    let shared = fixture.string("shared");
    let fan = fixture.array(&[shared, shared, head]);
    fixture.root(fan);
    fixture.root(members[0]);
    fixture.string("garbage");

    let expected = reachable_from_roots(&fixture.memory).len();
    assert_eq!(fixture.memory.reachable_count(MarkReason::Census), expected);

    let cycle = fixture.collect();
    assert_eq!(cycle.objects_marked, expected);
    assert_live_matches_reachable(&mut fixture.memory, "mixed graph");
}

#[test]
fn test_unregistered_root_releases_graph() {
    let mut fixture = MemoryFixture::with_defaults();
    let head = fixture.chain(2);
    let handle = fixture.memory.add_root(RootKind::Activation, head, Some("frame"));

    fixture.collect();
    assert!(fixture.memory.contains(head));

    assert_eq!(fixture.memory.remove_root(handle), Some(head));
    let cycle = fixture.collect();
    assert_eq!(cycle.objects_reclaimed, 3);
}

#[test]
fn test_hold_is_counted() {
    let mut fixture = MemoryFixture::with_defaults();
    let s = fixture.string("pinned");
    fixture.memory.hold(s);
    fixture.memory.hold(s);

    assert!(fixture.memory.release(s));
    fixture.collect();
    assert!(fixture.memory.contains(s));

    assert!(fixture.memory.release(s));
    fixture.collect();
    assert!(!fixture.memory.contains(s));
}

#[test]
fn test_freed_handle_is_invalid_reference() {
    let mut fixture = MemoryFixture::with_defaults();
    let s = fixture.string("gone");
    fixture.collect();

    let err = fixture.memory.object(s).unwrap_err();
    assert!(matches!(err, MemoryError::InvalidReference(r) if r == s));
}

/// ============================================================================
/// HEAP GROWTH
/// ============================================================================

#[test]
fn test_allocation_reuses_reclaimed_space() {
    let mut fixture = MemoryFixture::small();

    for _ in 0..500 {
        fixture.memory.allocate_buffer(100).unwrap();
    }

    let stats = fixture.memory.gc_stats().summary();
    assert!(stats.allocation_cycles > 0);
    assert_eq!(fixture.memory.heap().segment_count(), 1);
}

#[test]
fn test_live_data_forces_new_segments() {
    let mut fixture = MemoryFixture::small();
    let keep = fixture.memory.new_list(0).unwrap();
    fixture.root(keep);

    for _ in 0..100 {
        let b = fixture.memory.allocate_buffer(100).unwrap();
        fixture.memory.list_append(keep, b).unwrap();
    }

    assert!(fixture.memory.heap().segment_count() > 1);
    assert_eq!(fixture.memory.list_len(keep).unwrap(), 100);

    fixture.collect();
    assert_live_matches_reachable(&mut fixture.memory, "after growth");
}

#[test]
fn test_out_of_memory_is_fatal() {
    let mut fixture = MemoryFixture::small();
    let keep = fixture.memory.new_list(0).unwrap();
    fixture.root(keep);

    let err = loop {
        let result = fixture
            .memory
            .allocate_buffer(500)
            .and_then(|b| fixture.memory.list_append(keep, b));
        if let Err(e) = result {
            break e;
        }
    };

    assert!(err.is_fatal());
    assert!(matches!(err, MemoryError::OutOfMemory { limit, .. } if limit == SMALL_HEAP));
    assert!(fixture.memory.heap().committed_bytes() <= SMALL_HEAP);
}

#[test]
fn test_large_objects_get_own_segment() {
    let mut fixture = MemoryFixture::small();
    let big = fixture.memory.allocate_buffer(8 * 1024).unwrap();
    fixture.root(big);

    let stats = fixture.memory.statistics();
    assert_eq!(stats.large.segments, 1);
    assert_eq!(stats.large.live_objects, 1);
    assert_eq!(stats.object_stats(TypeTag::BUFFER).count, 1);
}

#[test]
fn test_inhibited_collection_grows_instead() {
    let mut fixture = MemoryFixture::small();
    {
        let mut guard = fixture.memory.inhibit_collection();
        for _ in 0..100 {
            guard.allocate_buffer(100).unwrap();
        }
        assert!(matches!(
            guard.collect(CollectionReason::Explicit),
            Err(MemoryError::InvalidState { .. })
        ));
    }

    assert_eq!(fixture.memory.collector().cycle_count(), 0);
    let cycle = fixture.collect();
    assert_eq!(cycle.objects_reclaimed, 100);
    assert!(cycle.segments_released > 0);
}

/// ============================================================================
/// INSTANCES
/// ============================================================================

#[test]
fn test_instances_run_on_separate_threads() {
    let handles: Vec<_> = (0..4)
        .map(|t| {
            thread::spawn(move || {
                let mut memory = Memory::new(small_config()).unwrap();
                let list = memory.new_list(4).unwrap();
                memory.add_root(RootKind::Global, list, None);

                for i in 0..200 {
                    let s = memory.allocate_string(format!("{}-{}", t, i)).unwrap();
                    if i % 10 == 0 {
                        memory.list_append(list, s).unwrap();
                    }
                }
                memory.gc().unwrap();
                memory.list_len(list).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 20);
    }
}

#[test]
fn test_instance_moves_between_threads() {
    let mut memory = Memory::new(MemoryConfig::default()).unwrap();
    let s = memory.allocate_string("moved").unwrap();
    memory.add_root(RootKind::Global, s, None);

    let memory = thread::spawn(move || {
        memory.gc().unwrap();
        memory
    })
    .join()
    .unwrap();

    assert!(memory.contains(s));
}
