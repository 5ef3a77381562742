//! ListTable Tests - order, growth and round trips
//!
//! Lists must read first to last after appends, copies, collections and
//! image round trips alike.

mod common;

use common::MemoryFixture;
use omem::{ListObject, MemoryError, ObjectRef, TypeTag};

fn rooted_list(fixture: &mut MemoryFixture, capacity: usize) -> ObjectRef {
    let list = fixture.memory.new_list(capacity).unwrap();
    fixture.root(list);
    list
}

fn texts(fixture: &MemoryFixture, list: ObjectRef) -> Vec<String> {
    fixture
        .memory
        .list_items(list)
        .unwrap()
        .into_iter()
        .map(|r| fixture.text(r))
        .collect()
}

fn append_strings(fixture: &mut MemoryFixture, list: ObjectRef, values: &[&str]) {
    for value in values {
        let s = fixture.string(value);
        fixture.memory.list_append(list, s).unwrap();
    }
}

#[test]
fn test_append_preserves_order() {
    let mut fixture = MemoryFixture::with_defaults();
    let list = rooted_list(&mut fixture, 4);
    append_strings(&mut fixture, list, &["A", "B", "C"]);

    assert_eq!(texts(&fixture, list), ["A", "B", "C"]);
    assert_eq!(fixture.memory.list_len(list).unwrap(), 3);
    assert!(fixture.memory.get::<ListObject>(list).unwrap().is_embedded());
}

#[test]
fn test_outgrowing_embedded_table() {
    let mut fixture = MemoryFixture::with_defaults();
    let list = rooted_list(&mut fixture, 2);
    let values: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    let refs: Vec<&str> = values.iter().map(String::as_str).collect();
    append_strings(&mut fixture, list, &refs);

    let object = fixture.memory.get::<ListObject>(list).unwrap();
    assert!(!object.is_embedded());
    let table = object.table().unwrap();
    assert!(fixture.memory.list_table_size(table).unwrap() >= 20);
    assert_eq!(texts(&fixture, list), values);

    fixture.collect();
    assert_eq!(texts(&fixture, list), values);
    let stats = fixture.memory.statistics();
    assert_eq!(stats.object_stats(TypeTag::LIST_TABLE).count, 1);
}

#[test]
fn test_list_get_bounds() {
    let mut fixture = MemoryFixture::with_defaults();
    let list = rooted_list(&mut fixture, 4);
    append_strings(&mut fixture, list, &["only"]);

    let first = fixture.memory.list_get(list, 0).unwrap();
    assert_eq!(fixture.text(first), "only");
    assert!(matches!(
        fixture.memory.list_get(list, 1),
        Err(MemoryError::BoundsCheckFailed { index: 1, length: 1 })
    ));
}

#[test]
fn test_companion_allocation_includes_table() {
    let mut fixture = MemoryFixture::with_defaults();
    let small = fixture.memory.new_list(0).unwrap();
    let large = fixture.memory.new_list(8).unwrap();

    let small_size = fixture.memory.size_of(small).unwrap();
    let large_size = fixture.memory.size_of(large).unwrap();
    assert_eq!(large_size - small_size, 8 * 8);
}

#[test]
fn test_copy_preserves_order_and_is_independent() {
    let mut fixture = MemoryFixture::with_defaults();
    let list = rooted_list(&mut fixture, 1);
    append_strings(&mut fixture, list, &["A", "B", "C"]);

    let copy = fixture.memory.list_copy(list).unwrap();
    fixture.root(copy);
    append_strings(&mut fixture, copy, &["D"]);

    assert_eq!(texts(&fixture, list), ["A", "B", "C"]);
    assert_eq!(texts(&fixture, copy), ["A", "B", "C", "D"]);
    assert_eq!(
        fixture.memory.list_items(list).unwrap(),
        fixture.memory.list_items(copy).unwrap()[..3]
    );
}

#[test]
fn test_standalone_table_put_and_get() {
    let mut fixture = MemoryFixture::with_defaults();
    let table = fixture.memory.new_list_table(3).unwrap();
    fixture.root(table);
    let s = fixture.string("entry");

    fixture.memory.list_table_put(table, 2, Some(s)).unwrap();
    fixture.collect();

    assert_eq!(fixture.memory.list_table_get(table, 0).unwrap(), None);
    assert_eq!(fixture.memory.list_table_get(table, 2).unwrap(), Some(s));
    assert!(fixture.memory.list_table_put(table, 3, None).is_err());
}

/// ============================================================================
/// IMAGE ROUND TRIPS
/// ============================================================================

#[test]
fn test_embedded_list_round_trip_keeps_order() {
    let mut fixture = MemoryFixture::with_defaults();
    let list = rooted_list(&mut fixture, 4);
    append_strings(&mut fixture, list, &["A", "B", "C"]);

    let image = fixture.memory.flatten(list).unwrap();
    let restored = fixture.memory.unflatten(&image).unwrap();

    assert_ne!(restored, list);
    assert_eq!(texts(&fixture, restored), ["A", "B", "C"]);
}

#[test]
fn test_expanded_list_round_trip_keeps_order() {
    let mut fixture = MemoryFixture::with_defaults();
    let list = rooted_list(&mut fixture, 0);
    append_strings(&mut fixture, list, &["A", "B", "C", "D", "E"]);

    let image = fixture.memory.flatten(list).unwrap();
    let restored = fixture.memory.unflatten(&image).unwrap();

    assert_eq!(texts(&fixture, restored), ["A", "B", "C", "D", "E"]);
}

#[test]
fn test_standalone_table_round_trip_keeps_order() {
    let mut fixture = MemoryFixture::with_defaults();
    let table = fixture.memory.new_list_table(3).unwrap();
    fixture.root(table);
    for (i, value) in ["A", "B", "C"].iter().enumerate() {
        let s = fixture.string(value);
        fixture.memory.list_table_put(table, i, Some(s)).unwrap();
    }

    let image = fixture.memory.flatten(table).unwrap();
    let restored = fixture.memory.unflatten(&image).unwrap();

    let restored_texts: Vec<String> = (0..3)
        .map(|i| {
            let r = fixture.memory.list_table_get(restored, i).unwrap().unwrap();
            fixture.text(r)
        })
        .collect();
    assert_eq!(restored_texts, ["A", "B", "C"]);
}
