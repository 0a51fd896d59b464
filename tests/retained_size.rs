//! End-to-end retained-size fixtures.
//!
//! Each test synthesizes the object graph of the corresponding fixture
//! program: a `TestData` holder class whose static fields anchor the graph,
//! with every class registered as a sticky-class root the way the JVM dumps
//! loaded classes. The expected byte counts follow the 16-byte instance
//! header, 24-byte object-array header and 24-byte (16 + 4 + 4)
//! primitive-array header rules.

mod common;

use common::*;
use hprof_retained::report;
use hprof_retained::Id;

#[test]
fn empty_object_is_just_a_header() {
    let mut builder = DumpBuilder::new();
    builder.named_class(100, "TestData").named_class(101, "Object1");
    builder.class_dump(100, 0, &[(90, TYPE_OBJECT, 1000)], &[]);
    builder.class_dump(101, 0, &[], &[]);
    builder.instance_dump(1000, 101, &[]);
    builder.root_sticky_class(100).root_sticky_class(101);

    let (mut analyzer, scanner) = analyze(&builder);
    assert_retained_size(&mut analyzer, &scanner, "Object1", 16);
}

#[test]
fn int_field_adds_four_bytes() {
    let mut builder = DumpBuilder::new();
    builder.named_class(100, "TestData").named_class(101, "Object1");
    builder.class_dump(100, 0, &[(90, TYPE_OBJECT, 1000)], &[]);
    builder.class_dump(101, 0, &[], &[(91, TYPE_INT)]);
    builder.instance_dump(1000, 101, &5963492_i32.to_be_bytes());
    builder.root_sticky_class(100).root_sticky_class(101);

    let (mut analyzer, scanner) = analyze(&builder);
    assert_retained_size(&mut analyzer, &scanner, "Object1", 20);
}

#[test]
fn uniquely_referenced_children_are_included() {
    // Object1 → Object2 → boxed Short
    let mut builder = DumpBuilder::new();
    builder
        .named_class(100, "TestData")
        .named_class(101, "Object1")
        .named_class(102, "Object2")
        .named_class(103, "java/lang/Short");
    builder.class_dump(100, 0, &[(90, TYPE_OBJECT, 1000)], &[]);
    builder.class_dump(101, 0, &[], &[(91, TYPE_OBJECT)]);
    builder.class_dump(102, 0, &[], &[(92, TYPE_OBJECT)]);
    builder.class_dump(103, 0, &[], &[(93, TYPE_SHORT)]);
    builder.instance_dump(1000, 101, &1001_u64.to_be_bytes());
    builder.instance_dump(1001, 102, &1002_u64.to_be_bytes());
    builder.instance_dump(1002, 103, &5898_u16.to_be_bytes());
    for class_obj_id in [100_u64, 101, 102, 103] {
        builder.root_sticky_class(class_obj_id);
    }

    let (mut analyzer, scanner) = analyze(&builder);
    assert_retained_size(&mut analyzer, &scanner, "java/lang/Short", 18);
    assert_retained_size(&mut analyzer, &scanner, "Object2", 42);
    assert_retained_size(&mut analyzer, &scanner, "Object1", 66);
}

#[test]
fn reference_cycle_is_counted_once() {
    // Object1 ⇄ Object2, Object1 also anchored by the holder's static field
    let mut builder = DumpBuilder::new();
    builder
        .named_class(100, "TestData")
        .named_class(101, "Object1")
        .named_class(102, "Object2");
    builder.class_dump(100, 0, &[(90, TYPE_OBJECT, 1000)], &[]);
    builder.class_dump(101, 0, &[], &[(91, TYPE_OBJECT)]);
    builder.class_dump(102, 0, &[], &[(92, TYPE_OBJECT)]);
    builder.instance_dump(1000, 101, &1001_u64.to_be_bytes());
    builder.instance_dump(1001, 102, &1000_u64.to_be_bytes());
    for class_obj_id in [100_u64, 101, 102] {
        builder.root_sticky_class(class_obj_id);
    }

    let (mut analyzer, scanner) = analyze(&builder);
    // the back edge to Object1 is shared (holder static + Object2 field)
    assert_retained_size(&mut analyzer, &scanner, "Object2", 24);
    assert_retained_size(&mut analyzer, &scanner, "Object1", 48);
}

#[test]
fn class_object_children_count_their_statics_only() {
    // Object1 holds a Class reference; Object2 has no statics
    let mut builder = DumpBuilder::new();
    builder
        .named_class(100, "TestData")
        .named_class(101, "Object1")
        .named_class(102, "Object2");
    builder.class_dump(100, 0, &[(90, TYPE_OBJECT, 1000)], &[]);
    builder.class_dump(101, 0, &[], &[(91, TYPE_OBJECT)]);
    builder.class_dump(102, 0, &[], &[(92, TYPE_OBJECT)]);
    builder.instance_dump(1000, 101, &102_u64.to_be_bytes());
    for class_obj_id in [100_u64, 101, 102] {
        builder.root_sticky_class(class_obj_id);
    }

    let (mut analyzer, scanner) = analyze(&builder);
    assert_retained_size(&mut analyzer, &scanner, "Object1", 24);
}

#[test]
fn interned_string_is_shared_and_not_charged() {
    let mut builder = DumpBuilder::new();
    builder
        .named_class(100, "TestData")
        .named_class(101, "Object1")
        .named_class(102, "java/lang/String");
    // the holder pins the literal too, as the string table does in a real dump
    builder.class_dump(
        100,
        0,
        &[(90, TYPE_OBJECT, 1000), (91, TYPE_OBJECT, 1001)],
        &[],
    );
    builder.class_dump(101, 0, &[], &[(92, TYPE_OBJECT)]);
    builder.class_dump(102, 0, &[], &[(93, TYPE_OBJECT), (94, TYPE_INT)]);
    builder.instance_dump(1000, 101, &1001_u64.to_be_bytes());
    let mut string_payload = 1002_u64.to_be_bytes().to_vec();
    string_payload.extend_from_slice(&0_i32.to_be_bytes());
    builder.instance_dump(1001, 102, &string_payload);
    builder.primitive_array_dump(1002, TYPE_BYTE, 26);
    for class_obj_id in [100_u64, 101, 102] {
        builder.root_sticky_class(class_obj_id);
    }

    let (mut analyzer, scanner) = analyze(&builder);
    // the string is reached from two parents, so Object1 keeps only its header + slot
    assert_retained_size(&mut analyzer, &scanner, "Object1", 24);
    // the string itself still uniquely retains its backing byte array
    assert_retained_size(&mut analyzer, &scanner, "java/lang/String", 78);
}

#[test]
fn string_builder_retains_its_backing_array() {
    let mut builder = DumpBuilder::new();
    builder
        .named_class(100, "TestData")
        .named_class(101, "Object1")
        .named_class(102, "java/lang/StringBuilder");
    builder.class_dump(100, 0, &[(90, TYPE_OBJECT, 1000)], &[]);
    builder.class_dump(101, 0, &[], &[(91, TYPE_OBJECT)]);
    builder.class_dump(
        102,
        0,
        &[],
        &[(92, TYPE_OBJECT), (93, TYPE_INT), (94, TYPE_BYTE)],
    );
    builder.instance_dump(1000, 101, &1001_u64.to_be_bytes());
    let mut sb_payload = 1002_u64.to_be_bytes().to_vec();
    sb_payload.extend_from_slice(&5_i32.to_be_bytes());
    sb_payload.push(0);
    builder.instance_dump(1001, 102, &sb_payload);
    builder.primitive_array_dump(1002, TYPE_BYTE, 16);
    for class_obj_id in [100_u64, 101, 102] {
        builder.root_sticky_class(class_obj_id);
    }

    let (mut analyzer, scanner) = analyze(&builder);
    // 24 (Object1) + 29 (builder) + 40 (byte[16])
    assert_retained_size(&mut analyzer, &scanner, "Object1", 93);
}

#[test]
fn byte_array_field() {
    let mut builder = DumpBuilder::new();
    builder.named_class(100, "TestData").named_class(101, "Object1");
    builder.class_dump(100, 0, &[(90, TYPE_OBJECT, 1000)], &[]);
    builder.class_dump(101, 0, &[], &[(91, TYPE_OBJECT)]);
    builder.instance_dump(1000, 101, &1002_u64.to_be_bytes());
    builder.primitive_array_dump(1002, TYPE_BYTE, 5);
    builder.root_sticky_class(100).root_sticky_class(101);

    let (mut analyzer, scanner) = analyze(&builder);
    // 24 (Object1) + 29 (byte[5])
    assert_retained_size(&mut analyzer, &scanner, "Object1", 53);
}

fn array_fixture() -> DumpBuilder {
    let mut builder = DumpBuilder::new();
    builder
        .named_class(100, "TestData")
        .named_class(101, "Object1")
        .named_class(102, "Object2")
        .named_class(103, "Object3")
        .named_class(104, "java/lang/Long");
    builder.class_dump(100, 0, &[(90, TYPE_OBJECT, 1000)], &[]);
    builder.class_dump(
        101,
        0,
        &[],
        &[(91, TYPE_OBJECT), (92, TYPE_OBJECT), (93, TYPE_OBJECT)],
    );
    builder.class_dump(102, 0, &[], &[(94, TYPE_OBJECT)]);
    builder.class_dump(103, 0, &[], &[(95, TYPE_OBJECT)]);
    builder.class_dump(104, 0, &[], &[(96, TYPE_LONG)]);

    // Object1 { char[] r2; Object2[] o2; Object3[] o3; }
    let mut payload = Vec::new();
    payload.extend_from_slice(&2000_u64.to_be_bytes());
    payload.extend_from_slice(&2001_u64.to_be_bytes());
    payload.extend_from_slice(&2002_u64.to_be_bytes());
    builder.instance_dump(1000, 101, &payload);

    builder.primitive_array_dump(2000, TYPE_CHAR, 10);
    let elements: Vec<u64> = (0..10).map(|at| 3000 + at).collect();
    builder.object_array_dump(2001, 102, &elements);
    builder.object_array_dump(2002, 103, &[]);

    // ten Object2 instances, each boxing its own Long
    for at in 0..10_u64 {
        builder.instance_dump(3000 + at, 102, &(4000 + at).to_be_bytes());
        builder.instance_dump(4000 + at, 104, &3893289_i64.to_be_bytes());
    }

    for class_obj_id in [100_u64, 101, 102, 103, 104] {
        builder.root_sticky_class(class_obj_id);
    }
    builder
}

#[test]
fn arrays_and_their_elements() {
    let (mut analyzer, scanner) = analyze(&array_fixture());

    // 40 (Object1) + 44 (char[10]) + 584 (Object2[10] and contents) + 24 (empty array)
    assert_retained_size(&mut analyzer, &scanner, "Object1", 692);
    assert_eq!(480, total_retained(&mut analyzer, &scanner, "Object2"));
    assert_eq!(240, total_retained(&mut analyzer, &scanner, "java/lang/Long"));
    assert_eq!(0, total_retained(&mut analyzer, &scanner, "Object3"));
}

#[test]
fn ranking_orders_by_retained_total_ascending() {
    let (mut analyzer, scanner) = analyze(&array_fixture());

    let rows = analyzer.ranking_by_class(&scanner).unwrap();

    let names: Vec<&str> = rows.iter().map(|row| row.class_name.as_str()).collect();
    assert_eq!(vec!["java/lang/Long", "Object2", "Object1"], names);

    let totals: Vec<u64> = rows.iter().map(|row| row.total_retained).collect();
    assert_eq!(vec![240, 480, 692], totals);

    let shallow: Vec<u64> = rows.iter().map(|row| row.total_shallow).collect();
    assert_eq!(vec![240, 240, 40], shallow);

    let counts: Vec<usize> = rows.iter().map(|row| row.instance_count).collect();
    assert_eq!(vec![10, 10, 1], counts);
}

#[test]
fn ranking_lines_render_with_grouped_digits() {
    let (mut analyzer, scanner) = analyze(&array_fixture());

    let rows = analyzer.ranking_by_class(&scanner).unwrap();
    let line = report::format_ranking_line(&rows[2]);

    assert!(line.ends_with("= Object1"), "line was {:?}", line);
    assert!(line.contains("retainedSize=        692"), "line was {:?}", line);
    assert!(line.contains("shallowSize=         40"), "line was {:?}", line);
}

#[test]
fn retained_size_is_at_least_shallow_size() {
    let (mut analyzer, scanner) = analyze(&array_fixture());

    let mut object_ids = vec![1000_u64, 2000, 2001, 2002];
    object_ids.extend((0..10).map(|at| 3000 + at));
    object_ids.extend((0..10).map(|at| 4000 + at));

    for object_id in object_ids {
        let retained = analyzer
            .retained_size(&scanner, Id::from(object_id))
            .unwrap();
        let shallow = analyzer.shallow_size(Id::from(object_id)).unwrap();
        assert!(
            retained >= shallow,
            "object {}: retained {} < shallow {}",
            object_id,
            retained,
            shallow
        );
    }
}

#[test]
fn repeated_queries_hit_the_cache() {
    let (mut analyzer, scanner) = analyze(&array_fixture());

    assert_eq!(None, analyzer.cached_retained_size(Id::from(1000)));

    let first = analyzer.retained_size(&scanner, Id::from(1000)).unwrap();
    assert_eq!(Some(first), analyzer.cached_retained_size(Id::from(1000)));

    let second = analyzer.retained_size(&scanner, Id::from(1000)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn instance_payload_length_matches_field_layout() {
    let (analyzer, _scanner) = analyze(&array_fixture());
    let index = analyzer.index();

    for class_obj_id in index.class_ids_with_instances().collect::<Vec<_>>() {
        for &object_id in index.instances_of(class_obj_id) {
            let instance = index.instance(object_id).unwrap().unwrap();
            // the walk errors if the payload disagrees with the layout
            index.instance_reference_ids(&instance).unwrap();
        }
    }
}
