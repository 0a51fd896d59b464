//! The retained-size engine.
//!
//! Retained size is the object's own bytes plus the bytes of every
//! descendant reached over edges where the child's recorded parent is
//! exactly the edge source. Children shared between parents contribute
//! nothing, which makes the totals a lower bound. A per-query visited set
//! breaks cycles; instance sizes are memoized across queries.

use crate::heap_dump::FieldType;
use crate::index::{ClassRecord, HeapObject, InstanceRecord, ObjectArrayRecord, SnapshotIndex};
use crate::roots::RootScanner;
use crate::seen::Seen;
use crate::{HeapError, Id};
use log::{debug, log_enabled, trace, Level};
use std::collections::HashMap;

pub struct RetainedSizeCalculator {
    size_cache: HashMap<Id, u64>,
}

impl RetainedSizeCalculator {
    pub fn new() -> RetainedSizeCalculator {
        RetainedSizeCalculator {
            size_cache: HashMap::new(),
        }
    }

    pub fn retained_size(
        &mut self,
        index: &SnapshotIndex,
        roots: &RootScanner,
        object_id: Id,
    ) -> Result<u64, HeapError> {
        let mut seen = Seen::new();
        self.retained_size_instance(index, roots, object_id, &mut seen)
    }

    /// Memoized size if this object was already computed.
    pub fn cached_size(&self, object_id: Id) -> Option<u64> {
        self.size_cache.get(&object_id).copied()
    }

    fn retained_size_instance(
        &mut self,
        index: &SnapshotIndex,
        roots: &RootScanner,
        object_id: Id,
        seen: &mut Seen,
    ) -> Result<u64, HeapError> {
        if seen.contains(object_id) {
            debug!("Recursive counting occurred: {}", object_id);
            return Ok(0);
        }

        if let Some(&size) = self.size_cache.get(&object_id) {
            return Ok(size);
        }

        seen.add(object_id);

        match index.heap_object(object_id)? {
            Some(HeapObject::Instance(instance)) => {
                if log_enabled!(Level::Debug) {
                    let name = index
                        .class_name(instance.class_obj_id)
                        .unwrap_or_else(|_| String::from("(unknown class)"));
                    debug!(
                        "retainedSizeInstance({}) objectId={} seen={}",
                        name,
                        object_id,
                        seen.len()
                    );
                }
                self.instance_size(index, roots, &instance, seen)
            }
            Some(HeapObject::ObjectArray(array)) => {
                self.object_array_size(index, roots, &array, seen)
            }
            Some(HeapObject::PrimitiveArray(array)) => {
                // 16-byte header plus two 32-bit array overhead words
                let size = 16
                    + 4
                    + 4
                    + array.element_count as u64 * array.element_type.size_bytes() as u64;
                debug!(
                    "primitive array: {} {}",
                    array.element_type.java_type_name(),
                    size
                );
                Ok(size)
            }
            Some(HeapObject::ClassObject(class)) => {
                self.class_object_size(index, roots, class, seen)
            }
            None => {
                if index.is_loaded_class(object_id)? {
                    debug!("no class dump for loaded class {}; counted as 0", object_id);
                    Ok(0)
                } else {
                    Err(index.unknown_object_error(object_id))
                }
            }
        }
    }

    fn instance_size(
        &mut self,
        index: &SnapshotIndex,
        roots: &RootScanner,
        instance: &InstanceRecord,
        seen: &mut Seen,
    ) -> Result<u64, HeapError> {
        // 16-byte object header on a 64-bit runtime; the payload already
        // covers declared and inherited fields
        let mut size = 16 + instance.payload.len() as u64;

        for child in index.instance_reference_ids(instance)? {
            if roots.is_retained(instance.obj_id, child) {
                let child_size = self.retained_size_instance(index, roots, child, seen)?;
                trace!(
                    "retained field: parent={} child={} size={}",
                    instance.obj_id,
                    child,
                    child_size
                );
                size += child_size;
            } else {
                trace!(
                    "shared field skipped: parent={} child={}",
                    instance.obj_id,
                    child
                );
            }
        }

        // cache on the post-order return so the value includes every
        // uniquely reached descendant
        self.size_cache.insert(instance.obj_id, size);
        Ok(size)
    }

    fn object_array_size(
        &mut self,
        index: &SnapshotIndex,
        roots: &RootScanner,
        array: &ObjectArrayRecord,
        seen: &mut Seen,
    ) -> Result<u64, HeapError> {
        // 24-byte array header plus one 64-bit slot per element
        let mut size = 24 + 8 * array.elements.len() as u64;

        for &element in &array.elements {
            if element.is_null() {
                continue;
            }
            if roots.is_retained(array.obj_id, element) {
                size += self.retained_size_instance(index, roots, element, seen)?;
            }
        }

        debug!(
            "object array: {} len={} size={}",
            array.obj_id,
            array.elements.len(),
            size
        );
        Ok(size)
    }

    fn class_object_size(
        &mut self,
        index: &SnapshotIndex,
        roots: &RootScanner,
        class: &ClassRecord,
        seen: &mut Seen,
    ) -> Result<u64, HeapError> {
        debug!("class object: {}", class.class_obj_id);

        let mut size = 0_u64;
        for field in &class.static_fields {
            match field.field_type {
                FieldType::Object => {
                    size += 8;
                    if let Some(child) = field.referent {
                        if roots.is_retained(class.class_obj_id, child) {
                            size += self.retained_size_instance(index, roots, child, seen)?;
                        }
                    }
                }
                primitive => size += primitive.size_bytes() as u64,
            }
        }

        Ok(size)
    }
}
