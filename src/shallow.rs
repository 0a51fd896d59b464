//! Per-object bytes-on-heap, excluding anything behind references.

use crate::heap_dump::FieldType;
use crate::index::{HeapObject, SnapshotIndex};
use crate::{HeapError, Id};

pub struct ShallowSizeCalculator;

impl ShallowSizeCalculator {
    pub fn new() -> ShallowSizeCalculator {
        ShallowSizeCalculator
    }

    pub fn shallow_size(&self, index: &SnapshotIndex, object_id: Id) -> Result<u64, HeapError> {
        match index.heap_object(object_id)? {
            Some(HeapObject::Instance(instance)) => Ok(16 + instance.payload.len() as u64),
            Some(HeapObject::ClassObject(class)) => {
                let mut size = 0_u64;
                for field in &class.static_fields {
                    size += match field.field_type {
                        FieldType::Object => 8,
                        primitive => primitive.size_bytes() as u64,
                    };
                }
                Ok(size)
            }
            // no array header here; the retained formula does charge one
            Some(HeapObject::ObjectArray(array)) => Ok(8 * array.elements.len() as u64),
            Some(HeapObject::PrimitiveArray(array)) => {
                Ok(16 + 4 + 4 + array.element_count as u64 * array.element_type.size_bytes() as u64)
            }
            None => Err(index.unknown_object_error(object_id)),
        }
    }

    /// Shallow total over every instance of the class.
    pub fn shallow_size_of_class(
        &self,
        index: &SnapshotIndex,
        class_obj_id: Id,
    ) -> Result<u64, HeapError> {
        let mut size = 0;
        for &object_id in index.instances_of(class_obj_id) {
            size += self.shallow_size(index, object_id)?;
        }
        Ok(size)
    }
}
