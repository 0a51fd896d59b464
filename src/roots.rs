//! Root reachability scanning.
//!
//! Walks every GC root set in a fixed order and records, for each object
//! reached, the single parent it was reached through. A child seen from two
//! or more distinct parents is demoted to the SHARED sentinel and is then
//! retained by no single parent.

use crate::index::{HeapObject, SnapshotIndex};
use crate::seen::Seen;
use crate::{HeapError, Id};
use log::{debug, trace};
use std::collections::{HashMap, HashSet};

/// Parent value for a child reached from two or more distinct parents.
/// 0 cannot collide with a real parent because null is never traversed.
const SHARED: Id = Id::NULL;

pub struct RootScanner {
    parents: HashMap<Id, Id>,
}

impl RootScanner {
    /// Walk all root sets and seal the parent map. The scan visits root sets
    /// in the order jni global, jni local, java frame, sticky class, thread
    /// obj, monitor used; each set gets a fresh visited set.
    pub fn scan_all(index: &SnapshotIndex) -> Result<RootScanner, HeapError> {
        let mut scanner = RootScanner {
            parents: HashMap::new(),
        };

        for (label, roots) in index.roots().in_scan_order() {
            scanner.scan_root_set(index, label, roots)?;
        }

        Ok(scanner)
    }

    fn scan_root_set(
        &mut self,
        index: &SnapshotIndex,
        label: &str,
        roots: &HashSet<Id>,
    ) -> Result<(), HeapError> {
        debug!("--- scanning {} roots: {}", label, roots.len());

        let mut seen = Seen::new();
        for &root in roots {
            trace!("root {}", root);
            self.walk(index, root, &mut seen)?;
        }

        debug!("--- finished {} roots, {} objects seen", label, seen.len());
        Ok(())
    }

    fn walk(&mut self, index: &SnapshotIndex, root: Id, seen: &mut Seen) -> Result<(), HeapError> {
        let mut stack = vec![root];

        while let Some(obj_id) = stack.pop() {
            if obj_id.is_null() || seen.contains(obj_id) {
                continue;
            }
            seen.add(obj_id);

            match index.heap_object(obj_id)? {
                Some(HeapObject::Instance(instance)) => {
                    trace!("instance {} of class {}", obj_id, instance.class_obj_id);
                    for child in index.instance_reference_ids(&instance)? {
                        self.register_parent(obj_id, child);
                        if !seen.contains(child) {
                            stack.push(child);
                        }
                    }
                }
                Some(HeapObject::ObjectArray(array)) => {
                    trace!("object array {}", obj_id);
                    for &element in &array.elements {
                        if element.is_null() {
                            continue;
                        }
                        self.register_parent(obj_id, element);
                        if !seen.contains(element) {
                            stack.push(element);
                        }
                    }
                }
                Some(HeapObject::PrimitiveArray(_)) => {
                    trace!("primitive array {}", obj_id);
                }
                Some(HeapObject::ClassObject(class)) => {
                    trace!("class object {}", obj_id);
                    for field in &class.static_fields {
                        if let Some(child) = field.referent {
                            self.register_parent(obj_id, child);
                            if !seen.contains(child) {
                                stack.push(child);
                            }
                        }
                    }
                    if let Some(super_id) = class.super_class_obj_id {
                        // a super class without its own dump is left alone
                        if index.class_metadata(super_id).is_some() {
                            self.register_parent(obj_id, super_id);
                            if !seen.contains(super_id) {
                                stack.push(super_id);
                            }
                        }
                    }
                }
                None => {
                    if index.is_loaded_class(obj_id)? {
                        // class loaders may be absent from the snapshot
                        debug!("no class dump for loaded class {}; treated as a leaf", obj_id);
                    } else {
                        return Err(index.unknown_object_error(obj_id));
                    }
                }
            }
        }

        Ok(())
    }

    /// First writer wins. A second, distinct writer demotes the child to
    /// SHARED; once SHARED the entry never changes again.
    fn register_parent(&mut self, parent_obj_id: Id, child_obj_id: Id) {
        if child_obj_id.is_null() {
            return;
        }

        match self.parents.get(&child_obj_id) {
            Some(&current) => {
                if current != SHARED && current != parent_obj_id {
                    // reference from another parent
                    self.parents.insert(child_obj_id, SHARED);
                }
            }
            None => {
                trace!(
                    "register parent: parent={} child={}",
                    parent_obj_id,
                    child_obj_id
                );
                self.parents.insert(child_obj_id, parent_obj_id);
            }
        }
    }

    /// True iff `child_obj_id` is referenced from `parent_obj_id` and from
    /// no other parent.
    pub fn is_retained(&self, parent_obj_id: Id, child_obj_id: Id) -> bool {
        if child_obj_id.is_null() {
            return false;
        }

        match self.parents.get(&child_obj_id) {
            Some(&parent) => parent == parent_obj_id,
            None => false,
        }
    }
}
