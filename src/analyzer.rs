//! Composition root tying the index, the root scanner and the two size
//! calculators together.

use crate::index::SnapshotIndex;
use crate::retained::RetainedSizeCalculator;
use crate::roots::RootScanner;
use crate::shallow::ShallowSizeCalculator;
use crate::{HeapError, Id};
use itertools::Itertools;
use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;

pub struct HeapDumpAnalyzer {
    index: SnapshotIndex,
    shallow: ShallowSizeCalculator,
    retained: RetainedSizeCalculator,
}

/// One ranking row: a class together with its instance totals.
#[derive(Clone, Debug)]
pub struct ClassRanking {
    pub class_name: String,
    pub total_retained: u64,
    pub total_shallow: u64,
    pub instance_count: usize,
}

impl HeapDumpAnalyzer {
    /// Ingest the snapshot at `path`. The index is built once and is
    /// read-only afterwards.
    pub fn read_file(path: &Path) -> Result<HeapDumpAnalyzer, HeapError> {
        Ok(HeapDumpAnalyzer {
            index: SnapshotIndex::from_file(path)?,
            shallow: ShallowSizeCalculator::new(),
            retained: RetainedSizeCalculator::new(),
        })
    }

    pub fn index(&self) -> &SnapshotIndex {
        &self.index
    }

    pub fn scan_roots(&self) -> Result<RootScanner, HeapError> {
        info!("Scanning retained root");
        RootScanner::scan_all(&self.index)
    }

    pub fn retained_size(
        &mut self,
        roots: &RootScanner,
        object_id: Id,
    ) -> Result<u64, HeapError> {
        self.retained.retained_size(&self.index, roots, object_id)
    }

    /// Memoized retained size, if `object_id` was computed before.
    pub fn cached_retained_size(&self, object_id: Id) -> Option<u64> {
        self.retained.cached_size(object_id)
    }

    pub fn shallow_size(&self, object_id: Id) -> Result<u64, HeapError> {
        self.shallow.shallow_size(&self.index, object_id)
    }

    /// Retained size of each instance of the first class named
    /// `target_name`.
    pub fn retained_sizes_by_class_name(
        &mut self,
        roots: &RootScanner,
        target_name: &str,
    ) -> Result<HashMap<Id, u64>, HeapError> {
        let class_ids = self.index.class_ids_with_instances().sorted().collect_vec();

        let mut sizes = HashMap::new();
        for class_obj_id in class_ids {
            let name = self.index.class_name(class_obj_id)?;
            if name != target_name {
                continue;
            }

            for &object_id in self.index.instances_of(class_obj_id) {
                debug!("**** Scanning {} objectId={}", target_name, object_id);
                let size = self.retained.retained_size(&self.index, roots, object_id)?;
                sizes.insert(object_id, size);
                debug!("**** Scanned {}", size);
            }
            break;
        }

        Ok(sizes)
    }

    /// One row per class with instances, ordered by total retained size
    /// ascending so the heaviest classes come last.
    pub fn ranking_by_class(
        &mut self,
        roots: &RootScanner,
    ) -> Result<Vec<ClassRanking>, HeapError> {
        let class_ids = self.index.class_ids_with_instances().sorted().collect_vec();

        let mut rows = Vec::with_capacity(class_ids.len());
        for class_obj_id in class_ids {
            let class_name = self.index.class_name(class_obj_id)?;

            let mut total_retained = 0_u64;
            let mut instance_count = 0_usize;
            for &object_id in self.index.instances_of(class_obj_id) {
                debug!(
                    "Starting scan {}(classObjectId={}, objectId={})",
                    class_name, class_obj_id, object_id
                );
                let size = self.retained.retained_size(&self.index, roots, object_id)?;
                total_retained += size;
                instance_count += 1;
                debug!(
                    "Finished scan {}(classObjectId={}, objectId={}) size={}",
                    class_name, class_obj_id, object_id, size
                );
            }

            let total_shallow = self.shallow.shallow_size_of_class(&self.index, class_obj_id)?;

            rows.push(ClassRanking {
                class_name,
                total_retained,
                total_shallow,
                instance_count,
            });
        }

        rows.sort_by_key(|row| row.total_retained);
        Ok(rows)
    }
}
