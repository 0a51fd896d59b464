//! The random-access view of a parsed heap dump.
//!
//! The snapshot file is streamed exactly once. Keyed records land in an
//! embedded KV store opened inside a fresh temporary directory; the hot
//! structures (class dumps, class → instance membership, GC root sets) stay
//! in memory because they are probed on every field walk.

use crate::heap_dump::{Class, FieldType, FieldValue, PrimitiveArrayType, SubRecord};
use crate::{parse_hprof, HeapError, Id, RecordTag};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::convert::TryInto;
use std::path::Path;
use std::time::UNIX_EPOCH;
use std::{fs, mem};

const KEY_PREFIX_STRING: &str = "string-";
const KEY_PREFIX_CLASS_NAME_ID: &str = "coid2cnid-";
const KEY_PREFIX_CLASS: &str = "class-";
const KEY_PREFIX_INSTANCE: &str = "instance-";
const KEY_PREFIX_OBJECT_ARRAY: &str = "objectarray-";
const KEY_PREFIX_PRIMITIVE_ARRAY: &str = "primitivearray-";

/// Snapshot mtime as base-36 seconds since epoch, reserved for freshness checks.
const KEY_MTIME: &str = "hprof_mtime";

const WRITE_BATCH_SIZE: usize = 100_000;
const INGEST_LOG_EVERY: u64 = 1_000_000;

/// Class metadata as stored in the index.
#[derive(Clone, Debug)]
pub struct ClassRecord {
    pub class_obj_id: Id,
    pub super_class_obj_id: Option<Id>,
    pub static_fields: Vec<StaticField>,
    /// Fields declared by this class only; inherited fields are reached
    /// through `super_class_obj_id`.
    pub instance_fields: Vec<InstanceField>,
}

#[derive(Copy, Clone, Debug)]
pub struct StaticField {
    pub name_id: Id,
    pub field_type: FieldType,
    /// The referenced object for non-null reference fields.
    pub referent: Option<Id>,
}

#[derive(Copy, Clone, Debug)]
pub struct InstanceField {
    pub name_id: Id,
    pub field_type: FieldType,
}

#[derive(Clone, Debug)]
pub struct InstanceRecord {
    pub obj_id: Id,
    pub class_obj_id: Id,
    /// All instance fields, declared and inherited, in layout order.
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct ObjectArrayRecord {
    pub obj_id: Id,
    pub array_class_obj_id: Id,
    /// Elements in order; null slots are `Id::NULL`.
    pub elements: Vec<Id>,
}

#[derive(Copy, Clone, Debug)]
pub struct PrimitiveArrayRecord {
    pub obj_id: Id,
    pub element_type: PrimitiveArrayType,
    pub element_count: u32,
}

/// The four object kinds behind an identifier. Hot paths dispatch on this once.
pub enum HeapObject<'a> {
    Instance(InstanceRecord),
    ObjectArray(ObjectArrayRecord),
    PrimitiveArray(PrimitiveArrayRecord),
    ClassObject(&'a ClassRecord),
}

/// The six GC root tables, disjoint by construction of the dump.
#[derive(Default)]
pub struct RootSets {
    pub jni_global: HashSet<Id>,
    pub jni_local: HashSet<Id>,
    pub java_frame: HashSet<Id>,
    pub sticky_class: HashSet<Id>,
    pub thread_obj: HashSet<Id>,
    pub monitor_used: HashSet<Id>,
}

impl RootSets {
    /// The fixed order the reachability scanner walks root sets in.
    pub fn in_scan_order(&self) -> [(&'static str, &HashSet<Id>); 6] {
        [
            ("jni global", &self.jni_global),
            ("jni local", &self.jni_local),
            ("java frame", &self.java_frame),
            ("sticky class", &self.sticky_class),
            ("thread obj", &self.thread_obj),
            ("monitor used", &self.monitor_used),
        ]
    }
}

pub struct SnapshotIndex {
    db: sled::Db,
    classes: HashMap<Id, ClassRecord>,
    class_instances: HashMap<Id, Vec<Id>>,
    roots: RootSets,
    // removed together with the store when the index is dropped
    _store_dir: tempfile::TempDir,
}

#[derive(Default)]
struct IngestCounters {
    classes: u64,
    instances: u64,
    object_arrays: u64,
    primitive_arrays: u64,
}

impl SnapshotIndex {
    /// Stream the snapshot at `path` once and build the index.
    pub fn from_file(path: &Path) -> Result<SnapshotIndex, HeapError> {
        info!("Opening {}", path.display());

        let file = fs::File::open(path)?;
        let mmap = unsafe { memmap::MmapOptions::new().map(&file) }?;
        let hprof = parse_hprof(&mmap[..])?;
        debug!(
            "snapshot label={:?} timestamp_millis={}",
            hprof.header().label(),
            hprof.header().timestamp_millis()
        );

        let store_dir = tempfile::Builder::new().prefix("hprof").tempdir()?;
        let db = sled::Config::new()
            .create_new(true)
            .path(store_dir.path().join("kv"))
            .open()?;

        let mut index = SnapshotIndex {
            db,
            classes: HashMap::new(),
            class_instances: HashMap::new(),
            roots: RootSets::default(),
            _store_dir: store_dir,
        };

        let mut writer = BatchWriter::default();
        let mut counters = IngestCounters::default();
        let mut sub_records = 0_u64;

        for record in hprof.records_iter() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!(
                        "Got parsing issue ({}); ignoring the remainder of the stream",
                        parse_error_kind(&e)
                    );
                    break;
                }
            };

            match record.tag() {
                RecordTag::Utf8 => match record.as_utf_8().expect("checked tag") {
                    Ok(utf8) => writer.put(
                        &index.db,
                        keyed(KEY_PREFIX_STRING, utf8.name_id()),
                        utf8.text().to_vec(),
                    )?,
                    Err(e) => warn!("Malformed utf-8 record ({}); skipped", parse_error_kind(&e)),
                },
                RecordTag::LoadClass => match record.as_load_class().expect("checked tag") {
                    Ok(load_class) => writer.put(
                        &index.db,
                        keyed(KEY_PREFIX_CLASS_NAME_ID, load_class.class_obj_id()),
                        load_class.class_name_id().id().to_be_bytes().to_vec(),
                    )?,
                    Err(e) => warn!(
                        "Malformed load-class record ({}); skipped",
                        parse_error_kind(&e)
                    ),
                },
                RecordTag::HeapDump | RecordTag::HeapDumpSegment => {
                    let segment = match record.as_heap_dump_segment().expect("checked tag") {
                        Ok(s) => s,
                        Err(e) => {
                            warn!(
                                "Malformed heap dump segment ({}); skipped",
                                parse_error_kind(&e)
                            );
                            continue;
                        }
                    };

                    for sub in segment.sub_records() {
                        let sub = match sub {
                            Ok(s) => s,
                            Err(e) => {
                                warn!(
                                    "Malformed heap dump sub-record ({}); skipping the rest of the segment",
                                    parse_error_kind(&e)
                                );
                                break;
                            }
                        };

                        sub_records += 1;
                        if sub_records % INGEST_LOG_EVERY == 0 {
                            info!("currently {} heap records", sub_records);
                        }

                        index.ingest_sub_record(sub, &mut writer, &mut counters)?;
                    }
                }
                // stack frames and traces carry no heap edges
                RecordTag::StackFrame | RecordTag::StackTrace | RecordTag::HeapDumpEnd => {}
                RecordTag::Unknown(tag) => warn!("unknown record type!!: {:#04X}", tag),
                other => debug!("ignoring record {:?}", other),
            }
        }

        let mtime = fs::metadata(path)?.modified()?;
        let mtime_secs = mtime
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        writer.put(
            &index.db,
            KEY_MTIME.as_bytes().to_vec(),
            to_base36(mtime_secs).into_bytes(),
        )?;
        writer.finish(&index.db)?;
        index.db.flush()?;

        info!(
            "Indexed {} classes, {} instances, {} object arrays, {} primitive arrays",
            counters.classes, counters.instances, counters.object_arrays, counters.primitive_arrays
        );

        Ok(index)
    }

    fn ingest_sub_record(
        &mut self,
        sub: SubRecord,
        writer: &mut BatchWriter,
        counters: &mut IngestCounters,
    ) -> Result<(), HeapError> {
        match sub {
            SubRecord::GcRootJniGlobal(root) => {
                debug!("Found JNI Global: {}", root.obj_id());
                self.roots.jni_global.insert(root.obj_id());
            }
            SubRecord::GcRootJniLocal(root) => {
                self.roots.jni_local.insert(root.obj_id());
            }
            SubRecord::GcRootJavaFrame(root) => {
                self.roots.java_frame.insert(root.obj_id());
            }
            SubRecord::GcRootStickyClass(root) => {
                self.roots.sticky_class.insert(root.obj_id());
            }
            SubRecord::GcRootThreadObj(root) => {
                if let Some(id) = root.thread_obj_id() {
                    self.roots.thread_obj.insert(id);
                }
            }
            SubRecord::GcRootMonitorUsed(root) => {
                self.roots.monitor_used.insert(root.obj_id());
            }
            SubRecord::GcRootUnknown(root) => {
                debug!("ignoring unknown gc root {}", root.obj_id())
            }
            SubRecord::GcRootNativeStack(root) => {
                debug!("ignoring native stack root {}", root.obj_id())
            }
            SubRecord::GcRootThreadBlock(root) => {
                debug!("ignoring thread block root {}", root.obj_id())
            }
            SubRecord::Class(class) => {
                if let Some(record) = class_record_from(&class) {
                    counters.classes += 1;
                    writer.put(
                        &self.db,
                        keyed(KEY_PREFIX_CLASS, record.class_obj_id),
                        encode_class(&record),
                    )?;
                    self.classes.insert(record.class_obj_id, record);
                }
            }
            SubRecord::Instance(instance) => {
                counters.instances += 1;
                self.class_instances
                    .entry(instance.class_obj_id())
                    .or_insert_with(Vec::new)
                    .push(instance.obj_id());
                writer.put(
                    &self.db,
                    keyed(KEY_PREFIX_INSTANCE, instance.obj_id()),
                    encode_instance(instance.class_obj_id(), instance.fields()),
                )?;
            }
            SubRecord::ObjectArray(array) => {
                let mut elements = Vec::with_capacity(array.num_elements() as usize);
                let mut ok = true;
                for element in array.elements() {
                    match element {
                        Ok(id) => elements.push(id.unwrap_or(Id::NULL)),
                        Err(e) => {
                            warn!(
                                "Malformed object array {} ({}); skipped",
                                array.obj_id(),
                                parse_error_kind(&e)
                            );
                            ok = false;
                            break;
                        }
                    }
                }
                if ok {
                    counters.object_arrays += 1;
                    writer.put(
                        &self.db,
                        keyed(KEY_PREFIX_OBJECT_ARRAY, array.obj_id()),
                        encode_object_array(array.array_class_obj_id(), &elements),
                    )?;
                }
            }
            SubRecord::PrimitiveArray(array) => {
                counters.primitive_arrays += 1;
                writer.put(
                    &self.db,
                    keyed(KEY_PREFIX_PRIMITIVE_ARRAY, array.obj_id()),
                    encode_primitive_array(array.primitive_type(), array.num_elements()),
                )?;
            }
        }

        Ok(())
    }

    pub fn string_by_name_id(&self, name_id: Id) -> Result<String, HeapError> {
        match self.db.get(keyed(KEY_PREFIX_STRING, name_id))? {
            Some(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            None => Err(HeapError::NameMissing(name_id)),
        }
    }

    pub fn class_name_id_by_class_obj_id(&self, class_obj_id: Id) -> Result<Id, HeapError> {
        match self.db.get(keyed(KEY_PREFIX_CLASS_NAME_ID, class_obj_id))? {
            Some(bytes) => {
                let raw: [u8; 8] =
                    bytes
                        .as_ref()
                        .try_into()
                        .map_err(|_| HeapError::BadStoreValue {
                            kind: "coid2cnid",
                            id: class_obj_id,
                        })?;
                Ok(Id::from(u64::from_be_bytes(raw)))
            }
            None => Err(HeapError::ClassNameMissing(class_obj_id)),
        }
    }

    pub fn class_name(&self, class_obj_id: Id) -> Result<String, HeapError> {
        let name_id = self.class_name_id_by_class_obj_id(class_obj_id)?;
        self.string_by_name_id(name_id)
    }

    pub fn class_metadata(&self, class_obj_id: Id) -> Option<&ClassRecord> {
        self.classes.get(&class_obj_id)
    }

    pub fn instance(&self, obj_id: Id) -> Result<Option<InstanceRecord>, HeapError> {
        match self.db.get(keyed(KEY_PREFIX_INSTANCE, obj_id))? {
            Some(bytes) => decode_instance(obj_id, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn object_array(&self, obj_id: Id) -> Result<Option<ObjectArrayRecord>, HeapError> {
        match self.db.get(keyed(KEY_PREFIX_OBJECT_ARRAY, obj_id))? {
            Some(bytes) => decode_object_array(obj_id, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn primitive_array(&self, obj_id: Id) -> Result<Option<PrimitiveArrayRecord>, HeapError> {
        match self.db.get(keyed(KEY_PREFIX_PRIMITIVE_ARRAY, obj_id))? {
            Some(bytes) => decode_primitive_array(obj_id, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve an identifier to its object kind, probing instance, object
    /// array, primitive array, then class object.
    pub fn heap_object(&self, obj_id: Id) -> Result<Option<HeapObject>, HeapError> {
        if let Some(instance) = self.instance(obj_id)? {
            return Ok(Some(HeapObject::Instance(instance)));
        }
        if let Some(array) = self.object_array(obj_id)? {
            return Ok(Some(HeapObject::ObjectArray(array)));
        }
        if let Some(array) = self.primitive_array(obj_id)? {
            return Ok(Some(HeapObject::PrimitiveArray(array)));
        }
        if let Some(class) = self.class_metadata(obj_id) {
            return Ok(Some(HeapObject::ClassObject(class)));
        }

        Ok(None)
    }

    /// True when a load-class record exists for the id, even if its class
    /// dump is absent (class loaders may be missing from the snapshot).
    pub fn is_loaded_class(&self, obj_id: Id) -> Result<bool, HeapError> {
        Ok(self
            .db
            .get(keyed(KEY_PREFIX_CLASS_NAME_ID, obj_id))?
            .is_some())
    }

    /// The invariant-violation error for an id that resolves to no kind,
    /// carrying the result of every kind probe.
    pub fn unknown_object_error(&self, obj_id: Id) -> HeapError {
        let probe = |prefix: &str| match self.db.get(keyed(prefix, obj_id)) {
            Ok(Some(_)) => "hit",
            Ok(None) => "miss",
            Err(_) => "store error",
        };

        let probes = format!(
            "instance={} object_array={} primitive_array={} class_dump={} load_class={} utf8={}",
            probe(KEY_PREFIX_INSTANCE),
            probe(KEY_PREFIX_OBJECT_ARRAY),
            probe(KEY_PREFIX_PRIMITIVE_ARRAY),
            if self.classes.contains_key(&obj_id) {
                "hit"
            } else {
                "miss"
            },
            probe(KEY_PREFIX_CLASS_NAME_ID),
            probe(KEY_PREFIX_STRING),
        );

        HeapError::UnknownObjectKind { id: obj_id, probes }
    }

    pub fn class_ids_with_instances(&self) -> impl Iterator<Item = Id> + '_ {
        self.class_instances.keys().copied()
    }

    pub fn instances_of(&self, class_obj_id: Id) -> &[Id] {
        self.class_instances
            .get(&class_obj_id)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn roots(&self) -> &RootSets {
        &self.roots
    }

    /// Non-null reference-field targets of an instance, in layout order:
    /// for each class from the instance's class up the super chain, declared
    /// fields in declaration order, 8-byte big-endian ids at the field
    /// offsets. The scanner and the size engine both walk payloads through
    /// this one decoder.
    pub fn instance_reference_ids(&self, instance: &InstanceRecord) -> Result<Vec<Id>, HeapError> {
        let payload = &instance.payload;
        let mut refs = Vec::new();
        let mut offset = 0_usize;
        let mut class_obj_id = instance.class_obj_id;

        loop {
            let class =
                self.class_metadata(class_obj_id)
                    .ok_or(HeapError::ClassDumpMissing {
                        class: class_obj_id,
                        instance: instance.obj_id,
                    })?;

            for field in &class.instance_fields {
                match field.field_type {
                    FieldType::Object => {
                        let end = offset + 8;
                        let raw = payload.get(offset..end).ok_or(
                            HeapError::PayloadLayoutMismatch {
                                instance: instance.obj_id,
                                expected: end,
                                actual: payload.len(),
                            },
                        )?;
                        let child = u64::from_be_bytes(raw.try_into().expect("8-byte slice"));
                        if child != 0 {
                            refs.push(Id::from(child));
                        }
                        offset = end;
                    }
                    primitive => offset += primitive.size_bytes(),
                }
            }

            match class.super_class_obj_id {
                Some(super_id) => class_obj_id = super_id,
                None => break,
            }
        }

        if offset != payload.len() {
            return Err(HeapError::PayloadLayoutMismatch {
                instance: instance.obj_id,
                expected: offset,
                actual: payload.len(),
            });
        }

        Ok(refs)
    }
}

/// Buffers KV writes and applies them in large batches; random single-key
/// inserts are far slower during ingest.
#[derive(Default)]
struct BatchWriter {
    batch: sled::Batch,
    pending: usize,
}

impl BatchWriter {
    fn put(&mut self, db: &sled::Db, key: Vec<u8>, value: Vec<u8>) -> Result<(), sled::Error> {
        self.batch.insert(key, value);
        self.pending += 1;

        if self.pending >= WRITE_BATCH_SIZE {
            db.apply_batch(mem::take(&mut self.batch))?;
            self.pending = 0;
        }

        Ok(())
    }

    fn finish(self, db: &sled::Db) -> Result<(), sled::Error> {
        db.apply_batch(self.batch)
    }
}

fn keyed(prefix: &str, id: Id) -> Vec<u8> {
    format!("{}{:x}", prefix, id.id()).into_bytes()
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if n == 0 {
        return "0".to_string();
    }

    let mut buf = [0_u8; 13];
    let mut at = buf.len();
    while n > 0 {
        at -= 1;
        buf[at] = DIGITS[(n % 36) as usize];
        n /= 36;
    }

    String::from_utf8_lossy(&buf[at..]).into_owned()
}

fn class_record_from(class: &Class) -> Option<ClassRecord> {
    let mut static_fields = Vec::new();
    for entry in class.static_fields() {
        match entry {
            Ok(field) => static_fields.push(StaticField {
                name_id: field.name_id(),
                field_type: field.field_type(),
                referent: match field.value() {
                    FieldValue::ObjectId(id) => id,
                    _ => None,
                },
            }),
            Err(_) => {
                warn!(
                    "Malformed static field table in class dump {}; skipped",
                    class.obj_id()
                );
                return None;
            }
        }
    }

    let mut instance_fields = Vec::new();
    for descriptor in class.instance_field_descriptors() {
        match descriptor {
            Ok(field) => instance_fields.push(InstanceField {
                name_id: field.name_id(),
                field_type: field.field_type(),
            }),
            Err(_) => {
                warn!(
                    "Malformed instance field table in class dump {}; skipped",
                    class.obj_id()
                );
                return None;
            }
        }
    }

    Some(ClassRecord {
        class_obj_id: class.obj_id(),
        super_class_obj_id: class.super_class_obj_id(),
        static_fields,
        instance_fields,
    })
}

fn encode_class(record: &ClassRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(
        12 + record.static_fields.len() * 17 + record.instance_fields.len() * 9,
    );

    buf.extend_from_slice(
        &record
            .super_class_obj_id
            .map(|id| id.id())
            .unwrap_or(0)
            .to_be_bytes(),
    );
    buf.extend_from_slice(&(record.static_fields.len() as u16).to_be_bytes());
    for field in &record.static_fields {
        buf.extend_from_slice(&field.name_id.id().to_be_bytes());
        buf.push(field.field_type.type_code());
        buf.extend_from_slice(&field.referent.map(|id| id.id()).unwrap_or(0).to_be_bytes());
    }
    buf.extend_from_slice(&(record.instance_fields.len() as u16).to_be_bytes());
    for field in &record.instance_fields {
        buf.extend_from_slice(&field.name_id.id().to_be_bytes());
        buf.push(field.field_type.type_code());
    }

    buf
}

fn decode_class(class_obj_id: Id, bytes: &[u8]) -> Result<ClassRecord, HeapError> {
    let bad = || HeapError::BadStoreValue {
        kind: "class",
        id: class_obj_id,
    };
    let mut offset = 0;

    let super_raw = read_u64(bytes, &mut offset).ok_or_else(bad)?;
    let super_class_obj_id = if super_raw == 0 {
        None
    } else {
        Some(Id::from(super_raw))
    };

    let num_statics = read_u16(bytes, &mut offset).ok_or_else(bad)?;
    let mut static_fields = Vec::with_capacity(num_statics as usize);
    for _ in 0..num_statics {
        let name_id = Id::from(read_u64(bytes, &mut offset).ok_or_else(bad)?);
        let field_type = FieldType::from_type_code(read_u8(bytes, &mut offset).ok_or_else(bad)?)
            .ok_or_else(bad)?;
        let referent_raw = read_u64(bytes, &mut offset).ok_or_else(bad)?;
        static_fields.push(StaticField {
            name_id,
            field_type,
            referent: if referent_raw == 0 {
                None
            } else {
                Some(Id::from(referent_raw))
            },
        });
    }

    let num_instance_fields = read_u16(bytes, &mut offset).ok_or_else(bad)?;
    let mut instance_fields = Vec::with_capacity(num_instance_fields as usize);
    for _ in 0..num_instance_fields {
        let name_id = Id::from(read_u64(bytes, &mut offset).ok_or_else(bad)?);
        let field_type = FieldType::from_type_code(read_u8(bytes, &mut offset).ok_or_else(bad)?)
            .ok_or_else(bad)?;
        instance_fields.push(InstanceField {
            name_id,
            field_type,
        });
    }

    if offset != bytes.len() {
        return Err(bad());
    }

    Ok(ClassRecord {
        class_obj_id,
        super_class_obj_id,
        static_fields,
        instance_fields,
    })
}

fn encode_instance(class_obj_id: Id, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + payload.len());
    buf.extend_from_slice(&class_obj_id.id().to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn decode_instance(obj_id: Id, bytes: &[u8]) -> Result<InstanceRecord, HeapError> {
    if bytes.len() < 8 {
        return Err(HeapError::BadStoreValue {
            kind: "instance",
            id: obj_id,
        });
    }

    let class_obj_id = Id::from(u64::from_be_bytes(
        bytes[..8].try_into().expect("8-byte slice"),
    ));

    Ok(InstanceRecord {
        obj_id,
        class_obj_id,
        payload: bytes[8..].to_vec(),
    })
}

fn encode_object_array(array_class_obj_id: Id, elements: &[Id]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + elements.len() * 8);
    buf.extend_from_slice(&array_class_obj_id.id().to_be_bytes());
    for element in elements {
        buf.extend_from_slice(&element.id().to_be_bytes());
    }
    buf
}

fn decode_object_array(obj_id: Id, bytes: &[u8]) -> Result<ObjectArrayRecord, HeapError> {
    if bytes.len() < 8 || (bytes.len() - 8) % 8 != 0 {
        return Err(HeapError::BadStoreValue {
            kind: "objectarray",
            id: obj_id,
        });
    }

    let array_class_obj_id = Id::from(u64::from_be_bytes(
        bytes[..8].try_into().expect("8-byte slice"),
    ));
    let elements = bytes[8..]
        .chunks_exact(8)
        .map(|chunk| Id::from(u64::from_be_bytes(chunk.try_into().expect("8-byte chunk"))))
        .collect();

    Ok(ObjectArrayRecord {
        obj_id,
        array_class_obj_id,
        elements,
    })
}

fn encode_primitive_array(element_type: PrimitiveArrayType, element_count: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.push(element_type.type_code());
    buf.extend_from_slice(&element_count.to_be_bytes());
    buf
}

fn decode_primitive_array(obj_id: Id, bytes: &[u8]) -> Result<PrimitiveArrayRecord, HeapError> {
    let bad = || HeapError::BadStoreValue {
        kind: "primitivearray",
        id: obj_id,
    };

    if bytes.len() != 5 {
        return Err(bad());
    }

    let element_type = PrimitiveArrayType::from_type_code(bytes[0]).ok_or_else(bad)?;
    let element_count = u32::from_be_bytes(bytes[1..5].try_into().expect("4-byte slice"));

    Ok(PrimitiveArrayRecord {
        obj_id,
        element_type,
        element_count,
    })
}

fn read_u64(bytes: &[u8], offset: &mut usize) -> Option<u64> {
    let end = *offset + 8;
    let chunk = bytes.get(*offset..end)?;
    *offset = end;
    Some(u64::from_be_bytes(chunk.try_into().ok()?))
}

fn read_u16(bytes: &[u8], offset: &mut usize) -> Option<u16> {
    let end = *offset + 2;
    let chunk = bytes.get(*offset..end)?;
    *offset = end;
    Some(u16::from_be_bytes(chunk.try_into().ok()?))
}

fn read_u8(bytes: &[u8], offset: &mut usize) -> Option<u8> {
    let byte = *bytes.get(*offset)?;
    *offset += 1;
    Some(byte)
}

fn parse_error_kind<'a, 'b>(e: &'a nom::Err<nom::error::Error<&'b [u8]>>) -> &'a str {
    match e {
        nom::Err::Incomplete(_) => "incomplete input",
        nom::Err::Error(inner) | nom::Err::Failure(inner) => inner.code.description(),
    }
}
