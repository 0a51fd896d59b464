//! Synthetic hprof streams for driving the full pipeline in tests.
//!
//! The builder mirrors what a JVM emits for the fixture programs: utf-8 and
//! load-class records up front, then one heap dump record holding class
//! dumps, instance dumps, arrays and GC roots. All identifiers are 8 bytes.

#![allow(dead_code)]

use hprof_retained::analyzer::HeapDumpAnalyzer;
use hprof_retained::roots::RootScanner;
use std::fs;
use std::path::{Path, PathBuf};

const TAG_UTF8: u8 = 0x01;
const TAG_LOAD_CLASS: u8 = 0x02;
const TAG_HEAP_DUMP: u8 = 0x0C;

pub const TYPE_OBJECT: u8 = 0x02;
pub const TYPE_BOOLEAN: u8 = 0x04;
pub const TYPE_CHAR: u8 = 0x05;
pub const TYPE_FLOAT: u8 = 0x06;
pub const TYPE_DOUBLE: u8 = 0x07;
pub const TYPE_BYTE: u8 = 0x08;
pub const TYPE_SHORT: u8 = 0x09;
pub const TYPE_INT: u8 = 0x0A;
pub const TYPE_LONG: u8 = 0x0B;

pub struct DumpBuilder {
    records: Vec<u8>,
    segment: Vec<u8>,
    next_name_id: u64,
    next_class_serial: u32,
}

impl DumpBuilder {
    pub fn new() -> DumpBuilder {
        DumpBuilder {
            records: Vec::new(),
            segment: Vec::new(),
            next_name_id: 1,
            next_class_serial: 1,
        }
    }

    fn record(&mut self, tag: u8, body: &[u8]) {
        self.records.push(tag);
        self.records.extend_from_slice(&0_u32.to_be_bytes());
        self.records.extend_from_slice(&(body.len() as u32).to_be_bytes());
        self.records.extend_from_slice(body);
    }

    /// A top-level record with an arbitrary tag byte (for exercising the
    /// unknown-record tolerance).
    pub fn raw_record(&mut self, tag: u8, body: &[u8]) -> &mut Self {
        self.record(tag, body);
        self
    }

    pub fn utf8(&mut self, name_id: u64, text: &str) -> &mut Self {
        let mut body = name_id.to_be_bytes().to_vec();
        body.extend_from_slice(text.as_bytes());
        self.record(TAG_UTF8, &body);
        self
    }

    /// Registers `name` for the class: one utf-8 record plus the load-class
    /// record mapping the class object id to the name.
    pub fn named_class(&mut self, class_obj_id: u64, name: &str) -> &mut Self {
        let name_id = self.next_name_id;
        self.next_name_id += 1;
        self.utf8(name_id, name);

        let serial = self.next_class_serial;
        self.next_class_serial += 1;

        let mut body = Vec::new();
        body.extend_from_slice(&serial.to_be_bytes());
        body.extend_from_slice(&class_obj_id.to_be_bytes());
        body.extend_from_slice(&0_u32.to_be_bytes());
        body.extend_from_slice(&name_id.to_be_bytes());
        self.record(TAG_LOAD_CLASS, &body);
        self
    }

    /// A class dump sub-record. Statics are `(name id, type code, value)`
    /// triples where the value is truncated to the type's width; instance
    /// fields are `(name id, type code)` pairs in declaration order.
    pub fn class_dump(
        &mut self,
        class_obj_id: u64,
        super_class_obj_id: u64,
        statics: &[(u64, u8, u64)],
        fields: &[(u64, u8)],
    ) -> &mut Self {
        self.segment.push(0x20);
        self.segment.extend_from_slice(&class_obj_id.to_be_bytes());
        self.segment.extend_from_slice(&0_u32.to_be_bytes());
        self.segment.extend_from_slice(&super_class_obj_id.to_be_bytes());
        // loader, signers, protection domain, 2x reserved
        self.segment.extend_from_slice(&[0_u8; 40]);
        self.segment.extend_from_slice(&0_u32.to_be_bytes()); // instance size hint
        self.segment.extend_from_slice(&0_u16.to_be_bytes()); // constant pool

        self.segment.extend_from_slice(&(statics.len() as u16).to_be_bytes());
        for &(name_id, type_code, value) in statics {
            self.segment.extend_from_slice(&name_id.to_be_bytes());
            self.segment.push(type_code);
            match type_code {
                TYPE_OBJECT | TYPE_LONG | TYPE_DOUBLE => {
                    self.segment.extend_from_slice(&value.to_be_bytes())
                }
                TYPE_INT | TYPE_FLOAT => {
                    self.segment.extend_from_slice(&(value as u32).to_be_bytes())
                }
                TYPE_CHAR | TYPE_SHORT => {
                    self.segment.extend_from_slice(&(value as u16).to_be_bytes())
                }
                _ => self.segment.push(value as u8),
            }
        }

        self.segment.extend_from_slice(&(fields.len() as u16).to_be_bytes());
        for &(name_id, type_code) in fields {
            self.segment.extend_from_slice(&name_id.to_be_bytes());
            self.segment.push(type_code);
        }
        self
    }

    pub fn instance_dump(&mut self, obj_id: u64, class_obj_id: u64, payload: &[u8]) -> &mut Self {
        self.segment.push(0x21);
        self.segment.extend_from_slice(&obj_id.to_be_bytes());
        self.segment.extend_from_slice(&0_u32.to_be_bytes());
        self.segment.extend_from_slice(&class_obj_id.to_be_bytes());
        self.segment.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        self.segment.extend_from_slice(payload);
        self
    }

    pub fn object_array_dump(
        &mut self,
        obj_id: u64,
        array_class_obj_id: u64,
        elements: &[u64],
    ) -> &mut Self {
        self.segment.push(0x22);
        self.segment.extend_from_slice(&obj_id.to_be_bytes());
        self.segment.extend_from_slice(&0_u32.to_be_bytes());
        self.segment.extend_from_slice(&(elements.len() as u32).to_be_bytes());
        self.segment.extend_from_slice(&array_class_obj_id.to_be_bytes());
        for &element in elements {
            self.segment.extend_from_slice(&element.to_be_bytes());
        }
        self
    }

    pub fn primitive_array_dump(
        &mut self,
        obj_id: u64,
        type_code: u8,
        element_count: u32,
    ) -> &mut Self {
        let element_size = match type_code {
            TYPE_BOOLEAN | TYPE_BYTE => 1,
            TYPE_CHAR | TYPE_SHORT => 2,
            TYPE_INT | TYPE_FLOAT => 4,
            _ => 8,
        };

        self.segment.push(0x23);
        self.segment.extend_from_slice(&obj_id.to_be_bytes());
        self.segment.extend_from_slice(&0_u32.to_be_bytes());
        self.segment.extend_from_slice(&element_count.to_be_bytes());
        self.segment.push(type_code);
        self.segment
            .extend(std::iter::repeat(0_u8).take(element_count as usize * element_size));
        self
    }

    pub fn root_jni_global(&mut self, obj_id: u64) -> &mut Self {
        self.segment.push(0x01);
        self.segment.extend_from_slice(&obj_id.to_be_bytes());
        self.segment.extend_from_slice(&0_u64.to_be_bytes());
        self
    }

    pub fn root_jni_local(&mut self, obj_id: u64) -> &mut Self {
        self.segment.push(0x02);
        self.segment.extend_from_slice(&obj_id.to_be_bytes());
        self.segment.extend_from_slice(&0_u32.to_be_bytes());
        self.segment.extend_from_slice(&0_u32.to_be_bytes());
        self
    }

    pub fn root_java_frame(&mut self, obj_id: u64) -> &mut Self {
        self.segment.push(0x03);
        self.segment.extend_from_slice(&obj_id.to_be_bytes());
        self.segment.extend_from_slice(&0_u32.to_be_bytes());
        self.segment.extend_from_slice(&0_u32.to_be_bytes());
        self
    }

    pub fn root_sticky_class(&mut self, obj_id: u64) -> &mut Self {
        self.segment.push(0x05);
        self.segment.extend_from_slice(&obj_id.to_be_bytes());
        self
    }

    pub fn root_thread_obj(&mut self, obj_id: u64) -> &mut Self {
        self.segment.push(0x08);
        self.segment.extend_from_slice(&obj_id.to_be_bytes());
        self.segment.extend_from_slice(&0_u32.to_be_bytes());
        self.segment.extend_from_slice(&0_u32.to_be_bytes());
        self
    }

    pub fn root_monitor_used(&mut self, obj_id: u64) -> &mut Self {
        self.segment.push(0x07);
        self.segment.extend_from_slice(&obj_id.to_be_bytes());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"JAVA PROFILE 1.0.2\0");
        buf.extend_from_slice(&8_u32.to_be_bytes());
        buf.extend_from_slice(&0_u32.to_be_bytes());
        buf.extend_from_slice(&0_u32.to_be_bytes());
        buf.extend_from_slice(&self.records);

        if !self.segment.is_empty() {
            buf.push(TAG_HEAP_DUMP);
            buf.extend_from_slice(&0_u32.to_be_bytes());
            buf.extend_from_slice(&(self.segment.len() as u32).to_be_bytes());
            buf.extend_from_slice(&self.segment);
        }

        buf
    }

    pub fn write_to(&self, dir: &Path) -> PathBuf {
        let path = dir.join("heapdump.hprof");
        fs::write(&path, self.build()).unwrap();
        path
    }
}

/// Run the full pipeline: write the dump, ingest it, scan roots.
pub fn analyze(builder: &DumpBuilder) -> (HeapDumpAnalyzer, RootScanner) {
    let dir = tempfile::tempdir().unwrap();
    let path = builder.write_to(dir.path());
    let analyzer = HeapDumpAnalyzer::read_file(&path).unwrap();
    let scanner = analyzer.scan_roots().unwrap();
    (analyzer, scanner)
}

/// Assert the class has exactly one instance with the given retained size,
/// the way the original fixture harness does.
pub fn assert_retained_size(
    analyzer: &mut HeapDumpAnalyzer,
    scanner: &RootScanner,
    class_name: &str,
    expected: u64,
) {
    let sizes = analyzer
        .retained_sizes_by_class_name(scanner, class_name)
        .unwrap();

    assert_eq!(
        1,
        sizes.len(),
        "expected exactly one {} instance",
        class_name
    );
    let size = *sizes.values().next().unwrap();
    assert_eq!(expected, size, "{} retained size", class_name);
}

/// Total retained size over all instances of the class.
pub fn total_retained(
    analyzer: &mut HeapDumpAnalyzer,
    scanner: &RootScanner,
    class_name: &str,
) -> u64 {
    analyzer
        .retained_sizes_by_class_name(scanner, class_name)
        .unwrap()
        .values()
        .sum()
}
