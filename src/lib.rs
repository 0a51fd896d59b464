use getset::CopyGetters;
use nom::bytes::complete as bytes;
use nom::number::complete as number;
use std::fmt::{Error, Formatter};
use std::{fmt, io};
use thiserror::Error as ThisError;

pub mod analyzer;
pub mod heap_dump;
pub mod index;
mod parsing_iterator;
pub mod report;
pub mod retained;
pub mod roots;
mod seen;
pub mod shallow;
use parsing_iterator::*;

/// A 64-bit object / name / class-object identifier. 0 is the null reference.
#[derive(CopyGetters, Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Id {
    #[get_copy = "pub"]
    id: u64,
}

impl Id {
    pub const NULL: Id = Id { id: 0 };

    pub fn is_null(&self) -> bool {
        self.id == 0
    }
}

impl From<u64> for Id {
    fn from(id: u64) -> Self {
        Id { id }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.id)
    }
}

impl fmt::UpperHex for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        fmt::UpperHex::fmt(&self.id, f)
    }
}

impl StatelessParser for Id {
    fn parse(input: &[u8]) -> nom::IResult<&[u8], Self> {
        number::be_u64(input).map(|(i, id)| (i, Id { id }))
    }
}

pub type Serial = u32;

/// Failures surfaced by the snapshot index, scanner and size engine.
///
/// Per-record parser noise is not represented here: malformed records are
/// logged and skipped during ingest rather than propagated.
#[derive(Debug, ThisError)]
pub enum HeapError {
    #[error("i/o error on snapshot")]
    Io(#[from] io::Error),
    #[error("index store failure")]
    Store(#[from] sled::Error),
    #[error("snapshot header is malformed")]
    MalformedHeader,
    #[error("unsupported identifier size {0} (only 64-bit snapshots are supported)")]
    UnsupportedIdSize(u32),
    #[error("no utf-8 record for name id {0}")]
    NameMissing(Id),
    #[error("no load-class record for class object id {0}")]
    ClassNameMissing(Id),
    #[error("missing class dump {class} for instance {instance}")]
    ClassDumpMissing { class: Id, instance: Id },
    #[error("corrupt index value under key kind `{kind}` for id {id}")]
    BadStoreValue { kind: &'static str, id: Id },
    #[error(
        "instance {instance} payload is {actual} bytes but its field layout consumes {expected}"
    )]
    PayloadLayoutMismatch {
        instance: Id,
        expected: usize,
        actual: usize,
    },
    #[error("id {id} matches no known heap object kind; probes: {probes}")]
    UnknownObjectKind { id: Id, probes: String },
}

// https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp

#[derive(CopyGetters)]
pub struct Hprof<'a> {
    #[get_copy = "pub"]
    header: Header<'a>,
    records: &'a [u8],
}

impl<'a> Hprof<'a> {
    pub fn records_iter<'i>(&self) -> Records<'i>
    where
        'a: 'i,
    {
        Records {
            remaining: self.records,
        }
    }
}

pub fn parse_hprof(input: &[u8]) -> Result<Hprof, HeapError> {
    let (input, (header, id_size)) = Header::parse(input).map_err(|_| HeapError::MalformedHeader)?;

    if id_size != 8 {
        return Err(HeapError::UnsupportedIdSize(id_size));
    }

    Ok(Hprof {
        header,
        records: input,
    })
}

#[derive(CopyGetters, Copy, Clone)]
pub struct Header<'a> {
    label: &'a [u8],
    /// The timestamp for the hprof as the number of millis since epoch
    #[get_copy = "pub"]
    timestamp_millis: u64,
}

impl<'a> Header<'a> {
    pub fn label(&self) -> Result<&'a str, std::str::Utf8Error> {
        std::str::from_utf8(self.label)
    }

    fn parse(input: &[u8]) -> nom::IResult<&[u8], (Header, u32)> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L63
        let (input, label) = bytes::take_until(&b"\0"[..])(input)?;
        let (input, _) = bytes::take_while_m_n(1, 1, |b| b == 0)(input)?;

        let (input, id_size) = number::be_u32(input)?;
        let (input, epoch_hi) = number::be_u32(input)?;
        let (input, epoch_lo) = number::be_u32(input)?;

        let epoch_timestamp = ((epoch_hi as u64) << 32) + (epoch_lo as u64);

        Ok((
            input,
            (
                Header {
                    label,
                    timestamp_millis: epoch_timestamp,
                },
                id_size,
            ),
        ))
    }
}

impl<'a> fmt::Debug for Header<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.debug_struct("Header")
            .field("label", &self.label())
            .field("timestamp_millis", &self.timestamp_millis())
            .finish()
    }
}

pub struct Records<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for Records<'a> {
    type Item = ParseResult<'a, Record<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        let res = Record::parse(self.remaining);
        match res {
            Ok((input, record)) => {
                self.remaining = input;
                Some(Ok(record))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

#[derive(CopyGetters, Copy, Clone)]
pub struct Record<'a> {
    #[get_copy = "pub"]
    tag: RecordTag,
    #[get_copy = "pub"]
    micros_since_header_ts: u32,
    body: &'a [u8],
}

impl<'a> Record<'a> {
    pub fn as_utf_8(&self) -> Option<ParseResult<'a, Utf8<'a>>> {
        match self.tag {
            RecordTag::Utf8 => Some(Utf8::parse(self.body)),
            _ => None,
        }
    }

    pub fn as_load_class(&self) -> Option<ParseResult<'a, LoadClass>> {
        match self.tag {
            RecordTag::LoadClass => Some(LoadClass::parse(self.body)),
            _ => None,
        }
    }

    pub fn as_heap_dump_segment(&self) -> Option<ParseResult<'a, HeapDumpSegment<'a>>> {
        match self.tag {
            RecordTag::HeapDump | RecordTag::HeapDumpSegment => {
                Some(HeapDumpSegment::parse(self.body))
            }
            _ => None,
        }
    }

    fn parse<'i: 'r, 'r>(input: &'i [u8]) -> nom::IResult<&'i [u8], Record<'r>> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L76
        let (input, tag_byte) = bytes::take(1_usize)(input)?;

        let tag = match tag_byte[0] {
            0x01 => RecordTag::Utf8,
            0x02 => RecordTag::LoadClass,
            0x03 => RecordTag::UnloadClass,
            0x04 => RecordTag::StackFrame,
            0x05 => RecordTag::StackTrace,
            0x06 => RecordTag::AllocSites,
            0x07 => RecordTag::HeapSummary,
            0x0A => RecordTag::StartThread,
            0x0B => RecordTag::EndThread,
            0x0C => RecordTag::HeapDump,
            0x0D => RecordTag::CpuSamples,
            0x0E => RecordTag::ControlSettings,
            0x1C => RecordTag::HeapDumpSegment,
            0x2C => RecordTag::HeapDumpEnd,
            other => RecordTag::Unknown(other),
        };

        let (input, micros) = number::be_u32(input)?;
        let (input, len) = number::be_u32(input)?;
        let (input, body) = bytes::take(len)(input)?;

        Ok((
            input,
            Record {
                tag,
                micros_since_header_ts: micros,
                body,
            },
        ))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecordTag {
    Utf8,
    LoadClass,
    UnloadClass,
    StackFrame,
    StackTrace,
    AllocSites,
    StartThread,
    EndThread,
    HeapSummary,
    HeapDump,
    CpuSamples,
    ControlSettings,
    HeapDumpSegment,
    HeapDumpEnd,
    /// A tag byte outside the known taxonomy. The record is length-prefixed,
    /// so the stream can still be advanced past it.
    Unknown(u8),
}

#[derive(CopyGetters, Copy, Clone)]
pub struct Utf8<'a> {
    #[get_copy = "pub"]
    name_id: Id,
    #[get_copy = "pub"]
    text: &'a [u8],
}

impl<'a> Utf8<'a> {
    fn parse(input: &'a [u8]) -> ParseResult<'a, Utf8<'a>> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L88
        let (input, id) = Id::parse(input)?;

        Ok(Utf8 {
            name_id: id,
            text: input,
        })
    }

    /// Note that in practice, there are nonzero Utf8 records with invalid UTF-8 bytes.
    pub fn text_as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(self.text)
    }
}

#[derive(CopyGetters, Copy, Clone)]
pub struct LoadClass {
    #[get_copy = "pub"]
    class_serial: Serial,
    #[get_copy = "pub"]
    class_obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    class_name_id: Id,
}

impl LoadClass {
    fn parse(input: &[u8]) -> ParseResult<LoadClass> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L93
        let (input, class_serial) = number::be_u32(input)?;
        let (input, class_obj_id) = Id::parse(input)?;
        let (input, stack_trace_serial) = number::be_u32(input)?;
        let (_input, class_name_id) = Id::parse(input)?;

        Ok(LoadClass {
            class_serial,
            class_obj_id,
            stack_trace_serial,
            class_name_id,
        })
    }
}

/// Represents either a HPROF_HEAP_DUMP or HPROF_HEAP_DUMP_SEGMENT
pub struct HeapDumpSegment<'a> {
    records: &'a [u8],
}

impl<'a> HeapDumpSegment<'a> {
    fn parse(input: &'a [u8]) -> ParseResult<'a, HeapDumpSegment<'a>> {
        Ok(HeapDumpSegment { records: input })
    }

    pub fn sub_records(&self) -> SubRecords<'a> {
        SubRecords {
            remaining: self.records,
        }
    }
}

pub struct SubRecords<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for SubRecords<'a> {
    type Item = ParseResult<'a, heap_dump::SubRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        let res = heap_dump::SubRecord::parse(self.remaining);
        match res {
            Ok((input, record)) => {
                self.remaining = input;
                Some(Ok(record))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

pub type ParseResult<'e, T> = Result<T, nom::Err<nom::error::Error<&'e [u8]>>>;
