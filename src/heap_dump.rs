use crate::*;

mod primitive_array;
pub use primitive_array::*;

// https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L142
const TAG_GC_ROOT_UNKNOWN: u8 = 0xFF;
const TAG_GC_ROOT_JNI_GLOBAL: u8 = 0x01;
const TAG_GC_ROOT_JNI_LOCAL: u8 = 0x02;
const TAG_GC_ROOT_JAVA_FRAME: u8 = 0x03;
const TAG_GC_ROOT_NATIVE_STACK: u8 = 0x04;
const TAG_GC_ROOT_STICKY_CLASS: u8 = 0x05;
const TAG_GC_ROOT_THREAD_BLOCK: u8 = 0x06;
const TAG_GC_ROOT_MONITOR_USED: u8 = 0x07;
const TAG_GC_ROOT_THREAD_OBJ: u8 = 0x08;
const TAG_CLASS_DUMP: u8 = 0x20;
const TAG_INSTANCE_DUMP: u8 = 0x21;
const TAG_OBJECT_ARRAY_DUMP: u8 = 0x22;
const TAG_PRIMITIVE_ARRAY_DUMP: u8 = 0x23;

/// One heap-dump sub-record out of a HPROF_HEAP_DUMP / HPROF_HEAP_DUMP_SEGMENT body.
#[derive(Copy, Clone)]
pub enum SubRecord<'a> {
    GcRootUnknown(GcRootUnknown),
    GcRootJniGlobal(GcRootJniGlobal),
    GcRootJniLocal(GcRootJniLocal),
    GcRootJavaFrame(GcRootJavaFrame),
    GcRootNativeStack(GcRootNativeStack),
    GcRootStickyClass(GcRootStickyClass),
    GcRootThreadBlock(GcRootThreadBlock),
    GcRootMonitorUsed(GcRootMonitorUsed),
    GcRootThreadObj(GcRootThreadObj),
    Class(Class<'a>),
    Instance(Instance<'a>),
    ObjectArray(ObjectArray<'a>),
    PrimitiveArray(PrimitiveArray<'a>),
}

impl<'a> SubRecord<'a> {
    pub(crate) fn parse(input: &'a [u8]) -> nom::IResult<&'a [u8], SubRecord<'a>> {
        let (input, tag) = number::be_u8(input)?;

        match tag {
            TAG_GC_ROOT_UNKNOWN => {
                let (input, obj_id) = Id::parse(input)?;
                Ok((input, SubRecord::GcRootUnknown(GcRootUnknown { obj_id })))
            }
            TAG_GC_ROOT_JNI_GLOBAL => {
                let (input, obj_id) = Id::parse(input)?;
                let (input, jni_global_ref_id) = Id::parse(input)?;
                Ok((
                    input,
                    SubRecord::GcRootJniGlobal(GcRootJniGlobal {
                        obj_id,
                        jni_global_ref_id,
                    }),
                ))
            }
            TAG_GC_ROOT_JNI_LOCAL => {
                let (input, obj_id) = Id::parse(input)?;
                let (input, thread_serial) = number::be_u32(input)?;
                let (input, frame_index) = number::be_u32(input)?;
                Ok((
                    input,
                    SubRecord::GcRootJniLocal(GcRootJniLocal {
                        obj_id,
                        thread_serial,
                        frame_index,
                    }),
                ))
            }
            TAG_GC_ROOT_JAVA_FRAME => {
                let (input, obj_id) = Id::parse(input)?;
                let (input, thread_serial) = number::be_u32(input)?;
                let (input, frame_index) = number::be_u32(input)?;
                Ok((
                    input,
                    SubRecord::GcRootJavaFrame(GcRootJavaFrame {
                        obj_id,
                        thread_serial,
                        frame_index,
                    }),
                ))
            }
            TAG_GC_ROOT_NATIVE_STACK => {
                let (input, obj_id) = Id::parse(input)?;
                let (input, thread_serial) = number::be_u32(input)?;
                Ok((
                    input,
                    SubRecord::GcRootNativeStack(GcRootNativeStack {
                        obj_id,
                        thread_serial,
                    }),
                ))
            }
            TAG_GC_ROOT_STICKY_CLASS => {
                let (input, obj_id) = Id::parse(input)?;
                Ok((input, SubRecord::GcRootStickyClass(GcRootStickyClass { obj_id })))
            }
            TAG_GC_ROOT_THREAD_BLOCK => {
                let (input, obj_id) = Id::parse(input)?;
                let (input, thread_serial) = number::be_u32(input)?;
                Ok((
                    input,
                    SubRecord::GcRootThreadBlock(GcRootThreadBlock {
                        obj_id,
                        thread_serial,
                    }),
                ))
            }
            TAG_GC_ROOT_MONITOR_USED => {
                let (input, obj_id) = Id::parse(input)?;
                Ok((input, SubRecord::GcRootMonitorUsed(GcRootMonitorUsed { obj_id })))
            }
            TAG_GC_ROOT_THREAD_OBJ => {
                let (input, thread_obj_id) = Id::parse(input)?;
                let (input, thread_serial) = number::be_u32(input)?;
                let (input, stack_trace_serial) = number::be_u32(input)?;
                Ok((
                    input,
                    SubRecord::GcRootThreadObj(GcRootThreadObj {
                        thread_obj_id,
                        thread_serial,
                        stack_trace_serial,
                    }),
                ))
            }
            TAG_CLASS_DUMP => Class::parse(input).map(|(i, c)| (i, SubRecord::Class(c))),
            TAG_INSTANCE_DUMP => Instance::parse(input).map(|(i, o)| (i, SubRecord::Instance(o))),
            TAG_OBJECT_ARRAY_DUMP => {
                ObjectArray::parse(input).map(|(i, a)| (i, SubRecord::ObjectArray(a)))
            }
            TAG_PRIMITIVE_ARRAY_DUMP => {
                PrimitiveArray::parse(input).map(|(i, a)| (i, SubRecord::PrimitiveArray(a)))
            }
            // sub-records are not length-prefixed, so an unknown tag is not skippable
            _ => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            ))),
        }
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootUnknown {
    #[get_copy = "pub"]
    obj_id: Id,
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootJniGlobal {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    jni_global_ref_id: Id,
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootJniLocal {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    thread_serial: Serial,
    #[get_copy = "pub"]
    frame_index: u32,
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootJavaFrame {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    thread_serial: Serial,
    #[get_copy = "pub"]
    frame_index: u32,
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootNativeStack {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    thread_serial: Serial,
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootStickyClass {
    #[get_copy = "pub"]
    obj_id: Id,
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootThreadBlock {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    thread_serial: Serial,
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootMonitorUsed {
    #[get_copy = "pub"]
    obj_id: Id,
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct GcRootThreadObj {
    thread_obj_id: Id,
    #[get_copy = "pub"]
    thread_serial: Serial,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
}

impl GcRootThreadObj {
    /// May be missing for a thread newly attached through JNI
    pub fn thread_obj_id(&self) -> Option<Id> {
        if self.thread_obj_id.is_null() {
            None
        } else {
            Some(self.thread_obj_id)
        }
    }
}

#[derive(CopyGetters, Copy, Clone)]
pub struct Class<'a> {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    super_class_obj_id: Id,
    #[get_copy = "pub"]
    instance_size_bytes: u32,
    num_static_fields: u16,
    static_field_bytes: &'a [u8],
    num_instance_fields: u16,
    instance_field_bytes: &'a [u8],
}

impl<'a> Class<'a> {
    pub fn super_class_obj_id(&self) -> Option<Id> {
        if self.super_class_obj_id.is_null() {
            None
        } else {
            Some(self.super_class_obj_id)
        }
    }

    pub fn static_fields(&self) -> StaticFieldEntries<'a> {
        StaticFieldEntries {
            iter: ParsingIterator::new(self.static_field_bytes, self.num_static_fields as u32),
        }
    }

    /// Just the fields declared by this class; inherited fields are reached
    /// through the super-class chain.
    pub fn instance_field_descriptors(&self) -> FieldDescriptors<'a> {
        FieldDescriptors {
            iter: ParsingIterator::new(self.instance_field_bytes, self.num_instance_fields as u32),
        }
    }

    fn parse(input: &'a [u8]) -> nom::IResult<&'a [u8], Class<'a>> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L197
        let (input, obj_id) = Id::parse(input)?;
        let (input, stack_trace_serial) = number::be_u32(input)?;
        let (input, super_class_obj_id) = Id::parse(input)?;
        let (input, _class_loader_obj_id) = Id::parse(input)?;
        let (input, _signers_obj_id) = Id::parse(input)?;
        let (input, _protection_domain_obj_id) = Id::parse(input)?;
        let (input, _reserved_1) = Id::parse(input)?;
        let (input, _reserved_2) = Id::parse(input)?;
        let (input, instance_size_bytes) = number::be_u32(input)?;

        // constant pool entries carry no reference edges; consume and drop
        let (input, num_constants) = number::be_u16(input)?;
        let mut rest = input;
        for _ in 0..num_constants {
            let (i, _pool_index) = number::be_u16(rest)?;
            let (i, field_type) = FieldType::parse(i)?;
            let (i, _) = bytes::take(field_type.size_bytes())(i)?;
            rest = i;
        }

        let (input, num_static_fields) = number::be_u16(rest)?;
        let statics_start = input;
        let mut rest = input;
        for _ in 0..num_static_fields {
            let (i, _name_id) = Id::parse(rest)?;
            let (i, field_type) = FieldType::parse(i)?;
            let (i, _) = bytes::take(field_type.size_bytes())(i)?;
            rest = i;
        }
        let static_field_bytes = &statics_start[..statics_start.len() - rest.len()];

        let (input, num_instance_fields) = number::be_u16(rest)?;
        let (input, instance_field_bytes) = bytes::take(num_instance_fields as usize * 9)(input)?;

        Ok((
            input,
            Class {
                obj_id,
                stack_trace_serial,
                super_class_obj_id,
                instance_size_bytes,
                num_static_fields,
                static_field_bytes,
                num_instance_fields,
                instance_field_bytes,
            },
        ))
    }
}

#[derive(CopyGetters, Copy, Clone)]
pub struct Instance<'a> {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    class_obj_id: Id,
    /// The raw field payload: all instance fields of this class and its
    /// superclasses concatenated in declaration order.
    #[get_copy = "pub"]
    fields: &'a [u8],
}

impl<'a> Instance<'a> {
    fn parse(input: &'a [u8]) -> nom::IResult<&'a [u8], Instance<'a>> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L262
        let (input, obj_id) = Id::parse(input)?;
        let (input, stack_trace_serial) = number::be_u32(input)?;
        let (input, class_obj_id) = Id::parse(input)?;
        let (input, num_bytes) = number::be_u32(input)?;
        let (input, fields) = bytes::take(num_bytes)(input)?;

        Ok((
            input,
            Instance {
                obj_id,
                stack_trace_serial,
                class_obj_id,
                fields,
            },
        ))
    }
}

#[derive(CopyGetters, Copy, Clone)]
pub struct ObjectArray<'a> {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    array_class_obj_id: Id,
    #[get_copy = "pub"]
    num_elements: u32,
    element_bytes: &'a [u8],
}

impl<'a> ObjectArray<'a> {
    /// Elements in order; `None` for null slots.
    pub fn elements(&self) -> ElementIds<'a> {
        ElementIds {
            iter: ParsingIterator::new(self.element_bytes, self.num_elements),
        }
    }

    fn parse(input: &'a [u8]) -> nom::IResult<&'a [u8], ObjectArray<'a>> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L271
        let (input, obj_id) = Id::parse(input)?;
        let (input, stack_trace_serial) = number::be_u32(input)?;
        let (input, num_elements) = number::be_u32(input)?;
        let (input, array_class_obj_id) = Id::parse(input)?;
        let (input, element_bytes) = bytes::take(num_elements as usize * 8)(input)?;

        Ok((
            input,
            ObjectArray {
                obj_id,
                stack_trace_serial,
                array_class_obj_id,
                num_elements,
                element_bytes,
            },
        ))
    }
}

pub struct ElementIds<'a> {
    iter: ParsingIterator<'a, Id>,
}

impl<'a> Iterator for ElementIds<'a> {
    type Item = ParseResult<'a, Option<Id>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|res| {
            res.map(|id| if id.is_null() { None } else { Some(id) })
        })
    }
}

pub struct StaticFieldEntries<'a> {
    iter: ParsingIterator<'a, StaticFieldEntry>,
}

impl<'a> Iterator for StaticFieldEntries<'a> {
    type Item = ParseResult<'a, StaticFieldEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

pub struct FieldDescriptors<'a> {
    iter: ParsingIterator<'a, FieldDescriptor>,
}

impl<'a> Iterator for FieldDescriptors<'a> {
    type Item = ParseResult<'a, FieldDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FieldType {
    Object,
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl FieldType {
    pub fn from_type_code(code: u8) -> Option<FieldType> {
        match code {
            0x02 => Some(FieldType::Object),
            0x04 => Some(FieldType::Boolean),
            0x05 => Some(FieldType::Char),
            0x06 => Some(FieldType::Float),
            0x07 => Some(FieldType::Double),
            0x08 => Some(FieldType::Byte),
            0x09 => Some(FieldType::Short),
            0x0A => Some(FieldType::Int),
            0x0B => Some(FieldType::Long),
            _ => None,
        }
    }

    pub fn type_code(&self) -> u8 {
        match self {
            FieldType::Object => 0x02,
            FieldType::Boolean => 0x04,
            FieldType::Char => 0x05,
            FieldType::Float => 0x06,
            FieldType::Double => 0x07,
            FieldType::Byte => 0x08,
            FieldType::Short => 0x09,
            FieldType::Int => 0x0A,
            FieldType::Long => 0x0B,
        }
    }

    /// Bytes a value of this type occupies, references included (64-bit ids).
    pub fn size_bytes(&self) -> usize {
        match self {
            FieldType::Object => 8,
            FieldType::Boolean => 1,
            FieldType::Char => 2,
            FieldType::Float => 4,
            FieldType::Double => 8,
            FieldType::Byte => 1,
            FieldType::Short => 2,
            FieldType::Int => 4,
            FieldType::Long => 8,
        }
    }

    pub fn java_type_name(&self) -> &'static str {
        match self {
            FieldType::Object => "Object",
            FieldType::Boolean => "boolean",
            FieldType::Char => "char",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Byte => "byte",
            FieldType::Short => "short",
            FieldType::Int => "int",
            FieldType::Long => "long",
        }
    }

    pub fn parse_value<'a>(&self, input: &'a [u8]) -> nom::IResult<&'a [u8], FieldValue> {
        match self {
            FieldType::Object => {
                let (input, id) = Id::parse(input)?;
                let id = if id.is_null() { None } else { Some(id) };
                Ok((input, FieldValue::ObjectId(id)))
            }
            FieldType::Boolean => {
                number::be_u8(input).map(|(i, v)| (i, FieldValue::Boolean(v != 0)))
            }
            FieldType::Char => number::be_u16(input).map(|(i, v)| (i, FieldValue::Char(v))),
            FieldType::Float => number::be_f32(input).map(|(i, v)| (i, FieldValue::Float(v))),
            FieldType::Double => number::be_f64(input).map(|(i, v)| (i, FieldValue::Double(v))),
            FieldType::Byte => number::be_i8(input).map(|(i, v)| (i, FieldValue::Byte(v))),
            FieldType::Short => number::be_i16(input).map(|(i, v)| (i, FieldValue::Short(v))),
            FieldType::Int => number::be_i32(input).map(|(i, v)| (i, FieldValue::Int(v))),
            FieldType::Long => number::be_i64(input).map(|(i, v)| (i, FieldValue::Long(v))),
        }
    }

    fn parse(input: &[u8]) -> nom::IResult<&[u8], FieldType> {
        let (input, code) = number::be_u8(input)?;
        match FieldType::from_type_code(code) {
            Some(field_type) => Ok((input, field_type)),
            None => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            ))),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FieldValue {
    ObjectId(Option<Id>),
    Boolean(bool),
    Char(u16),
    Float(f32),
    Double(f64),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct FieldDescriptor {
    #[get_copy = "pub"]
    name_id: Id,
    #[get_copy = "pub"]
    field_type: FieldType,
}

impl StatelessParser for FieldDescriptor {
    fn parse(input: &[u8]) -> nom::IResult<&[u8], Self> {
        let (input, name_id) = Id::parse(input)?;
        let (input, field_type) = FieldType::parse(input)?;

        Ok((
            input,
            FieldDescriptor {
                name_id,
                field_type,
            },
        ))
    }
}

#[derive(CopyGetters, Copy, Clone, Debug)]
pub struct StaticFieldEntry {
    #[get_copy = "pub"]
    name_id: Id,
    #[get_copy = "pub"]
    field_type: FieldType,
    #[get_copy = "pub"]
    value: FieldValue,
}

impl StatelessParser for StaticFieldEntry {
    fn parse(input: &[u8]) -> nom::IResult<&[u8], Self> {
        let (input, name_id) = Id::parse(input)?;
        let (input, field_type) = FieldType::parse(input)?;
        let (input, value) = field_type.parse_value(input)?;

        Ok((
            input,
            StaticFieldEntry {
                name_id,
                field_type,
                value,
            },
        ))
    }
}
