use crate::*;

#[derive(CopyGetters, Copy, Clone)]
pub struct PrimitiveArray<'a> {
    #[get_copy = "pub"]
    obj_id: Id,
    #[get_copy = "pub"]
    stack_trace_serial: Serial,
    #[get_copy = "pub"]
    primitive_type: PrimitiveArrayType,
    #[get_copy = "pub"]
    num_elements: u32,
    /// Raw element payload: `num_elements × primitive_type.size_bytes()` bytes.
    #[get_copy = "pub"]
    contents: &'a [u8],
}

impl<'a> PrimitiveArray<'a> {
    pub(crate) fn parse(input: &'a [u8]) -> nom::IResult<&'a [u8], PrimitiveArray<'a>> {
        // https://github.com/openjdk/jdk/blob/08822b4e0526fe001c39fe08e241b849eddf481d/src/hotspot/share/services/heapDumper.cpp#L279
        let (input, obj_id) = Id::parse(input)?;
        let (input, stack_trace_serial) = number::be_u32(input)?;
        let (input, num_elements) = number::be_u32(input)?;
        let (input, type_byte) = number::be_u8(input)?;

        let array_type = match PrimitiveArrayType::from_type_code(type_byte) {
            Some(t) => t,
            None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Tag,
                )))
            }
        };

        let (input, contents) =
            bytes::take(num_elements as usize * array_type.size_bytes())(input)?;

        Ok((
            input,
            PrimitiveArray {
                obj_id,
                stack_trace_serial,
                primitive_type: array_type,
                num_elements,
                contents,
            },
        ))
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum PrimitiveArrayType {
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl PrimitiveArrayType {
    pub fn from_type_code(code: u8) -> Option<PrimitiveArrayType> {
        match code {
            0x04 => Some(PrimitiveArrayType::Boolean),
            0x05 => Some(PrimitiveArrayType::Char),
            0x06 => Some(PrimitiveArrayType::Float),
            0x07 => Some(PrimitiveArrayType::Double),
            0x08 => Some(PrimitiveArrayType::Byte),
            0x09 => Some(PrimitiveArrayType::Short),
            0x0A => Some(PrimitiveArrayType::Int),
            0x0B => Some(PrimitiveArrayType::Long),
            _ => None,
        }
    }

    pub fn type_code(&self) -> u8 {
        match self {
            PrimitiveArrayType::Boolean => 0x04,
            PrimitiveArrayType::Char => 0x05,
            PrimitiveArrayType::Float => 0x06,
            PrimitiveArrayType::Double => 0x07,
            PrimitiveArrayType::Byte => 0x08,
            PrimitiveArrayType::Short => 0x09,
            PrimitiveArrayType::Int => 0x0A,
            PrimitiveArrayType::Long => 0x0B,
        }
    }

    pub fn size_bytes(&self) -> usize {
        match self {
            PrimitiveArrayType::Boolean => 1,
            PrimitiveArrayType::Char => 2,
            PrimitiveArrayType::Float => 4,
            PrimitiveArrayType::Double => 8,
            PrimitiveArrayType::Byte => 1,
            PrimitiveArrayType::Short => 2,
            PrimitiveArrayType::Int => 4,
            PrimitiveArrayType::Long => 8,
        }
    }

    pub fn java_type_name(&self) -> &'static str {
        match self {
            PrimitiveArrayType::Boolean => "boolean",
            PrimitiveArrayType::Char => "char",
            PrimitiveArrayType::Float => "float",
            PrimitiveArrayType::Double => "double",
            PrimitiveArrayType::Byte => "byte",
            PrimitiveArrayType::Short => "short",
            PrimitiveArrayType::Int => "int",
            PrimitiveArrayType::Long => "long",
        }
    }
}
