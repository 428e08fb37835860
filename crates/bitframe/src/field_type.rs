//! The field type table: every wire type a field can take and its bit width.

use std::{fmt, str::FromStr};

use crate::errors::SchemaError;

/// Width of a field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// Exact number of bits.
    Bits(u8),
    /// Resolved at encode/decode time from the value or a length policy.
    Variable,
}

impl Width {
    pub fn bits(self) -> Option<u8> {
        match self {
            Width::Bits(bits) => Some(bits),
            Width::Variable => None,
        }
    }
}

/// Element type of an integer array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
}

impl Element {
    pub fn field_type(self) -> FieldType {
        match self {
            Element::UInt8 => FieldType::UInt8,
            Element::UInt16 => FieldType::UInt16,
            Element::UInt32 => FieldType::UInt32,
            Element::UInt64 => FieldType::UInt64,
        }
    }

    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            Element::UInt8 => 1,
            Element::UInt16 => 2,
            Element::UInt32 => 4,
            Element::UInt64 => 8,
        }
    }
}

/// Wire type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bit,
    UInt2,
    UInt3,
    UInt4,
    UInt5,
    UInt6,
    UInt7,
    UInt8,
    UInt16,
    UInt32,
    /// Eight opaque bytes, not a numeric encoding.
    UInt64,
    String,
    Buffer,
    /// Array of integers, optionally with a literal element count (`uint16[4]`).
    Array {
        element: Element,
        count: Option<usize>,
    },
    SubFrame,
    SubFrameArray,
}

impl FieldType {
    /// Looks up the bit width of this type.
    pub fn width(self) -> Width {
        match self {
            FieldType::Bit => Width::Bits(1),
            FieldType::UInt2 => Width::Bits(2),
            FieldType::UInt3 => Width::Bits(3),
            FieldType::UInt4 => Width::Bits(4),
            FieldType::UInt5 => Width::Bits(5),
            FieldType::UInt6 => Width::Bits(6),
            FieldType::UInt7 => Width::Bits(7),
            FieldType::UInt8 => Width::Bits(8),
            FieldType::UInt16 => Width::Bits(16),
            FieldType::UInt32 => Width::Bits(32),
            FieldType::UInt64 => Width::Bits(64),
            FieldType::String
            | FieldType::Buffer
            | FieldType::Array { .. }
            | FieldType::SubFrame
            | FieldType::SubFrameArray => Width::Variable,
        }
    }

    pub fn is_fixed(self) -> bool {
        matches!(self.width(), Width::Bits(_))
    }

    /// True for the integer types that can carry a length prefix.
    pub fn is_length_prefix(self) -> bool {
        matches!(
            self,
            FieldType::UInt8 | FieldType::UInt16 | FieldType::UInt32
        )
    }

    /// Largest value a fixed numeric type can hold.
    pub(crate) fn max_value(self) -> Option<u64> {
        match self.width() {
            Width::Bits(64) | Width::Variable => None,
            Width::Bits(bits) => Some((1u64 << bits) - 1),
        }
    }
}

/// Textual lookup of a type tag's width. Unknown tags are a schema error.
pub fn width_of(tag: &str) -> Result<Width, SchemaError> {
    Ok(tag.parse::<FieldType>()?.width())
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s {
            "bit" => FieldType::Bit,
            "uint2" => FieldType::UInt2,
            "uint3" => FieldType::UInt3,
            "uint4" => FieldType::UInt4,
            "uint5" => FieldType::UInt5,
            "uint6" => FieldType::UInt6,
            "uint7" => FieldType::UInt7,
            "uint8" => FieldType::UInt8,
            "uint16" => FieldType::UInt16,
            "uint32" => FieldType::UInt32,
            "uint64" => FieldType::UInt64,
            "string" => FieldType::String,
            "buffer" => FieldType::Buffer,
            "subFrame" => FieldType::SubFrame,
            "subFrame[]" => FieldType::SubFrameArray,
            _ => return parse_array(s).ok_or_else(|| SchemaError::UnsupportedType(s.to_string())),
        };

        Ok(ty)
    }
}

fn parse_array(s: &str) -> Option<FieldType> {
    let (base, rest) = s.split_once('[')?;
    let count = rest.strip_suffix(']')?;

    let element = match base {
        "uint8" => Element::UInt8,
        "uint16" => Element::UInt16,
        "uint32" => Element::UInt32,
        "uint64" => Element::UInt64,
        _ => return None,
    };

    let count = if count.is_empty() {
        None
    } else {
        Some(count.parse().ok()?)
    };

    Some(FieldType::Array { element, count })
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            FieldType::Bit => "bit",
            FieldType::UInt2 => "uint2",
            FieldType::UInt3 => "uint3",
            FieldType::UInt4 => "uint4",
            FieldType::UInt5 => "uint5",
            FieldType::UInt6 => "uint6",
            FieldType::UInt7 => "uint7",
            FieldType::UInt8 => "uint8",
            FieldType::UInt16 => "uint16",
            FieldType::UInt32 => "uint32",
            FieldType::UInt64 => "uint64",
            FieldType::String => "string",
            FieldType::Buffer => "buffer",
            FieldType::SubFrame => "subFrame",
            FieldType::SubFrameArray => "subFrame[]",
            FieldType::Array { element, count } => {
                let base = element.field_type();
                return match count {
                    Some(count) => write!(f, "{base}[{count}]"),
                    None => write!(f, "{base}[]"),
                };
            }
        };

        f.write_str(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_widths() {
        let expected = [
            ("bit", 1),
            ("uint2", 2),
            ("uint3", 3),
            ("uint4", 4),
            ("uint5", 5),
            ("uint6", 6),
            ("uint7", 7),
            ("uint8", 8),
            ("uint16", 16),
            ("uint32", 32),
            ("uint64", 64),
        ];

        for (tag, bits) in expected {
            assert_eq!(width_of(tag).unwrap(), Width::Bits(bits), "{tag}");
        }
    }

    #[test]
    fn test_variable_widths() {
        for tag in [
            "string",
            "buffer",
            "uint8[]",
            "uint16[]",
            "uint32[]",
            "uint64[]",
            "uint16[4]",
            "subFrame",
            "subFrame[]",
        ] {
            assert_eq!(width_of(tag).unwrap(), Width::Variable, "{tag}");
        }
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(
            width_of("uint9").unwrap_err(),
            SchemaError::UnsupportedType("uint9".to_string())
        );
        assert!(width_of("bit[]").is_err());
        assert!(width_of("uint8[x]").is_err());
        assert!(width_of("uint8[4").is_err());
    }

    #[test]
    fn test_array_literal_count() {
        assert_eq!(
            "uint16[4]".parse::<FieldType>().unwrap(),
            FieldType::Array {
                element: Element::UInt16,
                count: Some(4)
            }
        );
    }

    #[test]
    fn test_display_matches_tags() {
        for tag in ["bit", "uint7", "uint64", "buffer", "uint32[]", "uint8[3]", "subFrame[]"] {
            assert_eq!(tag.parse::<FieldType>().unwrap().to_string(), tag);
        }
    }

    #[test]
    fn test_max_value() {
        assert_eq!(FieldType::Bit.max_value(), Some(1));
        assert_eq!(FieldType::UInt8.max_value(), Some(255));
        assert_eq!(FieldType::UInt32.max_value(), Some(u32::MAX as u64));
        assert_eq!(FieldType::UInt64.max_value(), None);
    }
}
