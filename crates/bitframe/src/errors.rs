//! Error types for schema construction, bit access, encoding and decoding.

use thiserror::Error;

/// Errors produced while building a [crate::Frame] or [crate::Protocol]. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Type tag is not part of the field type table.
    #[error("{0} is not supported")]
    UnsupportedType(String),
    /// Field name is empty or declared twice in the same frame.
    #[error("invalid field name {0:?}")]
    InvalidFieldName(String),
    /// Declared type does not fit the field kind (e.g. a simple field with a variable type).
    #[error("field {field} cannot carry type {ty}")]
    InvalidFieldKind { field: String, ty: String },
    /// Length prefix is not one of the byte-aligned integer types.
    #[error("field {field} uses {ty} as a length prefix")]
    InvalidLengthPrefix { field: String, ty: String },
    /// A repeated sub-frame field needs an element count policy.
    #[error("field {0} requires a length")]
    MissingLength(String),
    /// Registration targets a field that is not a declared sub-frame.
    #[error("no sub frame is registered for {0}")]
    UnknownSubFrameField(String),
    /// Registration names a discriminator shared by several sub-frame fields.
    #[error("{0} selects more than one sub frame field; register by field name")]
    AmbiguousSubFrameField(String),
    /// Discriminant value is already mapped for this sub-frame field.
    #[error("a sub frame is already registered at {field} for the value {discriminant}")]
    DuplicateRegistration { field: String, discriminant: u64 },
}

/// Errors produced when reading bits from a byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    /// Requested range is beyond the end of the data.
    #[error("read past end of buffer")]
    OutOfBounds,
    /// Requested range straddles a byte boundary or starts mid-byte for a byte-aligned width.
    #[error("{width}-bit read at bit {bit_offset} crosses a byte boundary")]
    CrossByteBoundary { bit_offset: u8, width: u8 },
    /// Width is not one of 1..=8, 16 or 32.
    #[error("unsupported read width {0}")]
    UnsupportedWidth(u8),
}

/// Errors produced when writing bits into a byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteError {
    /// Buffer is too short to hold the value.
    #[error("write past end of buffer")]
    OutOfBounds,
    /// Value would straddle a byte boundary or starts mid-byte for a byte-aligned width.
    #[error("{width}-bit write at bit {bit_offset} crosses a byte boundary")]
    CrossByteBoundary { bit_offset: u8, width: u8 },
    /// Width is not one of 1..=8, 16 or 32.
    #[error("unsupported write width {0}")]
    UnsupportedWidth(u8),
    /// Value does not fit in the requested width.
    #[error("value {value} does not fit in {width} bits")]
    ValueOutOfRange { value: u64, width: u8 },
}

/// Errors that abort [crate::Frame::encode]. The partially written output is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("field {field}: {source}")]
    Write {
        field: String,
        #[source]
        source: WriteError,
    },
    /// An emitted field has no value in the message.
    #[error("missing value for field {0}")]
    MissingField(String),
    /// The value held by the message does not match the resolved field type.
    #[error("field {field} expects {expected}")]
    InvalidValue { field: String, expected: &'static str },
    /// No way to delimit the field on the wire (e.g. an array without any length).
    #[error("field {0} has an unsupported length and type combination")]
    UnsupportedLength(String),
    /// A byte or element count does not fit the length prefix.
    #[error("field {field}: length {length} does not fit a {prefix} prefix")]
    LengthOverflow {
        field: String,
        length: usize,
        prefix: String,
    },
    /// Payload is longer than (or, for arrays, different from) the declared literal length.
    #[error("field {field}: expected {expected} but got {actual}")]
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },
    /// A dynamic type resolved to something the field kind cannot carry.
    #[error("field {field} resolved to unexpected type {ty}")]
    UnexpectedType { field: String, ty: String },
}

impl EncodeError {
    pub(crate) fn write(field: &str, source: WriteError) -> Self {
        EncodeError::Write {
            field: field.to_string(),
            source,
        }
    }
}

/// Errors recovered while decoding a single field. They are collected into
/// [crate::report::FieldFault]s and never abort a decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Read(#[from] ReadError),
    /// String field is not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    /// The sibling field holding the length is absent or not an integer.
    #[error("length field {0} is missing or not an integer")]
    MissingLength(String),
    /// Array or repeated sub-frame has no count policy.
    #[error("no length policy to resolve the element count")]
    UnsupportedLength,
    /// Resolved length runs past the end of the input.
    #[error("length {length} exceeds remaining {remaining} bytes")]
    InvalidLength { length: usize, remaining: usize },
    /// A dynamic type resolved to something the field kind cannot carry.
    #[error("resolved to unexpected type {0}")]
    UnexpectedType(String),
}
