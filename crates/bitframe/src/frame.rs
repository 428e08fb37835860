//! Frame: an ordered list of [Field]s with symmetric encode and decode.
//!
//! Both directions walk the fields in declaration order with a bit-precise
//! [Cursor]. Sub-byte fields pack LSB-first into the current byte; every
//! other field must start on a byte boundary. Fields decoded earlier are
//! visible to later dynamic types, length references and discriminators.

use std::{collections::HashSet, fmt, sync::Arc};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::{
    bits::{self, Cursor},
    errors::{DecodeError, EncodeError, ReadError, SchemaError, WriteError},
    field::{Field, FieldKind, Length, SubFrame, TypeSpec},
    field_type::{Element, FieldType},
    report::{DecodeReport, Encoded, FieldFault, Unmapped},
    value::{Message, Value},
};

/// Hook run on the message before it is encoded, e.g. to derive a length field.
pub type PrepareFn = Arc<dyn Fn(&mut Message) + Send + Sync>;

/// An immutable message schema.
#[derive(Clone)]
pub struct Frame {
    fields: Vec<Field>,
    prepare: Option<PrepareFn>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("fields", &self.fields)
            .field("prepare", &self.prepare.is_some())
            .finish()
    }
}

impl Frame {
    /// Validates `fields` and builds a frame. Fails on duplicate names, kinds
    /// that cannot carry their declared type, and non-integer length prefixes.
    pub fn new(fields: Vec<Field>) -> Result<Self, SchemaError> {
        Self::from_parts(fields, None)
    }

    /// Like [Frame::new], with a hook run on the message before every encode.
    pub fn with_prepare<F>(fields: Vec<Field>, prepare: F) -> Result<Self, SchemaError>
    where
        F: Fn(&mut Message) + Send + Sync + 'static,
    {
        Self::from_parts(fields, Some(Arc::new(prepare)))
    }

    pub(crate) fn from_parts(
        fields: Vec<Field>,
        prepare: Option<PrepareFn>,
    ) -> Result<Self, SchemaError> {
        let mut names = HashSet::with_capacity(fields.len());
        for field in &fields {
            if field.name.is_empty() || !names.insert(field.name.as_str()) {
                return Err(SchemaError::InvalidFieldName(field.name.clone()));
            }
            validate(field)?;
        }

        Ok(Frame { fields, prepare })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Finds a sub-frame field by its own name or, failing that, by its
    /// discriminator's name. A discriminator shared by several sub-frame
    /// fields does not identify one of them.
    pub(crate) fn sub_frame_mut(
        &mut self,
        name: &str,
    ) -> Result<(&str, &mut SubFrame), SchemaError> {
        let unknown = || SchemaError::UnknownSubFrameField(name.to_string());

        let by_name = self
            .fields
            .iter()
            .position(|field| field.as_sub_frame().is_some() && field.name == name);
        let index = match by_name {
            Some(index) => index,
            None => {
                let mut matches = self.fields.iter().enumerate().filter_map(|(index, field)| {
                    field
                        .as_sub_frame()
                        .is_some_and(|sub| sub.discriminator == name)
                        .then_some(index)
                });
                match (matches.next(), matches.next()) {
                    (Some(index), None) => index,
                    (Some(_), Some(_)) => {
                        return Err(SchemaError::AmbiguousSubFrameField(name.to_string()));
                    }
                    (None, _) => return Err(unknown()),
                }
            }
        };

        let field = &mut self.fields[index];
        match &mut field.kind {
            FieldKind::SubFrame(sub) => Ok((field.name.as_str(), sub)),
            _ => Err(unknown()),
        }
    }

    /// Serializes `message`. The prepare hook, if any, runs first and its
    /// changes stay in `message`. Optional fields are never written.
    pub fn encode(&self, message: &mut Message) -> Result<Encoded, EncodeError> {
        if let Some(prepare) = &self.prepare {
            prepare(message);
        }

        let mut writer = Writer::default();
        let mut unmapped = Vec::new();

        for field in &self.fields {
            if field.optional {
                continue;
            }

            match &field.kind {
                FieldKind::Simple(ty) | FieldKind::Complex { ty, .. } => {
                    let length = match &field.kind {
                        FieldKind::Complex { length, .. } => length.as_ref(),
                        _ => None,
                    };
                    encode_typed(field, ty, length, message, &mut writer)?;
                }
                FieldKind::SubFrame(sub) => {
                    let skipped = encode_sub_frame(field, sub, message, &mut writer)?;
                    unmapped.extend(skipped);
                }
                FieldKind::SubFrameArray { frame, length } => {
                    let skipped = encode_sub_frames(field, frame, length, message, &mut writer)?;
                    unmapped.extend(skipped);
                }
            }
        }

        Ok(Encoded {
            bytes: writer.finish(),
            unmapped,
        })
    }

    /// Decodes fields into `message` starting at byte `start` of `data`.
    ///
    /// Values already in `message` (such as a pre-set discriminator) are
    /// visible to the fields being decoded. A field that fails is set to
    /// [Value::Null] and reported; decoding continues with the next field.
    pub fn decode(&self, data: &[u8], message: &mut Message, start: usize) -> DecodeReport {
        let mut reader = Reader {
            data,
            cursor: Cursor::new(start),
        };
        let mut report = DecodeReport::default();

        for field in &self.fields {
            if field.optional {
                continue;
            }

            let result = match &field.kind {
                FieldKind::Simple(ty) => decode_typed(field, ty, None, message, &mut reader),
                FieldKind::Complex { ty, length } => {
                    decode_typed(field, ty, length.as_ref(), message, &mut reader)
                }
                FieldKind::SubFrame(sub) => {
                    decode_sub_frame(field, sub, message, &mut reader, &mut report)
                }
                FieldKind::SubFrameArray { frame, length } => {
                    decode_sub_frames(field, frame, length, message, &mut reader, &mut report)
                        .inspect_err(|_| reader.exhaust())
                }
            };

            match result {
                Ok(value) => {
                    trace!(field = %field.name, ?value, "decoded field");
                    message.insert(field.name.clone(), value);
                }
                Err(error) => {
                    debug!(field = %field.name, %error, "field failed to decode");
                    report.faults.push(FieldFault {
                        path: field.name.clone(),
                        error,
                    });
                    message.insert(field.name.clone(), Value::Null);
                }
            }
        }

        report.end = reader.cursor.end().min(data.len());
        report
    }
}

fn validate(field: &Field) -> Result<(), SchemaError> {
    let invalid_kind = |ty: FieldType| SchemaError::InvalidFieldKind {
        field: field.name.clone(),
        ty: ty.to_string(),
    };
    let check_prefix = |ty: FieldType| {
        if ty.is_length_prefix() {
            Ok(())
        } else {
            Err(SchemaError::InvalidLengthPrefix {
                field: field.name.clone(),
                ty: ty.to_string(),
            })
        }
    };

    match &field.kind {
        FieldKind::Simple(ty) => match ty.as_static() {
            Some(ty) if !ty.is_fixed() => Err(invalid_kind(ty)),
            _ => Ok(()),
        },
        FieldKind::Complex { ty, length } => {
            if let Some(ty @ (FieldType::SubFrame | FieldType::SubFrameArray)) = ty.as_static() {
                return Err(invalid_kind(ty));
            }
            match length {
                Some(Length::Prefix(prefix)) => check_prefix(*prefix),
                _ => Ok(()),
            }
        }
        FieldKind::SubFrame(sub) => sub.length.map_or(Ok(()), check_prefix),
        FieldKind::SubFrameArray { length, .. } => match length {
            Length::Prefix(prefix) => check_prefix(*prefix),
            _ => Ok(()),
        },
    }
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
    cursor: Cursor,
}

impl Writer {
    fn write_int(&mut self, field: &str, ty: FieldType, value: u64) -> Result<(), EncodeError> {
        let Some(width) = ty.width().bits() else {
            return Err(EncodeError::UnexpectedType {
                field: field.to_string(),
                ty: ty.to_string(),
            });
        };

        let needed = self.cursor.byte + (width as usize).div_ceil(8);
        if self.buf.len() < needed {
            self.buf.resize(needed, 0);
        }

        bits::write_bits(&mut self.buf, self.cursor.byte, self.cursor.bit, width, value)
            .map_err(|err| EncodeError::write(field, err))?;
        self.cursor.advance(width as usize);

        Ok(())
    }

    fn write_bytes(&mut self, field: &str, bytes: &[u8]) -> Result<(), EncodeError> {
        self.align(field, 8)?;
        let at = self.cursor.byte;
        self.buf.resize(at + bytes.len(), 0);
        bits::write_raw(&mut self.buf, at, bytes).map_err(|err| EncodeError::write(field, err))?;
        self.cursor.advance(bytes.len() * 8);

        Ok(())
    }

    fn align(&self, field: &str, width: u8) -> Result<(), EncodeError> {
        if self.cursor.is_aligned() {
            Ok(())
        } else {
            Err(EncodeError::write(
                field,
                WriteError::CrossByteBoundary {
                    bit_offset: self.cursor.bit,
                    width,
                },
            ))
        }
    }

    /// Writes one fixed-width value. `uint64` takes up to 8 raw bytes, zero padded.
    fn write_fixed(&mut self, field: &str, ty: FieldType, value: &Value) -> Result<(), EncodeError> {
        if ty == FieldType::UInt64 {
            let bytes = value.as_bytes().ok_or_else(|| EncodeError::InvalidValue {
                field: field.to_string(),
                expected: "bytes or string",
            })?;
            if bytes.len() > 8 {
                return Err(EncodeError::LengthMismatch {
                    field: field.to_string(),
                    expected: 8,
                    actual: bytes.len(),
                });
            }

            self.align(field, 64)?;
            let mut raw = [0u8; 8];
            raw[..bytes.len()].copy_from_slice(bytes);
            return self.write_bytes(field, &raw);
        }

        let value = value.as_u64().ok_or_else(|| EncodeError::InvalidValue {
            field: field.to_string(),
            expected: "integer",
        })?;
        trace!(field, %ty, value, "writing field");
        self.write_int(field, ty, value)
    }

    fn write_length(&mut self, field: &str, prefix: FieldType, length: usize) -> Result<(), EncodeError> {
        let fits = prefix
            .max_value()
            .is_some_and(|max| length as u64 <= max);
        if !fits {
            return Err(EncodeError::LengthOverflow {
                field: field.to_string(),
                length,
                prefix: prefix.to_string(),
            });
        }

        self.align(field, 8)?;
        self.write_int(field, prefix, length as u64)
    }

    fn finish(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

fn require<'a>(message: &'a Message, field: &Field) -> Result<&'a Value, EncodeError> {
    message
        .get(&field.name)
        .ok_or_else(|| EncodeError::MissingField(field.name.clone()))
}

fn encode_typed(
    field: &Field,
    ty: &TypeSpec,
    length: Option<&Length>,
    message: &Message,
    writer: &mut Writer,
) -> Result<(), EncodeError> {
    let ty = ty.resolve(message, &writer.buf);
    if !ty.is_fixed() && matches!(field.kind, FieldKind::Simple(_)) {
        return Err(EncodeError::UnexpectedType {
            field: field.name.clone(),
            ty: ty.to_string(),
        });
    }
    let value = require(message, field)?;

    match ty {
        ty if ty.is_fixed() => writer.write_fixed(&field.name, ty, value),
        FieldType::String | FieldType::Buffer => {
            let bytes = value.as_bytes().ok_or_else(|| EncodeError::InvalidValue {
                field: field.name.clone(),
                expected: "bytes or string",
            })?;
            encode_blob(field, bytes, length, writer)
        }
        FieldType::Array { element, count } => {
            let Value::Array(items) = value else {
                return Err(EncodeError::InvalidValue {
                    field: field.name.clone(),
                    expected: "array",
                });
            };
            encode_array(field, element, count, items, length, writer)
        }
        ty => Err(EncodeError::UnexpectedType {
            field: field.name.clone(),
            ty: ty.to_string(),
        }),
    }
}

fn encode_blob(
    field: &Field,
    bytes: &[u8],
    length: Option<&Length>,
    writer: &mut Writer,
) -> Result<(), EncodeError> {
    match length {
        Some(Length::Prefix(prefix)) => {
            writer.write_length(&field.name, *prefix, bytes.len())?;
            writer.write_bytes(&field.name, bytes)
        }
        Some(Length::Fixed(expected)) => {
            if bytes.len() > *expected {
                return Err(EncodeError::LengthMismatch {
                    field: field.name.clone(),
                    expected: *expected,
                    actual: bytes.len(),
                });
            }
            writer.write_bytes(&field.name, bytes)?;
            writer.write_bytes(&field.name, &vec![0u8; expected - bytes.len()])
        }
        Some(Length::Field(_)) | None => writer.write_bytes(&field.name, bytes),
    }
}

fn encode_array(
    field: &Field,
    element: Element,
    count: Option<usize>,
    items: &[Value],
    length: Option<&Length>,
    writer: &mut Writer,
) -> Result<(), EncodeError> {
    let expected = match (length, count) {
        (Some(Length::Prefix(prefix)), _) => {
            writer.write_length(&field.name, *prefix, items.len())?;
            None
        }
        (_, Some(expected)) => Some(expected),
        (Some(Length::Fixed(expected)), None) => Some(*expected),
        (Some(Length::Field(_)), None) => None,
        (None, None) => return Err(EncodeError::UnsupportedLength(field.name.clone())),
    };

    if let Some(expected) = expected {
        if items.len() != expected {
            return Err(EncodeError::LengthMismatch {
                field: field.name.clone(),
                expected,
                actual: items.len(),
            });
        }
    }

    writer.align(&field.name, 8)?;
    for item in items {
        writer.write_fixed(&field.name, element.field_type(), item)?;
    }

    Ok(())
}

fn encode_sub_frame(
    field: &Field,
    sub: &SubFrame,
    message: &mut Message,
    writer: &mut Writer,
) -> Result<Vec<Unmapped>, EncodeError> {
    let discriminant = message.get_u64(&sub.discriminator);
    let Some(frame) = discriminant.and_then(|value| sub.choices.get(&value)) else {
        debug!(field = %field.name, ?discriminant, "no sub frame registered, skipping");
        return Ok(vec![Unmapped {
            path: field.name.clone(),
            discriminator: sub.discriminator.clone(),
            discriminant,
        }]);
    };

    let nested = match message.get_mut(&field.name) {
        Some(Value::Record(record)) => frame.encode(record)?,
        Some(_) => {
            return Err(EncodeError::InvalidValue {
                field: field.name.clone(),
                expected: "record",
            });
        }
        None => return Err(EncodeError::MissingField(field.name.clone())),
    };

    if let Some(prefix) = sub.length {
        writer.write_length(&field.name, prefix, nested.bytes.len())?;
    }
    writer.write_bytes(&field.name, &nested.bytes)?;

    Ok(nested
        .unmapped
        .into_iter()
        .map(|skip| skip.nested(&field.name))
        .collect())
}

fn encode_sub_frames(
    field: &Field,
    frame: &Frame,
    length: &Length,
    message: &mut Message,
    writer: &mut Writer,
) -> Result<Vec<Unmapped>, EncodeError> {
    let records = match message.get_mut(&field.name) {
        Some(Value::Records(records)) => records,
        Some(_) => {
            return Err(EncodeError::InvalidValue {
                field: field.name.clone(),
                expected: "records",
            });
        }
        None => return Err(EncodeError::MissingField(field.name.clone())),
    };

    match length {
        Length::Prefix(prefix) => writer.write_length(&field.name, *prefix, records.len())?,
        Length::Fixed(expected) if records.len() != *expected => {
            return Err(EncodeError::LengthMismatch {
                field: field.name.clone(),
                expected: *expected,
                actual: records.len(),
            });
        }
        Length::Fixed(_) | Length::Field(_) => {}
    }

    let mut unmapped = Vec::new();
    for (index, record) in records.iter_mut().enumerate() {
        let nested = frame.encode(record)?;
        writer.write_bytes(&field.name, &nested.bytes)?;

        let prefix = format!("{}[{index}]", field.name);
        unmapped.extend(nested.unmapped.into_iter().map(|skip| skip.nested(&prefix)));
    }

    Ok(unmapped)
}

struct Reader<'a> {
    data: &'a [u8],
    cursor: Cursor,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.cursor.byte)
    }

    /// Gives up on the rest of the input after a variable-width field failed.
    fn exhaust(&mut self) {
        self.cursor = Cursor::new(self.data.len().max(self.cursor.byte));
    }

    fn align(&self, width: u8) -> Result<(), DecodeError> {
        if self.cursor.is_aligned() {
            Ok(())
        } else {
            Err(ReadError::CrossByteBoundary {
                bit_offset: self.cursor.bit,
                width,
            }
            .into())
        }
    }

    /// Reads one fixed-width value. The cursor advances by the type's width
    /// even when the read fails.
    fn read_fixed(&mut self, ty: FieldType) -> Result<Value, DecodeError> {
        let Some(width) = ty.width().bits() else {
            return Err(DecodeError::UnexpectedType(ty.to_string()));
        };

        let at = self.cursor;
        self.cursor.advance(width as usize);

        if ty == FieldType::UInt64 {
            if !at.is_aligned() {
                return Err(ReadError::CrossByteBoundary {
                    bit_offset: at.bit,
                    width,
                }
                .into());
            }
            let raw = bits::read_raw(self.data, at.byte, 8)?;
            return Ok(Value::Bytes(Bytes::copy_from_slice(raw)));
        }

        Ok(Value::U64(bits::read_bits(self.data, at.byte, at.bit, width)?))
    }

    fn read_length(&mut self, prefix: FieldType) -> Result<usize, DecodeError> {
        self.align(8)?;
        match self.read_fixed(prefix)? {
            Value::U64(length) => Ok(length as usize),
            _ => Err(DecodeError::UnexpectedType(prefix.to_string())),
        }
    }

    fn read_bytes(&mut self, length: usize) -> Result<&'a [u8], DecodeError> {
        self.align(8)?;
        let remaining = self.remaining();
        if length > remaining {
            return Err(DecodeError::InvalidLength { length, remaining });
        }
        if length == 0 {
            return Ok(&[]);
        }

        let at = self.cursor.byte;
        self.cursor.advance(length * 8);
        Ok(bits::read_raw(self.data, at, length)?)
    }
}

fn sibling_length(message: &Message, name: &str) -> Result<usize, DecodeError> {
    message
        .get_u64(name)
        .map(|length| length as usize)
        .ok_or_else(|| DecodeError::MissingLength(name.to_string()))
}

/// Element count from a prefix, an inline literal, a fixed count or a sibling field, in that order.
fn resolve_count(
    reader: &mut Reader<'_>,
    length: Option<&Length>,
    literal: Option<usize>,
    message: &Message,
) -> Result<usize, DecodeError> {
    match (length, literal) {
        (Some(Length::Prefix(prefix)), _) => reader.read_length(*prefix),
        (_, Some(count)) => Ok(count),
        (Some(Length::Fixed(count)), None) => Ok(*count),
        (Some(Length::Field(name)), None) => sibling_length(message, name),
        (None, None) => Err(DecodeError::UnsupportedLength),
    }
}

fn decode_typed(
    field: &Field,
    ty: &TypeSpec,
    length: Option<&Length>,
    message: &Message,
    reader: &mut Reader<'_>,
) -> Result<Value, DecodeError> {
    let ty = ty.resolve(message, reader.data);
    if ty.is_fixed() {
        return reader.read_fixed(ty);
    }

    if matches!(field.kind, FieldKind::Simple(_)) {
        return Err(DecodeError::UnexpectedType(ty.to_string()));
    }

    decode_variable(ty, length, message, reader).inspect_err(|_| reader.exhaust())
}

fn decode_variable(
    ty: FieldType,
    length: Option<&Length>,
    message: &Message,
    reader: &mut Reader<'_>,
) -> Result<Value, DecodeError> {
    match ty {
        FieldType::String | FieldType::Buffer => {
            let length = match length {
                Some(Length::Prefix(prefix)) => reader.read_length(*prefix)?,
                Some(Length::Fixed(length)) => *length,
                Some(Length::Field(name)) => sibling_length(message, name)?,
                None => reader.remaining(),
            };

            let bytes = reader.read_bytes(length)?;
            if ty == FieldType::Buffer {
                return Ok(Value::Bytes(Bytes::copy_from_slice(bytes)));
            }

            std::str::from_utf8(bytes)
                .map(|text| Value::String(text.to_string()))
                .map_err(|_| DecodeError::InvalidUtf8)
        }
        FieldType::Array { element, count } => {
            let count = resolve_count(reader, length, count, message)?;
            reader.align(8)?;

            let remaining = reader.remaining();
            if count.saturating_mul(element.size()) > remaining {
                return Err(DecodeError::InvalidLength {
                    length: count,
                    remaining,
                });
            }

            (0..count)
                .map(|_| reader.read_fixed(element.field_type()))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        ty => Err(DecodeError::UnexpectedType(ty.to_string())),
    }
}

fn decode_sub_frame(
    field: &Field,
    sub: &SubFrame,
    message: &Message,
    reader: &mut Reader<'_>,
    report: &mut DecodeReport,
) -> Result<Value, DecodeError> {
    let discriminant = message.get_u64(&sub.discriminator);
    let Some(frame) = discriminant.and_then(|value| sub.choices.get(&value)) else {
        debug!(field = %field.name, ?discriminant, "no sub frame registered, leaving empty");
        report.unmapped.push(Unmapped {
            path: field.name.clone(),
            discriminator: sub.discriminator.clone(),
            discriminant,
        });
        return Ok(Value::Record(Message::new()));
    };

    decode_nested(field, sub, frame, reader, report).inspect_err(|_| reader.exhaust())
}

/// Decodes a mapped sub-frame at the cursor. A length prefix bounds the
/// nested decode and fixes how far the cursor moves.
fn decode_nested(
    field: &Field,
    sub: &SubFrame,
    frame: &Frame,
    reader: &mut Reader<'_>,
    report: &mut DecodeReport,
) -> Result<Value, DecodeError> {
    reader.align(8)?;
    let mut record = Message::new();

    let nested = match sub.length {
        Some(prefix) => {
            let length = reader.read_length(prefix)?;
            let remaining = reader.remaining();
            if length > remaining {
                return Err(DecodeError::InvalidLength { length, remaining });
            }

            let start = reader.cursor.byte;
            let end = start + length;
            let nested = frame.decode(&reader.data[..end], &mut record, start);
            reader.cursor = Cursor::new(end);
            nested
        }
        None => {
            let nested = frame.decode(reader.data, &mut record, reader.cursor.byte);
            reader.cursor = Cursor::new(nested.end);
            nested
        }
    };

    report.absorb(&field.name, nested);
    Ok(Value::Record(record))
}

fn decode_sub_frames(
    field: &Field,
    frame: &Frame,
    length: &Length,
    message: &Message,
    reader: &mut Reader<'_>,
    report: &mut DecodeReport,
) -> Result<Value, DecodeError> {
    let count = resolve_count(reader, Some(length), None, message)?;
    reader.align(8)?;

    let mut records = Vec::with_capacity(count.min(reader.remaining()));
    for index in 0..count {
        if reader.remaining() == 0 {
            return Err(DecodeError::InvalidLength {
                length: count,
                remaining: 0,
            });
        }

        let start = reader.cursor.byte;
        let mut record = Message::new();
        let nested = frame.decode(reader.data, &mut record, start);
        if nested.end <= start {
            // An element that consumes nothing would repeat for the whole count.
            return Err(DecodeError::InvalidLength {
                length: count,
                remaining: reader.remaining(),
            });
        }

        reader.cursor = Cursor::new(nested.end);
        report.absorb(&format!("{}[{index}]", field.name), nested);
        records.push(record);
    }

    Ok(Value::Records(records))
}
