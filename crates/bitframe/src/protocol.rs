//! Protocol: a root [Frame] plus its discriminator registry.
//!
//! Registration happens on a [ProtocolBuilder]; [ProtocolBuilder::build]
//! freezes the registry into a [Protocol], which has no mutating API and can
//! be shared across threads for concurrent reads and writes.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::{
    errors::{EncodeError, SchemaError},
    field::{Field, FieldKind},
    frame::{Frame, PrepareFn},
    report::{DecodeReport, Decoded, Encoded},
    value::Message,
};

/// Accumulates discriminant to frame mappings for the root frame's sub-frame fields.
#[derive(Debug, Clone)]
pub struct ProtocolBuilder {
    root: Frame,
}

impl ProtocolBuilder {
    /// Maps `discriminant` to a nested frame built from `fields`.
    ///
    /// `name` is the sub-frame field or its discriminator field. Fails if no
    /// root sub-frame field matches, if the discriminator is shared by several
    /// of them, or if the discriminant is already taken.
    pub fn register(
        &mut self,
        name: &str,
        discriminant: u64,
        fields: Vec<Field>,
        prepare: Option<PrepareFn>,
    ) -> Result<&mut Self, SchemaError> {
        self.check_free(name, discriminant)?;
        let frame = Frame::from_parts(fields, prepare)?;
        self.register_frame(name, discriminant, frame)
    }

    /// Like [ProtocolBuilder::register], for an already built frame.
    pub fn register_frame(
        &mut self,
        name: &str,
        discriminant: u64,
        frame: Frame,
    ) -> Result<&mut Self, SchemaError> {
        self.check_free(name, discriminant)?;

        let (field, sub) = self.root.sub_frame_mut(name)?;
        debug!(field, discriminant, "registering sub frame");
        sub.choices.insert(discriminant, Arc::new(frame));

        Ok(self)
    }

    fn check_free(&mut self, name: &str, discriminant: u64) -> Result<(), SchemaError> {
        let (field, sub) = self.root.sub_frame_mut(name)?;

        if sub.choices.contains_key(&discriminant) {
            return Err(SchemaError::DuplicateRegistration {
                field: field.to_string(),
                discriminant,
            });
        }

        Ok(())
    }

    /// Freezes the registry.
    pub fn build(self) -> Protocol {
        Protocol {
            root: Arc::new(self.root),
        }
    }
}

/// A frozen protocol definition: read and write whole messages.
#[derive(Debug, Clone)]
pub struct Protocol {
    root: Arc<Frame>,
}

impl Protocol {
    /// Starts a protocol from its root fields. Every root sub-frame field
    /// gets a registry slot that [ProtocolBuilder::register] fills.
    pub fn builder(fields: Vec<Field>) -> Result<ProtocolBuilder, SchemaError> {
        Ok(ProtocolBuilder {
            root: Frame::new(fields)?,
        })
    }

    /// A protocol without registrations.
    pub fn new(fields: Vec<Field>) -> Result<Self, SchemaError> {
        Ok(Self::builder(fields)?.build())
    }

    pub fn frame(&self) -> &Frame {
        &self.root
    }

    /// Names of the root sub-frame fields.
    pub fn sub_frame_fields(&self) -> impl Iterator<Item = &str> {
        self.root
            .fields()
            .iter()
            .filter(|field| matches!(field.kind, FieldKind::SubFrame(_)))
            .map(|field| field.name.as_str())
    }

    /// Decodes `data` into a fresh message. Fields that fail are
    /// [crate::Value::Null]; use [Protocol::decode] to see why.
    pub fn read(&self, data: &[u8]) -> Message {
        self.decode(data).message
    }

    /// Decodes `data` into a fresh message and reports faults and unmapped sub-frames.
    pub fn decode(&self, data: &[u8]) -> Decoded {
        let mut message = Message::new();
        let report = self.decode_into(data, &mut message);
        Decoded::new(message, report)
    }

    /// Decodes into `message`, which may already hold values such as a discriminator.
    pub fn decode_into(&self, data: &[u8], message: &mut Message) -> DecodeReport {
        debug!(len = data.len(), "reading message");
        let report = self.root.decode(data, message, 0);
        debug!(
            end = report.end,
            faults = report.faults.len(),
            unmapped = report.unmapped.len(),
            "read message"
        );
        report
    }

    /// Encodes `message`; prepare hooks may update it in place.
    pub fn write(&self, message: &mut Message) -> Result<Bytes, EncodeError> {
        Ok(self.encode(message)?.bytes)
    }

    /// Encodes `message` and reports sub-frames skipped for lack of a registration.
    pub fn encode(&self, message: &mut Message) -> Result<Encoded, EncodeError> {
        debug!(fields = message.len(), "writing message");
        let encoded = self.root.encode(message)?;
        debug!(
            len = encoded.bytes.len(),
            unmapped = encoded.unmapped.len(),
            "written message"
        );
        Ok(encoded)
    }
}

#[cfg(feature = "serde")]
impl TryFrom<crate::serde::ProtocolDef> for Protocol {
    type Error = SchemaError;

    fn try_from(value: crate::serde::ProtocolDef) -> Result<Self, Self::Error> {
        let fields = value
            .fields
            .into_iter()
            .map(Field::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let mut builder = Protocol::builder(fields)?;

        for registration in value.subframes {
            let fields = registration
                .fields
                .into_iter()
                .map(Field::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            builder.register(&registration.field, registration.value, fields, None)?;
        }

        Ok(builder.build())
    }
}
