//! Field descriptors: the vocabulary a [crate::Frame] is built from.

use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{field_type::FieldType, frame::Frame, value::Message};

/// Resolves a field's type from the message built so far and the raw bytes
/// (the input on decode, the bytes emitted so far on encode).
pub type TypeFn = Arc<dyn Fn(&Message, &[u8]) -> FieldType + Send + Sync>;

/// Static or computed type of a field.
#[derive(Clone)]
pub enum TypeSpec {
    Static(FieldType),
    Dynamic(TypeFn),
}

impl TypeSpec {
    pub fn resolve(&self, message: &Message, data: &[u8]) -> FieldType {
        match self {
            TypeSpec::Static(ty) => *ty,
            TypeSpec::Dynamic(resolve) => resolve(message, data),
        }
    }

    pub fn as_static(&self) -> Option<FieldType> {
        match self {
            TypeSpec::Static(ty) => Some(*ty),
            TypeSpec::Dynamic(_) => None,
        }
    }
}

impl fmt::Debug for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Static(ty) => write!(f, "Static({ty})"),
            TypeSpec::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<FieldType> for TypeSpec {
    fn from(value: FieldType) -> Self {
        TypeSpec::Static(value)
    }
}

/// How the size of a variable-width field is determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Length {
    /// A byte-aligned integer of this type precedes the data on the wire.
    Prefix(FieldType),
    /// Literal byte length (string/buffer) or element count (arrays, sub-frame arrays).
    Fixed(usize),
    /// An earlier field of the same frame holds the length.
    Field(String),
}

/// A discriminated choice between nested frames.
#[derive(Debug, Clone)]
pub struct SubFrame {
    /// Earlier field whose value selects the nested frame.
    pub discriminator: String,
    /// Optional byte-length prefix in front of the nested encoding.
    pub length: Option<FieldType>,
    /// Discriminant value to nested frame.
    pub choices: BTreeMap<u64, Arc<Frame>>,
}

/// The four kinds of field a frame can hold.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Fixed-width integer or opaque `uint64`.
    Simple(TypeSpec),
    /// String, buffer or integer array; a dynamic type may also resolve to a fixed type.
    Complex {
        ty: TypeSpec,
        length: Option<Length>,
    },
    SubFrame(SubFrame),
    /// The same nested frame repeated `length` times.
    SubFrameArray { frame: Arc<Frame>, length: Length },
}

/// One entry of a frame's ordered schema.
#[derive(Debug, Clone)]
pub struct Field {
    /// Key of the value in the [Message].
    pub name: String,
    pub kind: FieldKind,
    /// Declared but inactive: never written and not read.
    pub optional: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Field {
            name: name.into(),
            kind,
            optional: false,
        }
    }

    pub fn simple(name: impl Into<String>, ty: FieldType) -> Self {
        Self::new(name, FieldKind::Simple(ty.into()))
    }

    pub fn complex(name: impl Into<String>, ty: FieldType) -> Self {
        Self::new(
            name,
            FieldKind::Complex {
                ty: ty.into(),
                length: None,
            },
        )
    }

    /// A field whose type depends on earlier fields of the message.
    pub fn computed<F>(name: impl Into<String>, resolve: F) -> Self
    where
        F: Fn(&Message, &[u8]) -> FieldType + Send + Sync + 'static,
    {
        Self::new(
            name,
            FieldKind::Complex {
                ty: TypeSpec::Dynamic(Arc::new(resolve)),
                length: None,
            },
        )
    }

    pub fn sub_frame(name: impl Into<String>, discriminator: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::SubFrame(SubFrame {
                discriminator: discriminator.into(),
                length: None,
                choices: BTreeMap::new(),
            }),
        )
    }

    pub fn sub_frame_array(name: impl Into<String>, frame: Frame, length: Length) -> Self {
        Self::new(
            name,
            FieldKind::SubFrameArray {
                frame: Arc::new(frame),
                length,
            },
        )
    }

    /// Sets the length policy. For sub-frames only a [Length::Prefix] is meaningful.
    pub fn with_length(mut self, policy: Length) -> Self {
        self.kind = match self.kind {
            FieldKind::Simple(ty) | FieldKind::Complex { ty, .. } => FieldKind::Complex {
                ty,
                length: Some(policy),
            },
            FieldKind::SubFrameArray { frame, .. } => FieldKind::SubFrameArray {
                frame,
                length: policy,
            },
            FieldKind::SubFrame(mut sub) => {
                sub.length = match policy {
                    Length::Prefix(ty) => Some(ty),
                    _ => None,
                };
                FieldKind::SubFrame(sub)
            }
        };
        self
    }

    /// Adds an authoring-time choice to a sub-frame field. No-op on other kinds.
    pub fn with_choice(mut self, discriminant: u64, frame: Frame) -> Self {
        if let FieldKind::SubFrame(sub) = &mut self.kind {
            sub.choices.insert(discriminant, Arc::new(frame));
        }
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn as_sub_frame(&self) -> Option<&SubFrame> {
        match &self.kind {
            FieldKind::SubFrame(sub) => Some(sub),
            _ => None,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<crate::serde::FieldDef> for Field {
    type Error = crate::errors::SchemaError;

    fn try_from(value: crate::serde::FieldDef) -> Result<Self, Self::Error> {
        let ty: FieldType = value.ty.parse()?;

        let length = value.length.map(Length::try_from).transpose()?;

        let mut field = match ty {
            FieldType::SubFrame => {
                let discriminator = value
                    .discriminator
                    .ok_or_else(|| crate::errors::SchemaError::InvalidFieldKind {
                        field: value.name.clone(),
                        ty: ty.to_string(),
                    })?;
                Field::sub_frame(value.name, discriminator)
            }
            FieldType::SubFrameArray => {
                let fields = value
                    .frame
                    .unwrap_or_default()
                    .into_iter()
                    .map(Field::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                let length = length
                    .clone()
                    .ok_or_else(|| crate::errors::SchemaError::MissingLength(value.name.clone()))?;
                Field::sub_frame_array(value.name, Frame::new(fields)?, length)
            }
            ty if ty.is_fixed() => Field::simple(value.name, ty),
            ty => Field::complex(value.name, ty),
        };

        if let Some(length) = length {
            if !matches!(field.kind, FieldKind::SubFrameArray { .. }) {
                field = field.with_length(length);
            }
        }

        field.optional = value.optional;
        Ok(field)
    }
}

#[cfg(feature = "serde")]
impl TryFrom<crate::serde::LengthDef> for Length {
    type Error = crate::errors::SchemaError;

    fn try_from(value: crate::serde::LengthDef) -> Result<Self, Self::Error> {
        Ok(match value {
            crate::serde::LengthDef::Prefix(ty) => Length::Prefix(ty.parse()?),
            crate::serde::LengthDef::Fixed(count) => Length::Fixed(count),
            crate::serde::LengthDef::Field(name) => Length::Field(name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_type_sees_message() {
        let field = Field::computed("payload", |message, _| {
            if message.get_u64("wide") == Some(1) {
                FieldType::UInt16
            } else {
                FieldType::UInt8
            }
        });

        let FieldKind::Complex { ty, .. } = &field.kind else {
            panic!("computed field should be complex");
        };

        assert_eq!(ty.resolve(&Message::new(), &[]), FieldType::UInt8);
        assert_eq!(
            ty.resolve(&Message::new().with("wide", 1u8), &[]),
            FieldType::UInt16
        );
        assert_eq!(ty.as_static(), None);
    }

    #[test]
    fn test_with_length_on_sub_frame_keeps_prefix_only() {
        let field = Field::sub_frame("body", "kind").with_length(Length::Prefix(FieldType::UInt16));
        assert_eq!(field.as_sub_frame().unwrap().length, Some(FieldType::UInt16));

        let field = Field::sub_frame("body", "kind").with_length(Length::Fixed(3));
        assert_eq!(field.as_sub_frame().unwrap().length, None);
    }

    #[test]
    fn test_with_choice() {
        let inner = Frame::new(vec![Field::simple("id", FieldType::UInt8)]).unwrap();
        let field = Field::sub_frame("body", "kind").with_choice(7, inner);
        assert!(field.as_sub_frame().unwrap().choices.contains_key(&7));
    }

    #[test]
    fn test_optional() {
        let field = Field::simple("crc", FieldType::UInt16).optional();
        assert!(field.optional);
    }
}
