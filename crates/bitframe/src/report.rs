//! Outcomes of an encode or decode that are not hard errors.
//!
//! Decoding never aborts on a bad field: the field is set to [crate::Value::Null]
//! and a [FieldFault] is recorded. Sub-frames whose discriminant has no
//! registered frame produce or consume nothing and are recorded as [Unmapped].

use bytes::Bytes;

use crate::{errors::DecodeError, value::Message};

/// A field that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFault {
    /// Dotted path of the field, e.g. `body.items[1].id`.
    pub path: String,
    pub error: DecodeError,
}

/// A sub-frame field skipped because its discriminant is not registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unmapped {
    pub path: String,
    pub discriminator: String,
    /// `None` when the discriminator field is absent or not an integer.
    pub discriminant: Option<u64>,
}

/// Output of [crate::Frame::encode].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Bytes,
    pub unmapped: Vec<Unmapped>,
}

/// Output of [crate::Frame::decode].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeReport {
    /// Byte offset just past the last consumed bit.
    pub end: usize,
    pub faults: Vec<FieldFault>,
    pub unmapped: Vec<Unmapped>,
}

impl DecodeReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty() && self.unmapped.is_empty()
    }

    /// Merges a nested frame's report, prefixing its paths with `prefix`.
    pub(crate) fn absorb(&mut self, prefix: &str, nested: DecodeReport) {
        self.faults
            .extend(nested.faults.into_iter().map(|fault| FieldFault {
                path: format!("{prefix}.{}", fault.path),
                ..fault
            }));
        self.unmapped
            .extend(nested.unmapped.into_iter().map(|skip| skip.nested(prefix)));
    }
}

impl Unmapped {
    pub(crate) fn nested(self, prefix: &str) -> Self {
        Unmapped {
            path: format!("{prefix}.{}", self.path),
            ..self
        }
    }
}

/// Output of [crate::Protocol::decode]: the message plus everything that went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub message: Message,
    pub end: usize,
    pub faults: Vec<FieldFault>,
    pub unmapped: Vec<Unmapped>,
}

impl Decoded {
    pub(crate) fn new(message: Message, report: DecodeReport) -> Self {
        Decoded {
            message,
            end: report.end,
            faults: report.faults,
            unmapped: report.unmapped,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.faults.is_empty() && self.unmapped.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ReadError;

    #[test]
    fn test_absorb_prefixes_paths() {
        let nested = DecodeReport {
            end: 4,
            faults: vec![FieldFault {
                path: "id".to_string(),
                error: DecodeError::Read(ReadError::OutOfBounds),
            }],
            unmapped: vec![Unmapped {
                path: "inner".to_string(),
                discriminator: "kind".to_string(),
                discriminant: Some(9),
            }],
        };

        let mut report = DecodeReport::default();
        report.absorb("items[2]", nested);

        assert_eq!(report.faults[0].path, "items[2].id");
        assert_eq!(report.unmapped[0].path, "items[2].inner");
        assert_eq!(report.end, 0);
        assert!(!report.is_clean());
    }
}
