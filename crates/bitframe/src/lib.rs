//! # bitframe
//!
//! A library for encoding and decoding binary messages from declarative schemas.
//!
//! Describe a message as an ordered list of fields (sub-byte integers,
//! big-endian integers, length-prefixed strings, buffers and arrays, and
//! nested sub-frames chosen by a discriminator), then write messages to
//! bytes and read bytes back into messages with the same description.
//!
//! ## Example
//!
//! ```
//! use bitframe::{Field, FieldType, Length, Message, Protocol};
//!
//! let mut builder = Protocol::builder(vec![
//!     Field::simple("kind", FieldType::UInt8),
//!     Field::sub_frame("body", "kind").with_length(Length::Prefix(FieldType::UInt8)),
//! ])
//! .unwrap();
//! builder
//!     .register(
//!         "kind",
//!         1,
//!         vec![
//!             Field::simple("urgent", FieldType::Bit),
//!             Field::simple("level", FieldType::UInt7),
//!             Field::complex("text", FieldType::String).with_length(Length::Prefix(FieldType::UInt8)),
//!         ],
//!         None,
//!     )
//!     .unwrap();
//! let protocol = builder.build();
//!
//! let mut message = Message::new().with("kind", 1u8).with(
//!     "body",
//!     Message::new().with("urgent", 1u8).with("level", 3u8).with("text", "hi"),
//! );
//! let bytes = protocol.write(&mut message).unwrap();
//! assert_eq!(&bytes[..], &[1, 4, 0b0000_0111, 2, b'h', b'i']);
//! assert_eq!(protocol.read(&bytes), message);
//! ```

pub mod bits;
pub mod errors;
pub mod field;
pub mod field_type;
pub mod frame;
pub mod protocol;
pub mod report;
#[cfg(feature = "serde")]
pub mod serde;
pub mod value;

pub use errors::{DecodeError, EncodeError, ReadError, SchemaError, WriteError};
pub use field::{Field, FieldKind, Length, SubFrame, TypeFn, TypeSpec};
pub use field_type::{Element, FieldType, Width, width_of};
pub use frame::{Frame, PrepareFn};
pub use protocol::{Protocol, ProtocolBuilder};
pub use report::{DecodeReport, Decoded, Encoded, FieldFault, Unmapped};
pub use value::{Message, Value};
