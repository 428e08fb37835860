//! JSON‑deserializable protocol description.
//!
//! These types describe the *shape* of a protocol: root fields plus the
//! nested frames registered for each discriminant. They are intended to be
//! loaded from a definition file shipped with your application and compiled
//! with `Protocol::try_from`. Dynamic types and prepare hooks have no
//! textual form and must be added in code.
//!
//! ```json
//! {
//!   "fields": [
//!     { "name": "kind", "type": "uint8" },
//!     { "name": "body", "type": "subFrame", "discriminator": "kind",
//!       "length": { "prefix": "uint16" } }
//!   ],
//!   "subframes": [
//!     { "field": "body", "value": 1,
//!       "fields": [{ "name": "text", "type": "string" }] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Top‑level protocol definition.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProtocolDef {
    /// Fields of the root frame, in wire order.
    pub fields: Vec<FieldDef>,
    /// Nested frames registered against the root's sub-frame fields.
    #[serde(default)]
    pub subframes: Vec<RegistrationDef>,
}

/// Description of a single field.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FieldDef {
    /// Key of the value in the message.
    pub name: String,
    /// Type tag such as `uint8`, `uint16[4]`, `string` or `subFrame`.
    #[serde(rename = "type")]
    pub ty: String,
    /// Declared but never written or read.
    #[serde(default)]
    pub optional: bool,
    /// Length policy for strings, buffers, arrays and sub-frames.
    #[serde(default)]
    pub length: Option<LengthDef>,
    /// Field selecting the nested frame (`subFrame` only).
    #[serde(default)]
    pub discriminator: Option<String>,
    /// Element frame (`subFrame[]` only).
    #[serde(default)]
    pub frame: Option<Vec<FieldDef>>,
}

/// Length policy of a variable‑width field.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LengthDef {
    /// Integer type tag of a prefix written before the data.
    Prefix(String),
    /// Literal byte length or element count.
    Fixed(usize),
    /// Name of an earlier field holding the length.
    Field(String),
}

/// One discriminant → nested frame mapping.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RegistrationDef {
    /// Sub‑frame field, or its discriminator field.
    pub field: String,
    /// Discriminant value selecting this frame.
    pub value: u64,
    /// Fields of the nested frame.
    pub fields: Vec<FieldDef>,
}
