//! Rich type codec.
//!
//! The host's structured values (vectors, colors, transforms, enum members,
//! keyframe sequences, ...) travel as JSON records tagged with `_type`:
//!
//! ```json
//! {"_type": "Vector3", "x": 1, "y": 2, "z": 3}
//! ```
//!
//! [`decode`] dispatches on the tag into the closed [`Variant`] set and
//! [`encode`] writes the same shape back, so `decode(encode(v)) == v` for
//! every supported kind. Unrecognised tags and records missing required
//! fields are errors; nothing is coerced silently.

mod codec;
mod kind;
mod types;

pub use codec::{decode, encode, validate, TYPE_TAG};
pub use kind::{Kind, UnknownKind};
pub use types::*;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("unknown rich type tag {0}")]
    UnknownType(String),
    #[error("malformed {kind} value: {reason}")]
    Malformed { kind: String, reason: String },
    #[error("expected {expected} value, found {found}")]
    KindMismatch { expected: Kind, found: String },
}

impl CodecError {
    pub fn code(&self) -> &'static str {
        match self {
            CodecError::UnknownType(_) => "unknown_type",
            CodecError::Malformed { .. } => "malformed_value",
            CodecError::KindMismatch { .. } => "kind_mismatch",
        }
    }
}
