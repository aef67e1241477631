//! Line-addressed script patching with optimistic guards.
//!
//! A batch of [`Patch`]es is applied in order to one script source. Every
//! destructive edit names the text it expects to find (`expectedContent` for
//! `replace`/`delete`, `expectedContext` for the line before an `insert`), so
//! an edit computed against a stale copy fails instead of landing on the
//! wrong lines. Batches are all-or-nothing:
//!
//! - patch *k* addresses the document produced by patches `1..k`;
//!   the engine never shifts later line numbers on the caller's behalf,
//! - any guard failure aborts the batch with the expected and actual text,
//! - the patched source must pass [`validate`] before it is returned.

mod document;
mod engine;
mod error;
mod patch;
mod validate;

pub use document::Document;
pub use engine::{apply, PatchOutcome};
pub use error::PatchError;
pub use patch::{Patch, PatchOp, PatchRequest};
pub use validate::{validate, StructureError};
