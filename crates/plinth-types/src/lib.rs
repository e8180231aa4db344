//! Foundation types for Plinth.
//!
//! Every other Plinth crate depends on `plinth-types`. Record properties are
//! dynamically named, so their contents are carried as a tagged [`Value`]
//! rather than as per-property Rust fields.
//!
//! # Key Types
//!
//! - [`Value`] — Tagged property value (null, bool, int, float, text, bytes, list, map)
//! - [`RecordId`] — Identifier of a record within its store
//! - [`TypeError`] — Conversion failures out of [`Value`]

pub mod error;
pub mod id;
pub mod value;

pub use error::TypeError;
pub use id::RecordId;
pub use value::Value;
