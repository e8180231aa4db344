//! Record types for Plinth: declared properties, lifecycle hooks, pluggable
//! serialization and `where`-style queries over a key-value store.
//!
//! A [`RecordType`] is declared once by name and shared by every record of
//! that kind. It owns the property schema, the hook table, the bound store
//! and the codec pipeline. Records are plain values: a [`RecordId`], a map of
//! property values and a dirty flag.
//!
//! # Key Types
//!
//! - [`RecordType`] — Per-type schema, hooks, store binding and collection API
//! - [`Record`] — One record with typed get/set, save and delete
//! - [`HookKind`] — Lifecycle moments callbacks can attach to
//! - [`Pipeline`] — Ordered codec chain between records and stored blobs
//! - [`Query`] — `where` builder combining a filter closure with predicates
//!
//! # Example
//!
//! ```
//! use plinth_record::{RecordType, Value};
//!
//! let heroes = RecordType::define("Docs::Hero");
//! heroes.property("name").property_with_default("flying?", false);
//!
//! let mut sam = heroes.build("h1", [("name", "Sam")])?;
//! assert_eq!(sam.get("flying"), &Value::Bool(false));
//!
//! sam.set("flying", true)?;
//! sam.save()?;
//!
//! let found = heroes.lookup("h1")?.expect("saved");
//! assert!(found.is("flying?"));
//! assert_eq!(heroes.select(["flying"])?.len(), 1);
//! # Ok::<(), plinth_record::RecordError>(())
//! ```

pub mod codec;
pub mod collection;
pub mod error;
pub mod hooks;
pub mod property;
pub mod query;
pub mod record;
pub mod record_type;
pub mod registry;

pub use codec::{BincodeCodec, ByteCodec, JsonCodec, Pipeline, RecordCodec, RecordSnapshot, ZstdCodec};
pub use collection::UpsertSource;
pub use error::{CodecError, CodecResult, RecordError, RecordResult};
pub use hooks::{HookFn, HookKind, HookRegistry};
pub use property::{PropertyDefault, PropertyOptions, PropertyRegistry, BOOLEAN_SUFFIX};
pub use query::{Predicate, Query};
pub use record::Record;
pub use record_type::RecordType;
pub use registry::{model, models};

pub use plinth_types::{RecordId, Value};
