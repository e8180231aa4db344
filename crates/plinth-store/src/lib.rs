//! Key-value storage backends for Plinth.
//!
//! The record layer treats storage as an opaque mapping from a record id to a
//! serialized blob. It never looks inside the blobs and the stores never look
//! inside the records.
//!
//! # Storage Backends
//!
//! All backends implement the [`KeyValueStore`] trait:
//!
//! - [`InMemoryStore`] -- lock-protected map for tests and embedding
//! - [`FileStore`] -- append-only, CRC-framed log replayed into memory on open
//!
//! # Design Rules
//!
//! 1. Keys enumerate in first-insertion order; overwriting keeps the position.
//! 2. Deleting an absent key is not an error, it reports `false`.
//! 3. A single call is atomic with respect to other calls on the same store.
//!    Nothing spans calls.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::{FileStore, FileStoreConfig, SyncMode};
pub use memory::InMemoryStore;
pub use traits::KeyValueStore;
