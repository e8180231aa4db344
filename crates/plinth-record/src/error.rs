//! Error types for the record layer.

use plinth_types::TypeError;

/// Errors raised by a codec in the serialization pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The codec could not encode its input.
    #[error("{codec} encode failed: {reason}")]
    Encode { codec: &'static str, reason: String },

    /// The codec could not decode its input.
    #[error("{codec} decode failed: {reason}")]
    Decode { codec: &'static str, reason: String },
}

/// Convenience alias for codec results.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during record operations.
///
/// Absence is never an error: lookups of missing ids return `Ok(None)` and
/// removals of missing ids return `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// A direct write or a query predicate named an undeclared property.
    #[error("\"{property}\" is not a valid property of {type_name}")]
    InvalidProperty { property: String, type_name: String },

    /// `upsert` was given neither a record of the type nor a value map.
    #[error("cannot create a {type_name} from {reason}")]
    InvalidArgument { type_name: String, reason: String },

    /// A stored blob decoded to a record of a different type.
    #[error("expected a {expected} record, decoded a {found}")]
    TypeMismatch { expected: String, found: String },

    /// A property value had the wrong kind for a typed read.
    #[error("property \"{property}\": {source}")]
    Value {
        property: String,
        #[source]
        source: TypeError,
    },

    /// A lifecycle callback aborted the operation.
    #[error("hook aborted: {0}")]
    Hook(String),

    /// Rendering a projection failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Serialization pipeline failure.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] plinth_store::StoreError),
}

/// Convenience alias for record results.
pub type RecordResult<T> = Result<T, RecordError>;
