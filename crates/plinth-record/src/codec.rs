//! Serialization pipeline between records and stored blobs.
//!
//! A [`Pipeline`] is an ordered chain of codecs. The first is a
//! [`RecordCodec`] that turns a [`RecordSnapshot`] into bytes; any further
//! stages are [`ByteCodec`]s that transform those bytes. Encoding runs the
//! chain left to right and decoding runs it right to left.
//!
//! The default pipeline is [`BincodeCodec`] alone.

use std::collections::BTreeMap;
use std::fmt;

use plinth_types::{RecordId, Value};
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};

/// Value copy of a record: what actually gets encoded.
///
/// Encoding works on a snapshot, never on the live record, so nothing a codec
/// does can reach back into the instance being saved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub type_name: String,
    pub id: RecordId,
    pub values: BTreeMap<String, Value>,
}

/// Whole-object codec: snapshot to bytes and back.
pub trait RecordCodec: Send + Sync {
    fn name(&self) -> &'static str;
    fn encode(&self, snapshot: &RecordSnapshot) -> CodecResult<Vec<u8>>;
    fn decode(&self, blob: &[u8]) -> CodecResult<RecordSnapshot>;
}

/// Byte-level transform stage applied after the record codec.
pub trait ByteCodec: Send + Sync {
    fn name(&self) -> &'static str;
    fn encode(&self, input: Vec<u8>) -> CodecResult<Vec<u8>>;
    fn decode(&self, input: Vec<u8>) -> CodecResult<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// Codecs
// ---------------------------------------------------------------------------

/// Compact binary encoding via bincode. The default.
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeCodec;

impl RecordCodec for BincodeCodec {
    fn name(&self) -> &'static str {
        "bincode"
    }

    fn encode(&self, snapshot: &RecordSnapshot) -> CodecResult<Vec<u8>> {
        bincode::serialize(snapshot).map_err(|e| CodecError::Encode {
            codec: self.name(),
            reason: e.to_string(),
        })
    }

    fn decode(&self, blob: &[u8]) -> CodecResult<RecordSnapshot> {
        bincode::deserialize(blob).map_err(|e| CodecError::Decode {
            codec: self.name(),
            reason: e.to_string(),
        })
    }
}

/// Human-readable JSON encoding.
///
/// JSON has no representation for NaN or infinity, so snapshots holding a
/// non-finite float are rejected at encode time.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl RecordCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, snapshot: &RecordSnapshot) -> CodecResult<Vec<u8>> {
        if let Some(property) = snapshot
            .values
            .iter()
            .find_map(|(name, value)| has_non_finite(value).then_some(name))
        {
            return Err(CodecError::Encode {
                codec: self.name(),
                reason: format!("property \"{property}\" holds a non-finite float"),
            });
        }
        serde_json::to_vec(snapshot).map_err(|e| CodecError::Encode {
            codec: self.name(),
            reason: e.to_string(),
        })
    }

    fn decode(&self, blob: &[u8]) -> CodecResult<RecordSnapshot> {
        serde_json::from_slice(blob).map_err(|e| CodecError::Decode {
            codec: self.name(),
            reason: e.to_string(),
        })
    }
}

fn has_non_finite(value: &Value) -> bool {
    match value {
        Value::Float(f) => !f.is_finite(),
        Value::List(items) => items.iter().any(has_non_finite),
        Value::Map(map) => map.values().any(has_non_finite),
        _ => false,
    }
}

/// zstd compression stage.
#[derive(Clone, Copy, Debug)]
pub struct ZstdCodec {
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ByteCodec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn encode(&self, input: Vec<u8>) -> CodecResult<Vec<u8>> {
        zstd::encode_all(input.as_slice(), self.level).map_err(|e| CodecError::Encode {
            codec: self.name(),
            reason: e.to_string(),
        })
    }

    fn decode(&self, input: Vec<u8>) -> CodecResult<Vec<u8>> {
        zstd::decode_all(input.as_slice()).map_err(|e| CodecError::Decode {
            codec: self.name(),
            reason: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Ordered codec chain used by a record type.
pub struct Pipeline {
    record: Box<dyn RecordCodec>,
    stages: Vec<Box<dyn ByteCodec>>,
}

impl Pipeline {
    /// A pipeline with the given record codec and no byte stages.
    pub fn new(record: impl RecordCodec + 'static) -> Self {
        Self {
            record: Box::new(record),
            stages: Vec::new(),
        }
    }

    /// Append a byte stage at the end of the chain.
    pub fn then(mut self, stage: impl ByteCodec + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Codec names in encoding order.
    pub fn codec_names(&self) -> Vec<&'static str> {
        std::iter::once(self.record.name())
            .chain(self.stages.iter().map(|s| s.name()))
            .collect()
    }

    pub fn encode(&self, snapshot: &RecordSnapshot) -> CodecResult<Vec<u8>> {
        let mut blob = self.record.encode(snapshot)?;
        for stage in &self.stages {
            blob = stage.encode(blob)?;
        }
        Ok(blob)
    }

    pub fn decode(&self, blob: &[u8]) -> CodecResult<RecordSnapshot> {
        let mut bytes = blob.to_vec();
        for stage in self.stages.iter().rev() {
            bytes = stage.decode(bytes)?;
        }
        self.record.decode(&bytes)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(BincodeCodec)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("codecs", &self.codec_names())
            .finish()
    }
}
