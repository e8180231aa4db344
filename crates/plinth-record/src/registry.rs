//! Process-wide list of declared record types.
//!
//! Starts empty and only grows. It exists for introspection; nothing
//! dispatches through it.

use std::sync::{LazyLock, RwLock};

use tracing::info;

use crate::record_type::RecordType;

static MODELS: LazyLock<RwLock<Vec<RecordType>>> = LazyLock::new(|| RwLock::new(Vec::new()));

/// Return the type registered under `name`, creating it with `make` first if
/// there is none.
pub(crate) fn register(name: &str, make: impl FnOnce() -> RecordType) -> RecordType {
    let mut models = MODELS.write().expect("model registry poisoned");
    if let Some(existing) = models.iter().find(|m| m.name() == name) {
        return existing.clone();
    }
    let record_type = make();
    models.push(record_type.clone());
    info!(record_type = name, total = models.len(), "record type declared");
    record_type
}

/// Every declared record type, ordered by name.
pub fn models() -> Vec<RecordType> {
    let mut models = MODELS.read().expect("model registry poisoned").clone();
    models.sort_by(|a, b| a.name().cmp(b.name()));
    models
}

/// The declared type named `name`, if any.
pub fn model(name: &str) -> Option<RecordType> {
    MODELS
        .read()
        .expect("model registry poisoned")
        .iter()
        .find(|m| m.name() == name)
        .cloned()
}
