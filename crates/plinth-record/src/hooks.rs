//! Lifecycle hooks.
//!
//! Each record type keeps an ordered list of callbacks per [`HookKind`].
//! Firing a kind runs every callback registered for it, in registration
//! order, with the record as the argument.
//!
//! While any callback runs for a record, that record fires no hooks at all.
//! A callback can therefore call `save` on the record without re-entering
//! `before_save`. The guard lives on the record, so other records are not
//! affected.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::RecordResult;
use crate::record::Record;

/// The moments in a record's life that callbacks can attach to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookKind {
    /// Before the first save performed by `upsert`/`create`.
    BeforeCreate,
    /// After the first save performed by `upsert`/`create`.
    AfterCreate,
    /// At the end of `Record::new`, after defaults are resolved.
    AfterInitialize,
    /// After a keyed lookup decodes a record.
    AfterFind,
    /// Before every save.
    BeforeSave,
    /// After every save.
    AfterSave,
    /// Before a record removes itself from the store.
    BeforeDestroy,
}

impl HookKind {
    pub const ALL: [HookKind; 7] = [
        HookKind::BeforeCreate,
        HookKind::AfterCreate,
        HookKind::AfterInitialize,
        HookKind::AfterFind,
        HookKind::BeforeSave,
        HookKind::AfterSave,
        HookKind::BeforeDestroy,
    ];
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeCreate => write!(f, "before_create"),
            Self::AfterCreate => write!(f, "after_create"),
            Self::AfterInitialize => write!(f, "after_initialize"),
            Self::AfterFind => write!(f, "after_find"),
            Self::BeforeSave => write!(f, "before_save"),
            Self::AfterSave => write!(f, "after_save"),
            Self::BeforeDestroy => write!(f, "before_destroy"),
        }
    }
}

/// A lifecycle callback. Returning an error aborts the surrounding operation.
pub type HookFn = Arc<dyn Fn(&mut Record) -> RecordResult<()> + Send + Sync>;

/// Per-type table of lifecycle callbacks.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<HookKind, Vec<HookFn>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback for `kind`.
    pub fn register(&mut self, kind: HookKind, hook: HookFn) {
        self.hooks.entry(kind).or_default().push(hook);
    }

    /// Callbacks registered for `kind`, in registration order.
    pub fn callbacks(&self, kind: HookKind) -> Vec<HookFn> {
        self.hooks.get(&kind).cloned().unwrap_or_default()
    }

    pub fn count(&self, kind: HookKind) -> usize {
        self.hooks.get(&kind).map_or(0, Vec::len)
    }

    /// Drop every registered callback.
    pub fn clear(&mut self) {
        self.hooks.clear();
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in HookKind::ALL {
            let count = self.count(kind);
            if count > 0 {
                map.entry(&kind, &count);
            }
        }
        map.finish()
    }
}

impl Record {
    /// Fire every callback registered for `kind` on this record.
    ///
    /// Does nothing while another callback is already running for this record.
    pub(crate) fn trigger(&mut self, kind: HookKind) -> RecordResult<()> {
        if self.hooks_active {
            debug!(hook = %kind, id = %self.id, "hook suppressed inside callback");
            return Ok(());
        }

        let callbacks = self.record_type.hooks().callbacks(kind);
        if callbacks.is_empty() {
            return Ok(());
        }

        debug!(
            hook = %kind,
            record_type = self.record_type.name(),
            id = %self.id,
            callbacks = callbacks.len(),
            "firing hooks"
        );
        for callback in callbacks {
            self.hooks_active = true;
            let result = callback(self);
            self.hooks_active = false;
            result?;
        }
        Ok(())
    }
}
