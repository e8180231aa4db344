//! Record types: the schema, hooks, store and pipeline shared by every
//! record of one kind.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use plinth_store::{InMemoryStore, KeyValueStore};
use plinth_types::{RecordId, Value};
use tracing::debug;

use crate::codec::{Pipeline, RecordSnapshot};
use crate::error::{RecordError, RecordResult};
use crate::hooks::{HookKind, HookRegistry};
use crate::property::{PropertyDefault, PropertyOptions, PropertyRegistry};
use crate::record::Record;
use crate::registry;

struct TypeInner {
    name: String,
    properties: RwLock<PropertyRegistry>,
    hooks: RwLock<HookRegistry>,
    store: RwLock<Arc<dyn KeyValueStore>>,
    pipeline: RwLock<Arc<Pipeline>>,
}

/// Handle to a declared record type.
///
/// Handles are cheap to clone and all clones share one schema. Declaring
/// more properties or hooks through any handle is visible through every
/// other handle and every existing record of the type.
#[derive(Clone)]
pub struct RecordType {
    inner: Arc<TypeInner>,
}

impl RecordType {
    /// Declare a record type, or reopen it if `name` is already declared.
    ///
    /// A new type starts with no properties, no hooks, an empty in-memory
    /// store and the default pipeline.
    pub fn define(name: &str) -> RecordType {
        registry::register(name, || RecordType {
            inner: Arc::new(TypeInner {
                name: name.to_string(),
                properties: RwLock::new(PropertyRegistry::new()),
                hooks: RwLock::new(HookRegistry::new()),
                store: RwLock::new(Arc::new(InMemoryStore::new())),
                pipeline: RwLock::new(Arc::new(Pipeline::default())),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Path-style name: `Marvel::SuperHero` becomes `marvel/super_hero`.
    ///
    /// An underscore goes between a non-slash character and the capital
    /// after it, scanning pairs left to right without overlap.
    pub fn underscore_name(&self) -> String {
        let chars: Vec<char> = self.inner.name.replace("::", "/").chars().collect();
        let mut out = String::with_capacity(chars.len() + 4);
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            match chars.get(i + 1) {
                Some(next) if c != '/' && next.is_ascii_uppercase() => {
                    out.push(c);
                    out.push('_');
                    out.push(*next);
                    i += 2;
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            }
        }
        out.to_lowercase()
    }

    // ---------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------

    /// Declare a property with options. Re-declaring is a no-op apart from
    /// replacing the default when one is given.
    pub fn declare(&self, name: &str, options: PropertyOptions) -> &Self {
        let added = self
            .inner
            .properties
            .write()
            .expect("lock poisoned")
            .declare(name, options);
        if added {
            debug!(record_type = self.name(), property = name, "property declared");
        }
        self
    }

    /// Declare a property without a default.
    pub fn property(&self, name: &str) -> &Self {
        self.declare(name, PropertyOptions::default())
    }

    /// Declare several properties without defaults.
    pub fn properties_list(&self, names: &[&str]) -> &Self {
        for name in names {
            self.property(name);
        }
        self
    }

    /// Declare a property with a literal default.
    pub fn property_with_default(&self, name: &str, default: impl Into<Value>) -> &Self {
        self.declare(
            name,
            PropertyOptions::with_default(PropertyDefault::Literal(default.into())),
        )
    }

    /// Declare a property whose default is computed from the new record.
    pub fn computed_property<F>(&self, name: &str, generator: F) -> &Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.declare(
            name,
            PropertyOptions::with_default(PropertyDefault::computed(generator)),
        )
    }

    /// Declared property names, in declaration order.
    pub fn properties(&self) -> Vec<String> {
        self.property_registry().names().to_vec()
    }

    pub fn is_valid_property(&self, name: &str) -> bool {
        self.property_registry().is_valid(name)
    }

    /// The declared form of `name`, accepting a boolean property's bare form.
    pub fn normalize_property(&self, name: &str) -> Option<String> {
        self.property_registry().normalize(name).map(str::to_string)
    }

    /// Like [`normalize_property`](Self::normalize_property) but fails with
    /// `InvalidProperty` for undeclared names.
    pub fn require_property(&self, name: &str) -> RecordResult<String> {
        self.normalize_property(name)
            .ok_or_else(|| RecordError::InvalidProperty {
                property: name.to_string(),
                type_name: self.name().to_string(),
            })
    }

    /// Declared defaults keyed by property name.
    pub fn defaults(&self) -> BTreeMap<String, PropertyDefault> {
        self.property_registry().defaults()
    }

    pub(crate) fn property_registry(&self) -> RwLockReadGuard<'_, PropertyRegistry> {
        self.inner.properties.read().expect("lock poisoned")
    }

    // ---------------------------------------------------------------
    // Hooks
    // ---------------------------------------------------------------

    /// Append a callback for `kind`.
    pub fn on<F>(&self, kind: HookKind, callback: F) -> &Self
    where
        F: Fn(&mut Record) -> RecordResult<()> + Send + Sync + 'static,
    {
        self.inner
            .hooks
            .write()
            .expect("lock poisoned")
            .register(kind, Arc::new(callback));
        debug!(record_type = self.name(), hook = %kind, "hook registered");
        self
    }

    pub fn before_create<F>(&self, callback: F) -> &Self
    where
        F: Fn(&mut Record) -> RecordResult<()> + Send + Sync + 'static,
    {
        self.on(HookKind::BeforeCreate, callback)
    }

    pub fn after_create<F>(&self, callback: F) -> &Self
    where
        F: Fn(&mut Record) -> RecordResult<()> + Send + Sync + 'static,
    {
        self.on(HookKind::AfterCreate, callback)
    }

    pub fn after_initialize<F>(&self, callback: F) -> &Self
    where
        F: Fn(&mut Record) -> RecordResult<()> + Send + Sync + 'static,
    {
        self.on(HookKind::AfterInitialize, callback)
    }

    pub fn after_find<F>(&self, callback: F) -> &Self
    where
        F: Fn(&mut Record) -> RecordResult<()> + Send + Sync + 'static,
    {
        self.on(HookKind::AfterFind, callback)
    }

    pub fn before_save<F>(&self, callback: F) -> &Self
    where
        F: Fn(&mut Record) -> RecordResult<()> + Send + Sync + 'static,
    {
        self.on(HookKind::BeforeSave, callback)
    }

    pub fn after_save<F>(&self, callback: F) -> &Self
    where
        F: Fn(&mut Record) -> RecordResult<()> + Send + Sync + 'static,
    {
        self.on(HookKind::AfterSave, callback)
    }

    pub fn before_destroy<F>(&self, callback: F) -> &Self
    where
        F: Fn(&mut Record) -> RecordResult<()> + Send + Sync + 'static,
    {
        self.on(HookKind::BeforeDestroy, callback)
    }

    /// Drop every registered callback of this type.
    pub fn clear_hooks(&self) -> &Self {
        self.inner.hooks.write().expect("lock poisoned").clear();
        self
    }

    pub fn hook_count(&self, kind: HookKind) -> usize {
        self.hooks().count(kind)
    }

    pub(crate) fn hooks(&self) -> RwLockReadGuard<'_, HookRegistry> {
        self.inner.hooks.read().expect("lock poisoned")
    }

    // ---------------------------------------------------------------
    // Store and pipeline
    // ---------------------------------------------------------------

    /// Bind this type to `store`, replacing the previous one.
    pub fn bind_store(&self, store: Arc<dyn KeyValueStore>) -> &Self {
        *self.inner.store.write().expect("lock poisoned") = store;
        debug!(record_type = self.name(), "store bound");
        self
    }

    /// The store this type currently persists to.
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.inner.store.read().expect("lock poisoned"))
    }

    /// Replace the serialization pipeline.
    pub fn set_pipeline(&self, pipeline: Pipeline) -> &Self {
        debug!(record_type = self.name(), codecs = ?pipeline.codec_names(), "pipeline set");
        *self.inner.pipeline.write().expect("lock poisoned") = Arc::new(pipeline);
        self
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.inner.pipeline.read().expect("lock poisoned"))
    }

    /// Encode a record through the pipeline.
    pub fn serialize(&self, record: &Record) -> RecordResult<Vec<u8>> {
        Ok(self.pipeline().encode(&record.snapshot())?)
    }

    /// Decode a blob into a record of this type.
    ///
    /// The record comes back clean and is not re-initialized: no defaults are
    /// resolved and no hooks fire.
    pub fn deserialize(&self, blob: &[u8]) -> RecordResult<Record> {
        let snapshot: RecordSnapshot = self.pipeline().decode(blob)?;
        if snapshot.type_name != self.name() {
            return Err(RecordError::TypeMismatch {
                expected: self.name().to_string(),
                found: snapshot.type_name,
            });
        }
        Ok(Record::from_snapshot(self.clone(), snapshot))
    }

    // ---------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------

    /// Construct a record of this type. See [`Record::new`].
    pub fn build<K, V, I>(&self, id: impl Into<RecordId>, initial: I) -> RecordResult<Record>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Record::new(self, id, initial)
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for RecordType {}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("name", &self.inner.name)
            .field("properties", &self.properties())
            .field("hooks", &*self.hooks())
            .field("pipeline", &*self.pipeline())
            .finish()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_twice_reopens_the_same_type() {
        let first = RecordType::define("RecordTypeTests::Reopened");
        first.property("real_name");
        let second = RecordType::define("RecordTypeTests::Reopened");
        second.property("hair_color");

        assert_eq!(first, second);
        assert_eq!(first.properties(), ["real_name", "hair_color"]);
    }

    #[test]
    fn properties_collapse_duplicates() {
        let ty = RecordType::define("RecordTypeTests::Dupes");
        ty.properties_list(&["vehicle", "lair", "vehicle"]);
        ty.property("lair");
        assert_eq!(ty.properties(), ["vehicle", "lair"]);
    }

    #[test]
    fn underscore_name() {
        assert_eq!(
            RecordType::define("Marvel::SuperHero").underscore_name(),
            "marvel/super_hero"
        );
        assert_eq!(RecordType::define("Hero").underscore_name(), "hero");
        assert_eq!(
            RecordType::define("RecordTypeTests::HTTPLog").underscore_name(),
            "record_type_tests/h_tt_plog"
        );
    }

    #[test]
    fn defaults_are_reported() {
        let ty = RecordType::define("RecordTypeTests::Defaults");
        ty.property("real_name")
            .property_with_default("hair_color", "black")
            .computed_property("alias", |r| r.get("real_name").clone());

        let defaults = ty.defaults();
        assert_eq!(defaults.len(), 2);
        assert_eq!(
            defaults["hair_color"].as_literal(),
            Some(&Value::from("black"))
        );
        assert!(defaults["alias"].is_computed());
    }

    #[test]
    fn require_property_names_type() {
        let ty = RecordType::define("RecordTypeTests::Require");
        ty.property("flying?");
        assert_eq!(ty.require_property("flying").unwrap(), "flying?");

        let err = ty.require_property("ip_address").unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"ip_address\" is not a valid property of RecordTypeTests::Require"
        );
    }

    #[test]
    fn bind_store_replaces_store() {
        let ty = RecordType::define("RecordTypeTests::Rebind");
        let store: Arc<dyn KeyValueStore> =
            Arc::new(InMemoryStore::with_entries([("attack", b"fwoosh".to_vec())]));
        ty.bind_store(Arc::clone(&store));
        assert!(Arc::ptr_eq(&ty.store(), &store));
        assert!(ty.store().has("attack").unwrap());
    }

    #[test]
    fn types_have_independent_stores() {
        let a = RecordType::define("RecordTypeTests::StoreA");
        let b = RecordType::define("RecordTypeTests::StoreB");
        assert!(!Arc::ptr_eq(&a.store(), &b.store()));
    }

    #[test]
    fn deserialize_rejects_other_types() {
        let hero = RecordType::define("RecordTypeTests::MismatchHero");
        let villain = RecordType::define("RecordTypeTests::MismatchVillain");
        let record = hero.build("x", Vec::<(&str, Value)>::new()).unwrap();
        let blob = hero.serialize(&record).unwrap();

        let err = villain.deserialize(&blob).unwrap_err();
        assert!(matches!(err, RecordError::TypeMismatch { .. }));
    }

    #[test]
    fn hook_registration_is_counted() {
        let ty = RecordType::define("RecordTypeTests::Hooks");
        ty.before_save(|_| Ok(())).before_save(|_| Ok(())).after_find(|_| Ok(()));
        assert_eq!(ty.hook_count(HookKind::BeforeSave), 2);
        assert_eq!(ty.hook_count(HookKind::AfterFind), 1);
        ty.clear_hooks();
        assert_eq!(ty.hook_count(HookKind::BeforeSave), 0);
    }

    #[test]
    fn debug_shows_schema() {
        let ty = RecordType::define("RecordTypeTests::Debug");
        ty.property("name");
        let debug = format!("{ty:?}");
        assert!(debug.contains("RecordTypeTests::Debug"));
        assert!(debug.contains("\"name\""));
        assert!(debug.contains("bincode"));
    }
}
