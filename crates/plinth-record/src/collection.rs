//! Collection operations over a record type's store.
//!
//! Every read decodes through the type's pipeline. Enumeration follows the
//! store's key order, which is first-insertion order for both bundled
//! backends.

use plinth_types::{RecordId, Value};
use tracing::debug;

use crate::error::{RecordError, RecordResult};
use crate::hooks::HookKind;
use crate::record::Record;
use crate::record_type::RecordType;

/// What [`RecordType::upsert`] can persist.
#[derive(Clone, Debug)]
pub enum UpsertSource {
    /// An existing record. One of the target type is adopted as is; one of
    /// another type contributes its values.
    Record(Record),
    /// Initial values for a new record.
    Values(Vec<(String, Value)>),
    /// A loose value. Only `Value::Map` is accepted.
    Value(Value),
}

impl From<Record> for UpsertSource {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<Value> for UpsertSource {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<i64> for UpsertSource {
    fn from(value: i64) -> Self {
        Self::Value(Value::Int(value))
    }
}

impl From<i32> for UpsertSource {
    fn from(value: i32) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<&str> for UpsertSource {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl<K: Into<String>, V: Into<Value>> From<Vec<(K, V)>> for UpsertSource {
    fn from(values: Vec<(K, V)>) -> Self {
        Self::Values(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for UpsertSource {
    fn from(values: [(K, V); N]) -> Self {
        Self::Values(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl RecordType {
    /// Load the record stored under `id`, firing `after_find`.
    ///
    /// Absence is `Ok(None)`.
    pub fn lookup(&self, id: &str) -> RecordResult<Option<Record>> {
        let Some(blob) = self.store().get(id)? else {
            debug!(record_type = self.name(), id, "lookup miss");
            return Ok(None);
        };
        let mut record = self.deserialize(&blob)?;
        record.trigger(HookKind::AfterFind)?;
        Ok(Some(record))
    }

    /// Same as [`lookup`](Self::lookup).
    pub fn find(&self, id: &str) -> RecordResult<Option<Record>> {
        self.lookup(id)
    }

    /// Persist `source` under `id` as a newly created record.
    ///
    /// A record of this type keeps its values and takes `id`. Anything
    /// carrying values becomes a new record built from `(id, values)`.
    /// Anything else fails with `InvalidArgument`. `before_create` and
    /// `after_create` wrap the save.
    pub fn upsert(
        &self,
        id: impl Into<RecordId>,
        source: impl Into<UpsertSource>,
    ) -> RecordResult<Record> {
        let id = id.into();
        let mut record = match source.into() {
            UpsertSource::Record(mut record) if record.record_type() == self => {
                record.set_id(id);
                record
            }
            UpsertSource::Record(other) => self.build(id, other.values())?,
            UpsertSource::Values(values) => self.build(id, values)?,
            UpsertSource::Value(Value::Map(values)) => self.build(id, values)?,
            UpsertSource::Value(other) => {
                return Err(RecordError::InvalidArgument {
                    type_name: self.name().to_string(),
                    reason: format!("a value of kind {}", other.kind()),
                });
            }
        };

        record.trigger(HookKind::BeforeCreate)?;
        record.save()?;
        record.trigger(HookKind::AfterCreate)?;
        debug!(record_type = self.name(), id = %record.id(), "record created");
        Ok(record)
    }

    /// Same as [`upsert`](Self::upsert).
    pub fn create(
        &self,
        id: impl Into<RecordId>,
        source: impl Into<UpsertSource>,
    ) -> RecordResult<Record> {
        self.upsert(id, source)
    }

    /// Create a record under a freshly generated id.
    pub fn insert(&self, source: impl Into<UpsertSource>) -> RecordResult<Record> {
        self.upsert(RecordId::generate(), source)
    }

    pub fn exists(&self, id: &str) -> RecordResult<bool> {
        Ok(self.store().has(id)?)
    }

    /// Stored ids in store order.
    pub fn ids(&self) -> RecordResult<Vec<RecordId>> {
        Ok(self
            .store()
            .keys()?
            .into_iter()
            .map(RecordId::from)
            .collect())
    }

    /// Every stored record, decoded. No hooks fire.
    pub fn all(&self) -> RecordResult<Vec<Record>> {
        self.store()
            .values()?
            .iter()
            .map(|blob| self.deserialize(blob))
            .collect()
    }

    /// Delete the record stored under `id` without loading it.
    ///
    /// No hooks fire; use [`Record::delete`] for `before_destroy`.
    pub fn remove(&self, id: &str) -> RecordResult<bool> {
        let existed = self.store().delete(id)?;
        if !existed {
            debug!(record_type = self.name(), id, "remove of missing record");
        }
        Ok(existed)
    }

    pub fn count(&self) -> RecordResult<usize> {
        Ok(self.store().len()?)
    }

    /// The earliest inserted record.
    pub fn first(&self) -> RecordResult<Option<Record>> {
        Ok(self.all()?.into_iter().next())
    }

    /// The most recently inserted record.
    pub fn last(&self) -> RecordResult<Option<Record>> {
        Ok(self.all()?.into_iter().last())
    }

    /// Iterate over every stored record.
    pub fn iter(&self) -> RecordResult<std::vec::IntoIter<Record>> {
        Ok(self.all()?.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use plinth_store::{FileStore, InMemoryStore};

    fn villain(name: &str) -> RecordType {
        let ty = RecordType::define(name);
        ty.properties_list(&["vehicle", "lair"])
            .property_with_default("really_evil?", true);
        ty.bind_store(Arc::new(InMemoryStore::new()));
        ty
    }

    fn hero(name: &str) -> RecordType {
        let ty = RecordType::define(name);
        ty.property("name").property_with_default("flying?", false);
        ty.bind_store(Arc::new(InMemoryStore::new()));
        ty
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    #[test]
    fn lookup_missing_is_none() {
        let ty = villain("CollectionTests::Missing");
        assert!(ty.lookup("Nobody").unwrap().is_none());
        assert!(ty.find("Nobody").unwrap().is_none());
    }

    #[test]
    fn save_then_lookup_is_equal_and_clean() {
        let ty = villain("CollectionTests::SaveLookup");
        let mut doc = ty
            .build("Dr. Octopus", [("vehicle", "jets"), ("lair", "abandoned sewer")])
            .unwrap();
        doc.save().unwrap();
        assert!(!doc.is_changed());

        let found = ty.lookup("Dr. Octopus").unwrap().unwrap();
        assert_eq!(found, doc);
        assert!(!found.is_changed());
    }

    #[test]
    fn hero_scenario() {
        let ty = hero("CollectionTests::Hero");
        let mut h1 = ty.build("h1", [("name", "Sam")]).unwrap();
        assert_eq!(h1.get("flying?"), &Value::Bool(false));

        h1.set("flying", true).unwrap();
        h1.save().unwrap();

        let found = ty.lookup("h1").unwrap().unwrap();
        assert_eq!(found.get("flying?"), &Value::Bool(true));
        assert_eq!(found.get("name"), &Value::from("Sam"));
    }

    #[test]
    fn lookup_does_not_rerun_defaults() {
        let ty = RecordType::define("CollectionTests::NoReinit");
        let counter = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&counter);
        ty.computed_property("stamp", move |_| {
            let mut n = seen.lock().unwrap();
            *n += 1;
            Value::Int(*n)
        });
        ty.bind_store(Arc::new(InMemoryStore::new()));

        ty.create("a", Vec::<(String, Value)>::new()).unwrap();
        let found = ty.lookup("a").unwrap().unwrap();
        assert_eq!(found.get("stamp"), &Value::Int(1));
        assert_eq!(*counter.lock().unwrap(), 1);
    }

    // -----------------------------------------------------------------------
    // Upsert
    // -----------------------------------------------------------------------

    #[test]
    fn upsert_from_values() {
        let ty = villain("CollectionTests::UpsertValues");
        let lizard = ty
            .upsert("Lizard Man", [("lair", Value::from("sewer"))])
            .unwrap();
        assert_eq!(lizard.id(), "Lizard Man");
        assert!(!lizard.is_changed());
        assert!(ty.exists("Lizard Man").unwrap());
        assert!(ty.lookup("Lizard Man").unwrap().unwrap().is("really_evil"));
    }

    #[test]
    fn upsert_from_map_value() {
        let ty = villain("CollectionTests::UpsertMap");
        let map: Value = [("vehicle", "glider")].into_iter().collect();
        let goblin = ty.create("Green Goblin", map).unwrap();
        assert_eq!(goblin.get("vehicle"), &Value::from("glider"));
    }

    #[test]
    fn upsert_adopts_record_of_same_type() {
        let ty = villain("CollectionTests::UpsertAdopt");
        let draft = ty.build("draft", [("lair", "tower")]).unwrap();
        let saved = ty.upsert("Kingpin", draft).unwrap();
        assert_eq!(saved.id(), "Kingpin");
        assert_eq!(saved.get("lair"), &Value::from("tower"));
        assert_eq!(ty.ids().unwrap(), vec![RecordId::new("Kingpin")]);
    }

    #[test]
    fn upsert_converts_record_of_other_type() {
        let heroes = hero("CollectionTests::ConvertHero");
        let villains = villain("CollectionTests::ConvertVillain");
        villains.property("name");

        let turncoat = heroes.build("t", [("name", "Harry")]).unwrap();
        let converted = villains.upsert("Harry", turncoat).unwrap();
        assert_eq!(converted.record_type(), &villains);
        assert_eq!(converted.get("name"), &Value::from("Harry"));
        assert!(converted.is("really_evil?"));
    }

    #[test]
    fn upsert_rejects_loose_values() {
        let ty = villain("CollectionTests::UpsertInvalid");
        let err = ty.upsert("x", 7).unwrap_err();
        assert!(matches!(err, RecordError::InvalidArgument { .. }));
        assert_eq!(
            err.to_string(),
            "cannot create a CollectionTests::UpsertInvalid from a value of kind int"
        );
        let err = ty.upsert("x", "seven").unwrap_err();
        assert!(matches!(err, RecordError::InvalidArgument { .. }));
        assert_eq!(ty.count().unwrap(), 0);
    }

    #[test]
    fn insert_generates_ids() {
        let ty = villain("CollectionTests::Insert");
        let a = ty.insert([("lair", "moon")]).unwrap();
        let b = ty.insert([("lair", "mars")]).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(ty.count().unwrap(), 2);
    }

    // -----------------------------------------------------------------------
    // Enumeration and removal
    // -----------------------------------------------------------------------

    #[test]
    fn enumeration_follows_insertion_order() {
        let ty = villain("CollectionTests::Order");
        for name in ["Mysterio", "Electro", "Vulture"] {
            ty.create(name, Vec::<(String, Value)>::new()).unwrap();
        }
        // Overwriting keeps the original position.
        ty.create("Mysterio", [("lair", "studio")]).unwrap();

        let ids: Vec<String> = ty.ids().unwrap().into_iter().map(RecordId::into_string).collect();
        assert_eq!(ids, ["Mysterio", "Electro", "Vulture"]);
        assert_eq!(ty.first().unwrap().unwrap().id(), "Mysterio");
        assert_eq!(ty.last().unwrap().unwrap().id(), "Vulture");
        assert_eq!(
            ty.iter().unwrap().filter(|v| v.get("lair").is_null()).count(),
            2
        );
        let lairs: Vec<Value> = ty.all().unwrap().iter().map(|v| v.get("lair").clone()).collect();
        assert_eq!(lairs[0], Value::from("studio"));
    }

    #[test]
    fn empty_collection() {
        let ty = villain("CollectionTests::Empty");
        assert!(ty.all().unwrap().is_empty());
        assert!(ty.first().unwrap().is_none());
        assert!(ty.last().unwrap().is_none());
        assert_eq!(ty.count().unwrap(), 0);
    }

    #[test]
    fn remove_is_a_passthrough() {
        let ty = villain("CollectionTests::Remove");
        let destroyed = Arc::new(Mutex::new(0));
        let d = Arc::clone(&destroyed);
        ty.before_destroy(move |_| {
            *d.lock().unwrap() += 1;
            Ok(())
        });

        ty.create("Rhino", Vec::<(String, Value)>::new()).unwrap();
        assert!(ty.remove("Rhino").unwrap());
        assert!(!ty.remove("Rhino").unwrap());
        assert!(!ty.exists("Rhino").unwrap());
        assert_eq!(*destroyed.lock().unwrap(), 0);
        ty.clear_hooks();
    }

    #[test]
    fn file_backed_collection_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("villains.log");

        let ty = villain("CollectionTests::FileBacked");
        ty.bind_store(Arc::new(FileStore::open(&path).unwrap()));
        ty.create("Sandman", [("lair", "beach")]).unwrap();
        ty.create("Shocker", [("vehicle", "none")]).unwrap();
        ty.remove("Shocker").unwrap();

        ty.bind_store(Arc::new(FileStore::open(&path).unwrap()));
        let ids: Vec<String> = ty.ids().unwrap().into_iter().map(RecordId::into_string).collect();
        assert_eq!(ids, ["Sandman"]);
        let sandman = ty.lookup("Sandman").unwrap().unwrap();
        assert_eq!(sandman.get("lair"), &Value::from("beach"));
    }
}
