//! Record instances.

use std::collections::BTreeMap;
use std::fmt;

use plinth_types::{RecordId, TypeError, Value};
use tracing::debug;

use crate::codec::RecordSnapshot;
use crate::error::{RecordError, RecordResult};
use crate::hooks::HookKind;
use crate::record_type::RecordType;

/// Returned by reference for properties that hold nothing.
static NULL: Value = Value::Null;

/// One record of a [`RecordType`].
///
/// Values are keyed by the declared property name, so `flying` and
/// `flying?` share one slot when the property was declared as `flying?`.
/// A record is dirty from construction until it is saved, and becomes dirty
/// again on any successful [`set`](Record::set).
#[derive(Clone)]
pub struct Record {
    pub(crate) record_type: RecordType,
    pub(crate) id: RecordId,
    pub(crate) values: BTreeMap<String, Value>,
    pub(crate) dirty: bool,
    /// Set while one of this record's hook callbacks is running.
    pub(crate) hooks_active: bool,
}

impl Record {
    /// Construct a record and resolve its defaults.
    ///
    /// Each declared property takes its value from `initial` if present
    /// (either form of a boolean name is accepted), otherwise from its
    /// default. Literal defaults are resolved before generators, so a
    /// generator can read any non-generated property. Keys in `initial` that
    /// are not declared are ignored. `after_initialize` fires last.
    pub fn new<K, V, I>(
        record_type: &RecordType,
        id: impl Into<RecordId>,
        initial: I,
    ) -> RecordResult<Self>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let id = id.into();
        let (mut supplied, plan) = {
            let registry = record_type.property_registry();
            let mut supplied = BTreeMap::new();
            for (key, value) in initial {
                let key = key.as_ref();
                match registry.normalize(key) {
                    Some(name) => {
                        supplied.insert(name.to_string(), value.into());
                    }
                    None => {
                        debug!(record_type = record_type.name(), key, "ignoring undeclared initial value");
                    }
                }
            }
            (supplied, registry.resolution_plan())
        };

        let mut record = Record {
            record_type: record_type.clone(),
            id,
            values: BTreeMap::new(),
            dirty: true,
            hooks_active: false,
        };
        for (name, default) in plan {
            let value = match supplied.remove(&name) {
                Some(value) => value,
                None => default.map(|d| d.resolve(&record)).unwrap_or_default(),
            };
            record.values.insert(name, value);
        }

        record.trigger(HookKind::AfterInitialize)?;
        Ok(record)
    }

    /// Rebuild a stored record. Clean, and no defaults or hooks run.
    pub(crate) fn from_snapshot(record_type: RecordType, snapshot: RecordSnapshot) -> Self {
        Record {
            record_type,
            id: snapshot.id,
            values: snapshot.values,
            dirty: false,
            hooks_active: false,
        }
    }

    /// Value copy handed to the serialization pipeline.
    pub(crate) fn snapshot(&self) -> RecordSnapshot {
        RecordSnapshot {
            type_name: self.record_type.name().to_string(),
            id: self.id.clone(),
            values: self.values.clone(),
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    /// The declared properties of this record's type.
    pub fn properties(&self) -> Vec<String> {
        self.record_type.properties()
    }

    pub fn is_valid_property(&self, name: &str) -> bool {
        self.record_type.is_valid_property(name)
    }

    /// Returns `true` if the record changed since it was last saved or loaded.
    pub fn is_changed(&self) -> bool {
        self.dirty
    }

    // ---------------------------------------------------------------
    // Property access
    // ---------------------------------------------------------------

    /// Read a property. Undeclared names and unset properties read as `Null`.
    pub fn get(&self, name: &str) -> &Value {
        let registry = self.record_type.property_registry();
        registry
            .normalize(name)
            .and_then(|declared| self.values.get(declared))
            .unwrap_or(&NULL)
    }

    /// Read a property and convert it to a Rust type.
    pub fn get_as<T>(&self, name: &str) -> RecordResult<T>
    where
        T: TryFrom<Value, Error = TypeError>,
    {
        T::try_from(self.get(name).clone()).map_err(|source| RecordError::Value {
            property: name.to_string(),
            source,
        })
    }

    /// Truthiness of a property: anything but `Null` and `false`.
    pub fn is(&self, name: &str) -> bool {
        self.get(name).is_truthy()
    }

    /// Write a property and mark the record dirty.
    ///
    /// Fails with `InvalidProperty` if `name` is not declared.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> RecordResult<()> {
        let declared = self.record_type.require_property(name)?;
        self.values.insert(declared, value.into());
        self.dirty = true;
        Ok(())
    }

    /// Apply `f` to a property's value in place and mark the record dirty.
    pub fn update<F>(&mut self, name: &str, f: F) -> RecordResult<()>
    where
        F: FnOnce(&mut Value) -> Result<(), TypeError>,
    {
        let declared = self.record_type.require_property(name)?;
        let slot = self.values.entry(declared.clone()).or_default();
        f(slot).map_err(|source| RecordError::Value {
            property: declared,
            source,
        })?;
        self.dirty = true;
        Ok(())
    }

    /// Assign every declared key in `values`, skip the rest, then save.
    ///
    /// Unlike [`set`](Record::set), undeclared keys are not an error here.
    pub fn update_properties<K, V, I>(&mut self, values: I) -> RecordResult<()>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in values {
            let key = key.as_ref();
            if self.is_valid_property(key) {
                self.set(key, value)?;
            } else {
                debug!(record_type = self.record_type.name(), key, "skipping undeclared property");
            }
        }
        self.save()
    }

    /// Same as [`update_properties`](Record::update_properties).
    pub fn update_attributes<K, V, I>(&mut self, values: I) -> RecordResult<()>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.update_properties(values)
    }

    // ---------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------

    /// Serialize the record and write it to its type's store.
    ///
    /// Fires `before_save` and `after_save`. The record is clean afterwards.
    pub fn save(&mut self) -> RecordResult<()> {
        self.trigger(HookKind::BeforeSave)?;

        let blob = self.record_type.serialize(self)?;
        let len = blob.len();
        self.record_type.store().set(self.id.as_str(), blob)?;
        self.dirty = false;
        debug!(record_type = self.record_type.name(), id = %self.id, len, "record saved");

        self.trigger(HookKind::AfterSave)
    }

    /// Remove the record from its type's store after firing `before_destroy`.
    ///
    /// Returns `true` if the store held the record.
    pub fn delete(&mut self) -> RecordResult<bool> {
        self.trigger(HookKind::BeforeDestroy)?;
        let existed = self.record_type.store().delete(self.id.as_str())?;
        debug!(record_type = self.record_type.name(), id = %self.id, existed, "record deleted");
        Ok(existed)
    }

    /// Same as [`delete`](Record::delete).
    pub fn destroy(&mut self) -> RecordResult<bool> {
        self.delete()
    }

    // ---------------------------------------------------------------
    // Projections
    // ---------------------------------------------------------------

    /// Label/value map of the record: its type name under `type`, its id
    /// under `key_label`, and every declared property under its declared
    /// name.
    pub fn to_projection(&self, key_label: &str) -> BTreeMap<String, Value> {
        let mut projection = BTreeMap::new();
        projection.insert(
            "type".to_string(),
            Value::Text(self.record_type.name().to_string()),
        );
        projection.insert(key_label.to_string(), Value::Text(self.id.to_string()));
        for name in self.properties() {
            let value = self.values.get(&name).cloned().unwrap_or_default();
            projection.insert(name, value);
        }
        projection
    }

    /// Declared properties and their values, without the type and id.
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.properties()
            .into_iter()
            .map(|name| {
                let value = self.values.get(&name).cloned().unwrap_or_default();
                (name, value)
            })
            .collect()
    }

    /// The projection rendered as pretty-printed JSON.
    pub fn to_text(&self, key_label: &str) -> RecordResult<String> {
        let json: serde_json::Map<String, serde_json::Value> = self
            .to_projection(key_label)
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::to_string_pretty(&json).map_err(|e| RecordError::Serialization(e.to_string()))
    }
}

impl PartialEq for Record {
    /// Same type, same id, and equal values for every declared property.
    fn eq(&self, other: &Self) -> bool {
        self.record_type.name() == other.record_type.name()
            && self.id == other.id
            && self
                .properties()
                .iter()
                .all(|name| self.get(name) == other.get(name))
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("type", &self.record_type.name())
            .field("id", &self.id)
            .field("values", &self.values)
            .field("dirty", &self.dirty)
            .finish()
    }
}
