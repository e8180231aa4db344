//! Property declarations and name normalization for a record type.
//!
//! A property declared as `flying?` can be addressed as either `flying?` or
//! `flying`. Both forms resolve to the single declared name, which is also
//! the key its value is stored under.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use plinth_types::Value;

use crate::record::Record;

/// Suffix that marks a boolean property.
pub const BOOLEAN_SUFFIX: char = '?';

/// Default generator: computes a value from the record under construction.
pub type Generator = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// The default value of a property.
#[derive(Clone)]
pub enum PropertyDefault {
    /// A fixed value, cloned into every new record.
    Literal(Value),
    /// A value computed from the record after all literal defaults and
    /// caller-supplied values are in place.
    Computed(Generator),
}

impl PropertyDefault {
    /// Wrap a generator closure.
    pub fn computed<F>(generator: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(generator))
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }

    /// The literal value, if this is not a generator.
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal(v) => Some(v),
            Self::Computed(_) => None,
        }
    }

    pub(crate) fn resolve(&self, record: &Record) -> Value {
        match self {
            Self::Literal(v) => v.clone(),
            Self::Computed(generator) => generator(record),
        }
    }
}

impl fmt::Debug for PropertyDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

macro_rules! literal_default_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for PropertyDefault {
                fn from(value: $ty) -> Self {
                    Self::Literal(value.into())
                }
            }
        )*
    };
}

literal_default_from!(Value, bool, i64, i32, f64, &str, String, Vec<Value>);

/// Options accepted by [`RecordType::declare`](crate::RecordType::declare).
#[derive(Clone, Debug, Default)]
pub struct PropertyOptions {
    pub default: Option<PropertyDefault>,
}

impl PropertyOptions {
    pub fn with_default(default: impl Into<PropertyDefault>) -> Self {
        Self {
            default: Some(default.into()),
        }
    }
}

/// The declared properties of one record type.
#[derive(Clone, Debug, Default)]
pub struct PropertyRegistry {
    /// Declared names, in first-declaration order, without duplicates.
    names: Vec<String>,
    defaults: HashMap<String, PropertyDefault>,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a property. Re-declaring a name keeps its position; a default
    /// given on re-declaration replaces the previous one.
    ///
    /// Returns `true` if the name was not declared before.
    pub fn declare(&mut self, name: &str, options: PropertyOptions) -> bool {
        let added = !self.names.iter().any(|n| n == name);
        if added {
            self.names.push(name.to_string());
        }
        if let Some(default) = options.default {
            self.defaults.insert(name.to_string(), default);
        }
        added
    }

    /// Declared names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resolve `name` to its declared form.
    ///
    /// An exact match wins; otherwise `name?` is tried. A name declared
    /// without the suffix is not reachable by adding one.
    pub fn normalize(&self, name: &str) -> Option<&str> {
        if let Some(exact) = self.names.iter().find(|n| *n == name) {
            return Some(exact.as_str());
        }
        let suffixed = format!("{name}{BOOLEAN_SUFFIX}");
        self.names
            .iter()
            .find(|n| **n == suffixed)
            .map(String::as_str)
    }

    pub fn is_valid(&self, name: &str) -> bool {
        self.normalize(name).is_some()
    }

    pub fn default_for(&self, name: &str) -> Option<&PropertyDefault> {
        self.defaults.get(name)
    }

    /// All declared defaults keyed by property name.
    pub fn defaults(&self) -> BTreeMap<String, PropertyDefault> {
        self.defaults
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The order in which a new record resolves its properties: everything
    /// without a generator first, then generator-backed properties, each group
    /// in declaration order.
    pub fn resolution_plan(&self) -> Vec<(String, Option<PropertyDefault>)> {
        let (mut plan, computed): (Vec<_>, Vec<_>) = self
            .names
            .iter()
            .map(|name| (name.clone(), self.defaults.get(name).cloned()))
            .partition(|(_, default)| !matches!(default, Some(d) if d.is_computed()));
        plan.extend(computed);
        plan
    }
}
