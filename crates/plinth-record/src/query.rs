//! `where`-style filtering over a full collection scan.
//!
//! A [`Query`] holds an optional filter closure and an ordered list of
//! [`Predicate`]s. Running it:
//!
//! 1. applies the filter to every stored record; an empty result is returned
//!    immediately,
//! 2. narrows the running set with each predicate in order, starting from
//!    the full collection when no filter ran.
//!
//! A query with neither a filter nor predicates matches nothing.

use std::fmt;

use plinth_types::Value;
use tracing::debug;

use crate::error::RecordResult;
use crate::record::Record;
use crate::record_type::RecordType;

/// One positional `where` argument.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Keep records whose value equals the given one for every pair.
    Matches(Vec<(String, Value)>),
    /// Keep records whose value for the property is truthy.
    Flag(String),
}

impl Predicate {
    pub fn matches<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Matches(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn flag(name: impl Into<String>) -> Self {
        Self::Flag(name.into())
    }

    /// Property names this predicate reads.
    fn names(&self) -> Vec<&str> {
        match self {
            Self::Matches(pairs) => pairs.iter().map(|(k, _)| k.as_str()).collect(),
            Self::Flag(name) => vec![name.as_str()],
        }
    }

    fn accepts(&self, record: &Record) -> bool {
        match self {
            Self::Matches(pairs) => pairs.iter().all(|(k, v)| record.get(k) == v),
            Self::Flag(name) => record.is(name),
        }
    }
}

impl From<&str> for Predicate {
    fn from(name: &str) -> Self {
        Self::Flag(name.to_string())
    }
}

impl From<String> for Predicate {
    fn from(name: String) -> Self {
        Self::Flag(name)
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Predicate {
    fn from(pairs: [(K, V); N]) -> Self {
        Self::matches(pairs)
    }
}

type Filter<'a> = Box<dyn Fn(&Record) -> bool + 'a>;

/// Builder for a `where` query against one record type.
pub struct Query<'a> {
    record_type: &'a RecordType,
    filter: Option<Filter<'a>>,
    predicates: Vec<Predicate>,
}

impl<'a> Query<'a> {
    pub fn new(record_type: &'a RecordType) -> Self {
        Self {
            record_type,
            filter: None,
            predicates: Vec::new(),
        }
    }

    /// Set the filter closure, replacing any previous one.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Record) -> bool + 'a,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Append a key/value equality predicate.
    pub fn matching<K, V, I>(self, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.predicate(Predicate::matches(pairs))
    }

    /// Append a truthy-flag predicate.
    pub fn flag(self, name: impl Into<String>) -> Self {
        self.predicate(Predicate::flag(name))
    }

    pub fn predicate(mut self, predicate: impl Into<Predicate>) -> Self {
        self.predicates.push(predicate.into());
        self
    }

    /// Evaluate the query.
    ///
    /// Fails with `InvalidProperty` when a predicate names an undeclared
    /// property, unless the filter already matched nothing.
    pub fn run(self) -> RecordResult<Vec<Record>> {
        let mut running: Option<Vec<Record>> = None;

        if let Some(filter) = &self.filter {
            let kept: Vec<Record> = self
                .record_type
                .all()?
                .into_iter()
                .filter(|r| filter(r))
                .collect();
            if kept.is_empty() {
                debug!(record_type = self.record_type.name(), "filter matched nothing");
                return Ok(kept);
            }
            running = Some(kept);
        }

        for predicate in &self.predicates {
            for name in predicate.names() {
                self.record_type.require_property(name)?;
            }
            let input = match running.take() {
                Some(records) => records,
                None => self.record_type.all()?,
            };
            running = Some(input.into_iter().filter(|r| predicate.accepts(r)).collect());
        }

        let result = running.unwrap_or_default();
        debug!(
            record_type = self.record_type.name(),
            predicates = self.predicates.len(),
            matched = result.len(),
            "query evaluated"
        );
        Ok(result)
    }
}

impl fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("record_type", &self.record_type.name())
            .field("filter", &self.filter.is_some())
            .field("predicates", &self.predicates)
            .finish()
    }
}

impl RecordType {
    /// Start a `where` query.
    pub fn query(&self) -> Query<'_> {
        Query::new(self)
    }

    /// Run a query made only of positional predicates.
    pub fn select<I, P>(&self, predicates: I) -> RecordResult<Vec<Record>>
    where
        I: IntoIterator<Item = P>,
        P: Into<Predicate>,
    {
        predicates
            .into_iter()
            .fold(self.query(), |query, predicate| query.predicate(predicate))
            .run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use plinth_store::InMemoryStore;

    use crate::error::RecordError;

    fn no_values() -> Vec<(String, Value)> {
        Vec::new()
    }

    fn villains(name: &str) -> RecordType {
        let ty = RecordType::define(name);
        ty.properties_list(&["vehicle", "lair"])
            .property_with_default("really_evil?", true);
        ty.bind_store(Arc::new(InMemoryStore::new()));

        ty.create(
            "Dr. Octopus",
            [("vehicle", Value::from("jets")), ("lair", Value::from("sewer"))],
        )
        .unwrap();
        ty.create(
            "Lizard Man",
            [("lair", Value::from("sewer")), ("really_evil?", Value::Bool(false))],
        )
        .unwrap();
        ty.create(
            "Green Goblin",
            [("vehicle", Value::from("glider")), ("lair", Value::from("tower"))],
        )
        .unwrap();
        ty
    }

    fn ids(records: &[Record]) -> Vec<String> {
        records.iter().map(|r| r.id().to_string()).collect()
    }

    // -----------------------------------------------------------------------
    // Filter
    // -----------------------------------------------------------------------

    #[test]
    fn filter_alone() {
        let ty = villains("QueryTests::FilterAlone");
        let found = ty
            .query()
            .filter(|r| r.get("lair") == &Value::from("sewer"))
            .run()
            .unwrap();
        assert_eq!(ids(&found), ["Dr. Octopus", "Lizard Man"]);
    }

    #[test]
    fn empty_filter_short_circuits_before_validation() {
        let ty = villains("QueryTests::ShortCircuit");
        let found = ty
            .query()
            .filter(|_| false)
            .flag("ip_address")
            .run()
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn no_arguments_matches_nothing() {
        let ty = villains("QueryTests::NoArgs");
        assert!(ty.query().run().unwrap().is_empty());
        assert!(ty.select(Vec::<Predicate>::new()).unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Predicates
    // -----------------------------------------------------------------------

    #[test]
    fn key_value_predicate() {
        let ty = villains("QueryTests::KeyValue");
        let found = ty.query().matching([("lair", "sewer")]).run().unwrap();
        assert_eq!(ids(&found), ["Dr. Octopus", "Lizard Man"]);

        let found = ty
            .query()
            .matching([("lair", "sewer"), ("vehicle", "jets")])
            .run()
            .unwrap();
        assert_eq!(ids(&found), ["Dr. Octopus"]);
    }

    #[test]
    fn null_matches_unset_properties() {
        let ty = villains("QueryTests::NullMatch");
        let found = ty
            .query()
            .matching([("vehicle", Value::Null)])
            .run()
            .unwrap();
        assert_eq!(ids(&found), ["Lizard Man"]);
    }

    #[test]
    fn flag_predicate_accepts_both_forms() {
        let ty = villains("QueryTests::Flag");
        let with_suffix = ty.select(["really_evil?"]).unwrap();
        let bare = ty.select(["really_evil"]).unwrap();
        assert_eq!(ids(&with_suffix), ["Dr. Octopus", "Green Goblin"]);
        assert_eq!(with_suffix, bare);
    }

    #[test]
    fn flag_predicate_on_non_boolean_uses_truthiness() {
        let ty = villains("QueryTests::Truthy");
        let found = ty.query().flag("vehicle").run().unwrap();
        assert_eq!(ids(&found), ["Dr. Octopus", "Green Goblin"]);
    }

    #[test]
    fn predicates_narrow_in_order() {
        let ty = villains("QueryTests::Narrow");
        let found = ty
            .query()
            .matching([("lair", "sewer")])
            .flag("really_evil")
            .run()
            .unwrap();
        assert_eq!(ids(&found), ["Dr. Octopus"]);
    }

    #[test]
    fn filter_then_predicates() {
        let ty = villains("QueryTests::FilterThen");
        let found = ty
            .query()
            .filter(|r| r.id().as_str().contains(' '))
            .flag("really_evil")
            .matching([("vehicle", "glider")])
            .run()
            .unwrap();
        assert_eq!(ids(&found), ["Green Goblin"]);
    }

    #[test]
    fn empty_running_set_stays_empty() {
        let ty = villains("QueryTests::StaysEmpty");
        let found = ty
            .query()
            .matching([("lair", "volcano")])
            .flag("really_evil")
            .run()
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn predicates_over_empty_collection() {
        let ty = RecordType::define("QueryTests::EmptyCollection");
        ty.property("lair");
        ty.bind_store(Arc::new(InMemoryStore::new()));
        assert!(ty.select(["lair"]).unwrap().is_empty());
        assert!(ty.create("x", no_values()).is_ok());
        assert!(ty.select(["lair"]).unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn undeclared_names_fail_in_every_form() {
        let ty = villains("QueryTests::Invalid");

        let err = ty.query().matching([("ip_address", "127.0.0.1")]).run().unwrap_err();
        assert!(matches!(err, RecordError::InvalidProperty { ref property, .. } if property == "ip_address"));

        let err = ty.select(["insurance_company"]).unwrap_err();
        assert!(matches!(err, RecordError::InvalidProperty { .. }));

        let err = ty
            .query()
            .filter(|_| true)
            .flag("insurance_company")
            .run()
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidProperty { .. }));
    }

    #[test]
    fn validation_applies_after_empty_predicate_result() {
        let ty = villains("QueryTests::LateInvalid");
        let err = ty
            .query()
            .matching([("lair", "volcano")])
            .flag("insurance_company")
            .run()
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidProperty { .. }));
    }

    #[test]
    fn predicate_conversions() {
        assert_eq!(Predicate::from("flying"), Predicate::Flag("flying".into()));
        assert_eq!(
            Predicate::from([("lair", "sewer")]),
            Predicate::Matches(vec![("lair".into(), Value::from("sewer"))])
        );
    }

    #[test]
    fn debug_output() {
        let ty = villains("QueryTests::Debug");
        let query = ty.query().flag("lair");
        let debug = format!("{query:?}");
        assert!(debug.contains("QueryTests::Debug"));
        assert!(debug.contains("Flag(\"lair\")"));
    }
}
