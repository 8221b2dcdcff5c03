//! `Point`: the atomic unit of data flowing through the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::group::GroupId;
use crate::value::Value;

/// An insertion-ordered string-to-string map. Tag iteration order is kept
/// stable so that templated alert ids/messages and `flatten`/`combine`
/// field-naming stay deterministic across replays, even though `GroupId`
/// hashing itself is order-independent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tags {
    entries: Vec<(String, String)>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        if let Some(pos) = self.entries.iter().position(|(k, _)| k == key) {
            Some(self.entries.remove(pos).1)
        } else {
            None
        }
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut t = Tags::new();
        for (k, v) in pairs {
            t.insert(k.into(), v.into());
        }
        t
    }
}

/// Field map. Unlike `Tags`, field order isn't load-bearing so a `HashMap`
/// is fine (and matches how `eval`/`default`/aggregations build them).
pub type Fields = HashMap<String, Value>;

/// A single immutable data point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    pub measurement: String,
    pub tags: Tags,
    pub fields: Fields,
    /// Nanosecond-precision timestamp.
    pub time: i64,
    pub group_id: GroupId,
}

impl Point {
    pub fn new(measurement: impl Into<String>, time: i64) -> Self {
        let measurement = measurement.into();
        let tags = Tags::new();
        let group_id = GroupId::from_tags(&measurement, &tags, false);
        Self {
            measurement,
            tags,
            fields: Fields::new(),
            time,
            group_id,
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.group_id = GroupId::from_tags(&self.measurement, &tags, false);
        self.tags = tags;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Recompute `group_id` after tags have been mutated in place (e.g. by
    /// `delete().tag(...)` or `eval(...).tags(...)`).
    pub fn recompute_group(&mut self, by_measurement: bool) {
        self.group_id = GroupId::from_tags(&self.measurement, &self.tags, by_measurement);
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_preserve_insertion_order() {
        let mut t = Tags::new();
        t.insert("b".into(), "2".into());
        t.insert("a".into(), "1".into());
        let keys: Vec<&String> = t.keys().collect();
        assert_eq!(keys, vec![&"b".to_string(), &"a".to_string()]);
    }

    #[test]
    fn insert_overwrites_existing_key() {
        let mut t = Tags::new();
        t.insert("host".into(), "a".into());
        t.insert("host".into(), "b".into());
        assert_eq!(t.len(), 1);
        assert_eq!(t.get("host"), Some(&"b".to_string()));
    }

    #[test]
    fn point_builder() {
        let p = Point::new("cpu", 10)
            .with_tags(Tags::from_pairs([("host", "serverA")]))
            .with_field("value", 90.0);
        assert_eq!(p.field("value").and_then(Value::as_f64), Some(90.0));
        assert_eq!(p.tag("host"), Some("serverA"));
    }
}
