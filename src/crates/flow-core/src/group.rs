//! Group identity.
//!
//! A group is the partition key a pipeline has "grouped by" at a given
//! point in the DAG: the set of tag keys plus the tuple of their values.
//! `GroupId` is the pre-hashed canonicalization used to key per-group state
//! in every stateful operator (window ring, join buffer, alert history...).

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::point::Tags;

/// Opaque, stable identity for a group. Two `Tags` maps with the same
/// key/value pairs (regardless of insertion order) hash to the same id;
/// insertion order is preserved on `Tags` itself only for stable display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl GroupId {
    /// The "nil" group: no tags, used by ungrouped tasks.
    pub const NIL: GroupId = GroupId(0);

    pub fn from_tags(measurement: &str, tags: &Tags, by_measurement: bool) -> GroupId {
        let mut pairs: Vec<(&String, &String)> = tags.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        let mut hasher = DefaultHasher::new();
        if by_measurement {
            measurement.hash(&mut hasher);
        }
        for (k, v) in pairs {
            k.hash(&mut hasher);
            v.hash(&mut hasher);
        }
        GroupId(hasher.finish())
    }
}

/// A grouping specification: which tag keys partition the edge downstream
/// of a `groupBy`. `All` corresponds to `groupBy(*)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupBySpec {
    /// No regrouping: inherit the upstream group identity verbatim.
    Inherit,
    /// Group by this explicit set of tag keys.
    Keys(Vec<String>),
    /// `groupBy(*)`: every tag on the point becomes part of the identity.
    All,
}

impl GroupBySpec {
    /// Tags retained/derived for a point under this spec, and whether the
    /// measurement name should be folded into the identity
    /// (`groupByMeasurement()`).
    pub fn apply(&self, measurement: &str, tags: &Tags, fold_measurement: bool) -> (Tags, GroupId) {
        let derived: Tags = match self {
            GroupBySpec::Inherit => tags.clone(),
            GroupBySpec::All => tags.clone(),
            GroupBySpec::Keys(keys) => {
                let mut t = Tags::new();
                for k in keys {
                    if let Some(v) = tags.get(k) {
                        t.insert(k.clone(), v.clone());
                    }
                }
                t
            }
        };
        let id = GroupId::from_tags(measurement, &derived, fold_measurement);
        (derived, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_independent() {
        let mut a = Tags::new();
        a.insert("host".into(), "serverA".into());
        a.insert("region".into(), "us".into());

        let mut b = Tags::new();
        b.insert("region".into(), "us".into());
        b.insert("host".into(), "serverA".into());

        assert_eq!(
            GroupId::from_tags("cpu", &a, false),
            GroupId::from_tags("cpu", &b, false)
        );
    }

    #[test]
    fn measurement_fold_changes_identity() {
        let t = Tags::new();
        assert_ne!(
            GroupId::from_tags("cpu", &t, true),
            GroupId::from_tags("mem", &t, true)
        );
        assert_eq!(
            GroupId::from_tags("cpu", &t, false),
            GroupId::from_tags("mem", &t, false)
        );
    }

    #[test]
    fn keys_spec_projects_subset() {
        let mut tags = Tags::new();
        tags.insert("host".into(), "a".into());
        tags.insert("dc".into(), "us-east".into());

        let spec = GroupBySpec::Keys(vec!["host".to_string()]);
        let (derived, _id) = spec.apply("cpu", &tags, false);
        assert_eq!(derived.get("host").map(String::as_str), Some("a"));
        assert_eq!(derived.get("dc"), None);
    }
}
