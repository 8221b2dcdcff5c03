//! `Batch`: a windowed group of points produced by `window` or a batch query.

use serde::{Deserialize, Serialize};

use crate::group::GroupId;
use crate::point::{Point, Tags};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub name: String,
    /// Tag set common to every contained point.
    pub tags: Tags,
    pub group_id: GroupId,
    /// Nominal window end time.
    pub tmax: i64,
    /// When true, `points` may span several measurements and consumers must
    /// split by `Point::measurement` rather than assume `name` applies to
    /// every point (query results grouped `byname`).
    pub byname: bool,
    pub points: Vec<Point>,
}

impl Batch {
    pub fn new(name: impl Into<String>, tags: Tags, tmax: i64) -> Self {
        let name = name.into();
        let group_id = GroupId::from_tags(&name, &tags, false);
        Self {
            name,
            tags,
            group_id,
            tmax,
            byname: false,
            points: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Split a `byname` batch into per-measurement sub-batches sharing the
    /// same group tags and `tmax`.
    pub fn split_by_name(&self) -> Vec<Batch> {
        if !self.byname {
            return vec![self.clone()];
        }
        let mut by_name: std::collections::BTreeMap<String, Vec<Point>> = Default::default();
        for p in &self.points {
            by_name.entry(p.measurement.clone()).or_default().push(p.clone());
        }
        by_name
            .into_iter()
            .map(|(name, points)| Batch {
                name: name.clone(),
                tags: self.tags.clone(),
                group_id: GroupId::from_tags(&name, &self.tags, false),
                tmax: self.tmax,
                byname: false,
                points,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Point;

    #[test]
    fn byname_split_groups_per_measurement() {
        let mut b = Batch::new("multi", Tags::new(), 10);
        b.byname = true;
        b.points.push(Point::new("cpu", 1));
        b.points.push(Point::new("mem", 2));
        b.points.push(Point::new("cpu", 3));

        let split = b.split_by_name();
        assert_eq!(split.len(), 2);
        assert!(split.iter().any(|s| s.name == "cpu" && s.points.len() == 2));
        assert!(split.iter().any(|s| s.name == "mem" && s.points.len() == 1));
    }

    #[test]
    fn non_byname_split_is_identity() {
        let mut b = Batch::new("cpu", Tags::new(), 10);
        b.points.push(Point::new("cpu", 1));
        let split = b.split_by_name();
        assert_eq!(split.len(), 1);
        assert_eq!(split[0].points.len(), 1);
    }
}
