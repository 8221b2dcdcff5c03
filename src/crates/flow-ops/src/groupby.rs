//! `groupBy` (spec §4.3): repartitions a stream or batch edge by a new tag
//! set. Downstream state is keyed off the new `GroupId` this produces.

use flow_core::{Batch, GroupBySpec, Message, Point};

use crate::operator::Operator;

pub struct GroupBy {
    spec: GroupBySpec,
    /// `groupByMeasurement()`: fold the measurement name into the identity.
    by_measurement: bool,
}

impl GroupBy {
    pub fn new(spec: GroupBySpec) -> Self {
        Self {
            spec,
            by_measurement: false,
        }
    }

    pub fn by_measurement(mut self) -> Self {
        self.by_measurement = true;
        self
    }

    fn regroup_point(&self, mut p: Point) -> Point {
        let (tags, group_id) = self.spec.apply(&p.measurement, &p.tags, self.by_measurement);
        p.tags = tags;
        p.group_id = group_id;
        p
    }

    fn regroup_batch(&self, mut b: Batch) -> Vec<Batch> {
        // A regrouped batch may fan out into several groups; bucket by the
        // new GroupId and rebuild per-bucket batches with that group's tags.
        use std::collections::BTreeMap;
        let mut buckets: BTreeMap<flow_core::GroupId, (flow_core::Tags, Vec<Point>)> = BTreeMap::new();
        for p in b.points.drain(..) {
            let (tags, gid) = self.spec.apply(&p.measurement, &p.tags, self.by_measurement);
            buckets.entry(gid).or_insert_with(|| (tags.clone(), Vec::new())).1.push(p);
        }
        buckets
            .into_iter()
            .map(|(gid, (tags, points))| Batch {
                name: b.name.clone(),
                tags,
                group_id: gid,
                tmax: b.tmax,
                byname: b.byname,
                points,
            })
            .collect()
    }
}

impl Operator for GroupBy {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        match msg {
            Message::Point(p) => vec![Message::Point(self.regroup_point(p))],
            Message::Batch(b) => self.regroup_batch(b).into_iter().map(Message::Batch).collect(),
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::Tags;

    #[test]
    fn groups_by_explicit_keys() {
        let mut g = GroupBy::new(GroupBySpec::Keys(vec!["host".into()]));
        let p = Point::new("cpu", 0).with_tags(Tags::from_pairs([("host", "a"), ("dc", "us")]));
        let out = g.process(Message::Point(p));
        let Message::Point(regrouped) = &out[0] else { panic!() };
        assert_eq!(regrouped.tag("host"), Some("a"));
        assert_eq!(regrouped.tag("dc"), None);
    }

    #[test]
    fn group_by_measurement_separates_identities() {
        let mut g = GroupBy::new(GroupBySpec::All).by_measurement();
        let cpu = Point::new("cpu", 0);
        let mem = Point::new("mem", 0);
        let Message::Point(cpu_out) = &g.process(Message::Point(cpu))[0] else { panic!() };
        let Message::Point(mem_out) = &g.process(Message::Point(mem))[0] else { panic!() };
        assert_ne!(cpu_out.group_id, mem_out.group_id);
    }

    #[test]
    fn batch_fans_out_per_new_group() {
        let mut g = GroupBy::new(GroupBySpec::Keys(vec!["host".into()]));
        let mut b = Batch::new("cpu", Tags::new(), 10);
        b.points.push(Point::new("cpu", 1).with_tags(Tags::from_pairs([("host", "a")])));
        b.points.push(Point::new("cpu", 2).with_tags(Tags::from_pairs([("host", "b")])));
        let out = g.process(Message::Batch(b));
        assert_eq!(out.len(), 2);
    }
}
