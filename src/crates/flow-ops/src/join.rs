//! Join (spec §4.4). Joins two or more upstream edges on a shared tag
//! subset within a time `tolerance`, producing one edge with fields renamed
//! `<alias>.<field>` joined by `delimiter`.
//!
//! Unlike every other operator kernel in this crate, a join has more than
//! one in-edge, so it does not implement the single-input `Operator` trait;
//! callers feed it through `push(side, msg)` instead, one call per arriving
//! message tagged with which upstream side it came from.

use std::collections::{HashMap, HashSet, VecDeque};

use flow_core::{GroupId, Message, Point, Tags};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillPolicy {
    /// Drop matches missing a side.
    None,
    /// Emit with the missing side's previously-seen field names defaulted
    /// to null (in practice: simply absent, so a downstream `default()`
    /// can patch them in — see spec §8 "Join fill(null) + default").
    Null,
    /// As `Null`, but the missing side's previously-seen field names are
    /// set to this constant instead of being left absent.
    Value(f64),
}

pub struct JoinSpec {
    pub aliases: Vec<String>,
    pub tolerance: i64,
    pub fill: FillPolicy,
    pub delimiter: String,
    pub stream_name: Option<String>,
}

impl JoinSpec {
    pub fn new(aliases: Vec<String>, tolerance: i64) -> Self {
        Self {
            aliases,
            tolerance,
            fill: FillPolicy::None,
            delimiter: ".".to_string(),
            stream_name: None,
        }
    }
}

#[derive(Default)]
struct GroupState {
    buffers: Vec<VecDeque<Point>>,
    max_seen: Vec<i64>,
    known_fields: Vec<HashSet<String>>,
}

impl GroupState {
    fn new(sides: usize) -> Self {
        Self {
            buffers: (0..sides).map(|_| VecDeque::new()).collect(),
            max_seen: vec![i64::MIN; sides],
            known_fields: (0..sides).map(|_| HashSet::new()).collect(),
        }
    }
}

pub struct Join {
    spec: JoinSpec,
    groups: HashMap<GroupId, GroupState>,
    barrier_time: i64,
}

impl Join {
    pub fn new(spec: JoinSpec) -> Self {
        Self {
            spec,
            groups: HashMap::new(),
            barrier_time: i64::MIN,
        }
    }

    fn sides(&self) -> usize {
        self.spec.aliases.len()
    }

    /// Feed one message arriving on upstream side `side` (0-indexed,
    /// matching `spec.aliases`). Returns zero or more joined output points.
    pub fn push(&mut self, side: usize, msg: Message) -> Vec<Message> {
        match msg {
            Message::Point(p) => self.push_point(side, p),
            Message::Barrier(b) => {
                self.barrier_time = self.barrier_time.max(b.time);
                self.flush_unmatchable()
            }
            other => vec![other],
        }
    }

    fn push_point(&mut self, side: usize, p: Point) -> Vec<Message> {
        let sides = self.sides();
        let state = self.groups.entry(p.group_id).or_insert_with(|| GroupState::new(sides));
        state.max_seen[side] = state.max_seen[side].max(p.time);
        for k in p.fields.keys() {
            state.known_fields[side].insert(k.clone());
        }
        let pos = state.buffers[side].iter().position(|q| q.time > p.time).unwrap_or(state.buffers[side].len());
        state.buffers[side].insert(pos, p);

        let mut out = self.try_match();
        out.extend(self.flush_unmatchable());
        out
    }

    fn try_match(&mut self) -> Vec<Message> {
        let tolerance = self.spec.tolerance;
        let sides = self.sides();
        let mut out = Vec::new();

        let group_ids: Vec<GroupId> = self.groups.keys().copied().collect();
        for gid in group_ids {
            loop {
                let state = self.groups.get_mut(&gid).unwrap();
                if state.buffers.iter().any(VecDeque::is_empty) {
                    break;
                }
                // Anchor on whichever side has the earliest unmatched point.
                let anchor_side = (0..sides)
                    .min_by_key(|&s| state.buffers[s].front().unwrap().time)
                    .unwrap();
                let anchor_time = state.buffers[anchor_side].front().unwrap().time;

                let mut picks: Vec<Option<usize>> = vec![None; sides];
                picks[anchor_side] = Some(0);
                let mut all_found = true;
                for s in 0..sides {
                    if s == anchor_side {
                        continue;
                    }
                    let found = state.buffers[s]
                        .iter()
                        .position(|p| (p.time - anchor_time).abs() <= tolerance);
                    if let Some(idx) = found {
                        picks[s] = Some(idx);
                    } else {
                        all_found = false;
                    }
                }
                if !all_found {
                    break;
                }

                let mut tuple_points = Vec::with_capacity(sides);
                for s in 0..sides {
                    let idx = picks[s].unwrap();
                    tuple_points.push(state.buffers[s].remove(idx).unwrap());
                }
                out.push(self.emit(&tuple_points));
            }
        }
        out
    }

    /// Apply the advance rule (spec §4.4): a side's earliest buffered point
    /// is flushed once `min(max-seen-on-every-other-side, barrier-time)`
    /// exceeds `point.time + tolerance`, i.e. no later-arriving data could
    /// still complete the match.
    fn flush_unmatchable(&mut self) -> Vec<Message> {
        let tolerance = self.spec.tolerance;
        let sides = self.sides();
        let barrier_time = self.barrier_time;
        let mut out = Vec::new();

        let group_ids: Vec<GroupId> = self.groups.keys().copied().collect();
        for gid in group_ids {
            let state = self.groups.get_mut(&gid).unwrap();
            for s in 0..sides {
                while let Some(p) = state.buffers[s].front() {
                    let bound = (0..sides)
                        .filter(|&other| other != s)
                        .map(|other| state.max_seen[other])
                        .min()
                        .unwrap_or(i64::MIN)
                        .max(barrier_time);
                    if bound <= p.time + tolerance {
                        break;
                    }
                    if matches!(self.spec.fill, FillPolicy::None) {
                        state.buffers[s].pop_front();
                        continue;
                    }
                    let p = state.buffers[s].pop_front().unwrap();
                    let mut tuple_points: Vec<Option<Point>> = vec![None; sides];
                    tuple_points[s] = Some(p);
                    out.push(self.emit_with_fill(s, tuple_points, &state.known_fields));
                }
            }
        }
        out
    }

    fn emit(&self, tuple_points: &[Point]) -> Message {
        let time = tuple_points.iter().map(|p| p.time).min().unwrap();
        let name = self
            .spec
            .stream_name
            .clone()
            .unwrap_or_else(|| tuple_points[0].measurement.clone());
        let mut fields = std::collections::HashMap::new();
        let mut tags = Tags::new();
        for p in tuple_points {
            for (k, v) in p.tags.iter() {
                tags.insert(k.clone(), v.clone());
            }
        }
        for (alias, p) in self.spec.aliases.iter().zip(tuple_points.iter()) {
            for (field_name, value) in &p.fields {
                fields.insert(format!("{alias}{}{field_name}", self.spec.delimiter), value.clone());
            }
        }
        Message::Point(Point {
            measurement: name,
            tags: tags.clone(),
            fields,
            time,
            group_id: tuple_points[0].group_id,
        })
    }

    fn emit_with_fill(
        &self,
        present_side: usize,
        tuple_points: Vec<Option<Point>>,
        known_fields: &[HashSet<String>],
    ) -> Message {
        let present = tuple_points[present_side].as_ref().unwrap();
        let time = present.time;
        let name = self.spec.stream_name.clone().unwrap_or_else(|| present.measurement.clone());
        let mut fields = std::collections::HashMap::new();
        let tags = present.tags.clone();
        let alias = &self.spec.aliases[present_side];
        for (field_name, value) in &present.fields {
            fields.insert(format!("{alias}{}{field_name}", self.spec.delimiter), value.clone());
        }
        if let FillPolicy::Value(v) = self.spec.fill {
            for (s, names) in known_fields.iter().enumerate() {
                if s == present_side {
                    continue;
                }
                let other_alias = &self.spec.aliases[s];
                for field_name in names {
                    fields.insert(
                        format!("{other_alias}{}{field_name}", self.spec.delimiter),
                        flow_core::Value::Float(v),
                    );
                }
            }
        }
        Message::Point(Point {
            measurement: name,
            tags,
            fields,
            time,
            group_id: present.group_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::Value;

    fn point(name: &str, time: i64, v: f64) -> Point {
        Point::new(name, time).with_field("value", v)
    }

    /// Spec §8 "Join tolerance": streams A/B ticking every second,
    /// tolerance(2s), no fill — one matched row per tick, no drops.
    #[test]
    fn matches_within_tolerance_no_fill() {
        let mut join = Join::new(JoinSpec::new(vec!["a".into(), "b".into()], 2_000_000_000));
        let mut out = Vec::new();
        for i in 0..5i64 {
            let t = i * 1_000_000_000;
            out.extend(join.push(0, Message::Point(point("a", t, i as f64))));
            out.extend(join.push(1, Message::Point(point("b", t, (i * 10) as f64))));
        }
        assert!(!out.is_empty());
        for msg in &out {
            let Message::Point(p) = msg else { panic!() };
            assert!(p.field("a.value").is_some());
            assert!(p.field("b.value").is_some());
        }
    }

    #[test]
    fn fill_null_emits_with_missing_side_absent() {
        let mut join = Join::new(JoinSpec {
            fill: FillPolicy::Null,
            ..JoinSpec::new(vec!["a".into(), "b".into()], 1_000_000_000)
        });
        let mut out = Vec::new();
        out.extend(join.push(0, Message::Point(point("a", 0, 1.0))));
        // B never arrives; a barrier far in the future proves it never
        // will within tolerance, so A's point must flush with fill.
        out.extend(join.push(1, Message::Barrier(flow_core::Barrier { time: 100_000_000_000 })));
        assert_eq!(out.len(), 1);
        let Message::Point(p) = &out[0] else { panic!() };
        assert_eq!(p.field("a.value").and_then(Value::as_f64), Some(1.0));
        assert!(p.field("b.value").is_none());
    }

    #[test]
    fn no_fill_drops_unmatched() {
        let mut join = Join::new(JoinSpec::new(vec!["a".into(), "b".into()], 1_000_000_000));
        let mut out = Vec::new();
        out.extend(join.push(0, Message::Point(point("a", 0, 1.0))));
        out.extend(join.push(1, Message::Barrier(flow_core::Barrier { time: 100_000_000_000 })));
        assert!(out.is_empty());
    }
}
