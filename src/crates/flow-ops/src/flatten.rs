//! `flatten` (spec §4.3): batch edge → stream edge. Within a batch, collects
//! points whose timestamps fall within `tolerance`, keyed by the value of
//! the `on(...)` tags, and emits one point per cluster with fields renamed
//! `<on-value>.<field>`.

use std::collections::BTreeMap;

use flow_core::{Batch, Message, Point, Tags, Value};

use crate::operator::Operator;

pub struct Flatten {
    on: Vec<String>,
    tolerance: i64,
}

impl Flatten {
    pub fn new(on: Vec<String>, tolerance: i64) -> Self {
        Self { on, tolerance }
    }

    fn on_value(&self, p: &Point) -> String {
        self.on
            .iter()
            .map(|k| p.tag(k).unwrap_or("").to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    fn flatten_batch(&self, b: Batch) -> Vec<Point> {
        let mut sorted = b.points;
        sorted.sort_by_key(|p| p.time);

        let mut clusters: Vec<Vec<Point>> = Vec::new();
        for p in sorted {
            if let Some(last) = clusters.last_mut() {
                let cluster_time = last[0].time;
                if (p.time - cluster_time).abs() <= self.tolerance {
                    last.push(p);
                    continue;
                }
            }
            clusters.push(vec![p]);
        }

        let mut out = Vec::new();
        for cluster in clusters {
            let time = cluster.iter().map(|p| p.time).min().unwrap_or(b.tmax);
            let mut fields = std::collections::HashMap::new();
            let mut tags = Tags::new();
            for (k, v) in b.tags.iter() {
                tags.insert(k.clone(), v.clone());
            }
            // Two points in the same cluster can share an on-value (e.g. the
            // same tag value appearing twice within `tolerance`); disambiguate
            // with a running index per on-value so neither point's fields
            // are silently overwritten by the other's.
            let mut seen_on_values: BTreeMap<String, usize> = BTreeMap::new();
            for p in &cluster {
                let on_value = self.on_value(p);
                *seen_on_values.entry(on_value).or_insert(0) += 1;
            }
            let mut emitted_so_far: BTreeMap<String, usize> = BTreeMap::new();
            for p in &cluster {
                let on_value = self.on_value(p);
                let prefix = if seen_on_values[&on_value] > 1 {
                    let idx = emitted_so_far.entry(on_value.clone()).or_insert(0);
                    let label = format!("{on_value}.{idx}");
                    *idx += 1;
                    label
                } else {
                    on_value
                };
                for (field_name, value) in &p.fields {
                    fields.insert(format!("{prefix}.{field_name}"), value.clone());
                }
            }
            if fields.is_empty() {
                continue;
            }
            out.push(Point {
                measurement: b.name.clone(),
                tags,
                fields,
                time,
                group_id: b.group_id,
            });
        }
        out
    }
}

impl Operator for Flatten {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        match msg {
            Message::Batch(b) => self.flatten_batch(b).into_iter().map(Message::Point).collect(),
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(time: i64, on_tag: &str, field: f64) -> Point {
        Point::new("errors", time)
            .with_tags(Tags::from_pairs([("service", on_tag)]))
            .with_field("value", field)
    }

    #[test]
    fn clusters_within_tolerance_merge_into_one_point() {
        let mut f = Flatten::new(vec!["service".into()], 1);
        let mut b = Batch::new("errors", Tags::new(), 10);
        b.points.push(point(0, "a", 1.0));
        b.points.push(point(1, "b", 2.0));
        let out = f.process(Message::Batch(b));
        assert_eq!(out.len(), 1);
        let Message::Point(p) = &out[0] else { panic!() };
        assert_eq!(p.field("a.value").and_then(Value::as_f64), Some(1.0));
        assert_eq!(p.field("b.value").and_then(Value::as_f64), Some(2.0));
    }

    #[test]
    fn points_outside_tolerance_form_separate_clusters() {
        let mut f = Flatten::new(vec!["service".into()], 1);
        let mut b = Batch::new("errors", Tags::new(), 10);
        b.points.push(point(0, "a", 1.0));
        b.points.push(point(5, "b", 2.0));
        let out = f.process(Message::Batch(b));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn duplicate_on_values_within_a_cluster_are_disambiguated_not_overwritten() {
        let mut f = Flatten::new(vec!["service".into()], 1);
        let mut b = Batch::new("errors", Tags::new(), 10);
        b.points.push(point(0, "a", 1.0));
        b.points.push(point(1, "a", 2.0));
        let out = f.process(Message::Batch(b));
        assert_eq!(out.len(), 1);
        let Message::Point(p) = &out[0] else { panic!() };
        assert_eq!(p.field("a.0.value").and_then(Value::as_f64), Some(1.0));
        assert_eq!(p.field("a.1.value").and_then(Value::as_f64), Some(2.0));
    }
}
