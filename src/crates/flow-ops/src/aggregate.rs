//! InfluxQL-equivalent reducers, selectors, and top/bottom-k (spec §4.6).
//! Operate on a batch edge, emit a stream edge (one point per reduction).

use std::collections::HashSet;

use flow_core::{Batch, Message, Point, Value};

use crate::operator::Operator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Sum,
    Count,
    Distinct,
    Mean,
    Median,
    Mode,
    Spread,
    Stddev,
    First,
    Last,
    Min,
    Max,
}

pub struct Percentile {
    pub field: String,
    pub p: f64,
    pub use_point_times: bool,
}

impl Percentile {
    fn output(&self, b: &Batch) -> Option<Point> {
        let mut values: Vec<(f64, &Point)> = b
            .points
            .iter()
            .filter_map(|p| p.field(&self.field).and_then(Value::as_f64).map(|v| (v, p)))
            .collect();
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        let idx = (((self.p / 100.0) * values.len() as f64).ceil() as usize)
            .saturating_sub(1)
            .min(values.len() - 1);
        let (v, src) = values[idx];
        let time = if self.use_point_times { src.time } else { b.tmax };
        Some(single_field_point(b, time, &self.field, Value::Float(v)))
    }
}

fn single_field_point(b: &Batch, time: i64, field: &str, value: Value) -> Point {
    Point {
        measurement: b.name.clone(),
        tags: b.tags.clone(),
        fields: std::collections::HashMap::from([(field.to_string(), value)]),
        time,
        group_id: b.group_id,
    }
}

/// A reducer or selector applied to one named field.
pub struct Aggregate {
    pub field: String,
    pub reducer: Reducer,
    pub use_point_times: bool,
}

impl Aggregate {
    pub fn new(field: impl Into<String>, reducer: Reducer) -> Self {
        Self {
            field: field.into(),
            reducer,
            use_point_times: false,
        }
    }

    pub fn use_point_times(mut self) -> Self {
        self.use_point_times = true;
        self
    }

    fn values(&self, b: &Batch) -> Vec<(f64, &Point)> {
        b.points
            .iter()
            .filter_map(|p| p.field(&self.field).and_then(Value::as_f64).map(|v| (v, p)))
            .collect()
    }

    fn reduce(&self, b: &Batch) -> Option<Point> {
        // count/sum are defined on an empty batch (spec §4.6 "Empty-batch
        // behaviour"); every other reducer/selector emits no row.
        match self.reducer {
            Reducer::Count => {
                let n = b.points.iter().filter(|p| p.field(&self.field).is_some()).count();
                return Some(single_field_point(b, b.tmax, &self.field, Value::Int(n as i64)));
            }
            Reducer::Sum => {
                let values = self.values(b);
                let sum: f64 = values.iter().map(|(v, _)| v).sum();
                return Some(single_field_point(b, b.tmax, &self.field, Value::Float(sum)));
            }
            _ => {}
        }

        let values = self.values(b);
        if values.is_empty() {
            return None;
        }

        match self.reducer {
            Reducer::Distinct => {
                let mut seen = HashSet::new();
                let mut count = 0;
                for (v, _) in &values {
                    if seen.insert(v.to_bits()) {
                        count += 1;
                    }
                }
                Some(single_field_point(b, b.tmax, &self.field, Value::Int(count)))
            }
            Reducer::Mean => {
                let mean = values.iter().map(|(v, _)| v).sum::<f64>() / values.len() as f64;
                Some(single_field_point(b, b.tmax, &self.field, Value::Float(mean)))
            }
            Reducer::Median => {
                let mut nums: Vec<f64> = values.iter().map(|(v, _)| *v).collect();
                nums.sort_by(|a, b| a.partial_cmp(b).unwrap());
                let mid = nums.len() / 2;
                let median = if nums.len() % 2 == 0 {
                    (nums[mid - 1] + nums[mid]) / 2.0
                } else {
                    nums[mid]
                };
                Some(single_field_point(b, b.tmax, &self.field, Value::Float(median)))
            }
            Reducer::Mode => {
                let mut counts: std::collections::HashMap<u64, (f64, usize)> = std::collections::HashMap::new();
                for (v, _) in &values {
                    let e = counts.entry(v.to_bits()).or_insert((*v, 0));
                    e.1 += 1;
                }
                let mode = counts.values().max_by_key(|(_, c)| *c).map(|(v, _)| *v).unwrap();
                Some(single_field_point(b, b.tmax, &self.field, Value::Float(mode)))
            }
            Reducer::Spread => {
                let min = values.iter().map(|(v, _)| *v).fold(f64::INFINITY, f64::min);
                let max = values.iter().map(|(v, _)| *v).fold(f64::NEG_INFINITY, f64::max);
                Some(single_field_point(b, b.tmax, &self.field, Value::Float(max - min)))
            }
            Reducer::Stddev => {
                let mean = values.iter().map(|(v, _)| v).sum::<f64>() / values.len() as f64;
                let variance = values.iter().map(|(v, _)| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
                Some(single_field_point(b, b.tmax, &self.field, Value::Float(variance.sqrt())))
            }
            Reducer::First => {
                let (v, src) = values.iter().min_by_key(|(_, p)| p.time).unwrap();
                let time = if self.use_point_times { src.time } else { b.tmax };
                Some(single_field_point(b, time, &self.field, Value::Float(*v)))
            }
            Reducer::Last => {
                let (v, src) = values.iter().max_by_key(|(_, p)| p.time).unwrap();
                let time = if self.use_point_times { src.time } else { b.tmax };
                Some(single_field_point(b, time, &self.field, Value::Float(*v)))
            }
            Reducer::Min => {
                let (v, src) = values.iter().min_by(|(a, _), (c, _)| a.partial_cmp(c).unwrap()).unwrap();
                let time = if self.use_point_times { src.time } else { b.tmax };
                Some(single_field_point(b, time, &self.field, Value::Float(*v)))
            }
            Reducer::Max => {
                let (v, src) = values.iter().max_by(|(a, _), (c, _)| a.partial_cmp(c).unwrap()).unwrap();
                let time = if self.use_point_times { src.time } else { b.tmax };
                Some(single_field_point(b, time, &self.field, Value::Float(*v)))
            }
            Reducer::Count | Reducer::Sum => unreachable!("handled above"),
        }
    }
}

impl Operator for Aggregate {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        match msg {
            Message::Batch(b) => self.reduce(&b).into_iter().map(Message::Point).collect(),
            other => vec![other],
        }
    }
}

impl Operator for Percentile {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        match msg {
            Message::Batch(b) => self.output(&b).into_iter().map(Message::Point).collect(),
            other => vec![other],
        }
    }
}

/// `top(k, field[, tag...])` / `bottom(k, field[, tag...])`.
pub struct TopK {
    pub k: usize,
    pub field: String,
    pub carry_tags: Vec<String>,
    pub bottom: bool,
}

impl Operator for TopK {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Batch(b) = msg else { return vec![msg] };
        // Stable sort on insertion order preserves earlier-arrival as the
        // tie-break (spec §8 "Top-K": "ties broken by earlier insertion
        // order").
        let mut ranked: Vec<&Point> = b
            .points
            .iter()
            .filter(|p| p.field(&self.field).and_then(Value::as_f64).is_some())
            .collect();
        ranked.sort_by(|a, c| {
            let av = a.field(&self.field).and_then(Value::as_f64).unwrap();
            let cv = c.field(&self.field).and_then(Value::as_f64).unwrap();
            if self.bottom {
                av.partial_cmp(&cv).unwrap()
            } else {
                cv.partial_cmp(&av).unwrap()
            }
        });
        ranked
            .into_iter()
            .take(self.k)
            .map(|p| {
                let mut fields = std::collections::HashMap::new();
                fields.insert(self.field.clone(), p.field(&self.field).cloned().unwrap());
                for tag in &self.carry_tags {
                    if let Some(v) = p.tag(tag) {
                        fields.insert(tag.clone(), Value::Str(v.to_string()));
                    }
                }
                Message::Point(Point {
                    measurement: b.name.clone(),
                    tags: p.tags.clone(),
                    fields,
                    time: b.tmax,
                    group_id: b.group_id,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::Tags;

    fn batch_with_values(values: &[f64]) -> Batch {
        let mut b = Batch::new("cpu", Tags::new(), 100);
        for (i, v) in values.iter().enumerate() {
            b.points.push(Point::new("cpu", i as i64).with_field("value", *v));
        }
        b
    }

    #[test]
    fn count_and_sum_defined_on_empty_batch() {
        let empty = Batch::new("cpu", Tags::new(), 100);
        let mut count = Aggregate::new("value", Reducer::Count);
        let out = count.process(Message::Batch(empty.clone()));
        let Message::Point(p) = &out[0] else { panic!() };
        assert_eq!(p.field("value").and_then(Value::as_i64), Some(0));

        let mut sum = Aggregate::new("value", Reducer::Sum);
        let out = sum.process(Message::Batch(empty));
        let Message::Point(p) = &out[0] else { panic!() };
        assert_eq!(p.field("value").and_then(Value::as_f64), Some(0.0));
    }

    #[test]
    fn min_max_emit_no_row_on_empty_batch() {
        let empty = Batch::new("cpu", Tags::new(), 100);
        let mut min = Aggregate::new("value", Reducer::Min);
        assert!(min.process(Message::Batch(empty)).is_empty());
    }

    #[test]
    fn mean_of_values() {
        let mut mean = Aggregate::new("value", Reducer::Mean);
        let out = mean.process(Message::Batch(batch_with_values(&[1.0, 2.0, 3.0])));
        let Message::Point(p) = &out[0] else { panic!() };
        assert_eq!(p.field("value").and_then(Value::as_f64), Some(2.0));
    }

    /// Spec §8 "Top-K": 20 players per game, top(5) → 5 rows sorted
    /// descending, ties broken by earlier insertion order.
    #[test]
    fn top_k_sorted_descending_with_stable_ties() {
        let mut b = Batch::new("scores", Tags::new(), 100);
        for i in 0..20i64 {
            b.points.push(
                Point::new("scores", i)
                    .with_tags(Tags::from_pairs([("player", format!("p{i}"))]))
                    .with_field("value", if i < 3 { 100.0 } else { i as f64 }),
            );
        }
        let mut topk = TopK {
            k: 5,
            field: "value".into(),
            carry_tags: vec!["player".into()],
            bottom: false,
        };
        let out = topk.process(Message::Batch(b));
        assert_eq!(out.len(), 5);
        let Message::Point(first) = &out[0] else { panic!() };
        assert_eq!(first.field("player"), Some(&Value::Str("p0".to_string())));
    }
}
