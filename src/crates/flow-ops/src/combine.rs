//! `combine` (spec §4.3): batch edge → stream edge. Enumerates all k-tuples
//! of points within a `tolerance` window where position `i` satisfies its
//! own predicate, and renames fields `<alias_i>.<field>`.

use flow_core::{Batch, Message, Point, Tags};

use crate::lambda::Expr;
use crate::operator::Operator;

pub struct CombinePosition {
    pub predicate: Expr,
    pub alias: String,
}

pub struct Combine {
    positions: Vec<CombinePosition>,
    tolerance: i64,
    delimiter: String,
}

impl Combine {
    pub fn new(positions: Vec<CombinePosition>, tolerance: i64) -> Self {
        Self {
            positions,
            tolerance,
            delimiter: ".".to_string(),
        }
    }

    pub fn delimiter(mut self, d: impl Into<String>) -> Self {
        self.delimiter = d.into();
        self
    }

    /// Candidates for each position: points satisfying that position's
    /// predicate, sorted by time for deterministic tuple enumeration.
    fn candidates_per_position(&self, points: &[Point]) -> Vec<Vec<&Point>> {
        self.positions
            .iter()
            .map(|pos| {
                let mut matched: Vec<&Point> = points
                    .iter()
                    .filter(|p| pos.predicate.eval(p).ok().and_then(|v| v.as_bool()).unwrap_or(false))
                    .collect();
                matched.sort_by_key(|p| p.time);
                matched
            })
            .collect()
    }

    fn combine_batch(&self, b: Batch) -> Vec<Point> {
        let per_position = self.candidates_per_position(&b.points);
        if per_position.iter().any(Vec::is_empty) {
            return Vec::new();
        }

        let mut out = Vec::new();
        enumerate_tuples(&per_position, &mut Vec::new(), &mut |tuple: &[&Point]| {
            let tmin = tuple.iter().map(|p| p.time).min().unwrap();
            let tmax = tuple.iter().map(|p| p.time).max().unwrap();
            if tmax - tmin > self.tolerance {
                return;
            }
            let mut fields = std::collections::HashMap::new();
            for (pos, p) in self.positions.iter().zip(tuple.iter()) {
                for (field_name, value) in &p.fields {
                    fields.insert(format!("{}{}{}", pos.alias, self.delimiter, field_name), value.clone());
                }
            }
            out.push(Point {
                measurement: b.name.clone(),
                tags: b.tags.clone(),
                fields,
                time: tmin,
                group_id: b.group_id,
            });
        });
        out
    }
}

/// Recursively enumerate the cartesian product of `candidates`, calling
/// `visit` once per full tuple. Tuple count is the product of each
/// position's candidate count; combine windows are small in practice so
/// this stays cheap.
fn enumerate_tuples<'a>(
    candidates: &[Vec<&'a Point>],
    current: &mut Vec<&'a Point>,
    visit: &mut dyn FnMut(&[&'a Point]),
) {
    if current.len() == candidates.len() {
        visit(current);
        return;
    }
    let idx = current.len();
    for p in &candidates[idx] {
        current.push(p);
        enumerate_tuples(candidates, current, visit);
        current.pop();
    }
}

impl Operator for Combine {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        match msg {
            Message::Batch(b) => self.combine_batch(b).into_iter().map(Message::Point).collect(),
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::Value;

    fn point(time: i64, v: f64) -> Point {
        Point::new("cpu", time).with_field("value", v)
    }

    #[test]
    fn combines_matching_tuples_within_tolerance() {
        let positions = vec![
            CombinePosition {
                predicate: Expr::Lt(Box::new(Expr::Field("value".into())), Box::new(Expr::Const(50.0.into()))),
                alias: "low".into(),
            },
            CombinePosition {
                predicate: Expr::Gte(Box::new(Expr::Field("value".into())), Box::new(Expr::Const(50.0.into()))),
                alias: "high".into(),
            },
        ];
        let mut combine = Combine::new(positions, 1);
        let mut b = Batch::new("cpu", Tags::new(), 10);
        b.points.push(point(0, 10.0));
        b.points.push(point(0, 90.0));
        let out = combine.process(Message::Batch(b));
        assert_eq!(out.len(), 1);
        let Message::Point(p) = &out[0] else { panic!() };
        assert_eq!(p.field("low.value").and_then(Value::as_f64), Some(10.0));
        assert_eq!(p.field("high.value").and_then(Value::as_f64), Some(90.0));
    }

    #[test]
    fn no_tuple_when_a_position_has_no_candidates() {
        let positions = vec![CombinePosition {
            predicate: Expr::Gt(Box::new(Expr::Field("value".into())), Box::new(Expr::Const(1000.0.into()))),
            alias: "x".into(),
        }];
        let mut combine = Combine::new(positions, 1);
        let mut b = Batch::new("cpu", Tags::new(), 10);
        b.points.push(point(0, 10.0));
        let out = combine.process(Message::Batch(b));
        assert!(out.is_empty());
    }
}
