//! Change operators (spec §4.6): stream edge → stream edge, each comparing
//! a point against state carried from the previous point in its group.

use std::collections::HashMap;

use flow_core::{GroupId, Message, Point, Value};

use crate::lambda::Expr;
use crate::operator::Operator;

/// `derivative(field).unit(d).nonNegative().as(name)`.
pub struct Derivative {
    pub field: String,
    pub as_name: String,
    pub unit: i64,
    pub non_negative: bool,
    prev: HashMap<GroupId, (i64, f64)>,
}

impl Derivative {
    pub fn new(field: impl Into<String>, unit: i64) -> Self {
        let field = field.into();
        Self {
            as_name: field.clone(),
            field,
            unit,
            non_negative: false,
            prev: HashMap::new(),
        }
    }

    pub fn non_negative(mut self) -> Self {
        self.non_negative = true;
        self
    }

    pub fn as_name(mut self, name: impl Into<String>) -> Self {
        self.as_name = name.into();
        self
    }
}

impl Operator for Derivative {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Point(p) = &msg else { return vec![msg] };
        let Some(v) = p.field(&self.field).and_then(Value::as_f64) else {
            return Vec::new();
        };
        let Some((prev_t, prev_v)) = self.prev.insert(p.group_id, (p.time, v)) else {
            return Vec::new();
        };
        let dt = (p.time - prev_t) as f64 / self.unit as f64;
        if dt == 0.0 {
            return Vec::new();
        }
        let rate = (v - prev_v) / dt;
        if self.non_negative && rate < 0.0 {
            return Vec::new();
        }
        vec![Message::Point(
            Point::new(p.measurement.clone(), p.time)
                .with_tags(p.tags.clone())
                .with_field(self.as_name.clone(), rate),
        )]
    }
}

/// `difference(field)`: raw value delta, no time normalization.
pub struct Difference {
    pub field: String,
    prev: HashMap<GroupId, f64>,
}

impl Difference {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            prev: HashMap::new(),
        }
    }
}

impl Operator for Difference {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Point(p) = &msg else { return vec![msg] };
        let Some(v) = p.field(&self.field).and_then(Value::as_f64) else {
            return Vec::new();
        };
        let Some(prev_v) = self.prev.insert(p.group_id, v) else {
            return Vec::new();
        };
        vec![Message::Point(
            Point::new(p.measurement.clone(), p.time)
                .with_tags(p.tags.clone())
                .with_field(self.field.clone(), v - prev_v),
        )]
    }
}

/// `elapsed(field, unit)`: time since the previous point in the group.
pub struct Elapsed {
    pub field: String,
    pub unit: i64,
    prev_time: HashMap<GroupId, i64>,
}

impl Elapsed {
    pub fn new(field: impl Into<String>, unit: i64) -> Self {
        Self {
            field: field.into(),
            unit,
            prev_time: HashMap::new(),
        }
    }
}

impl Operator for Elapsed {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Point(p) = &msg else { return vec![msg] };
        let Some(prev_t) = self.prev_time.insert(p.group_id, p.time) else {
            return Vec::new();
        };
        vec![Message::Point(
            Point::new(p.measurement.clone(), p.time)
                .with_tags(p.tags.clone())
                .with_field(self.field.clone(), (p.time - prev_t) / self.unit),
        )]
    }
}

/// `movingAverage(field, n)`: mean of the last `n` values.
pub struct MovingAverage {
    pub field: String,
    pub n: usize,
    ring: HashMap<GroupId, std::collections::VecDeque<f64>>,
}

impl MovingAverage {
    pub fn new(field: impl Into<String>, n: usize) -> Self {
        Self {
            field: field.into(),
            n,
            ring: HashMap::new(),
        }
    }
}

impl Operator for MovingAverage {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Point(p) = &msg else { return vec![msg] };
        let Some(v) = p.field(&self.field).and_then(Value::as_f64) else {
            return Vec::new();
        };
        let ring = self.ring.entry(p.group_id).or_default();
        ring.push_back(v);
        while ring.len() > self.n {
            ring.pop_front();
        }
        if ring.len() < self.n {
            return Vec::new();
        }
        let avg = ring.iter().sum::<f64>() / ring.len() as f64;
        vec![Message::Point(
            Point::new(p.measurement.clone(), p.time)
                .with_tags(p.tags.clone())
                .with_field(self.field.clone(), avg),
        )]
    }
}

/// `cumulativeSum(field)`: running total per group.
pub struct CumulativeSum {
    pub field: String,
    running: HashMap<GroupId, f64>,
}

impl CumulativeSum {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            running: HashMap::new(),
        }
    }
}

impl Operator for CumulativeSum {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Point(p) = &msg else { return vec![msg] };
        let Some(v) = p.field(&self.field).and_then(Value::as_f64) else {
            return Vec::new();
        };
        let total = self.running.entry(p.group_id).or_insert(0.0);
        *total += v;
        vec![Message::Point(
            Point::new(p.measurement.clone(), p.time)
                .with_tags(p.tags.clone())
                .with_field(self.field.clone(), *total),
        )]
    }
}

/// `changeDetect(field...)`: emit only when any listed field differs from
/// the previous point's value in the same group.
pub struct ChangeDetect {
    pub fields: Vec<String>,
    prev: HashMap<GroupId, HashMap<String, Value>>,
}

impl ChangeDetect {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            prev: HashMap::new(),
        }
    }
}

impl Operator for ChangeDetect {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Point(p) = &msg else { return vec![msg] };
        let prev = self.prev.entry(p.group_id).or_default();
        let changed = self.fields.iter().any(|f| {
            let new_val = p.field(f);
            let old_val = prev.get(f);
            new_val.map(Value::render) != old_val.map(Value::render)
        });
        for f in &self.fields {
            if let Some(v) = p.field(f) {
                prev.insert(f.clone(), v.clone());
            }
        }
        if changed {
            vec![msg]
        } else {
            Vec::new()
        }
    }
}

enum PredicateState {
    NotEntered,
    Entered { since: i64, count: i64 },
}

/// `stateDuration(lambda).unit(d).as(name)`: emits -1 while the predicate
/// is false, else the accumulated duration (in `unit`) since entry.
pub struct StateDuration {
    pub predicate: Expr,
    pub as_name: String,
    pub unit: i64,
    state: HashMap<GroupId, PredicateState>,
}

impl StateDuration {
    pub fn new(predicate: Expr, as_name: impl Into<String>, unit: i64) -> Self {
        Self {
            predicate,
            as_name: as_name.into(),
            unit,
            state: HashMap::new(),
        }
    }
}

impl Operator for StateDuration {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Point(p) = &msg else { return vec![msg] };
        let truthy = self.predicate.eval(p).ok().and_then(|v| v.as_bool()).unwrap_or(false);
        let entry = self.state.entry(p.group_id).or_insert(PredicateState::NotEntered);
        let value: f64 = if !truthy {
            *entry = PredicateState::NotEntered;
            -1.0
        } else {
            match entry {
                PredicateState::Entered { since, .. } => (p.time - *since) as f64 / self.unit as f64,
                PredicateState::NotEntered => {
                    *entry = PredicateState::Entered { since: p.time, count: 0 };
                    0.0
                }
            }
        };
        vec![Message::Point(
            Point::new(p.measurement.clone(), p.time)
                .with_tags(p.tags.clone())
                .with_field(self.as_name.clone(), value),
        )]
    }
}

/// `stateCount(lambda).as(name)`: emits -1 while false, else the count of
/// consecutive points (including this one) the predicate has held true.
pub struct StateCount {
    pub predicate: Expr,
    pub as_name: String,
    state: HashMap<GroupId, i64>,
}

impl StateCount {
    pub fn new(predicate: Expr, as_name: impl Into<String>) -> Self {
        Self {
            predicate,
            as_name: as_name.into(),
            state: HashMap::new(),
        }
    }
}

impl Operator for StateCount {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Point(p) = &msg else { return vec![msg] };
        let truthy = self.predicate.eval(p).ok().and_then(|v| v.as_bool()).unwrap_or(false);
        let value = if !truthy {
            self.state.insert(p.group_id, 0);
            -1
        } else {
            let count = self.state.entry(p.group_id).or_insert(0);
            *count += 1;
            *count
        };
        vec![Message::Point(
            Point::new(p.measurement.clone(), p.time)
                .with_tags(p.tags.clone())
                .with_field(self.as_name.clone(), value),
        )]
    }
}

/// `holtWinters(field, h, season, interval)`: forecasts `h` future points
/// using triple exponential smoothing fit over the batch's history.
pub struct HoltWinters {
    pub field: String,
    pub h: usize,
    pub season: usize,
    pub interval: i64,
    pub with_fit: bool,
}

impl HoltWinters {
    fn forecast(&self, history: &[f64]) -> Vec<f64> {
        if history.is_empty() {
            return Vec::new();
        }
        let alpha = 0.2;
        let beta = 0.1;
        let gamma = if self.season > 1 { 0.1 } else { 0.0 };

        let mut level = history[0];
        let mut trend = if history.len() > 1 { history[1] - history[0] } else { 0.0 };
        let mut seasonals = vec![0.0; self.season.max(1)];
        let mut fitted = Vec::with_capacity(history.len());

        for (i, &y) in history.iter().enumerate() {
            let season_idx = if self.season > 0 { i % self.season } else { 0 };
            let prev_level = level;
            let seasonal = seasonals[season_idx];
            level = alpha * (y - seasonal) + (1.0 - alpha) * (prev_level + trend);
            trend = beta * (level - prev_level) + (1.0 - beta) * trend;
            if self.season > 1 {
                seasonals[season_idx] = gamma * (y - level) + (1.0 - gamma) * seasonal;
            }
            fitted.push(prev_level + trend);
        }

        let mut out = if self.with_fit { fitted } else { Vec::new() };
        for step in 1..=self.h {
            let season_idx = if self.season > 0 { (history.len() + step - 1) % self.season } else { 0 };
            out.push(level + step as f64 * trend + seasonals[season_idx]);
        }
        out
    }
}

impl Operator for HoltWinters {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Batch(b) = msg else { return vec![msg] };
        let history: Vec<f64> = b.points.iter().filter_map(|p| p.field(&self.field).and_then(Value::as_f64)).collect();
        let values = self.forecast(&history);
        let step = self.interval;
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                Message::Point(
                    Point::new(b.name.clone(), b.tmax + (i as i64 + 1) * step)
                        .with_tags(b.tags.clone())
                        .with_field(self.field.clone(), v),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(t: i64, v: f64) -> Point {
        Point::new("packets", t).with_field("value", v)
    }

    /// Spec §8 "Derivative & nonNegative": values [1000, 1000.5, 1001,
    /// 500.5, 501] at 2s cadence. With `unit` set to the sampling cadence
    /// itself, the per-unit rate is the raw point-to-point delta; the sign
    /// of the third delta (a large drop) is what `.nonNegative()` drops.
    #[test]
    fn derivative_rate_per_cadence_unit_is_raw_delta() {
        let values = [1000.0, 1000.5, 1001.0, 500.5, 501.0];
        let mut deriv = Derivative::new("value", 2_000_000_000);
        let mut rates = Vec::new();
        for (i, v) in values.iter().enumerate() {
            let t = i as i64 * 2_000_000_000;
            for msg in deriv.process(Message::Point(point(t, *v))) {
                let Message::Point(p) = msg else { panic!() };
                rates.push(p.field("value").and_then(Value::as_f64).unwrap());
            }
        }
        assert_eq!(rates, vec![0.5, 0.5, -500.5, 0.5]);
    }

    #[test]
    fn derivative_non_negative_drops_negative_rows() {
        let values = [1000.0, 1000.5, 1001.0, 500.5, 501.0];
        let mut deriv = Derivative::new("value", 2_000_000_000).non_negative();
        let mut rates = Vec::new();
        for (i, v) in values.iter().enumerate() {
            let t = i as i64 * 2_000_000_000;
            for msg in deriv.process(Message::Point(point(t, *v))) {
                let Message::Point(p) = msg else { panic!() };
                rates.push(p.field("value").and_then(Value::as_f64).unwrap());
            }
        }
        assert_eq!(rates, vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn state_duration_resets_on_false() {
        let mut op = StateDuration::new(
            Expr::Gt(Box::new(Expr::Field("value".into())), Box::new(Expr::Const(90.0.into()))),
            "crit_duration",
            1_000_000_000,
        );
        let mut out = Vec::new();
        for (t, v) in [(0, 95.0), (1_000_000_000, 96.0), (2_000_000_000, 10.0)] {
            for msg in op.process(Message::Point(point(t, v))) {
                let Message::Point(p) = msg else { panic!() };
                out.push(p.field("crit_duration").and_then(Value::as_f64).unwrap());
            }
        }
        assert_eq!(out, vec![0.0, 1.0, -1.0]);
    }

    #[test]
    fn change_detect_only_emits_on_difference() {
        let mut op = ChangeDetect::new(vec!["value".into()]);
        let mut emitted = 0;
        for v in [1.0, 1.0, 2.0, 2.0, 3.0] {
            emitted += op.process(Message::Point(point(0, v))).len();
        }
        assert_eq!(emitted, 3);
    }
}
