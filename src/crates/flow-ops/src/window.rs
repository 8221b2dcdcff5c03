//! Time-driven and count-driven windowing (spec §4.3).
//!
//! Turns a stream edge into a batch edge: each group keeps a ring of recent
//! points and emits a `Batch` snapshot of that ring on every `every`
//! boundary (or every point, when `every == 0`).

use std::collections::{HashMap, VecDeque};

use flow_core::{Batch, GroupId, Message, Point};

use crate::operator::Operator;

#[derive(Debug, Clone)]
pub struct WindowSpec {
    /// Nanoseconds of history retained per group. `None` for count-driven.
    pub period: Option<i64>,
    /// Nanoseconds between emits. `Some(0)` means emit on every point.
    pub every: Option<i64>,
    /// Snap emit boundaries to multiples of `every`.
    pub align: bool,
    /// Suppress emits until the window has accumulated `period` of data.
    pub fill_period: bool,
    /// Ring size, for count-driven windows.
    pub period_count: Option<usize>,
    /// Emit stride, for count-driven windows.
    pub every_count: Option<usize>,
}

impl WindowSpec {
    pub fn time_driven(period: i64, every: i64) -> Self {
        Self {
            period: Some(period),
            every: Some(every),
            align: false,
            fill_period: false,
            period_count: None,
            every_count: None,
        }
    }

    pub fn count_driven(period_count: usize, every_count: usize) -> Self {
        Self {
            period: None,
            every: None,
            align: false,
            fill_period: false,
            period_count: Some(period_count),
            every_count: Some(every_count),
        }
    }

    pub fn aligned(mut self) -> Self {
        self.align = true;
        self
    }

    pub fn fill_period(mut self) -> Self {
        self.fill_period = true;
        self
    }
}

#[derive(Default)]
struct GroupState {
    ring: VecDeque<Point>,
    start_time: Option<i64>,
    next_emit: Option<i64>,
    since_last_emit: usize,
}

pub struct Window {
    spec: WindowSpec,
    groups: HashMap<GroupId, GroupState>,
}

impl Window {
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            groups: HashMap::new(),
        }
    }

    fn emit(&self, name: &str, state: &GroupState, tmax: i64) -> Message {
        let tags = state
            .ring
            .back()
            .map(|p| p.tags.clone())
            .unwrap_or_default();
        let mut batch = Batch::new(name, tags, tmax);
        batch.points = state.ring.iter().cloned().collect();
        Message::Batch(batch)
    }

    fn push_time_driven(&mut self, p: Point) -> Vec<Message> {
        let period = self.spec.period.expect("time-driven window requires period");
        let every = self.spec.every.expect("time-driven window requires every");
        let group_id = p.group_id;
        let name = p.measurement.clone();
        let time = p.time;

        let state = self.groups.entry(group_id).or_default();
        state.ring.push_back(p);
        if period > 0 {
            while let Some(front) = state.ring.front() {
                if front.time <= time - period {
                    state.ring.pop_front();
                } else {
                    break;
                }
            }
        }
        if state.start_time.is_none() {
            state.start_time = Some(time);
        }
        let window_has_enough_history =
            !self.spec.fill_period || time - state.start_time.unwrap() >= period;

        let mut out = Vec::new();
        if every == 0 {
            if window_has_enough_history {
                out.push(self.emit(&name, state, time));
            }
            return out;
        }

        if state.next_emit.is_none() {
            state.next_emit = Some(if self.spec.align {
                (time / every) * every
            } else {
                time
            });
        }
        while state.next_emit.map(|b| time >= b).unwrap_or(false) {
            let boundary = state.next_emit.unwrap();
            if window_has_enough_history {
                out.push(self.emit(&name, state, boundary.max(time)));
            }
            state.next_emit = Some(boundary + every);
        }
        out
    }

    fn push_count_driven(&mut self, p: Point) -> Vec<Message> {
        let period_count = self.spec.period_count.expect("count-driven window requires period_count");
        let every_count = self.spec.every_count.expect("count-driven window requires every_count");
        let group_id = p.group_id;
        let name = p.measurement.clone();
        let time = p.time;

        let state = self.groups.entry(group_id).or_default();
        state.ring.push_back(p);
        while state.ring.len() > period_count {
            state.ring.pop_front();
        }
        state.since_last_emit += 1;

        let mut out = Vec::new();
        let stride = every_count.max(1);
        if state.since_last_emit >= stride {
            state.since_last_emit = 0;
            out.push(self.emit(&name, state, time));
        }
        out
    }
}

impl Operator for Window {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        match msg {
            Message::Point(p) => {
                if self.spec.period_count.is_some() {
                    self.push_count_driven(p)
                } else {
                    self.push_time_driven(p)
                }
            }
            // Barriers don't carry data for a window to ring-buffer, but
            // still need forwarding so downstream joins can advance.
            other @ Message::Barrier(_) => vec![other],
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::Tags;

    fn point_with_value(t: i64, v: f64) -> Point {
        Point::new("cpu", t)
            .with_tags(Tags::from_pairs([("host", "serverA")]))
            .with_field("value", v)
    }

    /// Spec §8 "Window / every-0": period(10s).every(0s).fillPeriod(false) on
    /// one point per second; count emitted after the i-th point equals
    /// min(i+1, 10).
    #[test]
    fn every_zero_ring_count_matches_formula() {
        let period = 10_000_000_000i64;
        let mut window = Window::new(WindowSpec::time_driven(period, 0));
        for i in 0..15i64 {
            let t = i * 1_000_000_000;
            let out = window.process(Message::Point(point_with_value(t, i as f64)));
            assert_eq!(out.len(), 1, "every=0 must emit on every point");
            let Message::Batch(b) = &out[0] else { panic!("expected batch") };
            let expected = std::cmp::min(i + 1, 10) as usize;
            assert_eq!(b.len(), expected, "mismatch at i={i}");
        }
    }

    #[test]
    fn fill_period_suppresses_until_full_window() {
        let period = 5_000_000_000i64;
        let mut window = Window::new(WindowSpec::time_driven(period, 0).fill_period());
        for i in 0..4i64 {
            let t = i * 1_000_000_000;
            let out = window.process(Message::Point(point_with_value(t, i as f64)));
            assert!(out.is_empty(), "must be suppressed before period is covered, i={i}");
        }
        let out = window.process(Message::Point(point_with_value(5_000_000_000, 5.0)));
        assert_eq!(out.len(), 1, "must emit once period of data is seen");
    }

    #[test]
    fn count_driven_respects_stride() {
        let mut window = Window::new(WindowSpec::count_driven(3, 2));
        let mut emitted = 0;
        for i in 0..6i64 {
            let out = window.process(Message::Point(point_with_value(i, i as f64)));
            emitted += out.len();
        }
        assert_eq!(emitted, 3, "every_count=2 over 6 points emits 3 times");
    }

    #[test]
    fn every_nonzero_time_driven_emits_on_boundary_crossing() {
        let mut window = Window::new(WindowSpec::time_driven(4_000_000_000, 2_000_000_000));
        let mut total_emits = 0;
        for i in 0..6i64 {
            let t = i * 1_000_000_000;
            let out = window.process(Message::Point(point_with_value(t, i as f64)));
            total_emits += out.len();
        }
        assert!(total_emits >= 2, "should have crossed at least two 2s boundaries over 6s");
    }
}
