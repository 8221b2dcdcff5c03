//! Deadman / no-data detection.
//!
//! Not named in spec.md's alert section, but present in the original
//! implementation this system was distilled from and folded back in under
//! SPEC_FULL.md: a task whose source has gone quiet (no points for
//! `interval`) should still be able to raise an alert, since the normal
//! alert node only evaluates on arriving points and would otherwise never
//! notice silence.

use flow_core::Point;

use crate::data::AlertData;
use crate::level::Level;

pub struct Deadman {
    pub task_name: String,
    pub interval: i64,
    pub threshold: f64,
    last_seen: i64,
    last_count: u64,
    fired: bool,
}

impl Deadman {
    pub fn new(task_name: impl Into<String>, interval: i64, threshold: f64) -> Self {
        Self {
            task_name: task_name.into(),
            interval,
            threshold,
            last_seen: 0,
            last_count: 0,
            fired: false,
        }
    }

    /// Call on every arriving point to reset the silence clock.
    pub fn observe(&mut self, p: &Point) {
        self.last_seen = p.time;
        self.last_count += 1;
        self.fired = false;
    }

    /// Call on a periodic tick (driven by the task's clock). `now` is the
    /// current logical time; `count_since_last_check` is how many points
    /// arrived in the most recent `interval`. Below `threshold` points per
    /// interval counts as "no data".
    pub fn check(&mut self, now: i64, count_since_last_check: u64) -> Option<AlertData> {
        if self.fired {
            return None;
        }
        let elapsed_without_data = now - self.last_seen >= self.interval;
        let below_threshold = (count_since_last_check as f64) < self.threshold;
        if !elapsed_without_data || !below_threshold {
            return None;
        }
        self.fired = true;
        Some(AlertData {
            id: format!("{}-deadman", self.task_name),
            message: format!("{} has no data", self.task_name),
            details: String::new(),
            time: now,
            duration_since_entry: now - self.last_seen,
            level: Level::Critical,
            previous_level: Level::Ok,
            recoverable: false,
            task_name: self.task_name.clone(),
            tags: flow_core::Tags::new(),
            fields: std::collections::HashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_silence() {
        let mut dm = Deadman::new("cpu-task", 5_000_000_000, 1.0);
        dm.observe(&Point::new("cpu", 0));
        assert!(dm.check(4_000_000_000, 0).is_none(), "within interval, no alert yet");
        assert!(dm.check(6_000_000_000, 0).is_some(), "past interval with no data fires");
        assert!(dm.check(7_000_000_000, 0).is_none(), "does not re-fire until new data resets it");
    }

    #[test]
    fn resets_on_new_data() {
        let mut dm = Deadman::new("cpu-task", 5_000_000_000, 1.0);
        dm.observe(&Point::new("cpu", 0));
        dm.check(6_000_000_000, 0);
        dm.observe(&Point::new("cpu", 6_000_000_000));
        assert!(dm.check(7_000_000_000, 1).is_none());
    }
}
