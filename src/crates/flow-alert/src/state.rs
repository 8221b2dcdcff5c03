//! Per-`(topic, alert-id)` alert state (spec §3 "Alert state", §4.7
//! "Persistence"). Outlives individual task runs; loaded on task start,
//! updated on every evaluation.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::level::Level;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertState {
    pub level: Level,
    pub previous_level: Level,
    /// When the current level was entered.
    pub event_time: i64,
    /// Last time an emission was actually sent to handlers (used by
    /// `.stateChangesOnly(d)`'s reminder timer).
    pub last_emit_time: i64,
    /// Bounded ring of recent levels, most recent last.
    pub history: VecDeque<Level>,
    pub history_capacity: usize,
    /// Sticky flag: once flap frequency crosses `high`, stays suppressed
    /// until frequency drops below `low` (spec §4.7 "Flapping").
    pub flap_suppressed: bool,
}

impl AlertState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            level: Level::Ok,
            previous_level: Level::Ok,
            event_time: 0,
            last_emit_time: i64::MIN,
            history: VecDeque::with_capacity(history_capacity),
            history_capacity,
            flap_suppressed: false,
        }
    }

    pub fn push_history(&mut self, level: Level) {
        self.history.push_back(level);
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
    }

    /// Fraction of adjacent ring entries that differ (spec §4.7 "flap
    /// frequency = transitions / N").
    pub fn flap_frequency(&self) -> f64 {
        if self.history.len() < 2 {
            return 0.0;
        }
        let transitions = self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .filter(|(a, b)| a != b)
            .count();
        transitions as f64 / self.history.len() as f64
    }

    pub fn duration_since_entry(&self, now: i64) -> i64 {
        now - self.event_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flap_frequency_counts_adjacent_transitions() {
        let mut s = AlertState::new(21);
        for lvl in [Level::Ok, Level::Critical, Level::Ok, Level::Critical, Level::Ok] {
            s.push_history(lvl);
        }
        assert_eq!(s.flap_frequency(), 1.0);
    }

    #[test]
    fn history_is_capped_at_capacity() {
        let mut s = AlertState::new(3);
        for lvl in [Level::Ok, Level::Info, Level::Warning, Level::Critical] {
            s.push_history(lvl);
        }
        assert_eq!(s.history.len(), 3);
        assert_eq!(s.history.front(), Some(&Level::Info));
    }
}
