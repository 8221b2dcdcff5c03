//! The alert node's evaluation core (spec §4.7). Pure and synchronous like
//! the `flow-ops` operator kernels: handler dispatch and state persistence
//! are separate concerns layered on top by the caller.

use flow_core::Point;
use flow_ops::{render_template, Expr};

use crate::data::{template_vars, AlertData};
use crate::level::Level;
use crate::state::AlertState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateChangesOnly {
    Off,
    /// `.stateChangesOnly()`.
    On,
    /// `.stateChangesOnly(d)`: also remind every `d` nanoseconds while the
    /// same non-OK level persists.
    WithReminder(i64),
}

pub struct AlertSpec {
    pub task_name: String,
    pub info: Option<Expr>,
    pub warn: Option<Expr>,
    pub crit: Option<Expr>,
    pub info_reset: Option<Expr>,
    pub warn_reset: Option<Expr>,
    pub crit_reset: Option<Expr>,
    pub no_recoveries: bool,
    pub state_changes_only: StateChangesOnly,
    pub flapping: Option<(f64, f64)>,
    pub history_n: usize,
    pub id_template: String,
    pub message_template: String,
    pub details_template: String,
}

impl AlertSpec {
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            info: None,
            warn: None,
            crit: None,
            info_reset: None,
            warn_reset: None,
            crit_reset: None,
            no_recoveries: false,
            state_changes_only: StateChangesOnly::Off,
            flapping: None,
            history_n: 21,
            id_template: "{{.Name}}".to_string(),
            message_template: "{{.Name}} is {{.Level}}".to_string(),
            details_template: String::new(),
        }
    }

    fn reset_predicate_for(&self, level: Level) -> Option<&Expr> {
        match level {
            Level::Info => self.info_reset.as_ref(),
            Level::Warning => self.warn_reset.as_ref(),
            Level::Critical => self.crit_reset.as_ref(),
            Level::Ok => None,
        }
    }

    fn candidate_level(&self, p: &Point) -> Level {
        let truthy = |e: &Option<Expr>| e.as_ref().and_then(|e| e.eval(p).ok()).and_then(|v| v.as_bool()).unwrap_or(false);
        if truthy(&self.crit) {
            Level::Critical
        } else if truthy(&self.warn) {
            Level::Warning
        } else if truthy(&self.info) {
            Level::Info
        } else {
            Level::Ok
        }
    }
}

pub struct AlertNode {
    pub spec: AlertSpec,
    pub state: AlertState,
}

impl AlertNode {
    pub fn new(spec: AlertSpec) -> Self {
        let history_n = spec.history_n;
        Self {
            spec,
            state: AlertState::new(history_n),
        }
    }

    pub fn with_state(spec: AlertSpec, state: AlertState) -> Self {
        Self { spec, state }
    }

    /// Evaluate one point, returning `Some(AlertData)` if a handler
    /// dispatch should occur (all suppression modifiers already applied),
    /// `None` otherwise. State is always updated regardless of emission.
    pub fn evaluate(&mut self, p: &Point) -> Option<AlertData> {
        let now = p.time;
        let current = self.state.level;

        let new_level = match self.spec.reset_predicate_for(current) {
            Some(reset) => {
                let reset_fired = reset.eval(p).ok().and_then(|v| v.as_bool()).unwrap_or(false);
                if reset_fired {
                    self.spec.candidate_level(p)
                } else {
                    current
                }
            }
            None => self.spec.candidate_level(p),
        };

        let changed = new_level != current;
        if changed {
            // `event_time` marks the OK->non-OK entry, not every transition:
            // an escalation/de-escalation between two non-OK levels keeps
            // the original entry time, so a recovery's `duration_since_entry`
            // reports the whole non-OK span, not just the final level's.
            if current == Level::Ok {
                self.state.event_time = now;
            }
            self.state.previous_level = current;
            self.state.level = new_level;
        }
        self.state.push_history(new_level);

        if let Some((low, high)) = self.spec.flapping {
            let freq = self.state.flap_frequency();
            if freq > high {
                self.state.flap_suppressed = true;
            } else if freq < low {
                self.state.flap_suppressed = false;
            }
        }

        let should_emit = match self.spec.state_changes_only {
            StateChangesOnly::On => changed,
            StateChangesOnly::Off => true,
            StateChangesOnly::WithReminder(d) => {
                changed || (new_level != Level::Ok && now - self.state.last_emit_time >= d)
            }
        };
        if !should_emit {
            return None;
        }
        if self.state.flap_suppressed {
            return None;
        }
        if self.spec.no_recoveries && new_level == Level::Ok && (changed || self.state.previous_level != Level::Ok) {
            // recoveries suppressed from handlers, but state above is still
            // updated/persisted.
            if changed {
                self.state.last_emit_time = now;
            }
            return None;
        }

        self.state.last_emit_time = now;
        let id = render_template(&self.spec.id_template, &template_vars(&self.spec.task_name, "", p, new_level));
        let message = render_template(
            &self.spec.message_template,
            &template_vars(&self.spec.task_name, &id, p, new_level),
        );
        let details = render_template(
            &self.spec.details_template,
            &template_vars(&self.spec.task_name, &id, p, new_level),
        );
        Some(AlertData {
            id,
            message,
            details,
            time: now,
            duration_since_entry: self.state.duration_since_entry(now),
            level: new_level,
            previous_level: self.state.previous_level,
            recoverable: new_level == Level::Ok,
            task_name: self.spec.task_name.clone(),
            tags: p.tags.clone(),
            fields: p.fields.clone(),
        })
    }

    /// `.all()`: require the predicate to hold for every point in a batch
    /// before the whole batch is treated at that level; otherwise the
    /// caller should evaluate point-by-point via `evaluate`.
    pub fn evaluate_all(&mut self, points: &[Point]) -> Option<AlertData> {
        let last = points.last()?;
        let all_crit = self
            .spec
            .crit
            .as_ref()
            .map(|e| points.iter().all(|p| e.eval(p).ok().and_then(|v| v.as_bool()).unwrap_or(false)))
            .unwrap_or(false);
        let all_warn = self
            .spec
            .warn
            .as_ref()
            .map(|e| points.iter().all(|p| e.eval(p).ok().and_then(|v| v.as_bool()).unwrap_or(false)))
            .unwrap_or(false);
        let all_info = self
            .spec
            .info
            .as_ref()
            .map(|e| points.iter().all(|p| e.eval(p).ok().and_then(|v| v.as_bool()).unwrap_or(false)))
            .unwrap_or(false);
        let forced_level = if all_crit {
            Level::Critical
        } else if all_warn {
            Level::Warning
        } else if all_info {
            Level::Info
        } else {
            Level::Ok
        };

        // Reuse `evaluate`'s machinery by constructing a synthetic point at
        // the batch's last timestamp whose fields can't re-trigger the
        // per-point predicates (we've already decided `forced_level`), by
        // directly driving the state transition here instead.
        let now = last.time;
        let current = self.state.level;
        let changed = forced_level != current;
        if changed {
            if current == Level::Ok {
                self.state.event_time = now;
            }
            self.state.previous_level = current;
            self.state.level = forced_level;
        }
        self.state.push_history(forced_level);

        if let Some((low, high)) = self.spec.flapping {
            let freq = self.state.flap_frequency();
            if freq > high {
                self.state.flap_suppressed = true;
            } else if freq < low {
                self.state.flap_suppressed = false;
            }
        }

        let should_emit = match self.spec.state_changes_only {
            StateChangesOnly::On => changed,
            StateChangesOnly::Off => true,
            StateChangesOnly::WithReminder(d) => {
                changed || (forced_level != Level::Ok && now - self.state.last_emit_time >= d)
            }
        };
        if !should_emit || self.state.flap_suppressed {
            return None;
        }
        if self.spec.no_recoveries && forced_level == Level::Ok {
            return None;
        }

        self.state.last_emit_time = now;
        let id = render_template(&self.spec.id_template, &template_vars(&self.spec.task_name, "", last, forced_level));
        Some(AlertData {
            message: render_template(&self.spec.message_template, &template_vars(&self.spec.task_name, &id, last, forced_level)),
            details: render_template(&self.spec.details_template, &template_vars(&self.spec.task_name, &id, last, forced_level)),
            id,
            time: now,
            duration_since_entry: self.state.duration_since_entry(now),
            level: forced_level,
            previous_level: self.state.previous_level,
            recoverable: forced_level == Level::Ok,
            task_name: self.spec.task_name.clone(),
            tags: last.tags.clone(),
            fields: last.fields.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_ops::Expr;

    fn point(t: i64, v: f64) -> Point {
        Point::new("cpu", t).with_field("value", v)
    }

    fn crit_gt_90() -> AlertSpec {
        let mut spec = AlertSpec::new("task1");
        spec.crit = Some(Expr::Gt(Box::new(Expr::Field("value".into())), Box::new(Expr::Const(90.0.into()))));
        spec.state_changes_only = StateChangesOnly::On;
        spec
    }

    /// Spec §8 "Alert state transitions": crit `value>90` with
    /// `.stateChangesOnly()` on [95, 96, 93, 50, 50] fires exactly two
    /// handler invocations: one Critical, one OK.
    #[test]
    fn state_changes_only_fires_exactly_on_transitions() {
        let mut node = AlertNode::new(crit_gt_90());
        let values = [95.0, 96.0, 93.0, 50.0, 50.0];
        let mut emitted = Vec::new();
        for (i, v) in values.iter().enumerate() {
            if let Some(data) = node.evaluate(&point(i as i64, *v)) {
                emitted.push(data.level);
            }
        }
        assert_eq!(emitted, vec![Level::Critical, Level::Ok]);
    }

    #[test]
    fn state_changes_only_with_reminder_fires_after_duration() {
        let mut spec = crit_gt_90();
        spec.state_changes_only = StateChangesOnly::WithReminder(15_000_000_000);
        let mut node = AlertNode::new(spec);

        let mut emitted = Vec::new();
        for t in (0..=40).step_by(5) {
            let ns = t as i64 * 1_000_000_000;
            if let Some(data) = node.evaluate(&point(ns, 95.0)) {
                emitted.push((ns, data.level));
            }
        }
        assert_eq!(emitted[0], (0, Level::Critical));
        assert!(emitted.iter().any(|(t, _)| *t >= 15_000_000_000 && *t != 0));
    }

    #[test]
    fn no_recoveries_suppresses_ok_transition() {
        let mut spec = crit_gt_90();
        spec.no_recoveries = true;
        let mut node = AlertNode::new(spec);
        node.evaluate(&point(0, 95.0));
        let recovery = node.evaluate(&point(1, 10.0));
        assert!(recovery.is_none());
        assert_eq!(node.state.level, Level::Ok, "state still transitions even though emission is suppressed");
    }

    /// Spec §9 ambiguity (3): "the duration reported on recovery... is the
    /// time between entry and recovery" — escalating Warning->Critical
    /// before recovering to OK must not reset the clock at the escalation.
    #[test]
    fn recovery_duration_spans_the_whole_non_ok_run() {
        let mut spec = AlertSpec::new("task1");
        spec.warn = Some(Expr::Gt(Box::new(Expr::Field("value".into())), Box::new(Expr::Const(50.0.into()))));
        spec.crit = Some(Expr::Gt(Box::new(Expr::Field("value".into())), Box::new(Expr::Const(90.0.into()))));
        spec.state_changes_only = StateChangesOnly::On;
        let mut node = AlertNode::new(spec);

        node.evaluate(&point(0, 60.0)); // OK -> Warning, entry at t=0
        node.evaluate(&point(5, 95.0)); // Warning -> Critical, entry stays at t=0
        let recovery = node.evaluate(&point(12, 10.0)).unwrap(); // Critical -> OK

        assert_eq!(recovery.level, Level::Ok);
        assert_eq!(recovery.duration_since_entry, 12, "duration must span from the original t=0 entry, not the t=5 escalation");
    }

    /// Spec §8 "Flapping suppression": history(21).flapping(0.25, 0.50) on
    /// an alternating predicate; once >10 transitions sit in the ring, no
    /// further emission until transitions drop below 6.
    #[test]
    fn flapping_suppresses_once_frequency_crosses_high() {
        let mut spec = crit_gt_90();
        spec.state_changes_only = StateChangesOnly::Off;
        spec.flapping = Some((0.25, 0.50));
        spec.history_n = 21;
        let mut node = AlertNode::new(spec);

        let mut suppressed_at_some_point = false;
        for i in 0..21i64 {
            let v = if i % 2 == 0 { 95.0 } else { 10.0 };
            let before = node.state.flap_suppressed;
            node.evaluate(&point(i, v));
            if !before && node.state.flap_suppressed {
                suppressed_at_some_point = true;
            }
        }
        assert!(suppressed_at_some_point, "alternating predicate should trip flap suppression");
    }
}
