//! Stream matching and the batch driver scheduler (spec §4.1 "Stream
//! matching", "Batch driver"). Grounded on `execution::workflow_engine`'s
//! tick-driven loop shape, retargeted from "advance a workflow one step"
//! to "advance a scheduled query".

use flow_core::{EdgeSender, Message, Point};
use flow_ops::Expr;

use crate::taskmaster::spec::{BatchSchedule, DbRp, MeasurementSelector, TaskKind};

/// Everything `PointsWriter` needs to decide whether an incoming point is
/// routed to a given task (spec §4.1 "Stream matching"): the task must be
/// of kind `stream`, declare the point's `(db,rp)`, have a `from` selector
/// matching the point's measurement, and (if present) a `where` filter
/// that evaluates true against the point's tags/fields.
pub struct StreamMatcher<'a> {
    pub kind: TaskKind,
    pub dbrp: &'a [DbRp],
    pub from: &'a Option<MeasurementSelector>,
    pub where_filter: &'a Option<Expr>,
}

impl<'a> StreamMatcher<'a> {
    pub fn matches(&self, db: &str, rp: &str, point: &Point) -> bool {
        if self.kind != TaskKind::Stream {
            return false;
        }
        if !self.dbrp.iter().any(|pair| pair.database == db && pair.retention_policy == rp) {
            return false;
        }
        if let Some(selector) = self.from {
            if !selector.matches(&point.measurement) {
                return false;
            }
        }
        if let Some(filter) = self.where_filter {
            match filter.eval(point) {
                Ok(v) => {
                    if !v.as_bool().unwrap_or(false) {
                        return false;
                    }
                }
                Err(_) => return false,
            }
        }
        true
    }
}

/// The collaborator a `batch` task's scheduler issues its declared query
/// against (spec §4.1: "issues the task's declared query against the
/// remote store"). Out of scope to implement a concrete query engine here.
#[async_trait::async_trait]
pub trait BatchQuerySource: Send + Sync {
    async fn query(&self, task_name: &str, window_start: i64, window_end: i64) -> Result<Vec<flow_core::Batch>, String>;
}

/// Run a batch task's periodic query loop until `source` closes (task
/// stopped) or the clock stalls permanently. Each tick: compute the
/// `period`-wide window ending at the aligned tick time, query, and push
/// the resulting batches into the task's source edge.
pub async fn run_batch_driver<C: flow_clock::Clock>(
    task_name: &str,
    schedule: BatchSchedule,
    clock: &C,
    query_source: &dyn BatchQuerySource,
    source: &EdgeSender,
) {
    let mut next_tick = clock.zero() + schedule.every;
    loop {
        clock.until(next_tick).await;
        let tick = if schedule.align && schedule.every > 0 {
            (next_tick / schedule.every) * schedule.every
        } else {
            next_tick
        };
        let window_start = tick - schedule.period;

        match query_source.query(task_name, window_start, tick).await {
            Ok(batches) => {
                for batch in batches {
                    if source.send(Message::Batch(batch)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(task = %task_name, error = %e, "batch driver: query failed, skipping tick");
            }
        }

        if schedule.every <= 0 {
            return;
        }
        next_tick += schedule.every;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(measurement: &str) -> Point {
        Point::new(measurement, 0)
    }

    #[test]
    fn batch_task_never_matches_stream_dispatch() {
        let matcher = StreamMatcher { kind: TaskKind::Batch, dbrp: &[], from: &None, where_filter: &None };
        assert!(!matcher.matches("db", "autogen", &point("cpu")));
    }

    #[test]
    fn dbrp_must_match_exactly() {
        let dbrp = [DbRp { database: "db".to_string(), retention_policy: "autogen".to_string() }];
        let matcher = StreamMatcher { kind: TaskKind::Stream, dbrp: &dbrp, from: &None, where_filter: &None };
        assert!(matcher.matches("db", "autogen", &point("cpu")));
        assert!(!matcher.matches("db", "one_week", &point("cpu")));
        assert!(!matcher.matches("other_db", "autogen", &point("cpu")));
    }

    #[test]
    fn from_selector_filters_by_measurement() {
        let dbrp = [DbRp { database: "db".to_string(), retention_policy: "autogen".to_string() }];
        let from = Some(MeasurementSelector::Literal("cpu".to_string()));
        let matcher = StreamMatcher { kind: TaskKind::Stream, dbrp: &dbrp, from: &from, where_filter: &None };
        assert!(matcher.matches("db", "autogen", &point("cpu")));
        assert!(!matcher.matches("db", "autogen", &point("mem")));
    }

    #[test]
    fn where_filter_must_evaluate_truthy() {
        let dbrp = [DbRp { database: "db".to_string(), retention_policy: "autogen".to_string() }];
        let filter = Some(Expr::Gt(Box::new(Expr::Field("usage".to_string())), Box::new(Expr::Const(flow_core::Value::Int(50)))));
        let matcher = StreamMatcher { kind: TaskKind::Stream, dbrp: &dbrp, from: &None, where_filter: &filter };

        let hot = point("cpu").with_field("usage", 90i64);
        let cold = point("cpu").with_field("usage", 10i64);
        assert!(matcher.matches("db", "autogen", &hot));
        assert!(!matcher.matches("db", "autogen", &cold));
    }
}
