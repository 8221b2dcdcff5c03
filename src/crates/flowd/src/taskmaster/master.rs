//! `TaskMaster` (spec §4.1): owns the set of running tasks, routes
//! `PointsWriter` dispatch to matching stream tasks, and exposes
//! `Stream`/`BatchCollectors` for test/replay injection.
//!
//! Grounded on `Orchestrator`'s in-memory `HashMap<Uuid, Task>` registry in
//! the teacher's crate root (`lib.rs`), generalized from a passive task
//! ledger to the thing that actually owns running `ExecutingTask`s.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use flow_core::{EdgeSender, Message, Point};

use crate::taskmaster::sink::SharedResult;
use crate::taskmaster::source::StreamMatcher;
use crate::taskmaster::spec::{NodeId, TaskSpec};
use crate::taskmaster::task::{ExecutingTask, StartTaskError};

#[derive(Debug, Error)]
pub enum TaskMasterError {
    #[error("task {0:?} already exists")]
    AlreadyExists(String),
    #[error("task {0:?} not found")]
    NotFound(String),
    #[error(transparent)]
    Start(#[from] StartTaskError),
}

struct RunningTask {
    spec_summary: TaskSummary,
    executing: Option<ExecutingTask>,
    http_out: HashMap<NodeId, SharedResult>,
}

/// The bits of a `TaskSpec` kept around after `StartTask` consumes it, for
/// stream matching and introspection.
pub struct TaskSummary {
    pub kind: crate::taskmaster::spec::TaskKind,
    pub dbrp: Vec<crate::taskmaster::spec::DbRp>,
    pub from: Option<crate::taskmaster::spec::MeasurementSelector>,
    pub where_filter: Option<flow_ops::Expr>,
}

impl From<&TaskSpec> for TaskSummary {
    fn from(spec: &TaskSpec) -> Self {
        Self {
            kind: spec.kind,
            dbrp: spec.dbrp.clone(),
            from: spec.from.clone(),
            where_filter: spec.where_filter.clone(),
        }
    }
}

/// Owns every running task. One per server process (spec §4.1
/// "Responsibility: own the set of running tasks").
#[derive(Default)]
pub struct TaskMaster {
    tasks: RwLock<HashMap<String, RunningTask>>,
}

impl TaskMaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// `StartTask(task) -> ExecutingTask | error` (spec §4.1). Registers
    /// the task under its name; fails if a task by that name is already
    /// running.
    pub fn start_task(&self, spec: TaskSpec) -> Result<(), TaskMasterError> {
        let name = spec.name.clone();
        {
            let tasks = self.tasks.read();
            if tasks.contains_key(&name) {
                return Err(TaskMasterError::AlreadyExists(name));
            }
        }
        let summary = TaskSummary::from(&spec);
        let http_out = spec.http_out_results();
        let executing = ExecutingTask::start(spec)?;
        self.tasks.write().insert(name, RunningTask { spec_summary: summary, executing: Some(executing), http_out });
        Ok(())
    }

    /// `httpOut(name)`'s latest materialized result, for the admin HTTP
    /// surface to serve `GET /tasks/:task/:endpoint` from (spec §4.9/§6.2).
    pub fn http_out_result(&self, task_name: &str, node_id: &str) -> Option<SharedResult> {
        self.tasks.read().get(task_name).and_then(|t| t.http_out.get(node_id)).cloned()
    }

    /// `StopTask(name)` + `Drain()`: remove the task from the registry and
    /// wait for it to fully drain before returning (spec §4.1).
    pub async fn stop_task(&self, name: &str) -> Result<(), TaskMasterError> {
        let running = self.tasks.write().remove(name).ok_or_else(|| TaskMasterError::NotFound(name.to_string()))?;
        if let Some(executing) = running.executing {
            executing.stop_and_drain().await;
        }
        Ok(())
    }

    /// `PointsWriter(database, retention-policy, points...)`: dispatch each
    /// point to every task whose declared `(db,rp)` and `from`/`where`
    /// match (spec §4.1 "Stream matching").
    pub async fn points_writer(&self, database: &str, retention_policy: &str, points: Vec<Point>) {
        // Snapshot matching source edges under the lock, then send outside
        // it — sending can block on backpressure (spec §4.2) and must not
        // hold the registry lock while it does.
        let targets: Vec<EdgeSender> = {
            let tasks = self.tasks.read();
            tasks
                .values()
                .filter_map(|t| {
                    let executing = t.executing.as_ref()?;
                    Some((t.spec_summary.as_matcher(), executing.source_handle()))
                })
                .collect::<Vec<_>>()
                .into_iter()
                .filter(|(matcher, _)| points.iter().any(|p| matcher.matches(database, retention_policy, p)))
                .map(|(_, tx)| tx)
                .collect()
        };

        for tx in targets {
            for point in &points {
                if tx.send(Message::Point(point.clone())).await.is_err() {
                    break;
                }
            }
        }
    }

    /// `Stream(name)` / `BatchCollectors(name)`: the task's source edge,
    /// for a test/replay driver to feed data into directly.
    pub fn stream(&self, name: &str) -> Option<EdgeSender> {
        self.tasks.read().get(name).and_then(|t| t.executing.as_ref()).map(|e| e.source_handle())
    }

    pub fn batch_collectors(&self, name: &str) -> Option<EdgeSender> {
        self.stream(name)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.read().contains_key(name)
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.read().keys().cloned().collect()
    }
}

impl TaskSummary {
    fn as_matcher(&self) -> StreamMatcher<'_> {
        StreamMatcher {
            kind: self.kind,
            dbrp: &self.dbrp,
            from: &self.from,
            where_filter: &self.where_filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use flow_core::Point;

    use crate::taskmaster::parse::{new_task, Collaborators};
    use crate::taskmaster::spec::TaskKind;

    fn round_trip_spec(name: &str) -> TaskSpec {
        let script = r#"{
            "nodes": [
                {"id": "src", "type": "from"},
                {"id": "out", "type": "httpOut"}
            ],
            "edges": [{"from": "src", "to": "out"}]
        }"#;
        new_task(name, script, TaskKind::Stream, vec![], None, HashMap::new(), &Collaborators::default()).unwrap()
    }

    #[tokio::test]
    async fn a_point_pushed_through_the_source_reaches_http_out() {
        let spec = round_trip_spec("round-trip");
        let slot = spec.http_out_results().get("out").unwrap().clone();

        let master = TaskMaster::new();
        master.start_task(spec).unwrap();
        assert!(master.is_running("round-trip"));

        let tx = master.stream("round-trip").unwrap();
        tx.send(Message::Point(Point::new("cpu", 1).with_field("value", 42.0))).await.unwrap();

        // the httpOut worker runs on its own task; give it a moment to process
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(slot.read().groups.len(), 1);

        master.stop_task("round-trip").await.unwrap();
        assert!(!master.is_running("round-trip"));
    }

    #[tokio::test]
    async fn starting_a_duplicate_name_fails() {
        let master = TaskMaster::new();
        master.start_task(round_trip_spec("dup")).unwrap();
        let err = master.start_task(round_trip_spec("dup")).unwrap_err();
        assert!(matches!(err, TaskMasterError::AlreadyExists(name) if name == "dup"));
    }

    #[tokio::test]
    async fn stopping_an_unknown_task_fails() {
        let master = TaskMaster::new();
        let err = master.stop_task("ghost").await.unwrap_err();
        assert!(matches!(err, TaskMasterError::NotFound(name) if name == "ghost"));
    }

    #[test]
    fn task_names_reflects_the_registry() {
        let master = TaskMaster::new();
        assert!(master.task_names().is_empty());
        master.start_task(round_trip_spec("t1")).unwrap();
        assert_eq!(master.task_names(), vec!["t1".to_string()]);
    }
}
