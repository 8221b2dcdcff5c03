//! `StartTask`/`StopTask`/`Drain` (spec §4.1): wires a frozen `TaskSpec`
//! into running per-node tokio tasks connected by edges, then owns their
//! join handles and the task's source/collector edges.
//!
//! Grounded on `execution::workflow_engine::WorkflowExecutionEngine`'s
//! node/edge bookkeeping, generalized from "walk the DAG one step per
//! tick" to "spawn one cooperative worker per node, connected by real
//! edges, and let them run until the source closes".

use std::collections::HashMap;

use flow_core::{edge, EdgeKind, EdgeReceiver, EdgeSender};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::taskmaster::spec::{NodeId, NodeKind, TaskSpec};
use crate::taskmaster::{alert, node, sink, udf};

/// Bounded edge capacity (spec §4.2: edges are bounded, senders block on a
/// full buffer). Fixed for every edge in this implementation; a future
/// per-node override would thread through `NodeSpec`.
const EDGE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum StartTaskError {
    #[error("dag error: {0}")]
    Dag(#[from] crate::taskmaster::spec::DagError),
    #[error("join node {0:?} has no declared input edges")]
    JoinWithoutInputs(String),
}

/// A running task (spec §4.1 `ExecutingTask`): the source edge(s) data can
/// be pushed into, and the join handles for every per-node worker.
pub struct ExecutingTask {
    pub name: String,
    source: EdgeSender,
    handles: Vec<JoinHandle<()>>,
}

impl ExecutingTask {
    /// Allocate one edge per `EdgeSpec`, spawn one cooperative worker per
    /// node, and return a handle to the task's source edge (spec §4.1
    /// `StartTask`). Fails fast if the DAG doesn't validate or a join is
    /// missing one of its declared input edges.
    pub fn start(mut spec: TaskSpec) -> Result<Self, StartTaskError> {
        let source_id = TaskSpec::validate(&spec.nodes, &spec.edges)?;

        // One channel per declared edge. Senders are grouped by producer,
        // receivers are grouped by consumer (in edge-declaration order) so
        // joins can later be re-ordered to match their alias list.
        let mut senders_by_node: HashMap<NodeId, Vec<EdgeSender>> = HashMap::new();
        let mut receivers_by_node: HashMap<NodeId, Vec<(NodeId, EdgeReceiver)>> = HashMap::new();
        let out_kind_by_node: HashMap<NodeId, EdgeKind> = spec.nodes.iter().map(|n| (n.id.clone(), n.out_kind)).collect();

        for e in &spec.edges {
            let kind = out_kind_by_node.get(&e.from).copied().unwrap_or(EdgeKind::Stream);
            let (tx, rx) = edge(kind, EDGE_CAPACITY);
            senders_by_node.entry(e.from.clone()).or_default().push(tx);
            receivers_by_node.entry(e.to.clone()).or_default().push((e.from.clone(), rx));
        }

        // The task's own ingestion point: an edge whose sender is handed
        // back to the caller and whose receiver feeds the source node.
        let source_kind = out_kind_by_node.get(&source_id).copied().unwrap_or(EdgeKind::Stream);
        let (source_tx, source_rx) = edge(source_kind, EDGE_CAPACITY);
        receivers_by_node.entry(source_id.clone()).or_default().push((String::new(), source_rx));

        let mut handles = Vec::new();
        let nodes = std::mem::take(&mut spec.nodes);
        for n in nodes {
            let out: Vec<EdgeSender> = senders_by_node.remove(&n.id).unwrap_or_default();
            let mut inputs = receivers_by_node.remove(&n.id).unwrap_or_default();

            match n.kind {
                NodeKind::Operator(op) => {
                    let (_, in_rx) = inputs.pop().expect("non-join node must have exactly one in-edge");
                    handles.push(tokio::spawn(node::run_operator(op, in_rx, out)));
                }
                NodeKind::Join(join, input_ids) => {
                    if input_ids.is_empty() {
                        return Err(StartTaskError::JoinWithoutInputs(n.id));
                    }
                    let mut by_from: HashMap<NodeId, EdgeReceiver> = inputs.into_iter().collect();
                    let ordered: Vec<EdgeReceiver> = input_ids
                        .into_iter()
                        .filter_map(|id| by_from.remove(&id))
                        .collect();
                    handles.push(tokio::spawn(node::run_join(join, ordered, out)));
                }
                NodeKind::Alert(cfg) => {
                    let (_, in_rx) = inputs.pop().expect("alert node must have exactly one in-edge");
                    handles.push(tokio::spawn(alert::run_alert(cfg, in_rx)));
                }
                NodeKind::HttpOut(slot) => {
                    let (_, in_rx) = inputs.pop().expect("httpOut node must have exactly one in-edge");
                    handles.push(tokio::spawn(sink::run_http_out(slot, in_rx, out)));
                }
                NodeKind::HttpPost { url, timeout } => {
                    let (_, in_rx) = inputs.pop().expect("httpPost node must have exactly one in-edge");
                    handles.push(tokio::spawn(sink::run_http_post(url, timeout, in_rx, out)));
                }
                NodeKind::InfluxOut(cfg) => {
                    let (_, in_rx) = inputs.pop().expect("influxDBOut node must have exactly one in-edge");
                    handles.push(tokio::spawn(sink::run_influx_out(cfg, in_rx, out)));
                }
                NodeKind::Udf(cfg) => {
                    let (_, in_rx) = inputs.pop().expect("udf node must have exactly one in-edge");
                    handles.push(tokio::spawn(udf::run_udf(cfg, in_rx, out)));
                }
            }
        }

        Ok(ExecutingTask {
            name: spec.name,
            source: source_tx,
            handles,
        })
    }

    /// `PointsWriter`'s delivery point for this task once matched.
    pub fn source(&self) -> &EdgeSender {
        &self.source
    }

    /// `Stream(name)`/`BatchCollectors(name)`: a clone of the source
    /// sender, for test/replay drivers to feed data directly.
    pub fn source_handle(&self) -> EdgeSender {
        self.source.clone()
    }

    /// `StopTask`: close the source edge so no new input is accepted, then
    /// `Drain`: wait for every in-flight message to work its way through
    /// every node before returning (spec §4.1).
    pub async fn stop_and_drain(self) {
        drop(self.source);
        for h in self.handles {
            let _ = h.await;
        }
    }
}
