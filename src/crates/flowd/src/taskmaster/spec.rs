//! `TaskSpec`: the frozen DAG a parsed script compiles down to (spec §4.1
//! `NewTask`). Grounded on `execution::workflow_engine::{WorkflowNode,
//! WorkflowEdge}`: same node/edge-list shape, generalized from a JSON config
//! blob per node to a concrete, typed operator kernel per node.

use std::collections::{HashMap, HashSet};

use flow_core::EdgeKind;
use flow_ops::{Join, Operator};

use thiserror::Error;

pub type NodeId = String;

/// Which kind of task a script compiles to (spec §3 "Task", §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Stream,
    Batch,
}

/// A `(database, retention-policy)` pair a task subscribes to or queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbRp {
    pub database: String,
    pub retention_policy: String,
}

/// `from()`'s measurement selector: literal name or regex.
#[derive(Debug, Clone)]
pub enum MeasurementSelector {
    Literal(String),
    Regex(regex::Regex),
}

impl MeasurementSelector {
    pub fn matches(&self, measurement: &str) -> bool {
        match self {
            MeasurementSelector::Literal(name) => name == measurement,
            MeasurementSelector::Regex(re) => re.is_match(measurement),
        }
    }
}

/// The cadence a `batch` task's scheduler runs its query on (spec §4.1
/// "Batch driver").
#[derive(Debug, Clone, Copy)]
pub struct BatchSchedule {
    /// Nanoseconds between query ticks.
    pub every: i64,
    /// Nanoseconds of history the query window selects.
    pub period: i64,
    /// Snap tick boundaries to multiples of `every`.
    pub align: bool,
}

/// The sum type a `TaskSpec` names its nodes through, so the DAG can be
/// validated and wired generically before any node starts running.
/// `window`/`groupBy`/`flatten`/`combine`/`eval`-family/aggregation-family/
/// change-family/autoscale all implement the single-input `Operator` trait
/// and share one generic async driver loop (`taskmaster::node::run_operator`);
/// everything else here has its own async shape (multi-input, or a side
/// effect an `Operator` can't express) and gets a dedicated runner.
pub enum NodeKind {
    Operator(Box<dyn Operator>),
    /// Multi-input; driven by `taskmaster::node::run_join` instead of the
    /// generic single-input operator loop.
    Join(Join, Vec<NodeId>),
    Alert(crate::taskmaster::alert::AlertNodeConfig),
    HttpOut(crate::taskmaster::sink::SharedResult),
    HttpPost { url: String, timeout: std::time::Duration },
    InfluxOut(crate::taskmaster::sink::InfluxOutConfig),
    Udf(crate::taskmaster::udf::UdfNodeConfig),
}

pub struct NodeSpec {
    pub id: NodeId,
    pub kind: NodeKind,
    /// `Stream` or `Batch`: the edge kind this node *emits on*. The kind it
    /// consumes is whatever its in-edge(s) were allocated as; `StartTask`
    /// checks the two agree (window/flatten/combine/aggregate-family nodes
    /// translate between them, everything else passes the kind through).
    pub out_kind: EdgeKind,
}

pub struct EdgeSpec {
    pub from: NodeId,
    pub to: NodeId,
}

#[derive(Debug, Error)]
pub enum DagError {
    #[error("task has no source node (a source-only query must be a single select)")]
    NoSource,
    #[error("task has more than one source node; a source-only query must be a single select")]
    MultipleSources,
    #[error("edge references unknown node {0:?}")]
    UnknownNode(String),
    #[error("dag contains a cycle")]
    Cycle,
    #[error("duplicate node id {0:?}")]
    DuplicateNode(String),
}

/// A parsed, frozen DAG plus the dependency info `StartTask` needs to wire
/// it up and `PointsWriter` needs to route matching points to it (spec
/// §4.1 `NewTask`).
pub struct TaskSpec {
    pub name: String,
    pub kind: TaskKind,
    pub dbrp: Vec<DbRp>,
    pub ttl: Option<i64>,
    pub vars: HashMap<String, String>,
    pub from: Option<MeasurementSelector>,
    pub where_filter: Option<flow_ops::Expr>,
    pub schedule: Option<BatchSchedule>,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
    /// Source node id: the one node with no incoming edge.
    pub source: NodeId,
}

impl TaskSpec {
    /// Validate the node/edge list: exactly one source, every edge
    /// references a real node, and the graph is acyclic. Mirrors
    /// `WorkflowExecutionEngine::parse_definition`'s root-detection, made
    /// strict per spec §4.1 ("fails fast if the DAG is malformed").
    pub fn validate(nodes: &[NodeSpec], edges: &[EdgeSpec]) -> Result<NodeId, DagError> {
        let mut seen = HashSet::new();
        for n in nodes {
            if !seen.insert(n.id.clone()) {
                return Err(DagError::DuplicateNode(n.id.clone()));
            }
        }
        for e in edges {
            if !seen.contains(&e.from) {
                return Err(DagError::UnknownNode(e.from.clone()));
            }
            if !seen.contains(&e.to) {
                return Err(DagError::UnknownNode(e.to.clone()));
            }
        }

        let targets: HashSet<&str> = edges.iter().map(|e| e.to.as_str()).collect();
        let sources: Vec<&NodeId> = nodes.iter().map(|n| &n.id).filter(|id| !targets.contains(id.as_str())).collect();
        let source = match sources.as_slice() {
            [] => return Err(DagError::NoSource),
            [one] => (*one).clone(),
            _ => return Err(DagError::MultipleSources),
        };

        // Cycle check: Kahn's algorithm over the edge list.
        let mut indeg: HashMap<&str, usize> = nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
        for e in edges {
            *indeg.get_mut(e.to.as_str()).unwrap() += 1;
        }
        let mut queue: Vec<&str> = indeg.iter().filter(|(_, d)| **d == 0).map(|(id, _)| *id).collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop() {
            visited += 1;
            for e in edges.iter().filter(|e| e.from == id) {
                let d = indeg.get_mut(e.to.as_str()).unwrap();
                *d -= 1;
                if *d == 0 {
                    queue.push(e.to.as_str());
                }
            }
        }
        if visited != nodes.len() {
            return Err(DagError::Cycle);
        }

        Ok(source)
    }

    /// Nodes with no outgoing edge at all; a join's constituent in-edges
    /// come from edges whose `to` is the join's id.
    pub fn join_inputs(&self, join_id: &str) -> Vec<&NodeId> {
        self.edges.iter().filter(|e| e.to == join_id).map(|e| &e.from).collect()
    }

    pub fn outgoing(&self, id: &str) -> Vec<&NodeId> {
        self.edges.iter().filter(|e| e.from == id).map(|e| &e.to).collect()
    }

    /// Every `httpOut(name)` node's result slot, keyed by node id, so the
    /// admin HTTP surface can serve `GET /tasks/:task/:endpoint` after
    /// `ExecutingTask::start` has consumed the node list (spec §4.9/§6.2).
    pub fn http_out_results(&self) -> HashMap<NodeId, crate::taskmaster::sink::SharedResult> {
        self.nodes
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::HttpOut(slot) => Some((n.id.clone(), slot.clone())),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoOp;
    impl Operator for NoOp {
        fn process(&mut self, msg: flow_core::Message) -> Vec<flow_core::Message> {
            vec![msg]
        }
    }

    fn node(id: &str) -> NodeSpec {
        NodeSpec { id: id.to_string(), kind: NodeKind::Operator(Box::new(NoOp)), out_kind: EdgeKind::Stream }
    }

    fn edge(from: &str, to: &str) -> EdgeSpec {
        EdgeSpec { from: from.to_string(), to: to.to_string() }
    }

    #[test]
    fn linear_chain_validates_with_the_head_as_source() {
        let nodes = vec![node("a"), node("b"), node("c")];
        let edges = vec![edge("a", "b"), edge("b", "c")];
        assert_eq!(TaskSpec::validate(&nodes, &edges).unwrap(), "a");
    }

    #[test]
    fn no_source_is_rejected() {
        let nodes = vec![node("a"), node("b")];
        let edges = vec![edge("a", "b"), edge("b", "a")];
        assert!(matches!(TaskSpec::validate(&nodes, &edges), Err(DagError::NoSource)));
    }

    #[test]
    fn two_disconnected_sources_are_rejected() {
        let nodes = vec![node("a"), node("b"), node("c")];
        let edges = vec![edge("a", "c"), edge("b", "c")];
        assert!(matches!(TaskSpec::validate(&nodes, &edges), Err(DagError::MultipleSources)));
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let nodes = vec![node("a"), node("a")];
        assert!(matches!(TaskSpec::validate(&nodes, &[]), Err(DagError::DuplicateNode(id)) if id == "a"));
    }

    #[test]
    fn edge_to_unknown_node_is_rejected() {
        let nodes = vec![node("a")];
        let edges = vec![edge("a", "ghost")];
        assert!(matches!(TaskSpec::validate(&nodes, &edges), Err(DagError::UnknownNode(id)) if id == "ghost"));
    }

    #[test]
    fn cycle_downstream_of_the_source_is_rejected() {
        let nodes = vec![node("a"), node("b"), node("c")];
        let edges = vec![edge("a", "b"), edge("b", "c"), edge("c", "b")];
        assert!(matches!(TaskSpec::validate(&nodes, &edges), Err(DagError::Cycle)));
    }
}
