//! The async edge-reading/writing loop that drives a node (spec §4.1
//! "Scheduling model": "one cooperative worker per node"). Grounded on
//! `execution::workflow_engine::WorkflowExecutionEngine::execute_node`'s
//! per-node dispatch loop, generalized from a step-limited JSON-config walk
//! to an unbounded `Operator`-driven pump over real edges.

use flow_core::{EdgeReceiver, EdgeSender, Message};
use flow_ops::{Join, Operator};

/// Drive a single-input operator kernel until its in-edge closes, flushing
/// any buffered state and closing every out-edge afterward (spec §4.2:
/// "a receiver treats close as a terminal event and closes its own
/// downstream edges once pending state has been emitted").
pub async fn run_operator(mut op: Box<dyn Operator>, mut in_rx: EdgeReceiver, out: Vec<EdgeSender>) {
    while let Some(msg) = in_rx.recv().await {
        for produced in op.process(msg) {
            if !fan_out(&out, produced).await {
                return;
            }
        }
    }
    for produced in op.flush() {
        if !fan_out(&out, produced).await {
            return;
        }
    }
}

/// Drive a join across its N labeled in-edges (spec §4.4). Unlike every
/// other kernel, a join doesn't implement `Operator`: it's fed through
/// `push(side, msg)` so it can match matching messages across sides rather
/// than per edge independently. Sides are read concurrently — whichever
/// in-edge has a message ready goes first — since the join's own
/// tolerance-window buffering, not edge order, is what establishes
/// matching (spec §4.2 "no ordering other than what barriers establish").
pub async fn run_join(mut join: Join, mut inputs: Vec<EdgeReceiver>, out: Vec<EdgeSender>) {
    let mut closed = vec![false; inputs.len()];

    loop {
        if closed.iter().all(|c| *c) {
            return;
        }

        let mut sides = Vec::new();
        let mut futs = Vec::new();
        for (side, rx) in inputs.iter_mut().enumerate() {
            if !closed[side] {
                sides.push(side);
                futs.push(Box::pin(rx.recv()));
            }
        }
        let (result, ready_idx, _) = futures::future::select_all(futs).await;
        let side = sides[ready_idx];

        match result {
            Some(msg) => {
                for produced in join.push(side, msg) {
                    if !fan_out(&out, produced).await {
                        return;
                    }
                }
            }
            None => closed[side] = true,
        }
    }
}

async fn fan_out(out: &[EdgeSender], msg: Message) -> bool {
    for edge in out {
        if edge.send(msg.clone()).await.is_err() {
            return false;
        }
    }
    true
}
