//! The UDF node (spec §4.11): pipes points through an out-of-process
//! subprocess via `flow_udf::UdfProcess`. Pass-through from the DAG's point
//! of view — the subprocess's replies are forwarded downstream in whatever
//! order they arrive, since a UDF is free to buffer/reorder/batch.

use std::collections::HashMap;

use flow_core::{EdgeKind, EdgeReceiver, EdgeSender, Message};
use flow_udf::{OptionArg, UdfProcess};

pub struct UdfNodeConfig {
    pub command: String,
    pub args: Vec<String>,
    pub options: HashMap<String, Vec<OptionArg>>,
    pub required_edge_type: EdgeKind,
}

pub async fn run_udf(cfg: UdfNodeConfig, mut in_rx: EdgeReceiver, out: Vec<EdgeSender>) {
    let mut proc = match UdfProcess::spawn(&cfg.command, &cfg.args, &cfg.options, cfg.required_edge_type).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(command = %cfg.command, error = %e, "udf: failed to start, node aborting");
            return;
        }
    };

    loop {
        tokio::select! {
            inbound = in_rx.recv() => {
                match inbound {
                    Some(Message::Point(p)) => {
                        if let Err(e) = proc.send_point(&p).await {
                            tracing::error!(error = %e, "udf: send failed, node aborting");
                            return;
                        }
                    }
                    Some(Message::Barrier(b)) => {
                        if let Err(e) = proc.send_keepalive(b.time).await {
                            tracing::warn!(error = %e, "udf: keepalive send failed");
                        }
                    }
                    Some(_) => {}
                    None => {
                        let _ = proc.shutdown().await;
                        return;
                    }
                }
            }
            reply = proc.recv() => {
                match reply {
                    Ok(Some(frame)) => {
                        if let Some(msg) = frame_to_message(frame) {
                            for edge in &out {
                                if edge.send(msg.clone()).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        tracing::error!(error = %e, "udf: subprocess error, node aborting");
                        return;
                    }
                }
            }
        }
    }
}

fn frame_to_message(frame: flow_udf::Frame) -> Option<Message> {
    match frame {
        flow_udf::Frame::Point(wp) => Some(Message::Point((&wp).into())),
        flow_udf::Frame::Batch(wb) => {
            let mut tags = flow_core::Tags::new();
            for t in &wb.tags {
                tags.insert(t.key.clone(), t.value.clone());
            }
            let mut batch = flow_core::Batch::new(wb.name.clone(), tags, wb.tmax);
            batch.points = wb.points.iter().map(Into::into).collect();
            Some(Message::Batch(batch))
        }
        _ => None,
    }
}
