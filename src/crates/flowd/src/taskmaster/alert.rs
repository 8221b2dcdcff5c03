//! The alert node's async shell (spec §4.7): owns the pure `AlertNode`
//! evaluator plus the two async collaborators layered on top of it —
//! handler dispatch and state persistence — that don't fit the synchronous
//! `Operator` trait the rest of `flow_ops` uses.

use std::sync::Arc;

use flow_alert::{AlertHandler, AlertNode, AlertSpec, AlertStore};
use flow_core::{EdgeReceiver, Message};

pub struct AlertNodeConfig {
    pub spec: AlertSpec,
    pub topic: String,
    pub handlers: Vec<Arc<dyn AlertHandler>>,
    pub store: Option<Arc<AlertStore>>,
    pub history_capacity: usize,
}

/// Drive one alert node to completion: load persisted state, evaluate every
/// inbound point, dispatch to every handler on a level change, persist the
/// updated state, and (on stream close) leave the last state in the store
/// for the next run to rehydrate (spec §4.7 "Persistence").
pub async fn run_alert(cfg: AlertNodeConfig, mut in_rx: EdgeReceiver) {
    let alert_id = cfg.spec.id_template.clone();
    let initial_state = match &cfg.store {
        Some(store) => store
            .load(&cfg.topic, &alert_id, cfg.history_capacity)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, topic = %cfg.topic, "alert: failed to load persisted state, starting fresh");
                None
            }),
        None => None,
    };

    let mut node = match initial_state {
        Some(state) => AlertNode::with_state(cfg.spec, state),
        None => AlertNode::new(cfg.spec),
    };

    while let Some(msg) = in_rx.recv().await {
        let Message::Point(p) = msg else { continue };
        let Some(data) = node.evaluate(&p) else { continue };

        for handler in &cfg.handlers {
            if let Err(e) = handler.dispatch(&data).await {
                tracing::warn!(error = %e, alert = %data.id, "alert: handler dispatch failed");
            }
        }

        if let Some(store) = &cfg.store {
            if let Err(e) = store.collect(&cfg.topic, &data.id, &node.state).await {
                tracing::warn!(error = %e, alert = %data.id, "alert: failed to persist state");
            }
        }
    }
}
