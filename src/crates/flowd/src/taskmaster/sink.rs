//! Terminal output nodes (spec §4.9): `httpOut`, `httpPost`, `influxDBOut`.
//! All three are pass-through — they forward every message downstream
//! unchanged after performing their side effect — so they're driven by the
//! same bespoke async loop rather than the synchronous `Operator` trait.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use flow_core::{EdgeReceiver, EdgeSender, Message, Point, Tags};

/// The latest materialized result for a task's `httpOut(name)` endpoint
/// (spec §4.9: "a Result is a list of named groups with columns and row
/// values"). Shared via `Arc` so the admin HTTP layer can read it without
/// going through the running task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResult {
    pub groups: Vec<ResultGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultGroup {
    pub tags: Tags,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<flow_core::Value>>,
}

impl TaskResult {
    fn from_points(points: &[Point]) -> Self {
        let mut by_group: std::collections::BTreeMap<flow_core::GroupId, (Tags, Vec<String>, Vec<Vec<flow_core::Value>>)> =
            Default::default();
        for p in points {
            let entry = by_group.entry(p.group_id).or_insert_with(|| (p.tags.clone(), Vec::new(), Vec::new()));
            for name in p.fields.keys() {
                if !entry.1.contains(name) {
                    entry.1.push(name.clone());
                }
            }
        }
        for p in points {
            if let Some((_, columns, rows)) = by_group.get_mut(&p.group_id) {
                let row = columns.iter().map(|c| p.field(c).cloned().unwrap_or(flow_core::Value::Null)).collect();
                rows.push(row);
            }
        }
        TaskResult {
            groups: by_group
                .into_values()
                .map(|(tags, columns, rows)| ResultGroup { tags, columns, rows })
                .collect(),
        }
    }
}

pub type SharedResult = Arc<RwLock<TaskResult>>;

/// `httpOut(name)`: registers the named endpoint and keeps `slot` current.
/// Pass-through — callers who also want the points downstream attach
/// further edges off the same node.
pub async fn run_http_out(slot: SharedResult, mut in_rx: EdgeReceiver, out: Vec<EdgeSender>) {
    let mut batch_points = Vec::new();
    while let Some(msg) = in_rx.recv().await {
        match &msg {
            Message::Point(p) => {
                *slot.write() = TaskResult::from_points(std::slice::from_ref(p));
            }
            Message::Batch(b) => {
                batch_points.clear();
                batch_points.extend(b.points.iter().cloned());
                *slot.write() = TaskResult::from_points(&batch_points);
            }
            _ => {}
        }
        for edge in &out {
            if edge.send(msg.clone()).await.is_err() {
                return;
            }
        }
    }
}

/// `httpPost(url).timeout(d)`: POST the JSON-encoded result; a timed-out
/// request is dropped and logged, never blocks the pipeline (spec §4.9).
pub async fn run_http_post(url: String, timeout: Duration, mut in_rx: EdgeReceiver, out: Vec<EdgeSender>) {
    let client = reqwest::Client::new();
    while let Some(msg) = in_rx.recv().await {
        let body = match &msg {
            Message::Point(p) => Some(TaskResult::from_points(std::slice::from_ref(p))),
            Message::Batch(b) => Some(TaskResult::from_points(&b.points)),
            _ => None,
        };
        if let Some(body) = body {
            let send = client.post(&url).timeout(timeout).json(&body).send();
            match tokio::time::timeout(timeout, send).await {
                Ok(Ok(resp)) if !resp.status().is_success() => {
                    tracing::warn!(%url, status = %resp.status(), "httpPost: non-2xx response");
                }
                Ok(Err(e)) => tracing::warn!(%url, error = %e, "httpPost: request failed"),
                Err(_) => tracing::warn!(%url, ?timeout, "httpPost: request timed out, dropped"),
                Ok(Ok(_)) => {}
            }
        }
        for edge in &out {
            if edge.send(msg.clone()).await.is_err() {
                return;
            }
        }
    }
}

/// Where `influxDBOut` actually writes. Out of scope to implement a real
/// InfluxDB line-protocol client here (spec §1 non-goal: external notifier
/// wire formats); callers inject whatever collaborator fits their store.
#[async_trait::async_trait]
pub trait PointsSink: Send + Sync {
    async fn write(&self, db: &str, rp: &str, points: &[Point]) -> Result<(), String>;
    async fn create_database(&self, db: &str, rp: Option<&str>) -> Result<(), String>;
}

pub struct InfluxOutConfig {
    pub db: String,
    pub rp: String,
    pub measurement: String,
    pub flush_interval: Duration,
    pub create: bool,
    pub sink: Arc<dyn PointsSink>,
}

/// Buffers inbound points and flushes them to the external store at
/// `flush_interval` (spec §4.9). Pass-through.
pub async fn run_influx_out(cfg: InfluxOutConfig, mut in_rx: EdgeReceiver, out: Vec<EdgeSender>) {
    if cfg.create {
        if let Err(e) = cfg.sink.create_database(&cfg.db, Some(&cfg.rp)).await {
            tracing::warn!(db = %cfg.db, error = %e, "influxDBOut: create database failed");
        }
    }

    let mut buffer: Vec<Point> = Vec::new();
    let mut ticker = tokio::time::interval(cfg.flush_interval);

    loop {
        tokio::select! {
            msg = in_rx.recv() => {
                match msg {
                    Some(msg) => {
                        match &msg {
                            Message::Point(p) => buffer.push(p.clone()),
                            Message::Batch(b) => buffer.extend(b.points.iter().cloned()),
                            _ => {}
                        }
                        for edge in &out {
                            if edge.send(msg.clone()).await.is_err() {
                                return;
                            }
                        }
                    }
                    None => {
                        flush(&cfg, &mut buffer).await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                flush(&cfg, &mut buffer).await;
            }
        }
    }
}

async fn flush(cfg: &InfluxOutConfig, buffer: &mut Vec<Point>) {
    if buffer.is_empty() {
        return;
    }
    if let Err(e) = cfg.sink.write(&cfg.db, &cfg.rp, buffer).await {
        tracing::warn!(db = %cfg.db, error = %e, "influxDBOut: flush failed");
    }
    buffer.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_in_the_same_group_become_one_result_group_with_unioned_columns() {
        let tags = Tags::from_pairs([("host", "a")]);
        let points = vec![
            Point::new("cpu", 0).with_tags(tags.clone()).with_field("usage", 10.0),
            Point::new("cpu", 1).with_tags(tags).with_field("usage", 20.0).with_field("idle", 80.0),
        ];
        let result = TaskResult::from_points(&points);
        assert_eq!(result.groups.len(), 1);
        let group = &result.groups[0];
        assert_eq!(group.columns, vec!["usage".to_string(), "idle".to_string()]);
        assert_eq!(group.rows.len(), 2);
        assert!(matches!(group.rows[0][1], flow_core::Value::Null)); // first point has no "idle" field
    }

    #[test]
    fn distinct_tag_sets_become_distinct_groups() {
        let a = Point::new("cpu", 0).with_tags(Tags::from_pairs([("host", "a")])).with_field("usage", 1.0);
        let b = Point::new("cpu", 0).with_tags(Tags::from_pairs([("host", "b")])).with_field("usage", 2.0);
        let result = TaskResult::from_points(&[a, b]);
        assert_eq!(result.groups.len(), 2);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(TaskResult::from_points(&[]).groups.is_empty());
    }
}
