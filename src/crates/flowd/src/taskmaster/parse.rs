//! `NewTask`'s script compiler (spec §4.1: "Parses the script (external
//! parser) and returns a frozen DAG"). The DSL/query-language grammar
//! itself is out of scope (spec §1 non-goal) — what's implemented here is
//! the JSON intermediate form such a parser would emit: node/edge lists
//! plus per-node typed config, the same shape
//! `execution::workflow_engine::WorkflowExecutionEngine::parse_definition`
//! decoded, generalized from an untyped config blob per node to a concrete
//! operator kernel construction per node type.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as Json;
use thiserror::Error;

use flow_alert::{AlertHandler, AlertSpec, AlertStore, StateChangesOnly};
use flow_core::EdgeKind;
use flow_ops::{
    Aggregate, ChangeDetect, Combine, CombinePosition, CumulativeSum, DefaultFields, Delete, Derivative, Difference,
    Elapsed, Eval, Expr, Flatten, GroupBy, HoltWinters, Join, JoinSpec, MovingAverage, Percentile, Reducer, Shift,
    StateCount, StateDuration, TopK, Where, Window, WindowSpec,
};
use flow_core::{GroupBySpec, Value};

use crate::taskmaster::alert::AlertNodeConfig;
use crate::taskmaster::autoscale::AutoscaleConfig;
use crate::taskmaster::sink::{InfluxOutConfig, PointsSink};
use crate::taskmaster::spec::{BatchSchedule, DbRp, MeasurementSelector, NodeId, NodeKind, NodeSpec, EdgeSpec, TaskKind, TaskSpec};
use crate::taskmaster::udf::UdfNodeConfig;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed script json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("node {0:?} missing required field {1:?}")]
    MissingField(String, &'static str),
    #[error("node {0:?} has unknown type {1:?}")]
    UnknownNodeType(String, String),
    #[error("unknown reducer {0:?}")]
    UnknownReducer(String),
    #[error("malformed expression: {0}")]
    BadExpr(String),
    #[error("unknown collaborator {0:?} referenced by node {1:?}")]
    UnknownCollaborator(String, String),
}

/// Collaborators a script's nodes reference by name rather than embed
/// directly (spec §6): alert handlers, influx-out sinks, autoscale
/// controllers. Injected by the caller rather than constructed from JSON,
/// since they carry live connections (HTTP clients, k8s API handles, …).
#[derive(Default)]
pub struct Collaborators {
    pub alert_handlers: HashMap<String, Arc<dyn AlertHandler>>,
    pub alert_store: Option<Arc<AlertStore>>,
    pub points_sinks: HashMap<String, Arc<dyn PointsSink>>,
    pub replica_controllers: HashMap<String, Box<dyn Fn() -> Box<dyn flow_ops::ReplicaController> + Send + Sync>>,
}

fn get_str<'a>(node_id: &str, config: &'a serde_json::Map<String, Json>, key: &'static str) -> Result<&'a str, ParseError> {
    config.get(key).and_then(Json::as_str).ok_or_else(|| ParseError::MissingField(node_id.to_string(), key))
}

fn get_i64(config: &serde_json::Map<String, Json>, key: &str, default: i64) -> i64 {
    config.get(key).and_then(Json::as_i64).unwrap_or(default)
}

fn get_f64(config: &serde_json::Map<String, Json>, key: &str, default: f64) -> f64 {
    config.get(key).and_then(Json::as_f64).unwrap_or(default)
}

fn get_bool(config: &serde_json::Map<String, Json>, key: &str, default: bool) -> bool {
    config.get(key).and_then(Json::as_bool).unwrap_or(default)
}

fn get_strings(config: &serde_json::Map<String, Json>, key: &str) -> Vec<String> {
    config
        .get(key)
        .and_then(Json::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Decode a compiled lambda tree: `{"op": "...", "args": [...]}` for
/// binary/unary ops, `{"field": "name"}`, `{"tag": "name"}`, or a bare
/// JSON scalar for a constant (spec §9 design note: "a tagged union with
/// explicit coercion rules... expose the rules as a small interpreter").
fn parse_expr(v: &Json) -> Result<Expr, ParseError> {
    if let Some(field) = v.get("field").and_then(Json::as_str) {
        return Ok(Expr::Field(field.to_string()));
    }
    if let Some(tag) = v.get("tag").and_then(Json::as_str) {
        return Ok(Expr::Tag(tag.to_string()));
    }
    if let Some(op) = v.get("op").and_then(Json::as_str) {
        let args = v.get("args").and_then(Json::as_array).ok_or_else(|| ParseError::BadExpr("missing args".to_string()))?;
        let arg = |i: usize| args.get(i).ok_or_else(|| ParseError::BadExpr(format!("missing arg {i}"))).and_then(parse_expr);
        return match op {
            "not" => Ok(Expr::Not(Box::new(arg(0)?))),
            "and" => Ok(Expr::And(Box::new(arg(0)?), Box::new(arg(1)?))),
            "or" => Ok(Expr::Or(Box::new(arg(0)?), Box::new(arg(1)?))),
            "eq" => Ok(Expr::Eq(Box::new(arg(0)?), Box::new(arg(1)?))),
            "neq" => Ok(Expr::Neq(Box::new(arg(0)?), Box::new(arg(1)?))),
            "lt" => Ok(Expr::Lt(Box::new(arg(0)?), Box::new(arg(1)?))),
            "lte" => Ok(Expr::Lte(Box::new(arg(0)?), Box::new(arg(1)?))),
            "gt" => Ok(Expr::Gt(Box::new(arg(0)?), Box::new(arg(1)?))),
            "gte" => Ok(Expr::Gte(Box::new(arg(0)?), Box::new(arg(1)?))),
            "add" => Ok(Expr::Add(Box::new(arg(0)?), Box::new(arg(1)?))),
            "sub" => Ok(Expr::Sub(Box::new(arg(0)?), Box::new(arg(1)?))),
            "mul" => Ok(Expr::Mul(Box::new(arg(0)?), Box::new(arg(1)?))),
            "div" => Ok(Expr::Div(Box::new(arg(0)?), Box::new(arg(1)?))),
            other => Err(ParseError::BadExpr(format!("unknown op {other:?}"))),
        };
    }
    let constant = match v {
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) if n.is_i64() => Value::Int(n.as_i64().unwrap()),
        Json::Number(n) => Value::Float(n.as_f64().unwrap_or_default()),
        Json::String(s) => Value::Str(s.clone()),
        Json::Null => Value::Null,
        other => return Err(ParseError::BadExpr(format!("not a valid expression leaf: {other}"))),
    };
    Ok(Expr::Const(constant))
}

fn parse_reducer(s: &str) -> Result<Reducer, ParseError> {
    match s {
        "sum" => Ok(Reducer::Sum),
        "count" => Ok(Reducer::Count),
        "distinct" => Ok(Reducer::Distinct),
        "mean" => Ok(Reducer::Mean),
        "median" => Ok(Reducer::Median),
        "mode" => Ok(Reducer::Mode),
        "spread" => Ok(Reducer::Spread),
        "stddev" => Ok(Reducer::Stddev),
        "first" => Ok(Reducer::First),
        "last" => Ok(Reducer::Last),
        "min" => Ok(Reducer::Min),
        "max" => Ok(Reducer::Max),
        other => Err(ParseError::UnknownReducer(other.to_string())),
    }
}

fn group_by_spec(config: &serde_json::Map<String, Json>) -> GroupBySpec {
    if get_bool(config, "all", false) {
        GroupBySpec::All
    } else {
        let keys = get_strings(config, "keys");
        if keys.is_empty() {
            GroupBySpec::Inherit
        } else {
            GroupBySpec::Keys(keys)
        }
    }
}

/// `NewTask(name, script, kind, database-retention-pairs, ttl, vars)`
/// (spec §4.1). `script` is the JSON node/edge definition described above.
pub fn new_task(
    name: impl Into<String>,
    script: &str,
    kind: TaskKind,
    dbrp: Vec<DbRp>,
    ttl: Option<i64>,
    vars: HashMap<String, String>,
    collaborators: &Collaborators,
) -> Result<TaskSpec, ParseError> {
    let def: Json = serde_json::from_str(script)?;

    let from = def
        .get("from")
        .and_then(Json::as_str)
        .map(|s| {
            if let Some(pattern) = s.strip_prefix('/').and_then(|s| s.strip_suffix('/')) {
                regex::Regex::new(pattern).map(MeasurementSelector::Regex).map_err(|e| ParseError::BadExpr(e.to_string()))
            } else {
                Ok(MeasurementSelector::Literal(s.to_string()))
            }
        })
        .transpose()?;

    let where_filter = def.get("where").map(parse_expr).transpose()?;

    let empty_obj = serde_json::Map::new();
    let schedule = def.get("schedule").map(|s| {
        let obj = s.as_object().unwrap_or(&empty_obj);
        BatchSchedule {
            every: get_i64(obj, "every", 0),
            period: get_i64(obj, "period", 0),
            align: get_bool(obj, "align", false),
        }
    });

    let mut nodes = Vec::new();
    for n in def.get("nodes").and_then(Json::as_array).into_iter().flatten() {
        let id = n.get("id").and_then(Json::as_str).ok_or_else(|| ParseError::MissingField("<node>".to_string(), "id"))?;
        let node_type = n.get("type").and_then(Json::as_str).unwrap_or("eval");
        let empty = serde_json::Map::new();
        let config = n.get("config").and_then(Json::as_object).unwrap_or(&empty);
        nodes.push(parse_node(id, node_type, config, collaborators)?);
    }

    let mut edges = Vec::new();
    for e in def.get("edges").and_then(Json::as_array).into_iter().flatten() {
        let from_id = e.get("from").and_then(Json::as_str).ok_or_else(|| ParseError::MissingField("<edge>".to_string(), "from"))?;
        let to_id = e.get("to").and_then(Json::as_str).ok_or_else(|| ParseError::MissingField("<edge>".to_string(), "to"))?;
        edges.push(EdgeSpec { from: from_id.to_string(), to: to_id.to_string() });
    }

    let source = TaskSpec::validate(&nodes, &edges).map_err(|e| ParseError::BadExpr(e.to_string()))?;

    Ok(TaskSpec {
        name: name.into(),
        kind,
        dbrp,
        ttl,
        vars,
        from,
        where_filter,
        schedule,
        nodes,
        edges,
        source,
    })
}

fn parse_node(
    id: &str,
    node_type: &str,
    config: &serde_json::Map<String, Json>,
    collaborators: &Collaborators,
) -> Result<NodeSpec, ParseError> {
    let stream = EdgeKind::Stream;
    let batch = EdgeKind::Batch;

    let (kind, out_kind): (NodeKind, EdgeKind) = match node_type {
        "from" | "query" => {
            // The source node itself carries no operator: it's the
            // task's ingestion point, wired directly by `ExecutingTask`.
            (NodeKind::Operator(Box::new(PassThrough)), if matches!(config.get("kind").and_then(Json::as_str), Some("batch")) { batch } else { stream })
        }
        "window" => {
            let spec = if config.contains_key("periodCount") {
                WindowSpec {
                    period: None,
                    every: None,
                    align: false,
                    fill_period: false,
                    period_count: Some(get_i64(config, "periodCount", 1) as usize),
                    every_count: Some(get_i64(config, "everyCount", 1) as usize),
                }
            } else {
                WindowSpec {
                    period: Some(get_i64(config, "period", 0)),
                    every: Some(get_i64(config, "every", 0)),
                    align: get_bool(config, "align", false),
                    fill_period: get_bool(config, "fillPeriod", false),
                    period_count: None,
                    every_count: None,
                }
            };
            (NodeKind::Operator(Box::new(Window::new(spec))), batch)
        }
        "groupBy" => {
            let mut op = GroupBy::new(group_by_spec(config));
            if get_bool(config, "byMeasurement", false) {
                op = op.by_measurement();
            }
            (NodeKind::Operator(Box::new(op)), stream)
        }
        "flatten" => {
            let on = get_strings(config, "on");
            let tolerance = get_i64(config, "tolerance", 0);
            (NodeKind::Operator(Box::new(Flatten::new(on, tolerance))), stream)
        }
        "combine" => {
            let positions = config
                .get("positions")
                .and_then(Json::as_array)
                .map(|arr| {
                    arr.iter()
                        .map(|p| {
                            let alias = p.get("alias").and_then(Json::as_str).unwrap_or("").to_string();
                            let predicate = p.get("predicate").map(parse_expr).transpose()?.unwrap_or(Expr::Const(Value::Bool(true)));
                            Ok(CombinePosition { predicate, alias })
                        })
                        .collect::<Result<Vec<_>, ParseError>>()
                })
                .transpose()?
                .unwrap_or_default();
            let tolerance = get_i64(config, "tolerance", 0);
            let mut op = Combine::new(positions, tolerance);
            if let Some(d) = config.get("delimiter").and_then(Json::as_str) {
                op = op.delimiter(d.to_string());
            }
            (NodeKind::Operator(Box::new(op)), stream)
        }
        "eval" => {
            let exprs = config
                .get("exprs")
                .and_then(Json::as_array)
                .map(|arr| {
                    arr.iter()
                        .map(|e| {
                            let as_name = e.get("as").and_then(Json::as_str).unwrap_or("").to_string();
                            Ok((parse_expr(e.get("expr").unwrap_or(e))?, as_name))
                        })
                        .collect::<Result<Vec<_>, ParseError>>()
                })
                .transpose()?
                .unwrap_or_default();
            let mut op = Eval::new(exprs);
            if get_bool(config, "keepAll", false) {
                op = op.keep_all();
            } else if config.contains_key("keep") {
                op = op.keep(get_strings(config, "keep"));
            }
            let tags = get_strings(config, "tags");
            if !tags.is_empty() {
                op = op.tags(tags);
            }
            (NodeKind::Operator(Box::new(op)), stream)
        }
        "where" => {
            let predicate = config.get("predicate").map(parse_expr).transpose()?.unwrap_or(Expr::Const(Value::Bool(true)));
            (NodeKind::Operator(Box::new(Where { predicate })), stream)
        }
        "default" => {
            let fields: Vec<(String, Value)> = config
                .get("fields")
                .and_then(Json::as_object)
                .map(|m| m.iter().filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v))).collect())
                .unwrap_or_default();
            let tags: Vec<(String, String)> = config
                .get("tags")
                .and_then(Json::as_object)
                .map(|m| m.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
                .unwrap_or_default();
            (NodeKind::Operator(Box::new(DefaultFields { fields, tags })), stream)
        }
        "delete" => {
            let fields = get_strings(config, "fields");
            let tags = get_strings(config, "tags");
            let regroup = config.get("regroup").map(|_| group_by_spec(config));
            (NodeKind::Operator(Box::new(Delete { fields, tags, regroup })), stream)
        }
        "shift" => (NodeKind::Operator(Box::new(Shift { delta: get_i64(config, "delta", 0) })), stream),
        "aggregate" => {
            let field = get_str(id, config, "field")?.to_string();
            let reducer = parse_reducer(get_str(id, config, "reducer")?)?;
            (NodeKind::Operator(Box::new(Aggregate::new(field, reducer))), stream)
        }
        "percentile" => {
            let field = get_str(id, config, "field")?.to_string();
            let p = get_f64(config, "p", 50.0);
            (NodeKind::Operator(Box::new(Percentile { field, p, use_point_times: get_bool(config, "usePointTimes", false) })), stream)
        }
        "topK" | "bottomK" => {
            let field = get_str(id, config, "field")?.to_string();
            let k = get_i64(config, "k", 1) as usize;
            (
                NodeKind::Operator(Box::new(TopK { k, field, carry_tags: get_strings(config, "tags"), bottom: node_type == "bottomK" })),
                stream,
            )
        }
        "derivative" => {
            let field = get_str(id, config, "field")?.to_string();
            let unit = get_i64(config, "unit", 1_000_000_000);
            (NodeKind::Operator(Box::new(Derivative::new(field, unit))), stream)
        }
        "difference" => (NodeKind::Operator(Box::new(Difference::new(get_str(id, config, "field")?.to_string()))), stream),
        "elapsed" => {
            let field = get_str(id, config, "field")?.to_string();
            let unit = get_i64(config, "unit", 1_000_000_000);
            (NodeKind::Operator(Box::new(Elapsed::new(field, unit))), stream)
        }
        "movingAverage" => {
            let field = get_str(id, config, "field")?.to_string();
            let n = get_i64(config, "n", 1) as usize;
            (NodeKind::Operator(Box::new(MovingAverage::new(field, n))), stream)
        }
        "cumulativeSum" => (NodeKind::Operator(Box::new(CumulativeSum::new(get_str(id, config, "field")?.to_string()))), stream),
        "changeDetect" => (NodeKind::Operator(Box::new(ChangeDetect::new(get_strings(config, "fields")))), stream),
        "stateDuration" => {
            let predicate = config.get("predicate").map(parse_expr).transpose()?.unwrap_or(Expr::Const(Value::Bool(false)));
            let as_name = config.get("as").and_then(Json::as_str).unwrap_or("duration").to_string();
            let unit = get_i64(config, "unit", 1_000_000_000);
            (NodeKind::Operator(Box::new(StateDuration::new(predicate, as_name, unit))), stream)
        }
        "stateCount" => {
            let predicate = config.get("predicate").map(parse_expr).transpose()?.unwrap_or(Expr::Const(Value::Bool(false)));
            let as_name = config.get("as").and_then(Json::as_str).unwrap_or("count").to_string();
            (NodeKind::Operator(Box::new(StateCount::new(predicate, as_name))), stream)
        }
        "holtWinters" => {
            let field = get_str(id, config, "field")?.to_string();
            let h = get_i64(config, "h", 1) as usize;
            let season = get_i64(config, "season", 0) as usize;
            let interval = get_i64(config, "interval", 1_000_000_000);
            let with_fit = get_bool(config, "withFit", false);
            (NodeKind::Operator(Box::new(HoltWinters { field, h, season, interval, with_fit })), stream)
        }
        "autoscale" => {
            let controller_name = get_str(id, config, "controller")?;
            let make = collaborators
                .replica_controllers
                .get(controller_name)
                .ok_or_else(|| ParseError::UnknownCollaborator(controller_name.to_string(), id.to_string()))?;
            let cfg = AutoscaleConfig::new(
                get_str(id, config, "resourceTag")?,
                get_str(id, config, "replicasField")?,
                get_i64(config, "min", 1),
                get_i64(config, "max", i64::MAX),
                make(),
            );
            (NodeKind::Operator(Box::new(cfg)), stream)
        }
        "join" => {
            let aliases = get_strings(config, "aliases");
            let tolerance = get_i64(config, "tolerance", 0);
            let mut spec = JoinSpec::new(aliases, tolerance);
            if let Some(d) = config.get("delimiter").and_then(Json::as_str) {
                spec.delimiter = d.to_string();
            }
            let inputs: Vec<NodeId> = get_strings(config, "inputs");
            (NodeKind::Join(Join::new(spec), inputs), stream)
        }
        "alert" => {
            let mut spec = AlertSpec::new(config.get("taskName").and_then(Json::as_str).unwrap_or(id));
            spec.crit = config.get("crit").map(parse_expr).transpose()?;
            spec.warn = config.get("warn").map(parse_expr).transpose()?;
            spec.info = config.get("info").map(parse_expr).transpose()?;
            spec.no_recoveries = get_bool(config, "noRecoveries", false);
            spec.history_n = get_i64(config, "history", 21) as usize;
            if let Some(d) = config.get("id").and_then(Json::as_str) {
                spec.id_template = d.to_string();
            }
            if let Some(d) = config.get("message").and_then(Json::as_str) {
                spec.message_template = d.to_string();
            }
            spec.state_changes_only = if get_bool(config, "stateChangesOnly", false) {
                match config.get("reminderInterval").and_then(Json::as_i64) {
                    Some(d) => StateChangesOnly::WithReminder(d),
                    None => StateChangesOnly::On,
                }
            } else {
                StateChangesOnly::Off
            };

            let handlers = get_strings(config, "handlers")
                .into_iter()
                .filter_map(|name| collaborators.alert_handlers.get(&name).cloned())
                .collect();

            let cfg = AlertNodeConfig {
                history_capacity: spec.history_n,
                spec,
                topic: config.get("topic").and_then(Json::as_str).unwrap_or(id).to_string(),
                handlers,
                store: collaborators.alert_store.clone(),
            };
            (NodeKind::Alert(cfg), stream)
        }
        "httpOut" => (NodeKind::HttpOut(Default::default()), stream),
        "httpPost" => {
            let url = get_str(id, config, "url")?.to_string();
            let timeout = Duration::from_nanos(get_i64(config, "timeout", 10_000_000_000).max(0) as u64);
            (NodeKind::HttpPost { url, timeout }, stream)
        }
        "influxDBOut" => {
            let sink_name = get_str(id, config, "sink")?;
            let sink = collaborators
                .points_sinks
                .get(sink_name)
                .ok_or_else(|| ParseError::UnknownCollaborator(sink_name.to_string(), id.to_string()))?
                .clone();
            let cfg = InfluxOutConfig {
                db: get_str(id, config, "db")?.to_string(),
                rp: get_str(id, config, "rp")?.to_string(),
                measurement: get_str(id, config, "measurement")?.to_string(),
                flush_interval: Duration::from_nanos(get_i64(config, "flushInterval", 10_000_000_000).max(0) as u64),
                create: get_bool(config, "create", false),
                sink,
            };
            (NodeKind::InfluxOut(cfg), stream)
        }
        "udf" => {
            let command = get_str(id, config, "command")?.to_string();
            let args = get_strings(config, "args");
            let required_edge_type = if get_bool(config, "batch", false) { batch } else { stream };
            (NodeKind::Udf(UdfNodeConfig { command, args, options: HashMap::new(), required_edge_type }), required_edge_type)
        }
        other => return Err(ParseError::UnknownNodeType(id.to_string(), other.to_string())),
    };

    Ok(NodeSpec { id: id.to_string(), kind, out_kind })
}

fn json_to_value(v: &Json) -> Option<Value> {
    match v {
        Json::Bool(b) => Some(Value::Bool(*b)),
        Json::Number(n) if n.is_i64() => Some(Value::Int(n.as_i64()?)),
        Json::Number(n) => Some(Value::Float(n.as_f64()?)),
        Json::String(s) => Some(Value::Str(s.clone())),
        Json::Null => Some(Value::Null),
        _ => None,
    }
}

/// The source node's operator: never actually runs `process` (the
/// ingestion edge is wired directly to it by `ExecutingTask`), but every
/// `NodeSpec` needs a `NodeKind` so the slot is filled with a no-op.
struct PassThrough;

impl flow_ops::Operator for PassThrough {
    fn process(&mut self, msg: flow_core::Message) -> Vec<flow_core::Message> {
        vec![msg]
    }
}
