//! Task API models and DTOs (spec §4.1 `NewTask`/`StartTask`/`StopTask`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::db::models::TaskRecord;

fn default_true() -> bool {
    true
}

/// A `(database, retentionPolicy)` pair a task subscribes to or queries
/// (spec §4.1 `dbrp`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DbRpDto {
    pub database: String,
    #[serde(rename = "retentionPolicy")]
    pub retention_policy: String,
}

/// Request to define a new task.
///
/// `script` is the compiled node/edge JSON `taskmaster::parse::new_task`
/// decodes (spec §4.1 "Parses the script... returns a frozen DAG"); the
/// DSL/query-language grammar that would normally produce this JSON is out
/// of scope, so callers submit the intermediate form directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    /// `"stream"` or `"batch"`.
    pub kind: String,
    pub script: serde_json::Value,
    #[serde(default)]
    pub dbrp: Vec<DbRpDto>,
    #[serde(default)]
    pub ttl: Option<i64>,
    #[serde(default)]
    pub vars: HashMap<String, String>,
    /// Whether `StartTask` should run immediately after the definition is
    /// stored (spec §4.1: tasks are enabled/disabled independent of whether
    /// they are currently running).
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl CreateTaskRequest {
    pub fn validate(&self) -> ApiResult<()> {
        crate::api::middleware::validation::validate_not_empty(&self.name, "name")?;
        crate::api::middleware::validation::validate_string_length(&self.name, "name", 1, 255)?;
        if self.kind != "stream" && self.kind != "batch" {
            return Err(ApiError::ValidationError("kind must be \"stream\" or \"batch\"".to_string()));
        }
        Ok(())
    }
}

/// Request to redefine an existing task (spec §4.1: re-issuing `NewTask`
/// under an existing name replaces its definition in place).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateTaskRequest {
    pub kind: Option<String>,
    pub script: Option<serde_json::Value>,
    pub dbrp: Option<Vec<DbRpDto>>,
    pub ttl: Option<i64>,
    pub vars: Option<HashMap<String, String>>,
}

impl UpdateTaskRequest {
    pub fn has_updates(&self) -> bool {
        self.kind.is_some() || self.script.is_some() || self.dbrp.is_some() || self.ttl.is_some() || self.vars.is_some()
    }
}

/// Task definition response (flattened `TaskRecord` plus live status).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub name: String,
    pub kind: String,
    pub script: serde_json::Value,
    pub dbrp: Vec<DbRpDto>,
    pub ttl: Option<i64>,
    pub vars: HashMap<String, String>,
    pub enabled: bool,
    /// Whether `TaskMaster` currently has this task running.
    pub running: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskResponse {
    pub fn from_record(record: TaskRecord, running: bool) -> Self {
        Self {
            script: serde_json::from_str(&record.script).unwrap_or(serde_json::Value::Null),
            dbrp: serde_json::from_str(&record.dbrp).unwrap_or_default(),
            vars: serde_json::from_str(&record.vars).unwrap_or_default(),
            name: record.name,
            kind: record.kind,
            ttl: record.ttl,
            enabled: record.enabled,
            running,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Query parameters for listing tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskListQuery {
    pub enabled: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_task_request_rejects_unknown_kind() {
        let req = CreateTaskRequest {
            name: "cpu_alert".to_string(),
            kind: "weekly".to_string(),
            script: serde_json::json!({}),
            dbrp: vec![],
            ttl: None,
            vars: HashMap::new(),
            enabled: true,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn create_task_request_accepts_stream_kind() {
        let req = CreateTaskRequest {
            name: "cpu_alert".to_string(),
            kind: "stream".to_string(),
            script: serde_json::json!({}),
            dbrp: vec![],
            ttl: None,
            vars: HashMap::new(),
            enabled: true,
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn update_task_request_has_updates() {
        let req = UpdateTaskRequest { ttl: Some(60), ..Default::default() };
        assert!(req.has_updates());
        assert!(!UpdateTaskRequest::default().has_updates());
    }
}
