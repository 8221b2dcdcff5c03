//! Persisted task definitions (spec §4.1): the `(name, script, kind, dbrp,
//! ttl, vars)` tuple `NewTask` compiles into a `TaskSpec` and `StartTask`
//! runs, stored so tasks survive a server restart. The running DAG itself
//! (`taskmaster::spec::TaskSpec`, full of `Box<dyn Operator>`s and live
//! channels) is never persisted — only the definition it was built from.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row shape for the `tasks` table. All timestamp fields are ISO8601
/// strings (TEXT in SQLite), matching the rest of this crate's models.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskRecord {
    /// Task name (spec §3 "Task"); also the primary key.
    pub name: String,

    /// `stream` or `batch`.
    pub kind: String,

    /// The JSON node/edge definition `taskmaster::parse::new_task` compiles
    /// (spec §4.1 `NewTask`'s "script" parameter).
    pub script: String,

    /// `[{database, retentionPolicy}, ...]`, JSON-encoded.
    pub dbrp: String,

    /// Nanoseconds; `NULL` for no TTL.
    pub ttl: Option<i64>,

    /// Template variable bindings, JSON-encoded `{name: value}`.
    pub vars: String,

    /// Whether `StartTask` should be called for this definition on server
    /// startup (spec §4.1: tasks are `enabled`/`disabled` independent of
    /// whether they're currently running).
    pub enabled: bool,

    pub created_at: String,
    pub updated_at: String,
}

impl TaskRecord {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, script: impl Into<String>, dbrp: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            name: name.into(),
            kind: kind.into(),
            script: script.into(),
            dbrp: dbrp.into(),
            ttl: None,
            vars: "{}".to_string(),
            enabled: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_vars(mut self, vars: impl Into<String>) -> Self {
        self.vars = vars.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_to_enabled_with_no_ttl() {
        let rec = TaskRecord::new("cpu_alert", "stream", "{}", "[]");
        assert_eq!(rec.name, "cpu_alert");
        assert!(rec.enabled);
        assert_eq!(rec.ttl, None);
    }

    #[test]
    fn with_ttl_sets_the_field() {
        let rec = TaskRecord::new("cpu_alert", "stream", "{}", "[]").with_ttl(3_600_000_000_000);
        assert_eq!(rec.ttl, Some(3_600_000_000_000));
    }
}
