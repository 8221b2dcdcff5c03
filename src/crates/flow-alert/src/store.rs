//! Alert state persistence, keyed by topic (spec §4.7 "Persistence", §6.3
//! "Alert Service"). Grounded on the repository-per-table pattern used
//! elsewhere in this workspace's storage layer: a thin wrapper around a
//! `sqlx` pool with hand-written queries, converting `sqlx::Error` into a
//! local error type.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use thiserror::Error;

use crate::level::Level;
use crate::state::AlertState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("corrupt stored level {0:?}")]
    BadLevel(String),
}

pub struct AlertStore {
    pool: SqlitePool,
}

fn level_to_str(l: Level) -> &'static str {
    match l {
        Level::Ok => "ok",
        Level::Info => "info",
        Level::Warning => "warning",
        Level::Critical => "critical",
    }
}

fn level_from_str(s: &str) -> Result<Level, StoreError> {
    match s {
        "ok" => Ok(Level::Ok),
        "info" => Ok(Level::Info),
        "warning" => Ok(Level::Warning),
        "critical" => Ok(Level::Critical),
        other => Err(StoreError::BadLevel(other.to_string())),
    }
}

impl AlertStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS alert_states (
                topic TEXT NOT NULL,
                alert_id TEXT NOT NULL,
                level TEXT NOT NULL,
                previous_level TEXT NOT NULL,
                event_time INTEGER NOT NULL,
                last_emit_time INTEGER NOT NULL,
                history_json TEXT NOT NULL,
                PRIMARY KEY (topic, alert_id)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Collect an event and persist the resulting state (spec §6.3
    /// `Collect`).
    pub async fn collect(&self, topic: &str, alert_id: &str, state: &AlertState) -> Result<(), StoreError> {
        let history_json = serde_json::to_string(&state.history).unwrap_or_else(|_| "[]".to_string());
        sqlx::query(
            "INSERT INTO alert_states (topic, alert_id, level, previous_level, event_time, last_emit_time, history_json)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(topic, alert_id) DO UPDATE SET
                level = excluded.level,
                previous_level = excluded.previous_level,
                event_time = excluded.event_time,
                last_emit_time = excluded.last_emit_time,
                history_json = excluded.history_json",
        )
        .bind(topic)
        .bind(alert_id)
        .bind(level_to_str(state.level))
        .bind(level_to_str(state.previous_level))
        .bind(state.event_time)
        .bind(state.last_emit_time)
        .bind(history_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `RestoreTopic`/load-on-start: reload a single alert's state.
    pub async fn load(&self, topic: &str, alert_id: &str, history_capacity: usize) -> Result<Option<AlertState>, StoreError> {
        let row = sqlx::query(
            "SELECT level, previous_level, event_time, last_emit_time, history_json
             FROM alert_states WHERE topic = ? AND alert_id = ?",
        )
        .bind(topic)
        .bind(alert_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let level: String = row.try_get("level")?;
        let previous_level: String = row.try_get("previous_level")?;
        let event_time: i64 = row.try_get("event_time")?;
        let last_emit_time: i64 = row.try_get("last_emit_time")?;
        let history_json: String = row.try_get("history_json")?;
        let history: std::collections::VecDeque<Level> = serde_json::from_str(&history_json).unwrap_or_default();

        let mut state = AlertState::new(history_capacity);
        state.level = level_from_str(&level)?;
        state.previous_level = level_from_str(&previous_level)?;
        state.event_time = event_time;
        state.last_emit_time = last_emit_time;
        state.history = history;
        Ok(Some(state))
    }

    /// `CloseTopic`: purge persisted state for a topic (e.g. alert reached
    /// OK with persistence configured to delete rather than retain).
    pub async fn delete(&self, topic: &str, alert_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM alert_states WHERE topic = ? AND alert_id = ?")
            .bind(topic)
            .bind(alert_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// `TopicState`: summarized level + count of non-OK alert ids.
    pub async fn topic_state(&self, topic: &str) -> Result<(Level, i64), StoreError> {
        let rows = sqlx::query("SELECT level FROM alert_states WHERE topic = ?")
            .bind(topic)
            .fetch_all(&self.pool)
            .await?;
        let mut highest = Level::Ok;
        let mut active = 0i64;
        for row in rows {
            let level_str: String = row.try_get("level")?;
            let level = level_from_str(&level_str)?;
            if level != Level::Ok {
                active += 1;
            }
            if level > highest {
                highest = level;
            }
        }
        Ok((highest, active))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collect_then_load_roundtrips_state() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = AlertStore::new(pool);
        store.migrate().await.unwrap();

        let mut state = AlertState::new(21);
        state.level = Level::Critical;
        state.previous_level = Level::Ok;
        state.event_time = 100;
        state.push_history(Level::Critical);

        store.collect("cpu-alerts", "host-a", &state).await.unwrap();
        let loaded = store.load("cpu-alerts", "host-a", 21).await.unwrap().unwrap();
        assert_eq!(loaded.level, Level::Critical);
        assert_eq!(loaded.event_time, 100);
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = AlertStore::new(pool);
        store.migrate().await.unwrap();
        let state = AlertState::new(21);
        store.collect("t", "a", &state).await.unwrap();
        store.delete("t", "a").await.unwrap();
        assert!(store.load("t", "a", 21).await.unwrap().is_none());
    }
}
