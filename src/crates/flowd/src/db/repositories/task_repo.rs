//! Task definition repository (spec §4.1): CRUD plus enable/disable over
//! persisted task definitions. Grounded on the teacher's static-method +
//! `query_as::<_, T>` repository pattern.

use chrono::Utc;

use crate::db::connection::DatabasePool;
use crate::db::models::TaskRecord;

pub struct TaskRepository;

impl TaskRepository {
    pub async fn create(pool: &DatabasePool, record: &TaskRecord) -> Result<TaskRecord, sqlx::Error> {
        sqlx::query_as::<_, TaskRecord>(
            "INSERT INTO tasks (name, kind, script, dbrp, ttl, vars, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&record.name)
        .bind(&record.kind)
        .bind(&record.script)
        .bind(&record.dbrp)
        .bind(record.ttl)
        .bind(&record.vars)
        .bind(record.enabled)
        .bind(&record.created_at)
        .bind(&record.updated_at)
        .fetch_one(pool)
        .await
    }

    pub async fn get_by_name(pool: &DatabasePool, name: &str) -> Result<Option<TaskRecord>, sqlx::Error> {
        sqlx::query_as::<_, TaskRecord>("SELECT * FROM tasks WHERE name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &DatabasePool) -> Result<Vec<TaskRecord>, sqlx::Error> {
        sqlx::query_as::<_, TaskRecord>("SELECT * FROM tasks ORDER BY name ASC")
            .fetch_all(pool)
            .await
    }

    /// Every definition flagged `enabled`, for the server to `StartTask` on
    /// boot (spec §4.1).
    pub async fn list_enabled(pool: &DatabasePool) -> Result<Vec<TaskRecord>, sqlx::Error> {
        sqlx::query_as::<_, TaskRecord>("SELECT * FROM tasks WHERE enabled = TRUE ORDER BY name ASC")
            .fetch_all(pool)
            .await
    }

    /// Replace a definition's script/kind/dbrp/ttl/vars (spec §4.1
    /// `NewTask` re-issued under an existing name updates it in place).
    #[allow(clippy::too_many_arguments)]
    pub async fn update(
        pool: &DatabasePool,
        name: &str,
        kind: &str,
        script: &str,
        dbrp: &str,
        ttl: Option<i64>,
        vars: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE tasks SET kind = ?, script = ?, dbrp = ?, ttl = ?, vars = ?, updated_at = ? WHERE name = ?")
            .bind(kind)
            .bind(script)
            .bind(dbrp)
            .bind(ttl)
            .bind(vars)
            .bind(&now)
            .bind(name)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn set_enabled(pool: &DatabasePool, name: &str, enabled: bool) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE tasks SET enabled = ?, updated_at = ? WHERE name = ?")
            .bind(enabled)
            .bind(&now)
            .bind(name)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn delete(pool: &DatabasePool, name: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM tasks WHERE name = ?").bind(name).execute(pool).await?;
        Ok(())
    }

    pub async fn count(pool: &DatabasePool) -> Result<i64, sqlx::Error> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks").fetch_one(pool).await?;
        Ok(result.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "CREATE TABLE tasks (
        name TEXT PRIMARY KEY NOT NULL,
        kind TEXT NOT NULL,
        script TEXT NOT NULL,
        dbrp TEXT NOT NULL,
        ttl INTEGER,
        vars TEXT NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )";

    async fn pool_with_schema() -> DatabasePool {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(SCHEMA).execute(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn create_then_get_by_name_round_trips() {
        let pool = pool_with_schema().await;
        let record = TaskRecord::new("cpu_alert", "stream", "{}", "[]");
        TaskRepository::create(&pool, &record).await.unwrap();

        let fetched = TaskRepository::get_by_name(&pool, "cpu_alert").await.unwrap().unwrap();
        assert_eq!(fetched.name, "cpu_alert");
        assert!(fetched.enabled);
    }

    #[tokio::test]
    async fn list_enabled_excludes_disabled_definitions() {
        let pool = pool_with_schema().await;
        TaskRepository::create(&pool, &TaskRecord::new("a", "stream", "{}", "[]")).await.unwrap();
        TaskRepository::create(&pool, &TaskRecord::new("b", "stream", "{}", "[]")).await.unwrap();
        TaskRepository::set_enabled(&pool, "b", false).await.unwrap();

        let enabled = TaskRepository::list_enabled(&pool).await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "a");
    }

    #[tokio::test]
    async fn update_replaces_script_and_bumps_updated_at() {
        let pool = pool_with_schema().await;
        let record = TaskRecord::new("cpu_alert", "stream", "{}", "[]");
        TaskRepository::create(&pool, &record).await.unwrap();

        TaskRepository::update(&pool, "cpu_alert", "stream", r#"{"nodes":[]}"#, "[]", Some(60), "{}")
            .await
            .unwrap();

        let fetched = TaskRepository::get_by_name(&pool, "cpu_alert").await.unwrap().unwrap();
        assert_eq!(fetched.script, r#"{"nodes":[]}"#);
        assert_eq!(fetched.ttl, Some(60));
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let pool = pool_with_schema().await;
        TaskRepository::create(&pool, &TaskRecord::new("cpu_alert", "stream", "{}", "[]")).await.unwrap();
        TaskRepository::delete(&pool, "cpu_alert").await.unwrap();
        assert!(TaskRepository::get_by_name(&pool, "cpu_alert").await.unwrap().is_none());
    }
}
