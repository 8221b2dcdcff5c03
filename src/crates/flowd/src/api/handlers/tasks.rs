//! Task CRUD + lifecycle endpoint handlers (spec §4.1 `NewTask`/`StartTask`/
//! `StopTask`).
//!
//! Grounded on the teacher's `TaskServiceImpl` CRUD flow (validate, persist,
//! respond), generalized from a bare row-store to also drive `TaskMaster`:
//! a definition's `enabled` flag decides whether it's compiled and started
//! immediately, not just recorded.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::api::{
    error::{ApiError, ApiResult},
    models::{CreateTaskRequest, DbRpDto, TaskListQuery, TaskResponse, UpdateTaskRequest},
    response,
    routes::AppState,
};
use crate::db::models::TaskRecord;
use crate::db::repositories::TaskRepository;
use crate::taskmaster::{self, DbRp, TaskKind};

fn parse_kind(kind: &str) -> TaskKind {
    if kind == "batch" {
        TaskKind::Batch
    } else {
        TaskKind::Stream
    }
}

fn to_dbrp(dtos: &[DbRpDto]) -> Vec<DbRp> {
    dtos.iter()
        .map(|d| DbRp { database: d.database.clone(), retention_policy: d.retention_policy.clone() })
        .collect()
}

/// Compile and start a task definition against `TaskMaster`. Callers that
/// only want the definition persisted (an initially-`disabled` task) skip
/// this entirely.
fn start(app_state: &AppState, record: &TaskRecord) -> ApiResult<()> {
    let dbrp: Vec<DbRpDto> = serde_json::from_str(&record.dbrp).unwrap_or_default();
    let vars: std::collections::HashMap<String, String> = serde_json::from_str(&record.vars).unwrap_or_default();
    let spec = taskmaster::new_task(
        record.name.clone(),
        &record.script,
        parse_kind(&record.kind),
        to_dbrp(&dbrp),
        record.ttl,
        vars,
        &app_state.collaborators,
    )?;
    app_state.task_master.start_task(spec)?;
    Ok(())
}

/// Create a new task definition.
///
/// POST /api/v1/tasks
pub async fn create_task(
    State(app_state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    req.validate()?;

    let pool = app_state.db.pool();
    if TaskRepository::get_by_name(pool, &req.name).await.map_err(|e| ApiError::InternalError(e.to_string()))?.is_some() {
        return Err(ApiError::Conflict(format!("task {:?} already exists", req.name)));
    }

    let dbrp = serde_json::to_string(&req.dbrp).unwrap_or_default();
    let vars = serde_json::to_string(&req.vars).unwrap_or_else(|_| "{}".to_string());
    let mut record = TaskRecord::new(req.name, req.kind, req.script.to_string(), dbrp).with_vars(vars);
    if let Some(ttl) = req.ttl {
        record = record.with_ttl(ttl);
    }
    record.enabled = req.enabled;

    let created = TaskRepository::create(pool, &record).await.map_err(|e| ApiError::InternalError(e.to_string()))?;

    if created.enabled {
        start(&app_state, &created)?;
    }

    tracing::info!(task = %created.name, "created task definition");
    Ok((StatusCode::CREATED, Json(TaskResponse::from_record(created, req.enabled))))
}

/// List task definitions with optional `enabled` filter and pagination.
///
/// GET /api/v1/tasks
pub async fn list_tasks(
    State(app_state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let page = query.page.unwrap_or(0);
    let per_page = query.per_page.unwrap_or(20);
    crate::api::middleware::validation::validate_pagination(page, per_page, 100)?;

    let pool = app_state.db.pool();
    let records = TaskRepository::list(pool).await.map_err(|e| ApiError::InternalError(e.to_string()))?;

    let filtered: Vec<TaskRecord> = records.into_iter().filter(|t| query.enabled.map_or(true, |e| t.enabled == e)).collect();

    let total = filtered.len() as u32;
    let offset = (page as usize) * (per_page as usize);
    let responses: Vec<TaskResponse> = filtered
        .into_iter()
        .skip(offset)
        .take(per_page as usize)
        .map(|t| {
            let running = app_state.task_master.is_running(&t.name);
            TaskResponse::from_record(t, running)
        })
        .collect();

    Ok(response::paginated(responses, page, per_page, total))
}

/// Get a single task definition by name.
///
/// GET /api/v1/tasks/:name
pub async fn get_task(State(app_state): State<AppState>, Path(name): Path<String>) -> ApiResult<impl axum::response::IntoResponse> {
    let pool = app_state.db.pool();
    let record = TaskRepository::get_by_name(pool, &name)
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("task not found: {name}")))?;

    let running = app_state.task_master.is_running(&name);
    Ok(response::ok(TaskResponse::from_record(record, running)))
}

/// Replace a task's definition, restarting it if it's currently running
/// (spec §4.1: re-issuing `NewTask` under an existing name updates it in
/// place).
///
/// PUT /api/v1/tasks/:name
pub async fn update_task(
    State(app_state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if !req.has_updates() {
        return Err(ApiError::BadRequest("no fields to update".to_string()));
    }

    let pool = app_state.db.pool();
    let existing = TaskRepository::get_by_name(pool, &name)
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("task not found: {name}")))?;

    let kind = req.kind.unwrap_or(existing.kind);
    let script = req.script.map(|s| s.to_string()).unwrap_or(existing.script);
    let dbrp = req.dbrp.map(|d| serde_json::to_string(&d).unwrap_or_default()).unwrap_or(existing.dbrp);
    let ttl = req.ttl.or(existing.ttl);
    let vars = req.vars.map(|v| serde_json::to_string(&v).unwrap_or_else(|_| "{}".to_string())).unwrap_or(existing.vars);

    TaskRepository::update(pool, &name, &kind, &script, &dbrp, ttl, &vars)
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let was_running = app_state.task_master.is_running(&name);
    if was_running {
        app_state.task_master.stop_task(&name).await?;
    }

    let updated = TaskRepository::get_by_name(pool, &name)
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("task not found: {name}")))?;

    if was_running && updated.enabled {
        start(&app_state, &updated)?;
    }

    tracing::info!(task = %name, "updated task definition");
    Ok(response::ok(TaskResponse::from_record(updated, was_running)))
}

/// Delete a task definition, stopping it first if running.
///
/// DELETE /api/v1/tasks/:name
pub async fn delete_task(State(app_state): State<AppState>, Path(name): Path<String>) -> ApiResult<impl axum::response::IntoResponse> {
    if app_state.task_master.is_running(&name) {
        app_state.task_master.stop_task(&name).await?;
    }

    let pool = app_state.db.pool();
    TaskRepository::delete(pool, &name).await.map_err(|e| ApiError::InternalError(e.to_string()))?;

    tracing::info!(task = %name, "deleted task definition");
    Ok(StatusCode::NO_CONTENT)
}

/// `StartTask(name)`: compile the stored definition and register it with
/// `TaskMaster`.
///
/// POST /api/v1/tasks/:name/start
pub async fn start_task(State(app_state): State<AppState>, Path(name): Path<String>) -> ApiResult<impl axum::response::IntoResponse> {
    let pool = app_state.db.pool();
    let record = TaskRepository::get_by_name(pool, &name)
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("task not found: {name}")))?;

    if app_state.task_master.is_running(&name) {
        return Err(ApiError::Conflict(format!("task {name:?} is already running")));
    }

    start(&app_state, &record)?;
    TaskRepository::set_enabled(pool, &name, true).await.map_err(|e| ApiError::InternalError(e.to_string()))?;
    Ok(response::ok(TaskResponse::from_record(record, true)))
}

/// `StopTask(name)` + `Drain()`.
///
/// POST /api/v1/tasks/:name/stop
pub async fn stop_task(State(app_state): State<AppState>, Path(name): Path<String>) -> ApiResult<impl axum::response::IntoResponse> {
    app_state.task_master.stop_task(&name).await?;

    let pool = app_state.db.pool();
    TaskRepository::set_enabled(pool, &name, false).await.map_err(|e| ApiError::InternalError(e.to_string()))?;

    let record = TaskRepository::get_by_name(pool, &name)
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("task not found: {name}")))?;
    Ok(response::ok(TaskResponse::from_record(record, false)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kind_defaults_to_stream() {
        assert_eq!(parse_kind("nonsense"), TaskKind::Stream);
        assert_eq!(parse_kind("batch"), TaskKind::Batch);
    }
}
