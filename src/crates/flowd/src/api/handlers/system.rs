//! System information and metrics endpoint handlers

use axum::extract::State;

use crate::api::models::{StatusResponse, SystemInfoResponse, SystemMetricsResponse};
use crate::api::response;
use crate::db::repositories::TaskRepository;

/// Get system information
///
/// GET /api/v1/system/info
pub async fn system_info() -> impl axum::response::IntoResponse {
    let info = SystemInfoResponse {
        version: crate::version::VERSION.to_string(),
        build_timestamp: crate::version::BUILD_TIMESTAMP.to_string(),
        git_commit: "unknown".to_string(),
        rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
    };
    response::ok(info)
}

/// Get system metrics
///
/// GET /api/v1/system/metrics
pub async fn system_metrics(
    State(app_state): State<crate::api::routes::AppState>,
) -> impl axum::response::IntoResponse {
    let pool = app_state.db.pool();
    let total_tasks = TaskRepository::count(pool).await.unwrap_or(0);
    let enabled_tasks = TaskRepository::list_enabled(pool).await.map(|v| v.len() as i64).unwrap_or(0);
    let running_tasks = app_state.task_master.task_names().len() as i64;

    response::ok(SystemMetricsResponse { total_tasks, running_tasks, enabled_tasks, memory_bytes: None })
}

/// Get server status
///
/// GET /api/status
pub async fn status(State(app_state): State<crate::api::routes::AppState>) -> impl axum::response::IntoResponse {
    let db_status = match app_state.db.health_check().await {
        Ok(_) => "connected".to_string(),
        Err(_) => "disconnected".to_string(),
    };

    let status = StatusResponse {
        name: crate::version::PKG_NAME.to_string(),
        version: crate::version::VERSION.to_string(),
        status: "running".to_string(),
        database: db_status,
        running_tasks: app_state.task_master.task_names().len() as u32,
    };

    response::ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_info_response() {
        let info = SystemInfoResponse {
            version: "1.0.0".to_string(),
            build_timestamp: "2025-01-01".to_string(),
            git_commit: "abc123".to_string(),
            rust_version: "1.75".to_string(),
        };
        assert_eq!(info.version, "1.0.0");
    }
}
