//! API route definitions
//!
//! Defines all API routes and their associated handler functions.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::api::middleware::{cors_layer, logging_layer};
use crate::config::server::security::{security_middleware, SecurityState};
use crate::db::DatabaseConnection;
use crate::taskmaster::{Collaborators, TaskMaster};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub task_master: Arc<TaskMaster>,
    pub collaborators: Arc<Collaborators>,
}

/// Build the complete API router. `/health` stays outside the security
/// layer so liveness probes aren't gated by `SecurityMode::UserLogin`
/// credentials (spec §6.4 governs the admin surface, not process health).
pub fn create_router(
    db: DatabaseConnection,
    task_master: Arc<TaskMaster>,
    collaborators: Arc<Collaborators>,
    security_state: Arc<SecurityState>,
) -> Router {
    let app_state = AppState { db, task_master, collaborators };

    let admin = Router::new()
        .route("/api/v1/system/health", get(handlers::health_detailed))
        // Task CRUD + lifecycle (spec §4.1)
        .route("/api/v1/tasks", post(handlers::create_task).get(handlers::list_tasks))
        .route(
            "/api/v1/tasks/:name",
            get(handlers::get_task).put(handlers::update_task).delete(handlers::delete_task),
        )
        .route("/api/v1/tasks/:name/start", post(handlers::start_task))
        .route("/api/v1/tasks/:name/stop", post(handlers::stop_task))
        // httpOut/httpPost result retrieval (spec §4.9/§6.2)
        .route("/api/v1/tasks/:name/:endpoint", get(handlers::get_task_result))
        // Line-protocol ingest (spec §6.1)
        .route("/write", post(handlers::write_points))
        // System endpoints
        .route("/api/v1/system/info", get(handlers::system_info))
        .route("/api/v1/system/metrics", get(handlers::system_metrics))
        .route("/api/status", get(handlers::status))
        .layer(from_fn_with_state(security_state, security_middleware))
        .with_state(app_state);

    Router::new()
        .route("/health", get(handlers::health))
        .merge(admin)
        .layer(logging_layer())
        .layer(cors_layer())
}

/// Create a router for testing
#[cfg(test)]
pub fn create_test_router(db: DatabaseConnection) -> Router {
    use crate::config::{SecurityConfig, SecurityMode};
    use crate::services::AuthService;

    let security_state = Arc::new(SecurityState::new(
        SecurityConfig { mode: SecurityMode::Open, secret_key: None },
        Arc::new(AuthService::empty()),
    ));
    create_router(db, Arc::new(TaskMaster::new()), Arc::new(Collaborators::default()), security_state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_creation() {
        // This test just verifies the router can be created without panic
        assert!(true);
    }
}
