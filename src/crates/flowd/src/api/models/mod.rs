//! API data transfer objects (DTOs) and response models
//!
//! Provides request/response structures for API endpoints with validation.

pub mod task;

pub use task::{CreateTaskRequest, DbRpDto, TaskListQuery, TaskResponse, UpdateTaskRequest};

/// System health response
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    /// Overall status
    pub status: String,

    /// Database connection status
    pub database: String,

    /// API version
    pub version: String,

    /// Current timestamp
    pub timestamp: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn new(status: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            database: database.into(),
            version: crate::version::VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// System info response
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SystemInfoResponse {
    /// Application version
    pub version: String,

    /// Build timestamp
    pub build_timestamp: String,

    /// Git commit hash
    pub git_commit: String,

    /// Rust version
    pub rust_version: String,
}

/// System metrics response
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SystemMetricsResponse {
    /// Total defined tasks
    pub total_tasks: i64,

    /// Currently running tasks (`TaskMaster`-owned)
    pub running_tasks: i64,

    /// Enabled task definitions
    pub enabled_tasks: i64,

    /// Memory usage estimate (bytes)
    pub memory_bytes: Option<u64>,
}

/// Server status response
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StatusResponse {
    /// Server name
    pub name: String,

    /// Server version
    pub version: String,

    /// Server status
    pub status: String,

    /// Database connection status
    pub database: String,

    /// Number of currently running tasks
    pub running_tasks: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response() {
        let health = HealthResponse::new("ok", "connected");
        assert_eq!(health.status, "ok");
        assert_eq!(health.database, "connected");
        assert!(!health.version.is_empty());
        assert!(!health.timestamp.is_empty());
    }

    #[test]
    fn test_system_info_response() {
        let info = SystemInfoResponse {
            version: "1.0.0".to_string(),
            build_timestamp: "2025-01-01".to_string(),
            git_commit: "abc123".to_string(),
            rust_version: "1.75".to_string(),
        };
        assert_eq!(info.version, "1.0.0");
        assert_eq!(info.git_commit, "abc123");
    }

    #[test]
    fn test_system_metrics_response() {
        let metrics = SystemMetricsResponse {
            total_tasks: 100,
            running_tasks: 10,
            enabled_tasks: 90,
            memory_bytes: Some(1024 * 1024),
        };
        assert_eq!(metrics.total_tasks, 100);
        assert_eq!(metrics.running_tasks, 10);
    }
}
