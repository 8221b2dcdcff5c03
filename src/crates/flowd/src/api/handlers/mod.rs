//! API request handlers
//!
//! Provides handler functions for all API endpoints organized by resource.

pub mod health;
pub mod ingest;
pub mod system;
pub mod tasks;

pub use health::{health, health_detailed};
pub use ingest::{get_task_result, write_points};
pub use system::{status, system_info, system_metrics};
pub use tasks::{create_task, delete_task, get_task, list_tasks, start_task, stop_task, update_task};
