//! Database models
//!
//! Core data models for persistent storage in the orchestrator database.
//! All timestamp fields are stored as ISO8601 strings (TEXT in SQLite) due to
//! sqlx and SQLite type limitations with chrono::DateTime<Utc>.

pub mod task;

pub use task::TaskRecord;
