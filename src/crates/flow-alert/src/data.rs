//! `AlertData`: the record built on a level change and handed to every
//! configured handler (spec §4.7 "Transitions and messages").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use flow_core::{Point, Tags};

use crate::level::Level;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertData {
    pub id: String,
    pub message: String,
    pub details: String,
    pub time: i64,
    pub duration_since_entry: i64,
    pub level: Level,
    pub previous_level: Level,
    pub recoverable: bool,
    pub task_name: String,
    pub tags: Tags,
    pub fields: HashMap<String, flow_core::Value>,
}

/// Variables exposed to templates rendered via `flow_ops::render_template`:
/// `.Name`, `.TaskName`, `.ID`, `.Time`, `.Level`, `.Tags`, `.Fields`.
pub fn template_vars(task_name: &str, id: &str, point: &Point, level: Level) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("Name".to_string(), point.measurement.clone());
    vars.insert("TaskName".to_string(), task_name.to_string());
    vars.insert("ID".to_string(), id.to_string());
    vars.insert("Time".to_string(), point.time.to_string());
    vars.insert("Level".to_string(), level.to_string());
    for (k, v) in point.tags.iter() {
        vars.insert(format!("Tags.{k}"), v.clone());
    }
    for (k, v) in &point.fields {
        vars.insert(format!("Fields.{k}"), v.render());
    }
    vars
}
