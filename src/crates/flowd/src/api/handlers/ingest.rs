//! Line-protocol write ingest and `httpOut`/`httpPost` result retrieval
//! (spec §6.1, §4.9, §6.2).

use std::collections::HashMap;

use axum::extract::{Path, Query, State};

use crate::api::error::{ApiError, ApiResult};
use crate::api::response;
use crate::api::routes::AppState;
use flow_core::lineproto::{self, Precision};

/// `POST /write?db=...&rp=...&precision=...`: decode the body as
/// line-protocol and dispatch each point through `TaskMaster::points_writer`
/// (spec §6.1).
pub async fn write_points(
    State(app_state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> ApiResult<impl axum::response::IntoResponse> {
    let db = query.get("db").ok_or_else(|| ApiError::BadRequest("missing `db` query parameter".to_string()))?;
    let rp = query.get("rp").cloned().unwrap_or_default();
    let precision = query
        .get("precision")
        .map(|p| Precision::parse(p).ok_or_else(|| ApiError::BadRequest(format!("unknown precision {p:?}"))))
        .transpose()?
        .unwrap_or(Precision::Nanoseconds);

    let now_ns = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
    let points = lineproto::parse_lines(&body, precision, now_ns).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    app_state.task_master.points_writer(db, &rp, points).await;
    Ok(response::no_content())
}

/// `GET /tasks/:name/:endpoint`: the latest materialized result for a
/// running task's `httpOut(endpoint)` node (spec §4.9).
pub async fn get_task_result(
    State(app_state): State<AppState>,
    Path((name, endpoint)): Path<(String, String)>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let slot = app_state
        .task_master
        .http_out_result(&name, &endpoint)
        .ok_or_else(|| ApiError::NotFound(format!("no httpOut endpoint {endpoint:?} on task {name:?}")))?;
    let result = slot.read().clone();
    Ok(response::ok(result))
}
