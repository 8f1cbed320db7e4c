use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{json_rejection, require_user};
use crate::mastery::{classify, score, MasteryState, StatKey, StatRecord};
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:user_id/items/:item_id/mastery", get(item_mastery))
        .route("/:user_id/schedule", post(schedule))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MasteryView {
    item_id: String,
    score: Option<f64>,
    state: MasteryState,
    stat: Option<StatRecord>,
}

async fn item_mastery(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let user_id = require_user(&user_id)?;
    let engine = state.engine();

    let record = engine.stat(&StatKey::item(user_id, item_id.as_str())).await?;
    let view = MasteryView {
        score: record.as_ref().map(|r| score(Some(r))),
        state: classify(record.as_ref(), &engine.config().thresholds),
        stat: record,
        item_id,
    };
    Ok(ok(view).into_response())
}

#[derive(Debug, Deserialize)]
struct ScheduleRequest {
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct ScheduleResponse {
    items: Vec<Value>,
}

/// Items may be bare ids or objects carrying an `id`; they come back in the
/// same shape, reordered.
async fn schedule(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<ScheduleRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(json_rejection)?;
    let user_id = require_user(&user_id)?;

    let items = state.engine().schedule_items(user_id, request.items).await?;
    Ok(ok(ScheduleResponse { items }).into_response())
}
