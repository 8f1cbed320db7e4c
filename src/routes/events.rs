use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use super::{json_rejection, require_user};
use crate::mastery::OutcomeBatch;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/:user_id/events", post(record_events))
}

async fn record_events(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<OutcomeBatch>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(batch) = payload.map_err(json_rejection)?;
    let user_id = require_user(&user_id)?;

    let receipt = state.engine().record_outcomes(user_id, batch).await?;
    Ok(ok(receipt).into_response())
}
