use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use super::{query_rejection, require_user};
use crate::response::{ok, AppError};
use crate::state::AppState;

const DEFAULT_NUM_SAMPLES: i64 = 1;

pub fn router() -> Router<AppState> {
    Router::new().route("/:user_id/samplings/:list_id/:app_id", get(recent_samplings))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SamplingParams {
    num_samples: Option<String>,
}

async fn recent_samplings(
    State(state): State<AppState>,
    Path((user_id, list_id, app_id)): Path<(String, String, String)>,
    params: Result<Query<SamplingParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params.map_err(query_rejection)?;
    let user_id = require_user(&user_id)?;

    let n = match params.num_samples.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_NUM_SAMPLES,
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| AppError::bad_request("numSamples must be an integer"))?,
    };
    if n < 1 {
        return Err(AppError::bad_request("numSamples must be at least 1"));
    }

    let summaries = state
        .engine()
        .recent_samplings(user_id, Some(list_id.as_str()), Some(app_id.as_str()), n as usize)
        .await?;
    Ok(ok(summaries).into_response())
}
