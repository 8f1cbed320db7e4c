use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::{query_rejection, require_user};
use crate::mastery::{classify, score, MasteryState, MasteryThresholds, StatRecord, SubjectKind};
use crate::response::{ok, AppError};
use crate::services::stats_query::{PageMeta, StatsRequest};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:user_id/stats/:kind", get(list_stats))
        .route("/:user_id/summary", get(summary))
}

/// Query values are kept as strings so that unparseable ones fall back to
/// defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsQueryParams {
    num: Option<String>,
    page: Option<String>,
    sort: Option<String>,
    sort_dir: Option<String>,
    mastery: Option<String>,
    ids: Option<String>,
}

impl StatsQueryParams {
    fn into_request(self, kind: SubjectKind) -> StatsRequest {
        StatsRequest {
            kind: Some(kind),
            filter: self.mastery,
            sort: self.sort,
            sort_dir: self.sort_dir,
            page_size: self.num.as_deref().and_then(|v| v.trim().parse().ok()),
            page: self.page.as_deref().and_then(|v| v.trim().parse().ok()),
            subject_ids: self.ids.map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatView {
    #[serde(flatten)]
    record: StatRecord,
    mastery_score: f64,
    mastery_state: MasteryState,
}

impl StatView {
    fn new(record: StatRecord, thresholds: &MasteryThresholds) -> Self {
        Self {
            mastery_score: score(Some(&record)),
            mastery_state: classify(Some(&record), thresholds),
            record,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    success: bool,
    data: Vec<StatView>,
    meta: PageMeta,
}

async fn list_stats(
    State(state): State<AppState>,
    Path((user_id, kind)): Path<(String, String)>,
    params: Result<Query<StatsQueryParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params.map_err(query_rejection)?;
    let user_id = require_user(&user_id)?;
    let kind = SubjectKind::parse(&kind)
        .ok_or_else(|| AppError::not_found(format!("unknown stat kind: {kind}")))?;

    let engine = state.engine();
    let page = engine.query_stats(user_id, &params.into_request(kind)).await?;
    let thresholds = engine.config().thresholds;

    Ok(Json(StatsResponse {
        success: true,
        data: page
            .records
            .into_iter()
            .map(|record| StatView::new(record, &thresholds))
            .collect(),
        meta: page.meta,
    })
    .into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResponse {
    num_mastered: usize,
    lists_mastered: usize,
    standards_mastered: usize,
}

async fn summary(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Response, AppError> {
    let user_id = require_user(&user_id)?;
    let engine = state.engine();

    let (num_mastered, lists_mastered, standards_mastered) = tokio::try_join!(
        engine.count_mastered(user_id, SubjectKind::Item),
        engine.count_mastered(user_id, SubjectKind::List),
        engine.count_mastered(user_id, SubjectKind::Standard),
    )?;

    Ok(ok(SummaryResponse {
        num_mastered,
        lists_mastered,
        standards_mastered,
    })
    .into_response())
}
