pub mod events;
pub mod health;
pub mod mastery;
pub mod samplings;
pub mod stats;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::response::{json_error, AppError};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let users = Router::new()
        .merge(events::router())
        .merge(mastery::router())
        .merge(stats::router())
        .merge(samplings::router());

    Router::new()
        .nest("/health", health::router())
        .nest("/api/users", users)
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "route not found").into_response()
}

pub(crate) fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::bad_request(rejection.body_text())
}

pub(crate) fn query_rejection(rejection: QueryRejection) -> AppError {
    AppError::bad_request(rejection.body_text())
}

pub(crate) fn require_user(user_id: &str) -> Result<&str, AppError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::validation("userId is required"));
    }
    Ok(user_id)
}
