/// Publishing endpoints
use crate::{
    context::AppContext,
    error::{PublishError, PublishResult},
    publishing::FailureKind,
};
use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;

/// Build publishing routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/operators/:id/publish", post(publish_operator))
        .route("/api/operators/:id/publish-status", get(publish_status))
        .route(
            "/api/operators/:id/publish-error",
            delete(clear_publish_error),
        )
}

/// Response for a successful publish
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    slug: String,
    content: serde_json::Value,
}

/// Observables UI surfaces poll to disable controls
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishStatusResponse {
    is_publishing: bool,
    is_locked: bool,
    in_queue: bool,
    attempts: u32,
    can_retry: bool,
    last_error: Option<String>,
}

/// Publish an operator through the queue
async fn publish_operator(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
) -> PublishResult<Json<PublishResponse>> {
    // Immediate, synchronous rejections surface as 409 before any work
    if ctx.publish_queue.is_in_queue(&operator_id) {
        return Err(PublishError::Concurrency(
            "A publish for this operator is already in progress".to_string(),
        ));
    }
    if !ctx.publish_queue.can_retry(&operator_id) {
        return Err(PublishError::Concurrency(
            "Publishing has failed repeatedly for this operator; resolve the error first"
                .to_string(),
        ));
    }

    match ctx.publish_operator(&operator_id).await {
        Some(snapshot) => {
            let content = serde_json::to_value(&snapshot)
                .map_err(|e| PublishError::Internal(format!("Response encoding: {}", e)))?;
            Ok(Json(PublishResponse {
                slug: snapshot.operator.slug.clone(),
                content,
            }))
        }
        None => match ctx.publish_queue.last_error(&operator_id) {
            Some(state) if state.kind == FailureKind::Validation => {
                Err(PublishError::Validation(state.last_error))
            }
            Some(state) => Err(PublishError::Internal(state.last_error)),
            None => Err(PublishError::Internal("Publishing failed".to_string())),
        },
    }
}

/// Reset the failure record for an operator.
///
/// An exhausted retry budget can otherwise only clear on a success, which
/// the queue no longer admits; this is the way out once the underlying
/// problem is fixed.
async fn clear_publish_error(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
) -> Json<serde_json::Value> {
    ctx.publish_queue.clear_error(&operator_id);
    Json(serde_json::json!({ "cleared": true }))
}

/// Report the publishing observables for an operator
async fn publish_status(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
) -> Json<PublishStatusResponse> {
    let last = ctx.publish_queue.last_error(&operator_id);
    Json(PublishStatusResponse {
        is_publishing: ctx.publishing_state.is_publishing(&operator_id),
        is_locked: ctx.locks.is_locked(&operator_id),
        in_queue: ctx.publish_queue.is_in_queue(&operator_id),
        attempts: ctx.publish_queue.attempts(&operator_id),
        can_retry: ctx.publish_queue.can_retry(&operator_id),
        last_error: last.map(|state| state.last_error),
    })
}
