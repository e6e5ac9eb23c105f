/// Operator record endpoints: create, auto-save, duplicate, delete
use crate::{context::AppContext, error::PublishResult, operators::NewOperator};
use axum::{
    extract::{Path, State},
    routing::{delete, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Build operator routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/operators", post(create_operator))
        .route("/api/operators/:id/autosave", post(auto_save))
        .route("/api/operators/:id/duplicate", post(duplicate_operator))
        .route("/api/operators/:id", delete(delete_operator))
}

/// Request to create a draft operator
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOperatorRequest {
    slug: String,
    name: String,
    #[serde(default)]
    description: String,
    logo_url: Option<String>,
    hero_image_url: Option<String>,
}

/// Response carrying the new operator's identity
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OperatorIdResponse {
    id: String,
}

async fn create_operator(
    State(ctx): State<AppContext>,
    Json(request): Json<CreateOperatorRequest>,
) -> PublishResult<Json<OperatorIdResponse>> {
    let operator = ctx
        .operators
        .create(NewOperator {
            slug: request.slug,
            name: request.name,
            description: request.description,
            logo_url: request.logo_url,
            hero_image_url: request.hero_image_url,
            ..NewOperator::default()
        })
        .await?;

    Ok(Json(OperatorIdResponse { id: operator.id }))
}

/// Auto-save draft fields; publishing-control fields in the payload are
/// ignored by design
async fn auto_save(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> PublishResult<Json<serde_json::Value>> {
    ctx.operators.auto_save(&operator_id, payload).await?;
    Ok(Json(json!({ "saved": true })))
}

async fn duplicate_operator(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
) -> PublishResult<Json<OperatorIdResponse>> {
    let new_id = ctx.operators.duplicate(&operator_id).await?;
    Ok(Json(OperatorIdResponse { id: new_id }))
}

async fn delete_operator(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
) -> PublishResult<Json<serde_json::Value>> {
    ctx.operators.delete(&operator_id).await?;
    Ok(Json(json!({ "deleted": true })))
}
