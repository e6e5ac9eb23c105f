/// Extension fetch/save endpoints
use crate::{
    context::AppContext,
    error::PublishResult,
    models::{Bonus, Faq, Feature, PaymentMethod, Security},
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build extension routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/api/operators/:id/bonuses",
            get(fetch_bonuses).put(save_bonuses),
        )
        .route(
            "/api/operators/:id/payment-methods",
            get(fetch_payment_methods).put(save_payment_methods),
        )
        .route(
            "/api/operators/:id/features",
            get(fetch_features).put(save_features),
        )
        .route(
            "/api/operators/:id/security",
            get(fetch_security).put(save_security),
        )
        .route("/api/operators/:id/faqs", get(fetch_faqs).put(save_faqs))
        .route("/api/editing-active", post(set_editing_active))
}

/// Request toggling the editing surface
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditingActiveRequest {
    active: bool,
}

/// Aggregate flush outcome
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FlushResponse {
    attempted: usize,
    succeeded: usize,
    failed: Vec<String>,
}

async fn fetch_bonuses(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
) -> PublishResult<Json<Vec<Bonus>>> {
    Ok(Json(ctx.extensions.fetch_bonuses(&operator_id).await?))
}

async fn save_bonuses(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
    Json(rows): Json<Vec<Bonus>>,
) -> PublishResult<Json<serde_json::Value>> {
    ctx.extensions.save_bonuses(&operator_id, rows).await?;
    Ok(Json(serde_json::json!({ "saved": true })))
}

async fn fetch_payment_methods(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
) -> PublishResult<Json<Vec<PaymentMethod>>> {
    Ok(Json(
        ctx.extensions.fetch_payment_methods(&operator_id).await?,
    ))
}

async fn save_payment_methods(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
    Json(rows): Json<Vec<PaymentMethod>>,
) -> PublishResult<Json<serde_json::Value>> {
    ctx.extensions
        .save_payment_methods(&operator_id, rows)
        .await?;
    Ok(Json(serde_json::json!({ "saved": true })))
}

async fn fetch_features(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
) -> PublishResult<Json<Vec<Feature>>> {
    Ok(Json(ctx.extensions.fetch_features(&operator_id).await?))
}

async fn save_features(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
    Json(rows): Json<Vec<Feature>>,
) -> PublishResult<Json<serde_json::Value>> {
    ctx.extensions.save_features(&operator_id, rows).await?;
    Ok(Json(serde_json::json!({ "saved": true })))
}

async fn fetch_security(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
) -> PublishResult<Json<Option<Security>>> {
    Ok(Json(ctx.extensions.fetch_security(&operator_id).await?))
}

async fn save_security(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
    Json(row): Json<Security>,
) -> PublishResult<Json<serde_json::Value>> {
    ctx.extensions.save_security(&operator_id, row).await?;
    Ok(Json(serde_json::json!({ "saved": true })))
}

async fn fetch_faqs(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
) -> PublishResult<Json<Vec<Faq>>> {
    Ok(Json(ctx.extensions.fetch_faqs(&operator_id).await?))
}

async fn save_faqs(
    State(ctx): State<AppContext>,
    Path(operator_id): Path<String>,
    Json(rows): Json<Vec<Faq>>,
) -> PublishResult<Json<serde_json::Value>> {
    ctx.extensions.save_faqs(&operator_id, rows).await?;
    Ok(Json(serde_json::json!({ "saved": true })))
}

/// Toggle the editing surface; deactivating flushes buffered saves
async fn set_editing_active(
    State(ctx): State<AppContext>,
    Json(request): Json<EditingActiveRequest>,
) -> PublishResult<Json<FlushResponse>> {
    let report = ctx.extensions.set_editing_active(request.active).await?;
    Ok(Json(FlushResponse {
        attempted: report.attempted,
        succeeded: report.succeeded,
        failed: report.failed,
    }))
}
