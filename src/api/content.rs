/// Public content endpoints
use crate::{context::AppContext, error::PublishError};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

/// Build public content routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/content/:slug", get(get_content))
}

/// Snapshot-or-fallback public view for a slug
async fn get_content(
    State(ctx): State<AppContext>,
    Path(slug): Path<String>,
) -> Result<Json<serde_json::Value>, PublishError> {
    match ctx.reader.get_view(&slug).await {
        Some(content) => Ok(Json(content)),
        None => Err(PublishError::NotFound(format!(
            "No published content for slug {}",
            slug
        ))),
    }
}
