/// API routes and handlers
pub mod content;
pub mod extensions;
pub mod operators;
pub mod publish;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(publish::routes())
        .merge(content::routes())
        .merge(extensions::routes())
        .merge(operators::routes())
}
