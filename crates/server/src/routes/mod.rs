use axum::{Router, response::Json as ResponseJson, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utils::response::ApiResponse;

use crate::DeploymentImpl;

pub mod entities;
pub mod generation;
pub mod projects;

pub async fn health_check() -> ResponseJson<ApiResponse<String>> {
    ResponseJson(ApiResponse::success("OK".to_string()))
}

pub fn router(deployment: DeploymentImpl) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .merge(projects::router(&deployment))
        .merge(entities::router(&deployment))
        .merge(generation::router(&deployment));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(deployment)
}
