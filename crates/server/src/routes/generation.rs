use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::post,
};
use db::models::generation_job::GenerationJob;
use deployment::Deployment;
use services::services::generation::GenerationStatusView;
use uuid::Uuid;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::CurrentUser};

/// POST /api/projects/{project_id}/generation
/// Start generating the project's accepted entities; returns once the job is recorded
pub async fn start_generation(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user_id): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<GenerationJob>>), ApiError> {
    let started = deployment
        .generation()
        .start_generation(project_id, &user_id)
        .await?;
    Ok((StatusCode::ACCEPTED, ResponseJson(ApiResponse::success(started.job))))
}

/// GET /api/projects/{project_id}/generation
/// Latest job with its most recent log entries
pub async fn get_generation_status(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user_id): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<GenerationStatusView>>, ApiError> {
    let status = deployment
        .generation()
        .get_status(project_id, &user_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(status)))
}

/// DELETE /api/projects/{project_id}/generation
/// Cancel the running job
pub async fn cancel_generation(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user_id): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment
        .generation()
        .cancel_generation(project_id, &user_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route(
        "/projects/{project_id}/generation",
        post(start_generation)
            .get(get_generation_status)
            .delete(cancel_generation),
    )
}
