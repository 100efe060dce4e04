use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::project::{CreateProject, Project};
use deployment::Deployment;
use uuid::Uuid;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::CurrentUser};

/// POST /api/projects
pub async fn create_project(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user_id): CurrentUser,
    axum::Json(payload): axum::Json<CreateProject>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    let project = deployment.projects().create_project(&user_id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(project)))
}

/// GET /api/projects
/// Projects owned by the caller, newest first
pub async fn list_projects(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user_id): CurrentUser,
) -> Result<ResponseJson<ApiResponse<Vec<Project>>>, ApiError> {
    let projects = deployment.projects().list_projects(&user_id).await?;
    Ok(ResponseJson(ApiResponse::success(projects)))
}

/// GET /api/projects/{project_id}
pub async fn get_project(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user_id): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    let project = deployment.projects().get_project(project_id, &user_id).await?;
    Ok(ResponseJson(ApiResponse::success(project)))
}

/// DELETE /api/projects/{project_id}
/// Stops running generations and removes the project with all generated output
pub async fn delete_project(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user_id): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment.projects().delete_project(project_id, &user_id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{project_id}", get(get_project).delete(delete_project))
}
