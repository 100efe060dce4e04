use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, patch, post},
};
use db::models::project_entity::{EntityDescriptor, ProjectEntity, UpdateEntityStatus};
use deployment::Deployment;
use uuid::Uuid;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::CurrentUser};

/// GET /api/projects/{project_id}/entities
pub async fn list_entities(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user_id): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<ProjectEntity>>>, ApiError> {
    let entities = deployment.projects().list_entities(project_id, &user_id).await?;
    Ok(ResponseJson(ApiResponse::success(entities)))
}

/// POST /api/projects/{project_id}/entities
/// Add an entity by hand; it starts out accepted
pub async fn add_entity(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user_id): CurrentUser,
    Path(project_id): Path<Uuid>,
    axum::Json(payload): axum::Json<EntityDescriptor>,
) -> Result<ResponseJson<ApiResponse<ProjectEntity>>, ApiError> {
    let entity = deployment
        .projects()
        .add_entity(project_id, &user_id, payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(entity)))
}

/// POST /api/projects/{project_id}/entities/suggest
/// Ask for entity suggestions; they are stored for review
pub async fn suggest_entities(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user_id): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<ProjectEntity>>>, ApiError> {
    let entities = deployment
        .projects()
        .suggest_entities(project_id, &user_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(entities)))
}

/// PATCH /api/projects/{project_id}/entities/{entity_id}
pub async fn update_entity_status(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user_id): CurrentUser,
    Path((project_id, entity_id)): Path<(Uuid, Uuid)>,
    axum::Json(payload): axum::Json<UpdateEntityStatus>,
) -> Result<ResponseJson<ApiResponse<ProjectEntity>>, ApiError> {
    let entity = deployment
        .projects()
        .set_entity_status(project_id, entity_id, &user_id, payload.status)
        .await?;
    Ok(ResponseJson(ApiResponse::success(entity)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route(
            "/projects/{project_id}/entities",
            get(list_entities).post(add_entity),
        )
        .route(
            "/projects/{project_id}/entities/suggest",
            post(suggest_entities),
        )
        .route(
            "/projects/{project_id}/entities/{entity_id}",
            patch(update_entity_status),
        )
}
