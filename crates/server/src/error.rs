use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{
    generation::GenerationError, job_store::StoreError, projects::ProjectError,
};
use thiserror::Error;
use tracing::error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or empty X-User-Id header")]
    Unauthenticated,
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Project(#[from] ProjectError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Generation(e) => match e {
                GenerationError::ProjectNotFound | GenerationError::NotFound => StatusCode::NOT_FOUND,
                GenerationError::NoAcceptedEntities | GenerationError::DuplicateEntityName(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                GenerationError::Unauthorized => StatusCode::FORBIDDEN,
                GenerationError::AlreadyInProgress => StatusCode::CONFLICT,
                GenerationError::Store(StoreError::Unavailable(_)) | GenerationError::Database(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            },
            ApiError::Project(e) => match e {
                ProjectError::NotFound | ProjectError::EntityNotFound => StatusCode::NOT_FOUND,
                ProjectError::Unauthorized => StatusCode::FORBIDDEN,
                ProjectError::DuplicateEntityName(_) => StatusCode::CONFLICT,
                ProjectError::EmptyName | ProjectError::InvalidEntityName(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ProjectError::Database(_) | ProjectError::Suggestion(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(ApiResponse::<()>::error(&self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(GenerationError::NoAcceptedEntities).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(GenerationError::ProjectNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(GenerationError::Unauthorized).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(GenerationError::AlreadyInProgress).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(GenerationError::Store(StoreError::Unavailable(
                sqlx::Error::PoolTimedOut
            )))
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(GenerationError::DuplicateEntityName("order".to_string())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(ProjectError::DuplicateEntityName("Order".to_string())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
    }
}
