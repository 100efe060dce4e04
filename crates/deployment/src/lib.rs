//! The seam between the HTTP layer and whatever hosts the generation services.

use async_trait::async_trait;
use db::DBService;
use services::services::{
    config::GenerationConfig, generation::GenerationService, projects::ProjectService,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new() -> Result<Self, DeploymentError>;

    fn db(&self) -> &DBService;

    fn config(&self) -> &GenerationConfig;

    fn generation(&self) -> &GenerationService;

    fn projects(&self) -> &ProjectService;

    /// Stops background work before the process exits.
    async fn shutdown(&self) {}
}
