//! Project ownership, the entity review list, and project teardown.

use std::path::PathBuf;

use db::models::{
    generation_job::GenerationJob,
    project::{CreateProject, Project},
    project_entity::{EntityDescriptor, EntityStatus, ProjectEntity},
};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    entity_suggester::{EntitySuggester, EntitySuggestionError, normalize_entity_name},
    generation::GenerationService,
};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project not found")]
    NotFound,
    #[error("entity not found")]
    EntityNotFound,
    #[error("caller does not own this project")]
    Unauthorized,
    #[error("project name must not be empty")]
    EmptyName,
    #[error("invalid entity name: {0:?}")]
    InvalidEntityName(String),
    #[error("an accepted entity is already named {0:?}")]
    DuplicateEntityName(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Suggestion(#[from] EntitySuggestionError),
}

#[derive(Clone)]
pub struct ProjectService {
    pool: SqlitePool,
    generation: GenerationService,
    suggester: EntitySuggester,
}

impl ProjectService {
    pub fn new(pool: SqlitePool, generation: GenerationService, suggester: EntitySuggester) -> Self {
        Self {
            pool,
            generation,
            suggester,
        }
    }

    pub async fn create_project(
        &self,
        owner_id: &str,
        data: &CreateProject,
    ) -> Result<Project, ProjectError> {
        let name = data.name.trim();
        if name.is_empty() {
            return Err(ProjectError::EmptyName);
        }
        let data = CreateProject {
            name: name.to_string(),
            description: data.description.as_ref().map(|d| d.trim().to_string()),
        };
        let project = Project::create(&self.pool, Uuid::new_v4(), owner_id, &data).await?;
        info!(project_id = %project.id, owner_id = %owner_id, "Project created");
        Ok(project)
    }

    pub async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>, ProjectError> {
        Ok(Project::find_by_owner(&self.pool, owner_id).await?)
    }

    pub async fn get_project(&self, project_id: Uuid, caller_id: &str) -> Result<Project, ProjectError> {
        let project = Project::find_by_id(&self.pool, project_id)
            .await?
            .ok_or(ProjectError::NotFound)?;
        if !project.is_owned_by(caller_id) {
            return Err(ProjectError::Unauthorized);
        }
        Ok(project)
    }

    /// Stops the project's running generations, deletes its records, then removes every
    /// output directory its jobs produced.
    pub async fn delete_project(&self, project_id: Uuid, caller_id: &str) -> Result<(), ProjectError> {
        self.get_project(project_id, caller_id).await?;
        self.generation.stop_project_jobs(project_id).await;

        let outputs: Vec<PathBuf> = GenerationJob::find_by_project_id(&self.pool, project_id)
            .await?
            .into_iter()
            .filter_map(|job| job.output_path.map(PathBuf::from))
            .collect();

        Project::delete(&self.pool, project_id).await?;

        for dir in &outputs {
            if let Err(e) = self.generation.scaffolder().remove(dir).await {
                warn!(project_id = %project_id, dir = %dir.display(), error = %e, "Failed to remove generated output");
            }
        }
        info!(project_id = %project_id, removed_outputs = outputs.len(), "Project deleted");
        Ok(())
    }

    pub async fn list_entities(
        &self,
        project_id: Uuid,
        caller_id: &str,
    ) -> Result<Vec<ProjectEntity>, ProjectError> {
        self.get_project(project_id, caller_id).await?;
        Ok(ProjectEntity::find_by_project_id(&self.pool, project_id).await?)
    }

    /// Adds a hand-written entity. It is accepted immediately.
    pub async fn add_entity(
        &self,
        project_id: Uuid,
        caller_id: &str,
        entity: EntityDescriptor,
    ) -> Result<ProjectEntity, ProjectError> {
        self.get_project(project_id, caller_id).await?;
        let name = normalize_entity_name(&entity.name)
            .ok_or_else(|| ProjectError::InvalidEntityName(entity.name.clone()))?;
        let entity = EntityDescriptor {
            name,
            description: entity.description.trim().to_string(),
            fields: entity
                .fields
                .iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
        };
        self.ensure_name_free(project_id, None, &entity.name).await?;
        Ok(ProjectEntity::create(&self.pool, project_id, &entity, EntityStatus::Accepted).await?)
    }

    pub async fn suggest_entities(
        &self,
        project_id: Uuid,
        caller_id: &str,
    ) -> Result<Vec<ProjectEntity>, ProjectError> {
        let project = self.get_project(project_id, caller_id).await?;
        Ok(self.suggester.suggest_for_project(&self.pool, &project).await?)
    }

    pub async fn set_entity_status(
        &self,
        project_id: Uuid,
        entity_id: Uuid,
        caller_id: &str,
        status: EntityStatus,
    ) -> Result<ProjectEntity, ProjectError> {
        self.get_project(project_id, caller_id).await?;
        let entity = match ProjectEntity::find_by_id(&self.pool, entity_id).await? {
            Some(entity) if entity.project_id == project_id => entity,
            _ => return Err(ProjectError::EntityNotFound),
        };
        if status == EntityStatus::Accepted {
            self.ensure_name_free(project_id, Some(entity_id), &entity.name)
                .await?;
        }
        ProjectEntity::update_status(&self.pool, entity_id, status)
            .await?
            .ok_or(ProjectError::EntityNotFound)
    }

    /// Accepted entity names are unique per project ignoring case: each one owns a model
    /// file and a route.
    async fn ensure_name_free(
        &self,
        project_id: Uuid,
        except: Option<Uuid>,
        name: &str,
    ) -> Result<(), ProjectError> {
        let taken = ProjectEntity::find_accepted(&self.pool, project_id)
            .await?
            .into_iter()
            .any(|e| Some(e.id) != except && e.name.to_lowercase() == name.to_lowercase());
        if taken {
            return Err(ProjectError::DuplicateEntityName(name.to_string()));
        }
        Ok(())
    }
}
