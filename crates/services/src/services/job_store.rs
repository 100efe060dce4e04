//! Persisted generation state: status, ordered logs, output location.
//!
//! Every writer goes through [`JobStore`]. A missing job is reported as a value
//! (`false`, [`StatusChange::NotFound`]) rather than an error so callers can treat a
//! concurrently deleted job as a terminal no-op.

use async_trait::async_trait;
use db::models::{
    generation_job::{GenerationJob, GenerationStatus},
    generation_log::{GenerationLog, LogLevel},
    project_entity::EntityDescriptor,
};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Outcome of a status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Applied,
    NotFound,
    /// The job exists but `current` may not move to the requested status.
    Rejected { current: GenerationStatus },
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Records a new run as `generating` in one write. `None` when the project already
    /// has an unfinished run.
    async fn begin(
        &self,
        job_id: Uuid,
        project_id: Uuid,
        entities: &[EntityDescriptor],
        output_path: &str,
    ) -> Result<Option<GenerationJob>, StoreError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<GenerationJob>, StoreError>;

    async fn latest_for_project(
        &self,
        project_id: Uuid,
    ) -> Result<Option<GenerationJob>, StoreError>;

    async fn jobs_with_status(
        &self,
        status: GenerationStatus,
    ) -> Result<Vec<GenerationJob>, StoreError>;

    /// `false` when the job is gone.
    async fn append_log(
        &self,
        job_id: Uuid,
        level: LogLevel,
        message: &str,
    ) -> Result<bool, StoreError>;

    /// Last `limit` entries, oldest first.
    async fn recent_logs(&self, job_id: Uuid, limit: i64) -> Result<Vec<GenerationLog>, StoreError>;

    async fn set_status(
        &self,
        job_id: Uuid,
        status: GenerationStatus,
    ) -> Result<StatusChange, StoreError>;

    /// `false` when the job is gone.
    async fn set_output_path(&self, job_id: Uuid, path: &str) -> Result<bool, StoreError>;

    /// `false` when the job is gone.
    async fn set_download_handle(&self, job_id: Uuid, handle: &str) -> Result<bool, StoreError>;
}

/// [`JobStore`] over the application database.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn begin(
        &self,
        job_id: Uuid,
        project_id: Uuid,
        entities: &[EntityDescriptor],
        output_path: &str,
    ) -> Result<Option<GenerationJob>, StoreError> {
        Ok(GenerationJob::start(&self.pool, job_id, project_id, entities, output_path).await?)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<GenerationJob>, StoreError> {
        Ok(GenerationJob::find_by_id(&self.pool, job_id).await?)
    }

    async fn latest_for_project(
        &self,
        project_id: Uuid,
    ) -> Result<Option<GenerationJob>, StoreError> {
        Ok(GenerationJob::find_latest_by_project_id(&self.pool, project_id).await?)
    }

    async fn jobs_with_status(
        &self,
        status: GenerationStatus,
    ) -> Result<Vec<GenerationJob>, StoreError> {
        Ok(GenerationJob::find_by_status(&self.pool, status).await?)
    }

    async fn append_log(
        &self,
        job_id: Uuid,
        level: LogLevel,
        message: &str,
    ) -> Result<bool, StoreError> {
        let appended = GenerationLog::append(&self.pool, job_id, level, message).await?;
        if appended.is_none() {
            return Ok(false);
        }
        GenerationJob::touch(&self.pool, job_id).await?;
        Ok(true)
    }

    async fn recent_logs(&self, job_id: Uuid, limit: i64) -> Result<Vec<GenerationLog>, StoreError> {
        Ok(GenerationLog::find_recent_by_job_id(&self.pool, job_id, limit).await?)
    }

    async fn set_status(
        &self,
        job_id: Uuid,
        status: GenerationStatus,
    ) -> Result<StatusChange, StoreError> {
        if GenerationJob::transition_status(&self.pool, job_id, status).await? > 0 {
            return Ok(StatusChange::Applied);
        }
        Ok(match GenerationJob::find_by_id(&self.pool, job_id).await? {
            None => StatusChange::NotFound,
            Some(job) => StatusChange::Rejected {
                current: job.status,
            },
        })
    }

    async fn set_output_path(&self, job_id: Uuid, path: &str) -> Result<bool, StoreError> {
        Ok(GenerationJob::set_output_path(&self.pool, job_id, path).await? > 0)
    }

    async fn set_download_handle(&self, job_id: Uuid, handle: &str) -> Result<bool, StoreError> {
        Ok(GenerationJob::set_download_handle(&self.pool, job_id, handle).await? > 0)
    }
}

#[cfg(test)]
mod tests {
    use db::{
        DBService,
        models::project::{CreateProject, Project},
    };

    use super::*;

    async fn store_with_job() -> (SqliteJobStore, GenerationJob) {
        let db = DBService::new_in_memory().await.unwrap();
        let project_id = Uuid::new_v4();
        let data = CreateProject {
            name: "Fleet".to_string(),
            description: None,
        };
        Project::create(&db.pool, project_id, "owner", &data).await.unwrap();
        let store = SqliteJobStore::new(db.pool.clone());
        let job = store
            .begin(Uuid::new_v4(), project_id, &[], "/srv/out/first")
            .await
            .unwrap()
            .unwrap();
        (store, job)
    }

    #[tokio::test]
    async fn test_status_changes() {
        let (store, job) = store_with_job().await;
        assert_eq!(job.status, GenerationStatus::Generating);
        assert_eq!(
            store.set_status(job.id, GenerationStatus::Generating).await.unwrap(),
            StatusChange::Rejected {
                current: GenerationStatus::Generating
            }
        );
        assert_eq!(
            store.set_status(Uuid::new_v4(), GenerationStatus::Failed).await.unwrap(),
            StatusChange::NotFound
        );
        assert_eq!(
            store.set_status(job.id, GenerationStatus::Failed).await.unwrap(),
            StatusChange::Applied
        );
    }

    #[tokio::test]
    async fn test_begin_allows_one_unfinished_run() {
        let (store, job) = store_with_job().await;
        let second = store
            .begin(Uuid::new_v4(), job.project_id, &[], "/srv/out/second")
            .await
            .unwrap();
        assert!(second.is_none());

        store.set_status(job.id, GenerationStatus::Completed).await.unwrap();
        let third = store
            .begin(Uuid::new_v4(), job.project_id, &[], "/srv/out/third")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            store.latest_for_project(job.project_id).await.unwrap().unwrap().id,
            third.id
        );
    }

    #[tokio::test]
    async fn test_missing_job_writes_report_false() {
        let (store, _) = store_with_job().await;
        let ghost = Uuid::new_v4();
        assert!(!store.append_log(ghost, LogLevel::Info, "hello").await.unwrap());
        assert!(!store.set_output_path(ghost, "/tmp/x").await.unwrap());
        assert!(!store.set_download_handle(ghost, "x").await.unwrap());
        assert!(store.get(ghost).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_output_and_download_handle() {
        let (store, job) = store_with_job().await;
        assert!(store.set_output_path(job.id, "/srv/out/a").await.unwrap());
        assert!(store.set_download_handle(job.id, "a").await.unwrap());
        let stored = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.output_path.as_deref(), Some("/srv/out/a"));
        assert_eq!(stored.download_handle.as_deref(), Some("a"));
    }
}
