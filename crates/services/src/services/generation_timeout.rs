//! Fails `generating` jobs that no live pipeline owns and that have stopped making progress,
//! e.g. after the process restarted mid-run.

use std::time::Duration;

use chrono::Utc;
use db::models::generation_job::GenerationStatus;
use tokio::time::interval;
use tracing::{debug, error, info};

use super::{
    generation::GenerationService,
    job_store::{StatusChange, StoreError},
};

pub struct GenerationTimeoutService {
    generation: GenerationService,
    poll_interval: Duration,
    stale_after: Duration,
}

impl GenerationTimeoutService {
    pub fn new(generation: GenerationService) -> Self {
        let config = generation.config();
        Self {
            poll_interval: config.sweep_interval,
            stale_after: config.stale_after,
            generation,
        }
    }

    /// Spawn the background sweeper
    pub fn spawn(generation: GenerationService) -> tokio::task::JoinHandle<()> {
        let service = Self::new(generation);
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting generation timeout service with interval {:?}, stale after {:?}",
            self.poll_interval, self.stale_after
        );

        let mut interval = interval(self.poll_interval);
        loop {
            interval.tick().await;
            if let Err(e) = self.sweep().await {
                error!("Error checking for stale generations: {}", e);
            }
        }
    }

    /// Returns how many jobs were failed.
    pub async fn sweep(&self) -> Result<usize, StoreError> {
        let Some(cutoff) = chrono::Duration::from_std(self.stale_after)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(0);
        };
        let generating = self
            .generation
            .store()
            .jobs_with_status(GenerationStatus::Generating)
            .await?;

        let mut failed = 0;
        for job in generating {
            if self.generation.is_running(job.id) || job.updated_at > cutoff {
                continue;
            }
            info!(
                job_id = %job.id,
                project_id = %job.project_id,
                updated_at = %job.updated_at,
                "Generation timeout: found abandoned job, failing"
            );
            let reason = format!(
                "Generation abandoned: no progress for {} seconds",
                self.stale_after.as_secs()
            );
            match self.generation.force_fail(job.id, &reason).await {
                Ok(StatusChange::Applied) => failed += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Failed to fail abandoned generation");
                }
            }
        }

        if failed == 0 {
            debug!("Generation timeout: nothing to fail");
        }
        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use db::{
        DBService,
        models::{
            generation_job::GenerationJob,
            generation_log::{GenerationLog, LogLevel},
            project::{CreateProject, Project},
            project_entity::EntityDescriptor,
        },
    };
    use tempfile::TempDir;
    use uuid::Uuid;

    use super::*;
    use crate::services::{
        config::GenerationConfig,
        job_store::{JobStore, SqliteJobStore},
        scaffolder::LocalFs,
    };

    /// Delegates to SQLite but cannot write logs for one job.
    struct LogRefusingStore {
        inner: SqliteJobStore,
        refused: std::sync::Mutex<Option<Uuid>>,
    }

    #[async_trait]
    impl JobStore for LogRefusingStore {
        async fn begin(
            &self,
            job_id: Uuid,
            project_id: Uuid,
            entities: &[EntityDescriptor],
            output_path: &str,
        ) -> Result<Option<GenerationJob>, StoreError> {
            self.inner.begin(job_id, project_id, entities, output_path).await
        }

        async fn get(&self, job_id: Uuid) -> Result<Option<GenerationJob>, StoreError> {
            self.inner.get(job_id).await
        }

        async fn latest_for_project(
            &self,
            project_id: Uuid,
        ) -> Result<Option<GenerationJob>, StoreError> {
            self.inner.latest_for_project(project_id).await
        }

        async fn jobs_with_status(
            &self,
            status: GenerationStatus,
        ) -> Result<Vec<GenerationJob>, StoreError> {
            self.inner.jobs_with_status(status).await
        }

        async fn append_log(
            &self,
            job_id: Uuid,
            level: LogLevel,
            message: &str,
        ) -> Result<bool, StoreError> {
            if *self.refused.lock().unwrap() == Some(job_id) {
                return Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut));
            }
            self.inner.append_log(job_id, level, message).await
        }

        async fn recent_logs(
            &self,
            job_id: Uuid,
            limit: i64,
        ) -> Result<Vec<GenerationLog>, StoreError> {
            self.inner.recent_logs(job_id, limit).await
        }

        async fn set_status(
            &self,
            job_id: Uuid,
            status: GenerationStatus,
        ) -> Result<StatusChange, StoreError> {
            self.inner.set_status(job_id, status).await
        }

        async fn set_output_path(&self, job_id: Uuid, path: &str) -> Result<bool, StoreError> {
            self.inner.set_output_path(job_id, path).await
        }

        async fn set_download_handle(
            &self,
            job_id: Uuid,
            handle: &str,
        ) -> Result<bool, StoreError> {
            self.inner.set_download_handle(job_id, handle).await
        }
    }

    async fn generating_job(db: &DBService, store: &dyn JobStore, age_secs: i64) -> Uuid {
        let project_id = Uuid::new_v4();
        let data = CreateProject {
            name: "Fleet".to_string(),
            description: None,
        };
        Project::create(&db.pool, project_id, "owner", &data).await.unwrap();
        let job_id = Uuid::new_v4();
        store
            .begin(job_id, project_id, &[], "/tmp/fleet")
            .await
            .unwrap()
            .unwrap();
        sqlx::query("UPDATE generation_jobs SET updated_at = $2 WHERE id = $1")
            .bind(job_id)
            .bind(Utc::now() - chrono::Duration::seconds(age_secs))
            .execute(&db.pool)
            .await
            .unwrap();
        job_id
    }

    #[tokio::test]
    async fn test_sweep_fails_only_stale_jobs() {
        let db = DBService::new_in_memory().await.unwrap();
        let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(db.pool.clone()));
        let output = TempDir::new().unwrap();
        let config = GenerationConfig {
            output_root: output.path().to_path_buf(),
            stale_after: Duration::from_secs(60),
            ..GenerationConfig::default()
        };
        let generation =
            GenerationService::new(db.pool.clone(), store.clone(), Arc::new(LocalFs), config);

        let stale = generating_job(&db, store.as_ref(), 600).await;
        let fresh = generating_job(&db, store.as_ref(), 5).await;

        let sweeper = GenerationTimeoutService::new(generation);
        assert_eq!(sweeper.sweep().await.unwrap(), 1);
        assert_eq!(
            store.get(stale).await.unwrap().unwrap().status,
            GenerationStatus::Failed
        );
        assert_eq!(
            store.get(fresh).await.unwrap().unwrap().status,
            GenerationStatus::Generating
        );

        let logs = store.recent_logs(stale, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].message.contains("no progress for 60 seconds"));

        assert_eq!(sweeper.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_continues_past_a_failing_job() {
        let db = DBService::new_in_memory().await.unwrap();
        let store = Arc::new(LogRefusingStore {
            inner: SqliteJobStore::new(db.pool.clone()),
            refused: std::sync::Mutex::new(None),
        });
        let output = TempDir::new().unwrap();
        let config = GenerationConfig {
            output_root: output.path().to_path_buf(),
            stale_after: Duration::from_secs(60),
            ..GenerationConfig::default()
        };
        let generation =
            GenerationService::new(db.pool.clone(), store.clone(), Arc::new(LocalFs), config);

        let stuck = generating_job(&db, store.as_ref(), 600).await;
        let abandoned = generating_job(&db, store.as_ref(), 900).await;
        *store.refused.lock().unwrap() = Some(stuck);

        let sweeper = GenerationTimeoutService::new(generation);
        assert_eq!(sweeper.sweep().await.unwrap(), 1);
        assert_eq!(
            store.get(abandoned).await.unwrap().unwrap().status,
            GenerationStatus::Failed
        );
        assert_eq!(
            store.get(stuck).await.unwrap().unwrap().status,
            GenerationStatus::Generating
        );
    }
}
