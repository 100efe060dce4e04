//! Drives one project generation from request to terminal status.
//!
//! `start_generation` validates synchronously, persists the job as `generating` and
//! returns. The pipeline then runs on its own task: skeleton, shared files, then each
//! entity in order, appending one log entry per finished step. The first failing step
//! records one `error` entry, fails the job and stops; files already written stay.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use db::models::{
    generation_job::{GenerationJob, GenerationStatus},
    generation_log::{GenerationLog, LogLevel},
    project::Project,
    project_entity::{EntityDescriptor, ProjectEntity},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    config::GenerationConfig,
    job_store::{JobStore, StatusChange, StoreError},
    scaffolder::{ProjectFs, ProjectScaffolder, SHARED_FILES, ScaffoldError},
    templates::ProjectInfo,
};

const STATUS_RETRY_DELAY: Duration = Duration::from_millis(250);
const CANCEL_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("project not found")]
    ProjectNotFound,
    #[error("project has no accepted entities")]
    NoAcceptedEntities,
    #[error("accepted entities share the name {0:?}")]
    DuplicateEntityName(String),
    #[error("caller does not own this project")]
    Unauthorized,
    #[error("generation already in progress")]
    AlreadyInProgress,
    #[error("no generation found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GenerationError {
    /// Rejections raised before any job exists.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::ProjectNotFound | Self::NoAcceptedEntities | Self::DuplicateEntityName(_)
        )
    }
}

/// What a status poll returns: the latest job and its most recent log entries.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct GenerationStatusView {
    pub job_id: Uuid,
    pub project_id: Uuid,
    pub status: GenerationStatus,
    pub output_path: Option<String>,
    pub download_handle: Option<String>,
    pub logs: Vec<GenerationLog>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationStatusView {
    fn new(job: GenerationJob, logs: Vec<GenerationLog>) -> Self {
        Self {
            job_id: job.id,
            project_id: job.project_id,
            status: job.status,
            output_path: job.output_path,
            download_handle: job.download_handle,
            logs,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// An accepted request. Dropping `handle` detaches the pipeline.
pub struct StartedGeneration {
    pub job: GenerationJob,
    pub handle: JoinHandle<()>,
}

struct RunningJob {
    project_id: Uuid,
    cancel: CancellationToken,
    /// Closes when the pipeline task ends.
    done: watch::Receiver<()>,
}

#[derive(Clone)]
pub struct GenerationService {
    pool: SqlitePool,
    store: Arc<dyn JobStore>,
    scaffolder: ProjectScaffolder,
    config: GenerationConfig,
    running: Arc<DashMap<Uuid, RunningJob>>,
}

impl GenerationService {
    pub fn new(
        pool: SqlitePool,
        store: Arc<dyn JobStore>,
        fs: Arc<dyn ProjectFs>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            pool,
            store,
            scaffolder: ProjectScaffolder::new(fs),
            config,
            running: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn scaffolder(&self) -> &ProjectScaffolder {
        &self.scaffolder
    }

    /// Validates, records the job as `generating` and launches the pipeline.
    pub async fn start_generation(
        &self,
        project_id: Uuid,
        caller_id: &str,
    ) -> Result<StartedGeneration, GenerationError> {
        let project = self.owned_project(project_id, caller_id).await?;

        let entities: Vec<EntityDescriptor> = ProjectEntity::find_accepted(&self.pool, project_id)
            .await?
            .iter()
            .map(ProjectEntity::descriptor)
            .collect();
        if entities.is_empty() {
            return Err(GenerationError::NoAcceptedEntities);
        }

        if let Some(name) = colliding_entity_name(&entities) {
            return Err(GenerationError::DuplicateEntityName(name));
        }

        let job_id = Uuid::new_v4();
        let output_dir = self.job_directory(job_id);
        let job = self
            .store
            .begin(job_id, project_id, &entities, &output_dir.to_string_lossy())
            .await?
            .ok_or(GenerationError::AlreadyInProgress)?;

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(());
        self.running.insert(
            job_id,
            RunningJob {
                project_id,
                cancel: cancel.clone(),
                done: done_rx,
            },
        );

        let pipeline = Pipeline {
            store: self.store.clone(),
            scaffolder: self.scaffolder.clone(),
            job_id,
            base: output_dir,
            project: ProjectInfo {
                name: project.name,
                description: project.description,
            },
            entities,
        };
        let running = self.running.clone();
        let deadline = self.config.job_timeout;
        let handle = tokio::spawn(async move {
            pipeline.execute(cancel, deadline).await;
            running.remove(&job_id);
            drop(done_tx);
        });

        info!(
            job_id = %job_id,
            project_id = %project_id,
            entity_count = job.entities.0.len(),
            "Generation accepted"
        );
        Ok(StartedGeneration { job, handle })
    }

    /// Latest job of the project with its most recent log entries.
    pub async fn get_status(
        &self,
        project_id: Uuid,
        caller_id: &str,
    ) -> Result<GenerationStatusView, GenerationError> {
        self.owned_project(project_id, caller_id).await?;
        let job = self
            .store
            .latest_for_project(project_id)
            .await?
            .ok_or(GenerationError::NotFound)?;
        let logs = self
            .store
            .recent_logs(job.id, self.config.status_log_limit)
            .await?;
        Ok(GenerationStatusView::new(job, logs))
    }

    /// Signals the project's running pipeline to stop. It records the cancellation itself.
    pub async fn cancel_generation(
        &self,
        project_id: Uuid,
        caller_id: &str,
    ) -> Result<(), GenerationError> {
        self.owned_project(project_id, caller_id).await?;
        let tokens: Vec<CancellationToken> = self
            .running
            .iter()
            .filter(|entry| entry.project_id == project_id)
            .map(|entry| entry.cancel.clone())
            .collect();
        if tokens.is_empty() {
            return Err(GenerationError::NotFound);
        }
        for token in tokens {
            token.cancel();
        }
        info!(project_id = %project_id, "Generation cancellation requested");
        Ok(())
    }

    /// Cancels every pipeline of the project and waits, bounded, for them to stop.
    pub async fn stop_project_jobs(&self, project_id: Uuid) {
        let pending: Vec<(CancellationToken, watch::Receiver<()>)> = self
            .running
            .iter()
            .filter(|entry| entry.project_id == project_id)
            .map(|entry| (entry.cancel.clone(), entry.done.clone()))
            .collect();

        for (cancel, mut done) in pending {
            cancel.cancel();
            // Only closes, never sends: an error means the pipeline has finished.
            if tokio::time::timeout(CANCEL_WAIT, done.changed()).await.is_err() {
                warn!(project_id = %project_id, "Pipeline did not stop in time");
            }
        }
    }

    /// Whether a pipeline for `job_id` is alive in this process.
    pub fn is_running(&self, job_id: Uuid) -> bool {
        self.running.contains_key(&job_id)
    }

    /// Fails a job that no live pipeline owns, recording `reason` as its error entry.
    pub async fn force_fail(&self, job_id: Uuid, reason: &str) -> Result<StatusChange, StoreError> {
        if !self.store.append_log(job_id, LogLevel::Error, reason).await? {
            return Ok(StatusChange::NotFound);
        }
        let change = self.store.set_status(job_id, GenerationStatus::Failed).await?;
        warn!(job_id = %job_id, reason = %reason, ?change, "Generation force-failed");
        Ok(change)
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    async fn owned_project(
        &self,
        project_id: Uuid,
        caller_id: &str,
    ) -> Result<Project, GenerationError> {
        let project = Project::find_by_id(&self.pool, project_id)
            .await?
            .ok_or(GenerationError::ProjectNotFound)?;
        if !project.is_owned_by(caller_id) {
            return Err(GenerationError::Unauthorized);
        }
        Ok(project)
    }

    /// `<root>/<job id>-<unix millis>`: unique per job, so runs never share a directory.
    fn job_directory(&self, job_id: Uuid) -> PathBuf {
        self.config
            .output_root
            .join(format!("{}-{}", job_id, Utc::now().timestamp_millis()))
    }
}

/// Why a pipeline stopped before completing.
#[derive(Debug, Error)]
enum Halt {
    #[error("failed to {step}: {source}")]
    Step {
        step: String,
        #[source]
        source: ScaffoldError,
    },
    #[error("generation timed out after {0:?}")]
    TimedOut(Duration),
    #[error("generation cancelled")]
    Cancelled,
    /// The job record was deleted underneath the pipeline.
    #[error("job no longer exists")]
    JobGone,
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn step_failed(step: impl Into<String>) -> impl FnOnce(ScaffoldError) -> Halt {
    let step = step.into();
    move |source| Halt::Step { step, source }
}

/// First entity name that, ignoring case, repeats an earlier one. Such entities would
/// write the same files and mount the same route.
fn colliding_entity_name(entities: &[EntityDescriptor]) -> Option<String> {
    let mut seen = HashSet::new();
    entities
        .iter()
        .find(|entity| !seen.insert(entity.name.to_lowercase()))
        .map(|entity| entity.name.clone())
}

/// Field names an entity declares more than once, in first-repeat order.
fn duplicate_fields(entity: &EntityDescriptor) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut repeated = Vec::new();
    for field in &entity.fields {
        if !seen.insert(field.as_str()) && !repeated.contains(&field.as_str()) {
            repeated.push(field.as_str());
        }
    }
    repeated
}

/// One job's run. Owns its output directory exclusively.
struct Pipeline {
    store: Arc<dyn JobStore>,
    scaffolder: ProjectScaffolder,
    job_id: Uuid,
    base: PathBuf,
    project: ProjectInfo,
    entities: Vec<EntityDescriptor>,
}

impl Pipeline {
    async fn execute(self, cancel: CancellationToken, deadline: Duration) {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Halt::Cancelled),
            res = tokio::time::timeout(deadline, self.run_steps()) => {
                res.unwrap_or(Err(Halt::TimedOut(deadline)))
            }
        };

        match outcome {
            Ok(()) => self.complete().await,
            Err(Halt::JobGone) => {
                info!(job_id = %self.job_id, "Job removed during generation, stopping");
            }
            Err(Halt::Store(e)) => {
                error!(job_id = %self.job_id, error = %e, "Job store unavailable, abandoning generation");
                self.finish(GenerationStatus::Failed).await;
            }
            Err(halt) => {
                error!(job_id = %self.job_id, error = %halt, "Generation failed");
                match self.store.append_log(self.job_id, LogLevel::Error, &halt.to_string()).await {
                    Ok(true) => self.finish(GenerationStatus::Failed).await,
                    Ok(false) => debug!(job_id = %self.job_id, "Job removed before failure was recorded"),
                    Err(e) => {
                        error!(job_id = %self.job_id, error = %e, "Could not record failure");
                        self.finish(GenerationStatus::Failed).await;
                    }
                }
            }
        }
    }

    async fn run_steps(&self) -> Result<(), Halt> {
        self.scaffolder
            .create_skeleton(&self.base)
            .await
            .map_err(step_failed("create project structure"))?;
        self.log(LogLevel::Info, "Created project directory structure")
            .await?;

        self.scaffolder
            .write_shared_files(&self.base, &self.project, &self.entities)
            .await
            .map_err(step_failed("write shared files"))?;
        self.log(
            LogLevel::Info,
            &format!("Generated {} shared files", SHARED_FILES.len()),
        )
        .await?;

        for entity in &self.entities {
            let repeated = duplicate_fields(entity);
            if !repeated.is_empty() {
                self.log(
                    LogLevel::Warning,
                    &format!(
                        "Entity {} declares duplicate fields ({}); each occurrence is generated",
                        entity.name,
                        repeated.join(", ")
                    ),
                )
                .await?;
            }

            self.scaffolder
                .write_entity_files(&self.base, entity)
                .await
                .map_err(step_failed(format!("generate files for entity {}", entity.name)))?;
            self.log(
                LogLevel::Info,
                &format!("Generated model, controller and routes for {}", entity.name),
            )
            .await?;
        }
        Ok(())
    }

    async fn complete(&self) {
        let handle = directory_handle(&self.base);
        match self.store.set_download_handle(self.job_id, &handle).await {
            Ok(true) => {}
            Ok(false) => {
                info!(job_id = %self.job_id, "Job removed before completion");
                return;
            }
            Err(e) => warn!(job_id = %self.job_id, error = %e, "Failed to record download handle"),
        }
        self.finish(GenerationStatus::Completed).await;
        info!(
            job_id = %self.job_id,
            output = %self.base.display(),
            entity_count = self.entities.len(),
            "Generation completed"
        );
    }

    /// Writes a terminal status, retrying once if the store is unreachable.
    async fn finish(&self, status: GenerationStatus) {
        for attempt in 1..=2 {
            match self.store.set_status(self.job_id, status).await {
                Ok(StatusChange::Applied) => return,
                Ok(StatusChange::NotFound) => {
                    debug!(job_id = %self.job_id, "Job removed before final status");
                    return;
                }
                Ok(StatusChange::Rejected { current }) => {
                    warn!(job_id = %self.job_id, %current, requested = %status, "Final status rejected");
                    return;
                }
                Err(e) if attempt == 1 => {
                    warn!(job_id = %self.job_id, error = %e, "Status write failed, retrying once");
                    tokio::time::sleep(STATUS_RETRY_DELAY).await;
                }
                Err(e) => {
                    error!(job_id = %self.job_id, error = %e, requested = %status, "Status write failed, giving up");
                }
            }
        }
    }

    async fn log(&self, level: LogLevel, message: &str) -> Result<(), Halt> {
        match level {
            LogLevel::Info => info!(job_id = %self.job_id, "{}", message),
            LogLevel::Warning => warn!(job_id = %self.job_id, "{}", message),
            LogLevel::Error => error!(job_id = %self.job_id, "{}", message),
        }
        if self.store.append_log(self.job_id, level, message).await? {
            Ok(())
        } else {
            Err(Halt::JobGone)
        }
    }
}

fn directory_handle(base: &Path) -> String {
    base.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| base.to_string_lossy().into_owned())
}
