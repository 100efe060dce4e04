use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use db::DBService;
use deployment::{Deployment, DeploymentError};
use services::services::{
    ai_provider::{AiProvider, ClaudeProvider},
    config::GenerationConfig,
    entity_suggester::{BuiltinEntities, DefaultEntityProvider, EntitySuggester},
    generation::GenerationService,
    generation_timeout::GenerationTimeoutService,
    job_store::SqliteJobStore,
    projects::ProjectService,
    scaffolder::LocalFs,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const DEFAULT_DATABASE_URL: &str = "sqlite://data.db?mode=rwc";

/// Everything on one machine: SQLite, the local filesystem, an optional Claude provider.
#[derive(Clone)]
pub struct LocalDeployment {
    db: DBService,
    generation: GenerationService,
    projects: ProjectService,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl LocalDeployment {
    /// Wires the services over an existing database.
    pub async fn from_parts(
        db: DBService,
        config: GenerationConfig,
        provider: Option<Arc<dyn AiProvider>>,
        defaults: Arc<dyn DefaultEntityProvider>,
    ) -> Result<Self, DeploymentError> {
        tokio::fs::create_dir_all(&config.output_root).await?;

        let generation = GenerationService::new(
            db.pool.clone(),
            Arc::new(SqliteJobStore::new(db.pool.clone())),
            Arc::new(LocalFs),
            config,
        );
        let suggester = EntitySuggester::new(provider, defaults);
        let projects = ProjectService::new(db.pool.clone(), generation.clone(), suggester);

        Ok(Self {
            db,
            generation,
            projects,
            sweeper: Arc::new(Mutex::new(None)),
        })
    }

    /// Starts the abandoned-job sweeper. Repeated calls keep the first sweeper.
    pub fn spawn_background_services(&self) {
        let Ok(mut sweeper) = self.sweeper.lock() else {
            warn!("Sweeper handle poisoned, not starting generation timeout service");
            return;
        };
        if sweeper.is_none() {
            *sweeper = Some(GenerationTimeoutService::spawn(self.generation.clone()));
        }
    }
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new() -> Result<Self, DeploymentError> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let db = DBService::new(&database_url).await?;
        let config = GenerationConfig::from_env();

        let provider: Option<Arc<dyn AiProvider>> = match ClaudeProvider::from_env() {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                info!(reason = %e, "Entity suggestions will use built-in defaults");
                None
            }
        };

        info!(
            output_root = %config.output_root.display(),
            job_timeout = ?config.job_timeout,
            "Local deployment configured"
        );
        let deployment = Self::from_parts(db, config, provider, Arc::new(BuiltinEntities)).await?;
        deployment.spawn_background_services();
        Ok(deployment)
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn config(&self) -> &GenerationConfig {
        self.generation.config()
    }

    fn generation(&self) -> &GenerationService {
        &self.generation
    }

    fn projects(&self) -> &ProjectService {
        &self.projects
    }

    async fn shutdown(&self) {
        let handle = self.sweeper.lock().ok().and_then(|mut sweeper| sweeper.take());
        if let Some(handle) = handle {
            handle.abort();
        }
        info!("Local deployment shut down");
    }
}
