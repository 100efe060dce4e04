//! Writes a generated project to disk: directory skeleton, shared bootstrap files and
//! per-entity files.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use db::models::project_entity::EntityDescriptor;
use thiserror::Error;
use tracing::debug;

use super::{
    field_classifier::classify_fields,
    templates::{self, EntityNames, ProjectInfo},
};

/// Directories every generated project gets, relative to its root.
pub const SKELETON_DIRS: &[&str] = &[
    "backend/config",
    "backend/controllers",
    "backend/middleware",
    "backend/models",
    "backend/routes",
    "frontend/public",
    "frontend/src",
    "frontend/src/components",
    "frontend/src/pages",
    "frontend/src/services",
];

/// Shared bootstrap files, relative to the project root.
pub const MANIFEST_FILE: &str = "backend/package.json";
pub const ENV_TEMPLATE_FILE: &str = "backend/.env.example";
pub const ENTRY_POINT_FILE: &str = "backend/server.js";
pub const DATASTORE_FILE: &str = "backend/config/db.js";
pub const ERROR_MIDDLEWARE_FILE: &str = "backend/middleware/errorHandler.js";

pub const SHARED_FILES: &[&str] = &[
    MANIFEST_FILE,
    ENV_TEMPLATE_FILE,
    ENTRY_POINT_FILE,
    DATASTORE_FILE,
    ERROR_MIDDLEWARE_FILE,
];

#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to write {}: {source}", path.display())]
    WriteFile { path: PathBuf, source: io::Error },
}

/// Filesystem operations the generator needs. Directory creation is idempotent and
/// writes fully replace existing files.
#[async_trait]
pub trait ProjectFs: Send + Sync {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    async fn write_file(&self, path: &Path, contents: &str) -> io::Result<()>;
    async fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// [`ProjectFs`] backed by the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl ProjectFs for LocalFs {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        tokio::fs::write(path, contents).await
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_dir_all(path).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[derive(Clone)]
pub struct ProjectScaffolder {
    fs: Arc<dyn ProjectFs>,
}

impl ProjectScaffolder {
    pub fn new(fs: Arc<dyn ProjectFs>) -> Self {
        Self { fs }
    }

    /// Creates the fixed directory tree under `base`. Safe to repeat.
    pub async fn create_skeleton(&self, base: &Path) -> Result<(), ScaffoldError> {
        for dir in SKELETON_DIRS {
            let path = base.join(dir);
            self.fs
                .create_dir_all(&path)
                .await
                .map_err(|source| ScaffoldError::CreateDir { path, source })?;
        }
        debug!(base = %base.display(), "Created project skeleton");
        Ok(())
    }

    /// Writes the bootstrap files, overwriting any earlier version.
    pub async fn write_shared_files(
        &self,
        base: &Path,
        project: &ProjectInfo,
        entities: &[EntityDescriptor],
    ) -> Result<(), ScaffoldError> {
        let files = [
            (MANIFEST_FILE, templates::render_manifest(project)),
            (ENV_TEMPLATE_FILE, templates::render_env_template(project)),
            (ENTRY_POINT_FILE, templates::render_entry_point(project, entities)),
            (DATASTORE_FILE, templates::render_datastore_connector()),
            (ERROR_MIDDLEWARE_FILE, templates::render_error_middleware()),
        ];
        for (relative, contents) in files {
            self.write(&base.join(relative), &contents).await?;
        }
        Ok(())
    }

    /// Renders and writes the model, controller and routes of one entity, in that order.
    /// Stops at the first failed write. Returns the written paths.
    pub async fn write_entity_files(
        &self,
        base: &Path,
        entity: &EntityDescriptor,
    ) -> Result<Vec<PathBuf>, ScaffoldError> {
        let names = EntityNames::of(entity);
        let fields = classify_fields(&entity.fields);
        let backend = base.join("backend");
        let files = [
            (
                backend.join("models").join(names.model_file()),
                templates::render_model(entity, &fields),
            ),
            (
                backend.join("controllers").join(names.controller_file()),
                templates::render_controller(entity),
            ),
            (
                backend.join("routes").join(names.routes_file()),
                templates::render_routes(entity),
            ),
        ];

        let mut written = Vec::with_capacity(files.len());
        for (path, contents) in files {
            self.write(&path, &contents).await?;
            written.push(path);
        }
        Ok(written)
    }

    pub async fn remove(&self, base: &Path) -> io::Result<()> {
        self.fs.remove_dir_all(base).await
    }

    async fn write(&self, path: &Path, contents: &str) -> Result<(), ScaffoldError> {
        self.fs
            .write_file(path, contents)
            .await
            .map_err(|source| ScaffoldError::WriteFile {
                path: path.to_path_buf(),
                source,
            })
    }
}
