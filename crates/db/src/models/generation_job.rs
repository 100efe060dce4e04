use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type, types::Json};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::project_entity::EntityDescriptor;

/// Lifecycle of one generation run: `Pending -> Generating -> Completed | Failed`.
#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default)]
#[sqlx(type_name = "generation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GenerationStatus {
    #[default]
    Pending,
    Generating,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The only state a job may move into `self` from.
    pub fn predecessor(&self) -> Option<Self> {
        match self {
            Self::Pending => None,
            Self::Generating => Some(Self::Pending),
            Self::Completed | Self::Failed => Some(Self::Generating),
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        next.predecessor() == Some(*self)
    }
}

/// Persisted state of one generation run for a project.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct GenerationJob {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Entity list frozen when the run was requested.
    #[ts(as = "Vec<EntityDescriptor>")]
    pub entities: Json<Vec<EntityDescriptor>>,
    pub status: GenerationStatus,
    pub output_path: Option<String>,
    pub download_handle: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const JOB_COLUMNS: &str =
    "id, project_id, entities, status, output_path, download_handle, created_at, updated_at";

impl GenerationJob {
    /// Inserts a run directly as `generating` unless the project already has an unfinished
    /// one, in which case nothing is written and `None` is returned.
    pub async fn start(
        pool: &SqlitePool,
        id: Uuid,
        project_id: Uuid,
        entities: &[EntityDescriptor],
        output_path: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let now = Utc::now();
        let inserted = sqlx::query_as::<_, GenerationJob>(&format!(
            r#"INSERT INTO generation_jobs
                   (id, project_id, entities, status, output_path, created_at, updated_at)
               SELECT $1, $2, $3, $4, $5, $6, $6
               WHERE NOT EXISTS (
                   SELECT 1 FROM generation_jobs
                   WHERE project_id = $2 AND status IN ($7, $4)
               )
               RETURNING {JOB_COLUMNS}"#
        ))
        .bind(id)
        .bind(project_id)
        .bind(Json(entities))
        .bind(GenerationStatus::Generating)
        .bind(output_path)
        .bind(now)
        .bind(GenerationStatus::Pending)
        .fetch_optional(pool)
        .await;

        match inserted {
            // The partial unique index backs the NOT EXISTS guard.
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
            other => other,
        }
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GenerationJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM generation_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Most recent run for a project.
    pub async fn find_latest_by_project_id(
        pool: &SqlitePool,
        project_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GenerationJob>(&format!(
            r#"SELECT {JOB_COLUMNS}
               FROM generation_jobs
               WHERE project_id = $1
               ORDER BY created_at DESC, rowid DESC
               LIMIT 1"#
        ))
        .bind(project_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_project_id(
        pool: &SqlitePool,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, GenerationJob>(&format!(
            r#"SELECT {JOB_COLUMNS}
               FROM generation_jobs
               WHERE project_id = $1
               ORDER BY created_at ASC, rowid ASC"#
        ))
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_status(
        pool: &SqlitePool,
        status: GenerationStatus,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, GenerationJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM generation_jobs WHERE status = $1"
        ))
        .bind(status)
        .fetch_all(pool)
        .await
    }

    /// Moves the job into `status` only from its allowed predecessor.
    /// Returns the number of rows changed: 0 when the job is gone or the move is not allowed.
    pub async fn transition_status(
        pool: &SqlitePool,
        id: Uuid,
        status: GenerationStatus,
    ) -> Result<u64, sqlx::Error> {
        let Some(from) = status.predecessor() else {
            return Ok(0);
        };
        let result = sqlx::query(
            r#"UPDATE generation_jobs
               SET status = $2, updated_at = $4
               WHERE id = $1 AND status = $3"#,
        )
        .bind(id)
        .bind(status)
        .bind(from)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_output_path(
        pool: &SqlitePool,
        id: Uuid,
        output_path: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_jobs SET output_path = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(output_path)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_download_handle(
        pool: &SqlitePool,
        id: Uuid,
        handle: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_jobs SET download_handle = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(handle)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Records progress without changing any other column.
    pub async fn touch(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE generation_jobs SET updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
