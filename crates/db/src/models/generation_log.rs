use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "log_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Append-only progress entry of a generation job. `seq` defines append order.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct GenerationLog {
    pub seq: i64,
    pub job_id: Uuid,
    pub level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl GenerationLog {
    /// Appends an entry. Returns `None` when the job no longer exists.
    pub async fn append(
        pool: &SqlitePool,
        job_id: Uuid,
        level: LogLevel,
        message: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GenerationLog>(
            r#"INSERT INTO generation_logs (job_id, level, message, created_at)
               SELECT $1, $2, $3, $4
               WHERE EXISTS (SELECT 1 FROM generation_jobs WHERE id = $1)
               RETURNING seq, job_id, level, message, created_at"#,
        )
        .bind(job_id)
        .bind(level)
        .bind(message)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_job_id(
        pool: &SqlitePool,
        job_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, GenerationLog>(
            r#"SELECT seq, job_id, level, message, created_at
               FROM generation_logs
               WHERE job_id = $1
               ORDER BY seq ASC"#,
        )
        .bind(job_id)
        .fetch_all(pool)
        .await
    }

    /// The last `limit` entries, oldest first.
    pub async fn find_recent_by_job_id(
        pool: &SqlitePool,
        job_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut logs = sqlx::query_as::<_, GenerationLog>(
            r#"SELECT seq, job_id, level, message, created_at
               FROM generation_logs
               WHERE job_id = $1
               ORDER BY seq DESC
               LIMIT $2"#,
        )
        .bind(job_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        logs.reverse();
        Ok(logs)
    }
}
