use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// A user-owned project whose entities get synthesized into a backend.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
}

impl Project {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        owner_id: &str,
        data: &CreateProject,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Project>(
            r#"INSERT INTO projects (id, owner_id, name, description, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $5)
               RETURNING id, owner_id, name, description, created_at, updated_at"#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(&data.name)
        .bind(data.description.as_deref().unwrap_or_default())
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"SELECT id, owner_id, name, description, created_at, updated_at
               FROM projects
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_owner(
        pool: &SqlitePool,
        owner_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"SELECT id, owner_id, name, description, created_at, updated_at
               FROM projects
               WHERE owner_id = $1
               ORDER BY created_at DESC"#,
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await
    }

    /// Deletes the project row; entities, jobs and logs go with it through cascades.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    #[tokio::test]
    async fn test_create_and_find_project() {
        let db = DBService::new_in_memory().await.unwrap();
        let id = Uuid::new_v4();
        let data = CreateProject {
            name: "Inventory".to_string(),
            description: None,
        };
        let created = Project::create(&db.pool, id, "user-1", &data).await.unwrap();
        assert_eq!(created.description, "");
        assert!(created.is_owned_by("user-1"));
        assert!(!created.is_owned_by("user-2"));

        let found = Project::find_by_id(&db.pool, id).await.unwrap().unwrap();
        assert_eq!(found.name, "Inventory");

        assert_eq!(Project::find_by_owner(&db.pool, "user-1").await.unwrap().len(), 1);
        assert!(Project::find_by_owner(&db.pool, "user-2").await.unwrap().is_empty());

        assert_eq!(Project::delete(&db.pool, id).await.unwrap(), 1);
        assert!(Project::find_by_id(&db.pool, id).await.unwrap().is_none());
    }
}
