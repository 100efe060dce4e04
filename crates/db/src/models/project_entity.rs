use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type, types::Json};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Review state of an entity proposed for a project.
#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default)]
#[sqlx(type_name = "entity_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntityStatus {
    #[default]
    Suggested,
    Accepted,
    Rejected,
}

/// Abstract definition of a data type to scaffold.
///
/// `name` doubles as display label and, lowercased, as a file and route fragment.
/// Duplicate field names are kept as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct EntityDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl EntityDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ProjectEntity {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: String,
    #[ts(as = "Vec<String>")]
    pub fields: Json<Vec<String>>,
    pub status: EntityStatus,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateEntityStatus {
    pub status: EntityStatus,
}

impl ProjectEntity {
    pub fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            fields: self.fields.0.clone(),
        }
    }

    /// Appends an entity at the end of the project's list.
    pub async fn create(
        pool: &SqlitePool,
        project_id: Uuid,
        entity: &EntityDescriptor,
        status: EntityStatus,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ProjectEntity>(
            r#"INSERT INTO project_entities
                   (id, project_id, name, description, fields, status, position, created_at)
               VALUES ($1, $2, $3, $4, $5, $6,
                   (SELECT COALESCE(MAX(position) + 1, 0) FROM project_entities WHERE project_id = $2),
                   $7)
               RETURNING id, project_id, name, description, fields, status, position, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(&entity.name)
        .bind(&entity.description)
        .bind(Json(&entity.fields))
        .bind(status)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectEntity>(
            r#"SELECT id, project_id, name, description, fields, status, position, created_at
               FROM project_entities
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_project_id(
        pool: &SqlitePool,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectEntity>(
            r#"SELECT id, project_id, name, description, fields, status, position, created_at
               FROM project_entities
               WHERE project_id = $1
               ORDER BY position ASC"#,
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    /// Accepted entities in list order; this is what a generation run freezes.
    pub async fn find_accepted(
        pool: &SqlitePool,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectEntity>(
            r#"SELECT id, project_id, name, description, fields, status, position, created_at
               FROM project_entities
               WHERE project_id = $1 AND status = $2
               ORDER BY position ASC"#,
        )
        .bind(project_id)
        .bind(EntityStatus::Accepted)
        .fetch_all(pool)
        .await
    }

    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        status: EntityStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectEntity>(
            r#"UPDATE project_entities
               SET status = $2
               WHERE id = $1
               RETURNING id, project_id, name, description, fields, status, position, created_at"#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DBService,
        models::project::{CreateProject, Project},
    };

    async fn project(db: &DBService) -> Uuid {
        let id = Uuid::new_v4();
        let data = CreateProject {
            name: "Shop".to_string(),
            description: Some("An online shop".to_string()),
        };
        Project::create(&db.pool, id, "owner", &data).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_entities_keep_insertion_order_and_fields() {
        let db = DBService::new_in_memory().await.unwrap();
        let project_id = project(&db).await;

        let customer = EntityDescriptor::new("Customer", "Buyer", ["name", "email", "name"]);
        let order = EntityDescriptor::new("Order", "Purchase", ["customerId", "total"]);
        ProjectEntity::create(&db.pool, project_id, &customer, EntityStatus::Accepted)
            .await
            .unwrap();
        let created = ProjectEntity::create(&db.pool, project_id, &order, EntityStatus::Suggested)
            .await
            .unwrap();
        assert_eq!(created.position, 1);

        let all = ProjectEntity::find_by_project_id(&db.pool, project_id)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].descriptor(), customer);

        let accepted = ProjectEntity::find_accepted(&db.pool, project_id).await.unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].name, "Customer");
    }

    #[tokio::test]
    async fn test_update_status() {
        let db = DBService::new_in_memory().await.unwrap();
        let project_id = project(&db).await;
        let entity = EntityDescriptor::new("Invoice", "", ["amount"]);
        let created = ProjectEntity::create(&db.pool, project_id, &entity, EntityStatus::Suggested)
            .await
            .unwrap();

        let updated = ProjectEntity::update_status(&db.pool, created.id, EntityStatus::Accepted)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, EntityStatus::Accepted);

        let missing = ProjectEntity::update_status(&db.pool, Uuid::new_v4(), EntityStatus::Rejected)
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
