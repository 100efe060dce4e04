//! Proposes entities for a project from its description.
//!
//! The AI provider is optional and untrusted: any failure, malformed reply or empty
//! result falls back to a [`DefaultEntityProvider`].

use std::{collections::HashSet, sync::Arc};

use db::models::{
    project::Project,
    project_entity::{EntityDescriptor, EntityStatus, ProjectEntity},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use super::ai_provider::{AiProvider, AiProviderError, ask_json};

const SYSTEM_PROMPT: &str = "You are a backend architect designing the data model for a CRUD API. \
     Be concise and practical. Output valid JSON only.";

#[derive(Debug, Error)]
pub enum EntitySuggestionError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Source of entities used when the provider is unavailable or unusable.
pub trait DefaultEntityProvider: Send + Sync {
    fn default_entities(&self, project_name: &str) -> Vec<EntityDescriptor>;
}

/// Shipped fallback: a small user/product/order model.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEntities;

impl DefaultEntityProvider for BuiltinEntities {
    fn default_entities(&self, _project_name: &str) -> Vec<EntityDescriptor> {
        vec![
            EntityDescriptor::new(
                "User",
                "Application user account",
                ["name", "email", "password", "role"],
            ),
            EntityDescriptor::new(
                "Product",
                "Item offered by the application",
                ["name", "description", "price", "imageUrl", "status"],
            ),
            EntityDescriptor::new(
                "Order",
                "Purchase placed by a user",
                ["userId", "productId", "totalAmount", "status", "orderDate"],
            ),
        ]
    }
}

/// A fixed list, for tests and seeded deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticEntities(pub Vec<EntityDescriptor>);

impl DefaultEntityProvider for StaticEntities {
    fn default_entities(&self, _project_name: &str) -> Vec<EntityDescriptor> {
        self.0.clone()
    }
}

#[derive(Debug, Deserialize)]
struct SuggestionResponse {
    entities: Vec<EntityDescriptor>,
}

/// Normalizes an entity name into an identifier fragment. `None` when nothing is left.
pub fn normalize_entity_name(name: &str) -> Option<String> {
    let stripped = utils::text::strip_non_alphanumeric(name);
    let starts_with_letter = stripped.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    starts_with_letter.then_some(stripped)
}

/// Normalizes names, trims field names and drops entities without a usable name or
/// whose name repeats an earlier one.
pub fn sanitize_entities(entities: Vec<EntityDescriptor>) -> Vec<EntityDescriptor> {
    let mut seen = HashSet::new();
    entities
        .into_iter()
        .filter_map(|entity| {
            let name = normalize_entity_name(&entity.name)?;
            if !seen.insert(name.to_lowercase()) {
                return None;
            }
            let fields = entity
                .fields
                .iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
            Some(EntityDescriptor {
                name,
                description: entity.description.trim().to_string(),
                fields,
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct EntitySuggester {
    provider: Option<Arc<dyn AiProvider>>,
    defaults: Arc<dyn DefaultEntityProvider>,
}

impl EntitySuggester {
    pub fn new(
        provider: Option<Arc<dyn AiProvider>>,
        defaults: Arc<dyn DefaultEntityProvider>,
    ) -> Self {
        Self { provider, defaults }
    }

    /// Entities for a project. Never fails; falls back to the defaults.
    pub async fn suggest(&self, project_name: &str, description: &str) -> Vec<EntityDescriptor> {
        let Some(provider) = &self.provider else {
            info!(project = %project_name, "No AI provider configured, using default entities");
            return self.defaults.default_entities(project_name);
        };

        match self.ask_provider(provider.as_ref(), project_name, description).await {
            Ok(entities) if !entities.is_empty() => entities,
            Ok(_) => {
                warn!(project = %project_name, "Provider suggested no usable entities, using defaults");
                self.defaults.default_entities(project_name)
            }
            Err(e) => {
                warn!(project = %project_name, error = %e, "Entity suggestion failed, using defaults");
                self.defaults.default_entities(project_name)
            }
        }
    }

    /// Suggests entities for `project` and stores them for review. Names the project
    /// already has, in any status and ignoring case, are skipped.
    pub async fn suggest_for_project(
        &self,
        pool: &SqlitePool,
        project: &Project,
    ) -> Result<Vec<ProjectEntity>, EntitySuggestionError> {
        let existing: HashSet<String> = ProjectEntity::find_by_project_id(pool, project.id)
            .await?
            .into_iter()
            .map(|e| e.name.to_lowercase())
            .collect();
        let entities: Vec<_> =
            sanitize_entities(self.suggest(&project.name, &project.description).await)
                .into_iter()
                .filter(|e| !existing.contains(&e.name.to_lowercase()))
                .collect();
        let mut stored = Vec::with_capacity(entities.len());
        for entity in &entities {
            stored.push(
                ProjectEntity::create(pool, project.id, entity, EntityStatus::Suggested).await?,
            );
        }
        info!(
            project_id = %project.id,
            entity_count = stored.len(),
            "Stored suggested entities"
        );
        Ok(stored)
    }

    async fn ask_provider(
        &self,
        provider: &dyn AiProvider,
        project_name: &str,
        description: &str,
    ) -> Result<Vec<EntityDescriptor>, AiProviderError> {
        let prompt = format!(
            r#"Design the data entities for the following application.

## Application
Name: {project_name}
Description: {description}

## Instructions
1. Identify the core entities the backend must store
2. Use PascalCase singular names (e.g. "Customer", "OrderItem")
3. List field names in camelCase; reference other entities with an `Id` suffix (e.g. "customerId")
4. Do not include an `id` field; every entity gets one implicitly

## Output Format
Return ONLY valid JSON with this structure:
```json
{{
  "entities": [
    {{
      "name": "Customer",
      "description": "Person who places orders",
      "fields": ["name", "email", "createdAt"]
    }}
  ]
}}
```
"#
        );

        let response: SuggestionResponse = ask_json(provider, &prompt, Some(SYSTEM_PROMPT)).await?;
        Ok(sanitize_entities(response.entities))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use db::{DBService, models::project::CreateProject};
    use uuid::Uuid;

    use super::*;

    struct CannedProvider(Result<String, AiProviderError>);

    #[async_trait]
    impl AiProvider for CannedProvider {
        async fn complete(&self, _: &str, _: Option<&str>) -> Result<String, AiProviderError> {
            self.0.clone()
        }
    }

    fn fixture() -> Arc<dyn DefaultEntityProvider> {
        Arc::new(StaticEntities(vec![EntityDescriptor::new(
            "Fixture",
            "",
            ["label"],
        )]))
    }

    fn suggester(reply: Result<String, AiProviderError>) -> EntitySuggester {
        EntitySuggester::new(Some(Arc::new(CannedProvider(reply))), fixture())
    }

    #[test]
    fn test_normalize_entity_name() {
        assert_eq!(normalize_entity_name("Order Item"), Some("OrderItem".to_string()));
        assert_eq!(normalize_entity_name("  "), None);
        assert_eq!(normalize_entity_name("123abc"), None);
    }

    #[test]
    fn test_sanitize_drops_unusable_and_repeated() {
        let entities = vec![
            EntityDescriptor::new("Customer", " Buyer ", [" name ", "", "email"]),
            EntityDescriptor::new("customer", "", ["x"]),
            EntityDescriptor::new("!!!", "", ["x"]),
        ];
        let cleaned = sanitize_entities(entities);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0], EntityDescriptor::new("Customer", "Buyer", ["name", "email"]));
    }

    #[tokio::test]
    async fn test_uses_provider_reply() {
        let reply = r#"```json
{"entities": [{"name": "Patient", "description": "Person treated", "fields": ["name", "birthDate"]}]}
```"#;
        let entities = suggester(Ok(reply.to_string()))
            .suggest("Clinic", "Patient records")
            .await;
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "Patient");
        assert_eq!(entities[0].fields, vec!["name", "birthDate"]);
    }

    #[tokio::test]
    async fn test_falls_back_on_error_malformed_or_empty() {
        for reply in [
            Err(AiProviderError::Timeout),
            Ok("sorry, no JSON here".to_string()),
            Ok(r#"{"entities": []}"#.to_string()),
            Ok(r#"{"entities": [{"name": "???"}]}"#.to_string()),
        ] {
            let entities = suggester(reply).suggest("Clinic", "").await;
            assert_eq!(entities, vec![EntityDescriptor::new("Fixture", "", ["label"])]);
        }
    }

    #[tokio::test]
    async fn test_without_provider_uses_builtin_defaults() {
        let suggester = EntitySuggester::new(None, Arc::new(BuiltinEntities));
        let names: Vec<_> = suggester
            .suggest("Shop", "")
            .await
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["User", "Product", "Order"]);
    }

    #[tokio::test]
    async fn test_suggest_for_project_persists_as_suggested() {
        let db = DBService::new_in_memory().await.unwrap();
        let data = CreateProject {
            name: "Shop".to_string(),
            description: None,
        };
        let project = Project::create(&db.pool, Uuid::new_v4(), "owner", &data)
            .await
            .unwrap();

        let suggester = EntitySuggester::new(None, Arc::new(BuiltinEntities));
        let stored = suggester.suggest_for_project(&db.pool, &project).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|e| e.status == EntityStatus::Suggested));
        assert!(
            ProjectEntity::find_accepted(&db.pool, project.id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_suggest_for_project_skips_existing_names() {
        let db = DBService::new_in_memory().await.unwrap();
        let data = CreateProject {
            name: "Shop".to_string(),
            description: None,
        };
        let project = Project::create(&db.pool, Uuid::new_v4(), "owner", &data)
            .await
            .unwrap();
        ProjectEntity::create(
            &db.pool,
            project.id,
            &EntityDescriptor::new("order", "", ["total"]),
            EntityStatus::Accepted,
        )
        .await
        .unwrap();

        let suggester = EntitySuggester::new(None, Arc::new(BuiltinEntities));
        let stored = suggester.suggest_for_project(&db.pool, &project).await.unwrap();
        let names: Vec<_> = stored.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["User", "Product"]);

        assert!(
            suggester
                .suggest_for_project(&db.pool, &project)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            ProjectEntity::find_by_project_id(&db.pool, project.id)
                .await
                .unwrap()
                .len(),
            3
        );
    }
}
