pub mod ai_provider;
pub mod config;
pub mod entity_suggester;
pub mod field_classifier;
pub mod generation;
pub mod generation_timeout;
pub mod job_store;
pub mod projects;
pub mod scaffolder;
pub mod templates;
