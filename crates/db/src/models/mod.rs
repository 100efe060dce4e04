pub mod generation_job;
pub mod generation_log;
pub mod project;
pub mod project_entity;
