//! Data models: configuration, templates and annotation records.

pub mod annotation;
pub mod config;
pub mod template;
