//! Shared types, error model, and configuration for Draftsmith.
//!
//! This crate is the foundation depended on by all other Draftsmith crates.
//! It provides:
//! - [`DraftsmithError`] and [`StageError`]: the error taxonomy
//! - Domain types ([`ContentItem`], [`ResearchBundle`], [`TopicSummary`], [`StageResult`])
//! - Configuration ([`AppConfig`], [`CallPolicy`], config loading)
//! - [`with_policy`]: timeout + bounded retry for external calls

pub mod config;
pub mod error;
pub mod policy;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CallPolicy, GeneratorConfig, KnowledgeConfig, ResilienceConfig, ServerConfig,
    StorageConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_api_key,
};
pub use error::{DraftsmithError, ErrorKind, Result, StageError, StageResultExt};
pub use policy::with_policy;
pub use types::{
    ContentItem, ContentItemId, ContentStatus, MAX_SUMMARY_POINTS, NO_CONTENT_SENTINEL,
    PipelineState, ResearchBundle, ResearchRecord, Stage, StageResult, TopicSummary,
};
