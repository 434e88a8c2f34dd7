//! Pipeline orchestration for Draftsmith.
//!
//! This crate ties the knowledge source, generator, text normalization and
//! storage together into the topic → research → write → edit → publish flow.

pub mod health;
pub mod pipeline;
pub mod prompts;
pub mod research;
pub mod seed;

#[cfg(test)]
mod test_support;

pub use health::{CheckResult, HealthReport, HealthStatus, check_health};
pub use pipeline::{
    EditRequest, Orchestrator, PipelineRun, ProgressReporter, ResearchMode, SilentProgress,
    StageOutcome, TopicOutcome, TopicRequest,
};
pub use research::{NO_RESULTS, ResearchAggregator};
