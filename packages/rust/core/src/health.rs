//! Dependency health checks: generator, knowledge source, database.

use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use draftsmith_generator::ContentGenerator;
use draftsmith_knowledge::KnowledgeSource;
use draftsmith_shared::Result;
use draftsmith_storage::Storage;
use serde::Serialize;
use tracing::{info, instrument};

use crate::pipeline::Orchestrator;

/// Prompt sent to the generator probe.
pub const GENERATOR_PROBE_PROMPT: &str = "Hello, are you working?";

/// Topic searched by the knowledge probe.
pub const KNOWLEDGE_PROBE_TOPIC: &str = "artificial intelligence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    /// Not probed (quick mode).
    Skipped,
}

/// Outcome of one probe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub status: HealthStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl CheckResult {
    fn healthy(message: impl Into<String>, started: Instant) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: message.into(),
            response_time_ms: Some(started.elapsed().as_millis() as u64),
        }
    }

    fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: message.into(),
            response_time_ms: None,
        }
    }

    fn skipped() -> Self {
        Self {
            status: HealthStatus::Skipped,
            message: "skipped (quick mode)".into(),
            response_time_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    pub generator: CheckResult,
    pub knowledge: CheckResult,
    pub database: CheckResult,
}

/// Aggregate report. Healthy iff every probe that ran is healthy.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: HealthChecks,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Run the probes concurrently. `quick` probes only the database.
///
/// A missing generator (no API key configured) reports unhealthy.
#[instrument(skip_all, fields(quick))]
pub async fn check_health(
    storage: &Storage,
    knowledge: &dyn KnowledgeSource,
    generator: Option<&dyn ContentGenerator>,
    quick: bool,
) -> HealthReport {
    let (generator, knowledge, database) = if quick {
        (
            CheckResult::skipped(),
            CheckResult::skipped(),
            check_database(storage).await,
        )
    } else {
        tokio::join!(
            check_generator(generator),
            check_knowledge(knowledge),
            check_database(storage),
        )
    };

    let all_healthy = [&generator, &knowledge, &database]
        .iter()
        .all(|check| check.status != HealthStatus::Unhealthy);
    let status = if all_healthy {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };

    info!(?status, "health check complete");
    HealthReport {
        status,
        checks: HealthChecks {
            generator,
            knowledge,
            database,
        },
        timestamp: Utc::now(),
    }
}

/// Send a trivial prompt and expect recognisable text back.
pub async fn check_generator(generator: Option<&dyn ContentGenerator>) -> CheckResult {
    let Some(generator) = generator else {
        return CheckResult::unhealthy("generator API key is not configured");
    };

    let started = Instant::now();
    match generator.generate(GENERATOR_PROBE_PROMPT).await {
        Ok(text) if text.is_sentinel() || text.text.trim().is_empty() => {
            CheckResult::unhealthy("generator returned an empty response")
        }
        Ok(_) => CheckResult::healthy("generator is responding", started),
        Err(e) => CheckResult::unhealthy(e.to_string()),
    }
}

/// Search a well-known topic, then fetch the first hit's summary.
pub async fn check_knowledge(source: &dyn KnowledgeSource) -> CheckResult {
    let started = Instant::now();
    let titles = match source.search(KNOWLEDGE_PROBE_TOPIC).await {
        Ok(titles) => titles,
        Err(e) => return CheckResult::unhealthy(e.to_string()),
    };
    let Some(first) = titles.first() else {
        return CheckResult::unhealthy("knowledge source returned no search results");
    };

    match source.fetch_summary(first).await {
        Ok(summary) => CheckResult::healthy(
            format!("knowledge source is responding (found '{}')", summary.title),
            started,
        ),
        Err(failure) => CheckResult::unhealthy(failure.to_string()),
    }
}

/// Round-trip `SELECT 1`.
pub async fn check_database(storage: &Storage) -> CheckResult {
    timed(storage.ping(), "database connection is working").await
}

async fn timed<F>(probe: F, ok_message: &str) -> CheckResult
where
    F: Future<Output = Result<()>>,
{
    let started = Instant::now();
    match probe.await {
        Ok(()) => CheckResult::healthy(ok_message, started),
        Err(e) => CheckResult::unhealthy(e.to_string()),
    }
}

impl Orchestrator {
    /// Probe every dependency this orchestrator uses.
    pub async fn health(&self, quick: bool) -> HealthReport {
        check_health(
            self.storage(),
            self.knowledge().as_ref(),
            Some(self.generator().as_ref()),
            quick,
        )
        .await
    }
}
