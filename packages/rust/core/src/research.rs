//! Research aggregation: topic → main summary + related summaries.

use std::sync::Arc;

use draftsmith_knowledge::{KnowledgeSource, RawSummary};
use draftsmith_markdown::bullet_points;
use draftsmith_shared::{
    DraftsmithError, MAX_SUMMARY_POINTS, ResearchBundle, Result, TopicSummary,
};
use futures::future::join_all;
use tracing::{info, instrument, warn};

/// Message prefix of the not-found error raised when search has no hits.
pub const NO_RESULTS: &str = "no results for topic";

/// Combines knowledge source results into a [`ResearchBundle`].
#[derive(Clone)]
pub struct ResearchAggregator {
    source: Arc<dyn KnowledgeSource>,
    source_label: String,
    related_limit: usize,
}

impl ResearchAggregator {
    pub fn new(
        source: Arc<dyn KnowledgeSource>,
        source_label: impl Into<String>,
        related_limit: usize,
    ) -> Self {
        Self {
            source,
            source_label: source_label.into(),
            related_limit,
        }
    }

    /// Research `topic`.
    ///
    /// The top search hit becomes the main topic and must be fetched. The
    /// following hits, up to `related_limit`, are fetched concurrently; any
    /// that fail are dropped and the rest keep search order.
    #[instrument(skip_all, fields(topic = %topic))]
    pub async fn aggregate(&self, topic: &str) -> Result<ResearchBundle> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(DraftsmithError::validation("topic must not be empty"));
        }

        let candidates = self.source.search(topic).await?;
        let Some((main_title, rest)) = candidates.split_first() else {
            return Err(DraftsmithError::not_found(format!("{NO_RESULTS} '{topic}'")));
        };

        let main = self
            .source
            .fetch_summary(main_title)
            .await
            .map_err(|failure| DraftsmithError::upstream("knowledge", failure.to_string()))?;

        let related_titles = &rest[..rest.len().min(self.related_limit)];
        let fetches = related_titles
            .iter()
            .map(|title| self.source.fetch_summary(title));

        let mut related_topics = Vec::with_capacity(related_titles.len());
        for outcome in join_all(fetches).await {
            match outcome {
                Ok(raw) => related_topics.push(summarize(raw)),
                Err(failure) => warn!(title = %failure.title, reason = %failure.reason, "dropping related topic"),
            }
        }

        info!(
            main = %main.title,
            related = related_topics.len(),
            requested = related_titles.len(),
            "research aggregated"
        );

        Ok(ResearchBundle {
            source: self.source_label.clone(),
            main_topic: summarize(main),
            related_topics,
        })
    }
}

/// Condense a raw summary into bullet points.
pub fn summarize(raw: RawSummary) -> TopicSummary {
    TopicSummary {
        summary: bullet_points(&raw.extract, MAX_SUMMARY_POINTS),
        title: raw.title,
        description: raw.description,
        url: raw.url,
    }
}
