//! Stage orchestration: topic → research → write → edit → publish.
//!
//! The [`Orchestrator`] validates each stage's preconditions against the
//! stored [`PipelineState`], calls the knowledge source and generator, persists
//! the outcome, and only then advances the state. Every failure leaves the
//! orchestrator as a [`StageError`] naming the stage that failed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use draftsmith_generator::ContentGenerator;
use draftsmith_knowledge::KnowledgeSource;
use draftsmith_markdown::{normalize_generated, parse_topic_list};
use draftsmith_shared::{
    AppConfig, ContentItem, ContentItemId, ContentStatus, DraftsmithError, PipelineState,
    ResearchBundle, Result, Stage, StageError, StageResult, StageResultExt,
};
use draftsmith_storage::Storage;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::prompts::{self, TOPIC_IDEA_COUNT};
use crate::research::ResearchAggregator;

/// Outcome of a stage call.
pub type StageOutcome<P> = std::result::Result<StageResult<P>, StageError>;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Input to [`Orchestrator::select_topic`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRequest {
    /// Free-form intent to expand into topic ideas.
    #[serde(default)]
    pub user_input: Option<String>,
    /// A chosen topic. Takes precedence over `user_input`.
    #[serde(default)]
    pub selected_topic: Option<String>,
    /// Existing item to re-target instead of creating a new one.
    #[serde(default)]
    pub content_item_id: Option<ContentItemId>,
}

/// What [`Orchestrator::select_topic`] produced.
#[derive(Debug, Clone)]
pub enum TopicOutcome {
    /// Candidate topics. No item was created or changed.
    Suggestions(Vec<String>),
    /// The item now carrying the selected topic.
    Selected(ContentItem),
}

/// How [`Orchestrator::research`] obtains its bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResearchMode {
    /// Query the knowledge source and store the result.
    #[default]
    #[serde(rename = "research")]
    FetchNew,
    /// Read the bundle already stored for the item.
    UseExisting,
}

/// Input to [`Orchestrator::edit`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditRequest {
    #[serde(default)]
    pub draft: String,
    #[serde(default)]
    pub instructions: String,
    /// Optional tone, e.g. "casual".
    #[serde(default)]
    pub style: Option<String>,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for [`Orchestrator::run_pipeline`].
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, name: &str);
    /// Called when the run completes.
    fn done(&self, run: &PipelineRun);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _run: &PipelineRun) {}
}

/// Result of [`Orchestrator::run_pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub item: ContentItem,
    pub research: ResearchBundle,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives content items through the pipeline stages.
#[derive(Clone)]
pub struct Orchestrator {
    storage: Arc<Storage>,
    knowledge: Arc<dyn KnowledgeSource>,
    generator: Arc<dyn ContentGenerator>,
    aggregator: ResearchAggregator,
}

impl Orchestrator {
    pub fn new(
        storage: Arc<Storage>,
        knowledge: Arc<dyn KnowledgeSource>,
        generator: Arc<dyn ContentGenerator>,
        config: &AppConfig,
    ) -> Self {
        let aggregator = ResearchAggregator::new(
            Arc::clone(&knowledge),
            config.knowledge.base_url.clone(),
            config.knowledge.related_limit,
        );
        Self {
            storage,
            knowledge,
            generator,
            aggregator,
        }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn knowledge(&self) -> &Arc<dyn KnowledgeSource> {
        &self.knowledge
    }

    pub fn generator(&self) -> &Arc<dyn ContentGenerator> {
        &self.generator
    }

    // --- Topic ---

    /// Select a topic, or expand an intent into topic ideas.
    #[instrument(skip_all, fields(stage = "topic"))]
    pub async fn select_topic(&self, request: TopicRequest) -> StageOutcome<TopicOutcome> {
        self.select_topic_inner(request).await.in_stage(Stage::Topic)
    }

    async fn select_topic_inner(&self, request: TopicRequest) -> Result<StageResult<TopicOutcome>> {
        if let Some(topic) = non_blank(request.selected_topic.as_deref()) {
            let item = match &request.content_item_id {
                Some(id) => {
                    let existing = self.storage.require_content_item(id).await?;
                    ensure_unpublished(&existing)?;
                    self.storage.set_topic(id, topic).await?
                }
                None => {
                    self.storage
                        .insert_content_item(Some(topic), None, ContentStatus::Draft)
                        .await?
                }
            };

            info!(id = %item.id, %topic, "topic selected");
            return Ok(StageResult::new(
                Stage::Topic,
                TopicOutcome::Selected(item),
                Some(Stage::Research),
            ));
        }

        let Some(intent) = non_blank(request.user_input.as_deref()) else {
            return Err(DraftsmithError::validation(
                "either selectedTopic or userInput is required",
            ));
        };

        let text = self.generate(&prompts::topic_ideas(intent)).await?;
        let topics = parse_topic_list(&text, TOPIC_IDEA_COUNT);
        if topics.len() < TOPIC_IDEA_COUNT {
            return Err(DraftsmithError::upstream(
                "generator",
                format!(
                    "expected {TOPIC_IDEA_COUNT} distinct topics, got {}",
                    topics.len()
                ),
            ));
        }

        info!(count = topics.len(), "topic ideas generated");
        Ok(StageResult::new(
            Stage::Topic,
            TopicOutcome::Suggestions(topics),
            Some(Stage::Topic),
        ))
    }

    // --- Research ---

    /// Gather research for an item's topic, or load what is stored.
    #[instrument(skip_all, fields(stage = "research", id = %id, ?mode))]
    pub async fn research(&self, id: &ContentItemId, mode: ResearchMode) -> StageOutcome<ResearchBundle> {
        self.research_inner(id, mode).await.in_stage(Stage::Research)
    }

    async fn research_inner(
        &self,
        id: &ContentItemId,
        mode: ResearchMode,
    ) -> Result<StageResult<ResearchBundle>> {
        let item = self.storage.require_content_item(id).await?;
        ensure_unpublished(&item)?;
        let topic = item
            .topic()
            .ok_or_else(|| DraftsmithError::precondition(format!("content item {id} has no topic")))?;

        let bundle = match mode {
            ResearchMode::FetchNew => {
                let bundle = self.aggregator.aggregate(topic).await?;
                self.storage.upsert_research(id, &bundle).await?;
                bundle
            }
            ResearchMode::UseExisting => {
                self.storage
                    .get_research(id)
                    .await?
                    .ok_or_else(|| {
                        DraftsmithError::not_found(format!("no research stored for content item {id}"))
                    })?
                    .content
            }
        };

        if item.stage < PipelineState::Researched {
            self.storage.set_stage(id, PipelineState::Researched).await?;
        }

        info!(main = %bundle.main_topic.title, related = bundle.related_topics.len(), "research ready");
        Ok(StageResult::new(Stage::Research, bundle, Some(Stage::Write)))
    }

    // --- Write ---

    /// Generate a first draft from the stored research.
    #[instrument(skip_all, fields(stage = "write", id = %id))]
    pub async fn write(&self, id: &ContentItemId) -> StageOutcome<ContentItem> {
        self.write_inner(id).await.in_stage(Stage::Write)
    }

    async fn write_inner(&self, id: &ContentItemId) -> Result<StageResult<ContentItem>> {
        let item = self.storage.require_content_item(id).await?;
        ensure_unpublished(&item)?;
        if item.stage < PipelineState::Researched {
            return Err(DraftsmithError::precondition(format!(
                "content item {id} has not been researched"
            )));
        }
        let topic = item
            .topic()
            .ok_or_else(|| DraftsmithError::precondition(format!("content item {id} has no topic")))?;

        let research = self
            .storage
            .get_research(id)
            .await?
            .ok_or_else(|| DraftsmithError::not_found(format!("no research stored for content item {id}")))?;

        let draft = self.generate(&prompts::draft(topic, &research.content)).await?;
        let item = self.storage.set_draft(id, &draft, PipelineState::Drafted).await?;

        info!(len = draft.len(), "draft written");
        Ok(StageResult::new(Stage::Write, item, Some(Stage::Edit)))
    }

    // --- Edit ---

    /// Ask the editor persona for revisions. The stored draft is not changed.
    #[instrument(skip_all, fields(stage = "edit", id = %id))]
    pub async fn edit(&self, id: &ContentItemId, request: EditRequest) -> StageOutcome<String> {
        self.edit_inner(id, request).await.in_stage(Stage::Edit)
    }

    async fn edit_inner(&self, id: &ContentItemId, request: EditRequest) -> Result<StageResult<String>> {
        if request.draft.trim().is_empty() || request.instructions.trim().is_empty() {
            return Err(DraftsmithError::validation(
                "both draft and instructions are required",
            ));
        }

        let item = self.storage.require_content_item(id).await?;
        ensure_draft(&item)?;

        let prompt = prompts::edit(&request.draft, &request.instructions, request.style.as_deref());
        let suggestion = self.generate(&prompt).await?;
        if item.stage != PipelineState::Edited {
            self.storage.set_stage(id, PipelineState::Edited).await?;
        }

        info!(len = suggestion.len(), "edit suggested");
        Ok(StageResult::new(Stage::Edit, suggestion, Some(Stage::Publish)))
    }

    /// Adopt revised text as the item's draft.
    #[instrument(skip_all, fields(stage = "edit", id = %id))]
    pub async fn apply_edit(&self, id: &ContentItemId, content: &str) -> StageOutcome<ContentItem> {
        self.apply_edit_inner(id, content).await.in_stage(Stage::Edit)
    }

    async fn apply_edit_inner(&self, id: &ContentItemId, content: &str) -> Result<StageResult<ContentItem>> {
        if content.trim().is_empty() {
            return Err(DraftsmithError::validation("content is required"));
        }

        let item = self.storage.require_content_item(id).await?;
        ensure_draft(&item)?;

        let item = self.storage.set_draft(id, content, PipelineState::Edited).await?;
        Ok(StageResult::new(Stage::Edit, item, Some(Stage::Publish)))
    }

    // --- Publish ---

    /// Mark a drafted item published. Terminal.
    #[instrument(skip_all, fields(stage = "publish", id = %id))]
    pub async fn publish(&self, id: &ContentItemId) -> StageOutcome<ContentItem> {
        self.publish_inner(id).await.in_stage(Stage::Publish)
    }

    async fn publish_inner(&self, id: &ContentItemId) -> Result<StageResult<ContentItem>> {
        let item = self.storage.require_content_item(id).await?;
        ensure_draft(&item)?;

        let item = self.storage.publish(id).await?;
        info!("content item published");
        Ok(StageResult::new(Stage::Publish, item, None))
    }

    // --- Full run ---

    /// Select `topic`, research it, and write a draft.
    #[instrument(skip_all, fields(topic = %topic))]
    pub async fn run_pipeline(
        &self,
        topic: &str,
        progress: &dyn ProgressReporter,
    ) -> std::result::Result<PipelineRun, StageError> {
        let start = Instant::now();

        progress.phase("Selecting topic");
        let selected = self
            .select_topic(TopicRequest {
                selected_topic: Some(topic.to_string()),
                ..Default::default()
            })
            .await?;
        let TopicOutcome::Selected(item) = selected.payload else {
            return Err(StageError::new(
                Stage::Topic,
                DraftsmithError::validation("topic must not be empty"),
            ));
        };

        progress.phase("Researching");
        let research = self.research(&item.id, ResearchMode::FetchNew).await?.payload;

        progress.phase("Writing draft");
        let item = self.write(&item.id).await?.payload;

        let run = PipelineRun {
            item,
            research,
            elapsed: start.elapsed(),
        };
        progress.done(&run);
        Ok(run)
    }

    /// Generate and normalize text.
    async fn generate(&self, prompt: &str) -> Result<String> {
        let generated = self.generator.generate(prompt).await?;
        if generated.is_sentinel() {
            warn!("generator returned no usable content");
        }
        Ok(normalize_generated(&generated.text))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn ensure_unpublished(item: &ContentItem) -> Result<()> {
    if item.status == ContentStatus::Published || item.stage == PipelineState::Published {
        return Err(DraftsmithError::precondition(format!(
            "content item {} is already published",
            item.id
        )));
    }
    Ok(())
}

fn ensure_draft(item: &ContentItem) -> Result<()> {
    ensure_unpublished(item)?;
    if !item.stage.has_draft() {
        return Err(DraftsmithError::precondition(format!(
            "content item {} has no draft yet (stage: {})",
            item.id, item.stage
        )));
    }
    Ok(())
}
