//! Core domain types for the Draftsmith content pipeline.

use chrono::{DateTime, Utc};
use draftsmith_markdown::bullet_points;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{DraftsmithError, Result};

/// Maximum number of bullet points kept in a [`TopicSummary`].
pub const MAX_SUMMARY_POINTS: usize = 4;

/// Literal returned when the generator's response has no recognisable text.
pub const NO_CONTENT_SENTINEL: &str = "no content returned";

// ---------------------------------------------------------------------------
// ContentItemId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for content item identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentItemId(pub Uuid);

impl ContentItemId {
    /// Generate a new time-sortable identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ContentItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContentItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ContentItemId {
    type Err = DraftsmithError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| DraftsmithError::validation(format!("invalid content item id '{s}': {e}")))
    }
}

// ---------------------------------------------------------------------------
// Status, state, stage
// ---------------------------------------------------------------------------

/// Publication status of a content item. Only `Draft -> Published` is allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    #[default]
    Draft,
    Published,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl std::str::FromStr for ContentStatus {
    type Err = DraftsmithError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            other => Err(DraftsmithError::validation(format!(
                "unknown status '{other}' (expected draft or published)"
            ))),
        }
    }
}

/// Where a content item sits in the pipeline. Ordered by progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    NoTopic,
    TopicSelected,
    Researched,
    Drafted,
    Edited,
    Published,
}

impl PipelineState {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoTopic => "no_topic",
            Self::TopicSelected => "topic_selected",
            Self::Researched => "researched",
            Self::Drafted => "drafted",
            Self::Edited => "edited",
            Self::Published => "published",
        }
    }

    /// True once a draft exists and the item is still editable.
    pub fn has_draft(&self) -> bool {
        matches!(self, Self::Drafted | Self::Edited)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PipelineState {
    type Err = DraftsmithError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "no_topic" => Ok(Self::NoTopic),
            "topic_selected" => Ok(Self::TopicSelected),
            "researched" => Ok(Self::Researched),
            "drafted" => Ok(Self::Drafted),
            "edited" => Ok(Self::Edited),
            "published" => Ok(Self::Published),
            other => Err(DraftsmithError::DataIntegrity(format!(
                "unknown pipeline state '{other}'"
            ))),
        }
    }
}

/// A named pipeline step, as invoked by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Topic,
    Research,
    Write,
    Edit,
    Publish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Topic => "topic",
            Self::Research => "research",
            Self::Write => "write",
            Self::Edit => "edit",
            Self::Publish => "publish",
        }
    }

    /// Route of this stage on the HTTP surface, used as the advisory `nextStep`.
    pub fn route(&self) -> &'static str {
        match self {
            Self::Topic => "/topic",
            Self::Research => "/research",
            Self::Write => "/write",
            Self::Edit => "/edit",
            Self::Publish => "/publish",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ContentItem
// ---------------------------------------------------------------------------

/// The blog/article record moving through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: ContentItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Current draft text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub status: ContentStatus,
    pub stage: PipelineState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    /// The topic, if one has been selected and is non-blank.
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Research
// ---------------------------------------------------------------------------

/// Normalized knowledge about a single reference entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSummary {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Bullet points derived from the raw extract, at most [`MAX_SUMMARY_POINTS`].
    #[serde(default, deserialize_with = "points")]
    pub summary: Vec<String>,
    #[serde(default)]
    pub url: String,
}

/// Accept either a list of points or a single legacy extract string, which is
/// condensed into points the same way a fresh extract is.
fn points<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Points {
        List(Vec<String>),
        Text(String),
    }

    Ok(match Points::deserialize(deserializer)? {
        Points::List(list) => list,
        Points::Text(text) => bullet_points(&text, MAX_SUMMARY_POINTS),
    })
}

/// Normalized external knowledge attached to one content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchBundle {
    /// Provenance label or URL.
    #[serde(default)]
    pub source: String,
    pub main_topic: TopicSummary,
    /// Optional enrichment; absent in older payloads.
    #[serde(default)]
    pub related_topics: Vec<TopicSummary>,
}

impl ResearchBundle {
    /// Decode a stored payload.
    ///
    /// Accepts a full bundle or a bare [`TopicSummary`]. Anything else is a
    /// [`DraftsmithError::DataIntegrity`] failure.
    pub fn decode(raw: &str) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Stored {
            Bundle(ResearchBundle),
            Summary(TopicSummary),
        }

        match serde_json::from_str::<Stored>(raw) {
            Ok(Stored::Bundle(bundle)) => Ok(bundle),
            Ok(Stored::Summary(main_topic)) => Ok(Self {
                source: main_topic.url.clone(),
                main_topic,
                related_topics: Vec::new(),
            }),
            Err(e) => Err(DraftsmithError::DataIntegrity(format!(
                "malformed research payload: {e}"
            ))),
        }
    }

    /// Serialize for storage.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| DraftsmithError::Storage(format!("failed to encode research: {e}")))
    }
}

/// A persisted research row, decoded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRecord {
    pub id: String,
    pub content_item_id: ContentItemId,
    pub source: String,
    pub content: ResearchBundle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

/// Value returned to the caller after each orchestration step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult<P> {
    pub stage: Stage,
    pub payload: P,
    /// Conventional next stage. Advisory only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_stage: Option<Stage>,
}

impl<P> StageResult<P> {
    pub fn new(stage: Stage, payload: P, next_stage: Option<Stage>) -> Self {
        Self {
            stage,
            payload,
            next_stage,
        }
    }
}
