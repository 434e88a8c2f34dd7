//! In-memory capability mocks shared by the core tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use draftsmith_generator::{ContentGenerator, GeneratedText, ResponseShape};
use draftsmith_knowledge::{FetchFailure, KnowledgeSource, RawSummary};
use draftsmith_shared::{DraftsmithError, NO_CONTENT_SENTINEL, Result};
use draftsmith_storage::Storage;
use uuid::Uuid;

/// Temp-file database, migrated.
pub async fn temp_storage() -> Storage {
    let tmp = std::env::temp_dir().join(format!("ds_core_test_{}.db", Uuid::now_v7()));
    Storage::open(&tmp).await.expect("open test db")
}

// ---------------------------------------------------------------------------
// MockKnowledge
// ---------------------------------------------------------------------------

pub struct MockKnowledge {
    titles: Vec<String>,
    extracts: HashMap<String, String>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    pub search_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl MockKnowledge {
    /// Search returns `titles` for every query.
    pub fn new(titles: &[&str]) -> Self {
        Self {
            titles: titles.iter().map(|t| t.to_string()).collect(),
            extracts: HashMap::new(),
            failing: HashSet::new(),
            delays: HashMap::new(),
            search_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_extract(mut self, title: &str, extract: &str) -> Self {
        self.extracts.insert(title.into(), extract.into());
        self
    }

    pub fn failing(mut self, title: &str) -> Self {
        self.failing.insert(title.into());
        self
    }

    pub fn delayed(mut self, title: &str, delay: Duration) -> Self {
        self.delays.insert(title.into(), delay);
        self
    }

    pub fn total_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst) + self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KnowledgeSource for MockKnowledge {
    async fn search(&self, _topic: &str) -> Result<Vec<String>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.titles.clone())
    }

    async fn fetch_summary(&self, title: &str) -> std::result::Result<RawSummary, FetchFailure> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(title) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(title) {
            return Err(FetchFailure {
                title: title.into(),
                reason: "HTTP 404".into(),
            });
        }

        let extract = self.extracts.get(title).cloned().unwrap_or_else(|| {
            format!("{title} is a subject. It has a history. It matters today.")
        });
        Ok(RawSummary {
            title: title.into(),
            description: format!("About {title}"),
            extract,
            url: format!("https://en.wikipedia.org/wiki/{}", title.replace(' ', "_")),
        })
    }
}

// ---------------------------------------------------------------------------
// MockGenerator
// ---------------------------------------------------------------------------

enum Reply {
    Text(String),
    Sentinel,
    Fail,
}

pub struct MockGenerator {
    reply: Reply,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    fn with(reply: Reply) -> Self {
        Self {
            reply,
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers `text`.
    pub fn replying(text: &str) -> Self {
        Self::with(Reply::Text(text.into()))
    }

    /// Always answers with an unrecognised shape.
    pub fn sentinel() -> Self {
        Self::with(Reply::Sentinel)
    }

    /// Always fails upstream.
    pub fn failing() -> Self {
        Self::with(Reply::Fail)
    }

    /// Sleep for `delay` before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().expect("prompts lock").last().cloned()
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedText> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().expect("prompts lock").push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.reply {
            Reply::Text(text) => Ok(GeneratedText {
                text: text.clone(),
                shape: ResponseShape::Candidates,
            }),
            Reply::Sentinel => Ok(GeneratedText {
                text: NO_CONTENT_SENTINEL.into(),
                shape: ResponseShape::Unrecognized,
            }),
            Reply::Fail => Err(DraftsmithError::upstream("generator", "HTTP 403: API key not valid")),
        }
    }
}
