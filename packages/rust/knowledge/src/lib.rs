//! Knowledge source adapter.
//!
//! A [`KnowledgeSource`] answers two questions about a topic: which reference
//! entries match it ([`KnowledgeSource::search`]) and what a given entry says
//! ([`KnowledgeSource::fetch_summary`]). [`WikipediaSource`] implements both
//! against the MediaWiki opensearch endpoint and the REST page-summary API.
//!
//! Every HTTP call runs under the shared [`CallPolicy`].

use async_trait::async_trait;
use draftsmith_shared::{CallPolicy, DraftsmithError, KnowledgeConfig, Result, with_policy};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

/// Service label used in errors and logs.
const SERVICE: &str = "knowledge";

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Unprocessed summary of one reference entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSummary {
    pub title: String,
    pub description: String,
    /// Full extract text, not yet condensed.
    pub extract: String,
    /// Canonical desktop page URL.
    pub url: String,
}

/// Per-title fetch failure. Callers decide whether it is fatal.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to fetch '{title}': {reason}")]
pub struct FetchFailure {
    pub title: String,
    pub reason: String,
}

/// Capability to search a reference index and read entry summaries.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Candidate titles for `topic`, in the source's relevance order.
    ///
    /// No match is an empty list, not an error.
    async fn search(&self, topic: &str) -> Result<Vec<String>>;

    /// Summary of the entry named `title`.
    async fn fetch_summary(&self, title: &str) -> std::result::Result<RawSummary, FetchFailure>;
}

// ---------------------------------------------------------------------------
// WikipediaSource
// ---------------------------------------------------------------------------

/// [`KnowledgeSource`] backed by a MediaWiki site.
#[derive(Debug, Clone)]
pub struct WikipediaSource {
    client: Client,
    base_url: Url,
    search_limit: u32,
    policy: CallPolicy,
}

impl WikipediaSource {
    /// Build a source from `[knowledge]` config and the shared call policy.
    pub fn new(config: &KnowledgeConfig, policy: CallPolicy) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            DraftsmithError::config(format!("invalid knowledge base_url '{}': {e}", config.base_url))
        })?;

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| DraftsmithError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            search_limit: config.search_limit,
            policy,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DraftsmithError::config(format!("base_url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T>(&self, url: &Url) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self.client.get(url.clone()).send().await.map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| DraftsmithError::upstream(SERVICE, format!("malformed response: {e}")))
    }
}

#[async_trait]
impl KnowledgeSource for WikipediaSource {
    #[instrument(skip_all, fields(topic = %topic))]
    async fn search(&self, topic: &str) -> Result<Vec<String>> {
        let mut url = self.endpoint(&["w", "api.php"])?;
        url.query_pairs_mut()
            .append_pair("action", "opensearch")
            .append_pair("search", topic)
            .append_pair("limit", &self.search_limit.to_string())
            .append_pair("namespace", "0")
            .append_pair("format", "json");

        let body: serde_json::Value = with_policy(&self.policy, SERVICE, || self.get_json(&url)).await?;
        let titles = parse_opensearch(&body)?;

        debug!(candidates = titles.len(), "search complete");
        Ok(titles)
    }

    #[instrument(skip_all, fields(title = %title))]
    async fn fetch_summary(&self, title: &str) -> std::result::Result<RawSummary, FetchFailure> {
        let fail = |reason: String| FetchFailure {
            title: title.to_string(),
            reason,
        };

        let page = title.trim().replace(' ', "_");
        let url = self
            .endpoint(&["api", "rest_v1", "page", "summary", &page])
            .map_err(|e| fail(e.to_string()))?;

        let body: SummaryResponse = with_policy(&self.policy, SERVICE, || self.get_json(&url))
            .await
            .map_err(|e| fail(e.to_string()))?;

        let page_url = body
            .content_urls
            .and_then(|urls| urls.desktop)
            .map(|desktop| desktop.page)
            .unwrap_or_else(|| url.to_string());

        Ok(RawSummary {
            title: body.title,
            description: body.description.unwrap_or_default(),
            extract: body.extract.unwrap_or_default(),
            url: page_url,
        })
    }
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    #[serde(default)]
    desktop: Option<PageUrl>,
}

#[derive(Debug, Deserialize)]
struct PageUrl {
    page: String,
}

/// Opensearch returns `[query, [titles], [descriptions], [urls]]`.
fn parse_opensearch(body: &serde_json::Value) -> Result<Vec<String>> {
    let titles = body
        .get(1)
        .and_then(|v| v.as_array())
        .ok_or_else(|| DraftsmithError::upstream(SERVICE, "malformed search response"))?;

    Ok(titles
        .iter()
        .filter_map(|t| t.as_str())
        .map(String::from)
        .collect())
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

fn request_error(e: reqwest::Error) -> DraftsmithError {
    if e.is_timeout() || e.is_connect() {
        DraftsmithError::transient(SERVICE, e.to_string())
    } else {
        DraftsmithError::upstream(SERVICE, e.to_string())
    }
}

fn status_error(status: StatusCode) -> DraftsmithError {
    let message = format!("HTTP {status}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        DraftsmithError::transient(SERVICE, message)
    } else {
        DraftsmithError::upstream(SERVICE, message)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> WikipediaSource {
        let config = KnowledgeConfig {
            base_url: server.uri(),
            ..Default::default()
        };
        let policy = CallPolicy {
            timeout: Duration::from_millis(500),
            max_retries: 1,
            backoff: Duration::from_millis(1),
        };
        WikipediaSource::new(&config, policy).expect("build source")
    }

    fn summary_body(title: &str) -> serde_json::Value {
        serde_json::json!({
            "title": title,
            "description": "Computation using quantum phenomena",
            "extract": "A quantum computer exploits superposition. It uses qubits. It is fast.",
            "content_urls": { "desktop": { "page": format!("https://en.wikipedia.org/wiki/{title}") } }
        })
    }

    #[tokio::test]
    async fn search_returns_titles_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("action", "opensearch"))
            .and(query_param("search", "Quantum Computing"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                "Quantum Computing",
                ["Quantum computing", "Quantum supremacy", "Qubit"],
                ["", "", ""],
                ["u1", "u2", "u3"]
            ])))
            .mount(&server)
            .await;

        let titles = source_for(&server).search("Quantum Computing").await.unwrap();
        assert_eq!(titles, vec!["Quantum computing", "Quantum supremacy", "Qubit"]);
    }

    #[tokio::test]
    async fn search_with_no_hits_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(["zzz", [], [], []])))
            .mount(&server)
            .await;

        let titles = source_for(&server).search("zzz").await.unwrap();
        assert!(titles.is_empty());
    }

    #[tokio::test]
    async fn search_retries_server_errors_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let err = source_for(&server).search("Rust").await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn search_does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let err = source_for(&server).search("Rust").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn fetch_summary_reads_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/summary/Quantum_computing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(summary_body("Quantum computing")))
            .mount(&server)
            .await;

        let summary = source_for(&server)
            .fetch_summary("Quantum computing")
            .await
            .unwrap();
        assert_eq!(summary.title, "Quantum computing");
        assert_eq!(summary.description, "Computation using quantum phenomena");
        assert!(summary.extract.starts_with("A quantum computer"));
        assert_eq!(summary.url, "https://en.wikipedia.org/wiki/Quantum computing");
    }

    #[tokio::test]
    async fn fetch_summary_failure_is_marker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/summary/Missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let failure = source_for(&server).fetch_summary("Missing").await.unwrap_err();
        assert_eq!(failure.title, "Missing");
        assert!(failure.reason.contains("404"));
    }

    #[tokio::test]
    async fn fetch_summary_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/summary/Slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(summary_body("Slow"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let failure = source_for(&server).fetch_summary("Slow").await.unwrap_err();
        assert!(failure.reason.contains("timed out"));
    }

    #[test]
    fn malformed_opensearch_is_upstream_error() {
        let err = parse_opensearch(&serde_json::json!({"error": "nope"})).unwrap_err();
        assert!(matches!(err, DraftsmithError::Upstream { .. }));
    }

    #[tokio::test]
    async fn non_hierarchical_base_url_is_config_error() {
        let config = KnowledgeConfig {
            base_url: "mailto:wiki@example.org".into(),
            ..Default::default()
        };
        let source = WikipediaSource::new(&config, CallPolicy::default()).expect("build source");

        let err = source.search("Rust").await.unwrap_err();
        assert!(matches!(err, DraftsmithError::Config { .. }));
        assert!(err.to_string().contains("mailto:wiki@example.org"));

        let failure = source.fetch_summary("Rust").await.unwrap_err();
        assert!(failure.reason.contains("cannot be a base"));
    }
}
