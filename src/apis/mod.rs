pub mod crossref;
pub mod semantic_scholar;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upstream catalogue a record came from.
///
/// Variant order is the merge priority: CrossRef records are listed before
/// Semantic Scholar records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    CrossRef,
    SemanticScholar,
}

impl Source {
    pub fn display_name(self) -> &'static str {
        match self {
            Source::CrossRef => "CrossRef",
            Source::SemanticScholar => "Semantic Scholar",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Unified per-paper shape handed to the presentation layer.
///
/// Absent optionals stay `None`; in particular a missing citation count is
/// never reported as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub citation_count: Option<u64>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub source: Source,
}

impl PaperRecord {
    /// Where "open paper" should go: the DOI resolver when a DOI is known,
    /// otherwise the source-provided URL.
    pub fn link(&self) -> Option<String> {
        match (&self.doi, &self.url) {
            (Some(doi), _) => Some(doi_url(doi)),
            (None, Some(url)) => Some(url.clone()),
            (None, None) => None,
        }
    }
}

pub(crate) fn doi_url(doi: &str) -> String {
    format!("https://doi.org/{}", doi)
}

/// Returns `None` for missing or whitespace-only strings.
pub(crate) fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("malformed response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else if e.is_decode() {
            SourceError::Parse(e.to_string())
        } else {
            SourceError::Network(e.to_string())
        }
    }
}

/// A searchable upstream catalogue. Each implementation owns its typed
/// response schema and the transform from it into [`PaperRecord`].
#[async_trait]
pub trait PaperSource: Send + Sync {
    fn source(&self) -> Source;
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<PaperRecord>, SourceError>;
}

pub(crate) fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .build()
        .map_err(|e| SourceError::Network(format!("failed to build HTTP client: {}", e)))
}

/// Reads the body of a response, turning non-success statuses into errors.
/// HTTP 429 becomes [`SourceError::RateLimited`].
pub(crate) async fn read_body(resp: reqwest::Response) -> Result<String, SourceError> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.as_u16() == 429 {
        return Err(SourceError::RateLimited(
            "too many requests (HTTP 429), try again shortly".to_string(),
        ));
    }
    if !status.is_success() {
        return Err(SourceError::Api {
            status: status.as_u16(),
            message: snippet(&body),
        });
    }
    Ok(body)
}

fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    let body = body.trim();
    if body.is_empty() {
        return "empty response body".to_string();
    }
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
