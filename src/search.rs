use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::apis::{PaperRecord, PaperSource, Source, SourceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ok,
    Empty,
    Failed,
}

/// Outcome of one adapter for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResult {
    pub source: Source,
    pub status: Status,
    pub records: Vec<PaperRecord>,
    pub error_message: Option<String>,
}

impl SourceResult {
    pub fn from_records(source: Source, records: Vec<PaperRecord>) -> Self {
        let status = if records.is_empty() { Status::Empty } else { Status::Ok };
        Self { source, status, records, error_message: None }
    }

    pub fn failed(source: Source, message: impl Into<String>) -> Self {
        Self {
            source,
            status: Status::Failed,
            records: Vec::new(),
            error_message: Some(message.into()),
        }
    }

    fn from_outcome(source: Source, outcome: Result<Vec<PaperRecord>, SourceError>) -> Self {
        match outcome {
            Ok(records) => Self::from_records(source, records),
            Err(e) => {
                tracing::warn!("{} search failed: {}", source, e);
                Self::failed(source, e.to_string())
            }
        }
    }
}

/// Everything one search produced: merged records plus a status line per source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedSearch {
    pub query: String,
    pub results: Vec<PaperRecord>,
    pub per_source: Vec<SourceResult>,
}

impl AggregatedSearch {
    fn assemble(query: String, per_source: Vec<SourceResult>) -> Self {
        let results = per_source.iter()
            .flat_map(|r| r.records.iter().cloned())
            .collect();
        Self { query, results, per_source }
    }

    pub fn count_from(&self, source: Source) -> usize {
        self.results.iter().filter(|r| r.source == source).count()
    }

    /// One-line status for the presentation layer.
    pub fn summary(&self) -> String {
        let mut line = if self.results.is_empty() {
            "No papers found. Try a different search term.".to_string()
        } else {
            let counts: Vec<String> = self.per_source.iter()
                .map(|r| format!("{} from {}", self.count_from(r.source), r.source))
                .collect();
            format!("Found {} papers ({})", self.results.len(), counts.join(", "))
        };
        for r in self.per_source.iter().filter(|r| r.status == Status::Failed) {
            line.push_str(&format!(
                "; {} failed: {}",
                r.source,
                r.error_message.as_deref().unwrap_or("unknown error")
            ));
        }
        line
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("Please enter a search topic: the query is empty")]
    EmptyQuery,
}

type SearchTask = tokio::task::JoinHandle<Result<Vec<PaperRecord>, SourceError>>;

/// Aborts adapter tasks still running when an aggregation is dropped early.
struct AbortOnDrop(Vec<(Source, SearchTask)>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for (_, handle) in &self.0 {
            handle.abort();
        }
    }
}

/// Fans a query out to every configured source and merges the outcomes.
pub struct Aggregator {
    sources: Vec<Arc<dyn PaperSource>>,
    limit: u32,
    timeout: Duration,
}

impl Aggregator {
    /// `sources` should be in priority order; results are merged in that order.
    pub fn new(sources: Vec<Arc<dyn PaperSource>>, limit: u32, timeout: Duration) -> Self {
        Self { sources, limit, timeout }
    }

    pub fn sources(&self) -> &[Arc<dyn PaperSource>] {
        &self.sources
    }

    /// Trimmed query, or an error if nothing is left to search for.
    pub fn validate(query: &str) -> Result<&str, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        Ok(query)
    }

    /// Query all sources in parallel and wait for every one of them.
    ///
    /// Source failures, including timeouts, land in `per_source`; the only
    /// error returned here is an empty query, which is rejected before any
    /// request is made.
    pub async fn aggregate(&self, query: &str) -> Result<AggregatedSearch, SearchError> {
        let query = Self::validate(query)?;

        let mut tasks = AbortOnDrop(self.sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                let query = query.to_string();
                let (limit, timeout) = (self.limit, self.timeout);
                let tag = source.source();
                let handle = tokio::spawn(async move {
                    match tokio::time::timeout(timeout, source.search(&query, limit)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(SourceError::Timeout),
                    }
                });
                (tag, handle)
            })
            .collect());

        // Awaited in source order so completion order never reorders output.
        let mut per_source = Vec::with_capacity(tasks.0.len());
        for (tag, handle) in tasks.0.iter_mut() {
            let tag = *tag;
            let result = match handle.await {
                Ok(outcome) => SourceResult::from_outcome(tag, outcome),
                Err(e) => {
                    tracing::warn!("{} search task panicked: {}", tag, e);
                    SourceResult::failed(tag, format!("search task failed: {}", e))
                }
            };
            per_source.push(result);
        }

        let search = AggregatedSearch::assemble(query.to_string(), per_source);
        tracing::info!("Total papers found for '{}': {}", search.query, search.results.len());
        Ok(search)
    }
}
