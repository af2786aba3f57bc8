use std::sync::Arc;
use std::time::Duration;

use crate::apis::{self, PaperSource, SourceError};
use crate::search::Aggregator;

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_MAX_RESULTS: u32 = 10;
pub const MAX_RESULTS_CAP: u32 = 50;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub semantic_scholar_api_key: Option<String>,
    pub crossref_mailto: Option<String>,
    pub request_timeout: Duration,
    pub max_results: u32,
    pub crossref_url: String,
    pub semantic_scholar_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let request_timeout = get("PAPER_EXPLORER_TIMEOUT_SECS")
            .and_then(|v| parse_or_warn::<u64>("PAPER_EXPLORER_TIMEOUT_SECS", &v))
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let max_results = get("PAPER_EXPLORER_MAX_RESULTS")
            .and_then(|v| parse_or_warn::<u32>("PAPER_EXPLORER_MAX_RESULTS", &v))
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_CAP);

        Self {
            semantic_scholar_api_key: get("SEMANTIC_SCHOLAR_API_KEY"),
            crossref_mailto: get("CROSSREF_MAILTO"),
            request_timeout,
            max_results,
            crossref_url: get("CROSSREF_API_URL")
                .unwrap_or_else(|| apis::crossref::BASE_URL.to_string()),
            semantic_scholar_url: get("SEMANTIC_SCHOLAR_API_URL")
                .unwrap_or_else(|| apis::semantic_scholar::BASE_URL.to_string()),
        }
    }

    /// Build the sources in merge-priority order: CrossRef, then Semantic Scholar.
    pub fn build_sources(&self) -> Result<Vec<Arc<dyn PaperSource>>, SourceError> {
        let sources: Vec<Arc<dyn PaperSource>> = vec![
            Arc::new(apis::crossref::CrossRefClient::new(
                &self.crossref_url,
                self.crossref_mailto.as_deref(),
                self.request_timeout,
            )?),
            Arc::new(apis::semantic_scholar::SemanticScholarClient::new(
                &self.semantic_scholar_url,
                self.semantic_scholar_api_key.clone(),
                self.request_timeout,
            )?),
        ];
        Ok(sources)
    }

    pub fn build_aggregator(&self) -> Result<Aggregator, SourceError> {
        // Slack past the HTTP client timeout so a slow body read still
        // surfaces as the client's own error.
        let timeout = self.request_timeout + Duration::from_secs(2);
        Ok(Aggregator::new(self.build_sources()?, self.max_results, timeout))
    }

    /// Return a list of source status descriptions.
    pub fn source_status(&self) -> Vec<SourceInfo> {
        vec![
            SourceInfo {
                name: apis::Source::CrossRef.to_string(),
                url: self.crossref_url.clone(),
                note: if self.crossref_mailto.is_some() { "Polite pool email set".into() } else { "No email (public pool)".into() },
            },
            SourceInfo {
                name: apis::Source::SemanticScholar.to_string(),
                url: self.semantic_scholar_url.clone(),
                note: if self.semantic_scholar_api_key.is_some() { "API key set".into() } else { "No API key (rate limited)".into() },
            },
        ]
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}, using default", key, value);
            None
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub url: String,
    pub note: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(c.max_results, DEFAULT_MAX_RESULTS);
        assert_eq!(c.crossref_url, apis::crossref::BASE_URL);
        assert_eq!(c.semantic_scholar_url, apis::semantic_scholar::BASE_URL);
        assert!(c.semantic_scholar_api_key.is_none());
    }

    #[test]
    fn test_overrides_and_clamping() {
        let c = config(&[
            ("PAPER_EXPLORER_TIMEOUT_SECS", "3"),
            ("PAPER_EXPLORER_MAX_RESULTS", "500"),
            ("SEMANTIC_SCHOLAR_API_KEY", " key "),
            ("CROSSREF_MAILTO", ""),
        ]);
        assert_eq!(c.request_timeout, Duration::from_secs(3));
        assert_eq!(c.max_results, MAX_RESULTS_CAP);
        assert_eq!(c.semantic_scholar_api_key.as_deref(), Some("key"));
        assert!(c.crossref_mailto.is_none());

        assert_eq!(config(&[("PAPER_EXPLORER_MAX_RESULTS", "0")]).max_results, 1);
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let c = config(&[
            ("PAPER_EXPLORER_TIMEOUT_SECS", "soon"),
            ("PAPER_EXPLORER_MAX_RESULTS", "-4"),
        ]);
        assert_eq!(c.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(c.max_results, DEFAULT_MAX_RESULTS);
    }

    #[test]
    fn test_sources_in_priority_order() {
        let c = config(&[]);
        let sources = c.build_sources().unwrap();
        let order: Vec<_> = sources.iter().map(|s| s.source()).collect();
        assert_eq!(order, vec![apis::Source::CrossRef, apis::Source::SemanticScholar]);
        assert_eq!(c.source_status().len(), 2);
    }
}
