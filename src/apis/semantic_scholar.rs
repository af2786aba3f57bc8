use std::time::Duration;

use super::{build_client, non_blank, read_body, PaperRecord, PaperSource, Source, SourceError};
use async_trait::async_trait;
use serde::Deserialize;

pub const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";

const FIELDS: &str = "title,authors,year,abstract,venue,citationCount,externalIds,url";

pub struct SemanticScholarClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client("paper-explorer/0.1", timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn add_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }

    fn rate_limit_message(&self) -> String {
        let mut msg = "Semantic Scholar is rate limiting requests, try again in a minute".to_string();
        if self.api_key.is_none() {
            msg.push_str(" or set SEMANTIC_SCHOLAR_API_KEY for a higher quota");
        }
        msg
    }
}

/// Search envelope. `data` is omitted entirely when nothing matched; error
/// responses sometimes arrive with HTTP 200 and only `error`/`message` set.
#[derive(Deserialize)]
struct S2SearchResponse {
    data: Option<Vec<serde_json::Value>>,
    error: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    title: Option<String>,
    authors: Option<Vec<Option<S2Author>>>,
    year: Option<i32>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    venue: Option<String>,
    citation_count: Option<u64>,
    external_ids: Option<S2ExternalIds>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

fn s2_to_record(p: &S2Paper) -> PaperRecord {
    PaperRecord {
        title: non_blank(p.title.as_deref()).unwrap_or_else(|| "Untitled".to_string()),
        authors: p.authors.iter()
            .flatten()
            .flatten()
            .filter_map(|a| non_blank(a.name.as_deref()))
            .collect(),
        year: p.year,
        venue: non_blank(p.venue.as_deref()),
        abstract_text: non_blank(p.abstract_text.as_deref()),
        citation_count: p.citation_count,
        doi: p.external_ids.as_ref().and_then(|e| non_blank(e.doi.as_deref())),
        url: non_blank(p.url.as_deref()),
        source: Source::SemanticScholar,
    }
}

fn looks_rate_limited(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("rate limit") || lower.contains("too many requests") || lower.contains("quota")
}

enum Parsed {
    Records(Vec<PaperRecord>),
    /// HTTP 200 whose body is an error payload.
    EmbeddedError(String),
}

fn parse_search(body: &str) -> Result<Parsed, SourceError> {
    let resp: S2SearchResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::Parse(format!("Semantic Scholar response: {}", e)))?;

    let Some(data) = resp.data else {
        return Ok(match resp.error.or(resp.message) {
            Some(err) => Parsed::EmbeddedError(err),
            None => Parsed::Records(Vec::new()),
        });
    };

    let records = data.into_iter()
        .filter_map(|raw| match serde_json::from_value::<S2Paper>(raw) {
            Ok(p) => Some(s2_to_record(&p)),
            Err(e) => {
                tracing::warn!("Skipping malformed Semantic Scholar paper: {}", e);
                None
            }
        })
        .collect();
    Ok(Parsed::Records(records))
}

#[async_trait]
impl PaperSource for SemanticScholarClient {
    fn source(&self) -> Source { Source::SemanticScholar }

    async fn search(&self, query: &str, limit: u32) -> Result<Vec<PaperRecord>, SourceError> {
        let url = format!("{}/paper/search", self.base_url);
        let limit = limit.to_string();
        let resp = self.add_auth(
            self.client.get(&url)
                .header(reqwest::header::ACCEPT, "application/json")
                .query(&[
                    ("query", query),
                    ("limit", limit.as_str()),
                    ("fields", FIELDS),
                ])
        ).send().await?;
        tracing::debug!("Semantic Scholar response status: {}", resp.status());

        let body = match read_body(resp).await {
            Err(SourceError::RateLimited(_)) => {
                tracing::warn!("Semantic Scholar rate limited");
                return Err(SourceError::RateLimited(self.rate_limit_message()));
            }
            other => other?,
        };

        match parse_search(&body)? {
            Parsed::Records(records) => {
                tracing::info!("Semantic Scholar returned {} items", records.len());
                Ok(records)
            }
            Parsed::EmbeddedError(msg) if looks_rate_limited(&msg) => {
                tracing::warn!("Semantic Scholar rate limited: {}", msg);
                Err(SourceError::RateLimited(self.rate_limit_message()))
            }
            Parsed::EmbeddedError(msg) => Err(SourceError::Api { status: 200, message: msg }),
        }
    }
}
