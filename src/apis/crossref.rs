use std::time::Duration;

use super::{build_client, doi_url, non_blank, read_body, PaperRecord, PaperSource, Source, SourceError};
use async_trait::async_trait;
use serde::Deserialize;

pub const BASE_URL: &str = "https://api.crossref.org";

pub struct CrossRefClient {
    client: reqwest::Client,
    base_url: String,
}

impl CrossRefClient {
    /// `mailto` puts requests in CrossRef's polite pool.
    pub fn new(base_url: &str, mailto: Option<&str>, timeout: Duration) -> Result<Self, SourceError> {
        let ua = match mailto {
            Some(m) => format!("paper-explorer/0.1 (mailto:{})", m),
            None => "paper-explorer/0.1".to_string(),
        };
        Ok(Self {
            client: build_client(&ua, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize)]
struct CRResponse {
    status: Option<String>,
    message: serde_json::Value,
}

#[derive(Deserialize)]
struct CRMessage {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct CRItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    // Lists may arrive as `null`; authors are decoded one by one.
    title: Option<Vec<Option<String>>>,
    author: Option<Vec<serde_json::Value>>,
    #[serde(rename = "container-title")]
    container_title: Option<Vec<Option<String>>>,
    #[serde(rename = "is-referenced-by-count")]
    citation_count: Option<u64>,
    #[serde(rename = "published-print")]
    published_print: Option<CRDate>,
    #[serde(rename = "published-online")]
    published_online: Option<CRDate>,
    published: Option<CRDate>,
    issued: Option<CRDate>,
}

#[derive(Deserialize)]
struct CRAuthor {
    given: Option<String>,
    family: Option<String>,
    // Organisational authors carry a single name.
    name: Option<String>,
}

#[derive(Deserialize)]
struct CRDate {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl CRDate {
    fn year(&self) -> Option<i32> {
        self.date_parts.first()?.first().copied().flatten()
    }
}

fn author_name(a: &CRAuthor) -> Option<String> {
    match (non_blank(a.given.as_deref()), non_blank(a.family.as_deref())) {
        (Some(given), Some(family)) => Some(format!("{} {}", given, family)),
        (None, Some(family)) => Some(family),
        _ => non_blank(a.name.as_deref()),
    }
}

fn first_non_blank(list: &Option<Vec<Option<String>>>) -> Option<String> {
    list.iter().flatten().find_map(|t| non_blank(t.as_deref()))
}

fn item_to_record(item: &CRItem) -> PaperRecord {
    let doi = non_blank(item.doi.as_deref());
    let title = first_non_blank(&item.title).unwrap_or_else(|| "Untitled".to_string());
    let authors = item.author.iter()
        .flatten()
        .filter_map(|raw| serde_json::from_value::<CRAuthor>(raw.clone()).ok())
        .filter_map(|a| author_name(&a))
        .collect();
    let year = [&item.published_print, &item.published_online, &item.published, &item.issued]
        .into_iter()
        .filter_map(|d| d.as_ref().and_then(CRDate::year))
        .min();
    let venue = first_non_blank(&item.container_title);
    let url = match &doi {
        Some(doi) => Some(doi_url(doi)),
        None => non_blank(item.url.as_deref()),
    };

    PaperRecord {
        title,
        authors,
        year,
        venue,
        abstract_text: None,
        citation_count: item.citation_count,
        doi,
        url,
        source: Source::CrossRef,
    }
}

fn parse_works(body: &str) -> Result<Vec<PaperRecord>, SourceError> {
    let resp: CRResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::Parse(format!("CrossRef response: {}", e)))?;
    if let Some(status) = resp.status.as_deref() {
        if status != "ok" {
            return Err(SourceError::Api {
                status: 200,
                message: format!("CrossRef reported status '{}': {}", status, resp.message),
            });
        }
    }
    let message: CRMessage = serde_json::from_value(resp.message)
        .map_err(|e| SourceError::Parse(format!("CrossRef message: {}", e)))?;

    let records = message.items.into_iter()
        .filter_map(|raw| match serde_json::from_value::<CRItem>(raw) {
            Ok(item) => Some(item_to_record(&item)),
            Err(e) => {
                tracing::warn!("Skipping malformed CrossRef item: {}", e);
                None
            }
        })
        .collect();
    Ok(records)
}

#[async_trait]
impl PaperSource for CrossRefClient {
    fn source(&self) -> Source { Source::CrossRef }

    async fn search(&self, query: &str, limit: u32) -> Result<Vec<PaperRecord>, SourceError> {
        let url = format!("{}/works", self.base_url);
        let rows = limit.to_string();
        let resp = self.client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[
                ("query", query),
                ("rows", rows.as_str()),
                ("sort", "relevance"),
                ("order", "desc"),
            ])
            .send().await?;
        let body = read_body(resp).await?;
        let records = parse_works(&body)?;
        tracing::info!("CrossRef returned {} items", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SAMPLE_WORKS: &str = r#"{
      "status": "ok",
      "message-type": "work-list",
      "message": {
        "items": [
          {
            "DOI": "10.1038/nature14539",
            "URL": "http://dx.doi.org/10.1038/nature14539",
            "title": ["Deep learning"],
            "author": [
              {"given": "Yann", "family": "LeCun"},
              {"given": "Yoshua", "family": "Bengio"},
              {"affiliation": []},
              {"name": "The Deep Learning Consortium"}
            ],
            "container-title": ["Nature"],
            "is-referenced-by-count": 50000,
            "published-print": {"date-parts": [[2015, 5, 28]]},
            "published-online": {"date-parts": [[2015, 5, 27]]}
          },
          {
            "URL": "https://example.org/report",
            "title": [],
            "issued": {"date-parts": [[null]]}
          },
          {
            "title": "not a list"
          },
          {
            "DOI": "10.1000/late",
            "title": ["  ", "Second Title"],
            "published-online": {"date-parts": [[2021]]},
            "issued": {"date-parts": [[2019, 12]]},
            "is-referenced-by-count": 0
          }
        ]
      }
    }"#;

    #[test]
    fn test_parse_works_maps_fields() {
        let records = parse_works(SAMPLE_WORKS).unwrap();
        assert_eq!(records.len(), 3, "undecodable item is skipped");

        let p = &records[0];
        assert_eq!(p.title, "Deep learning");
        assert_eq!(p.authors, vec!["Yann LeCun", "Yoshua Bengio", "The Deep Learning Consortium"]);
        assert_eq!(p.year, Some(2015));
        assert_eq!(p.venue.as_deref(), Some("Nature"));
        assert_eq!(p.abstract_text, None);
        assert_eq!(p.citation_count, Some(50000));
        assert_eq!(p.doi.as_deref(), Some("10.1038/nature14539"));
        assert_eq!(p.url.as_deref(), Some("https://doi.org/10.1038/nature14539"));
        assert_eq!(p.source, Source::CrossRef);
    }

    #[test]
    fn test_parse_works_absence_rules() {
        let records = parse_works(SAMPLE_WORKS).unwrap();

        let report = &records[1];
        assert_eq!(report.title, "Untitled");
        assert!(report.authors.is_empty());
        assert_eq!(report.year, None);
        assert_eq!(report.citation_count, None);
        assert_eq!(report.doi, None);
        assert_eq!(report.url.as_deref(), Some("https://example.org/report"));

        let late = &records[2];
        assert_eq!(late.title, "Second Title");
        assert_eq!(late.year, Some(2019), "earliest date wins");
        assert_eq!(late.citation_count, Some(0));
    }

    #[test]
    fn test_parse_works_rejects_bad_envelopes() {
        assert!(matches!(parse_works("<html>"), Err(SourceError::Parse(_))));
        assert!(matches!(parse_works(r#"{"status":"ok"}"#), Err(SourceError::Parse(_))));
        let failed = r#"{"status":"failed","message":[{"type":"query-parameter","message":"bad"}]}"#;
        assert!(matches!(parse_works(failed), Err(SourceError::Api { .. })));
        let empty = r#"{"status":"ok","message":{"items":[]}}"#;
        assert!(parse_works(empty).unwrap().is_empty());
    }

    #[test]
    fn test_parse_works_null_lists_use_defaults() {
        let body = r#"{"status":"ok","message":{"items":[
            {"DOI":"10.1/a","title":null,"container-title":null,"author":null},
            {"DOI":"10.1/b","title":[null,"Kept"],"container-title":[null],
             "author":["garbage",{"given":"Ada","family":"Lovelace"},{"family":null,"given":null}]}
        ]}}"#;
        let records = parse_works(body).unwrap();
        assert_eq!(records.len(), 2);

        let a = &records[0];
        assert_eq!(a.title, "Untitled");
        assert!(a.authors.is_empty());
        assert_eq!(a.venue, None);
        assert_eq!(a.doi.as_deref(), Some("10.1/a"));

        let b = &records[1];
        assert_eq!(b.title, "Kept");
        assert_eq!(b.authors, vec!["Ada Lovelace"]);
        assert_eq!(b.venue, None);
    }

    #[tokio::test]
    async fn test_search_sends_query_and_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .and(query_param("query", "deep learning"))
            .and(query_param("rows", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_WORKS))
            .expect(1)
            .mount(&server)
            .await;

        let client = CrossRefClient::new(&server.uri(), Some("me@example.org"), Duration::from_secs(5)).unwrap();
        let records = client.search("deep learning", 7).await.unwrap();
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_search_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .mount(&server)
            .await;

        let client = CrossRefClient::new(&server.uri(), None, Duration::from_secs(5)).unwrap();
        let err = client.search("anything", 5).await.unwrap_err();
        match err {
            SourceError::Api { status, message } => {
                assert_eq!(status, 503);
                assert!(message.contains("Service Unavailable"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(SAMPLE_WORKS)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = CrossRefClient::new(&server.uri(), None, Duration::from_millis(200)).unwrap();
        let err = client.search("slow", 5).await.unwrap_err();
        assert!(matches!(err, SourceError::Timeout), "got {err:?}");
    }
}
