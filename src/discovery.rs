//! Paper discovery: the [`DiscoveryApi`] seam and its Semantic Scholar +
//! arXiv implementation.
//!
//! Search goes to the Semantic Scholar Graph API (`/paper/search`); full
//! documents are fetched from arXiv by id. Both go through the shared
//! [`RateLimitedClient`].

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use ragrag_core::models::PaperSummary;

use crate::config::DiscoveryConfig;
use crate::ratelimit::RateLimitedClient;

/// Fields requested from the search endpoint.
const SEARCH_FIELDS: &str = "title,abstract,tldr,year,citationCount,externalIds,authors";

/// Prefix for papers that have no arXiv id; these cannot be fetched in full.
pub const S2_ID_PREFIX: &str = "s2:";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("server error (HTTP {status})")]
    Server { status: u16 },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request rejected (HTTP {status})")]
    Http { status: u16 },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("gave up after {attempts} attempts: {last}")]
    RateLimitExhausted {
        attempts: u32,
        #[source]
        last: Box<DiscoveryError>,
    },
}

impl DiscoveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DiscoveryError::RateLimited
                | DiscoveryError::Timeout
                | DiscoveryError::Network(_)
                | DiscoveryError::Server { .. }
        )
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DiscoveryError::Timeout
        } else if err.is_decode() {
            DiscoveryError::Decode(err.to_string())
        } else {
            DiscoveryError::Network(err.to_string())
        }
    }
}

/// Map a non-success status to its error. `None` for 2xx.
pub fn classify_status(status: StatusCode, what: &str) -> Option<DiscoveryError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Some(DiscoveryError::RateLimited)
    } else if status == StatusCode::NOT_FOUND {
        Some(DiscoveryError::NotFound(what.to_string()))
    } else if status.is_server_error() {
        Some(DiscoveryError::Server {
            status: status.as_u16(),
        })
    } else {
        Some(DiscoveryError::Http {
            status: status.as_u16(),
        })
    }
}

/// Raw bytes of a fetched paper plus the MIME type the server declared.
#[derive(Debug, Clone)]
pub struct FullDocument {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait DiscoveryApi: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperSummary>, DiscoveryError>;

    async fn fetch_full_document(&self, external_id: &str) -> Result<FullDocument, DiscoveryError>;
}

// ---- Semantic Scholar wire format ----

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<S2Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: String,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    tldr: Option<S2Tldr>,
    year: Option<i32>,
    citation_count: Option<u64>,
    external_ids: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    authors: Vec<S2Author>,
}

#[derive(Debug, Deserialize)]
struct S2Tldr {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    name: Option<String>,
}

impl S2Paper {
    fn into_summary(self) -> PaperSummary {
        let arxiv = self
            .external_ids
            .as_ref()
            .and_then(|ids| ids.get("ArXiv"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        PaperSummary {
            external_id: arxiv.unwrap_or_else(|| format!("{}{}", S2_ID_PREFIX, self.paper_id)),
            title: self.title.unwrap_or_default(),
            abstract_text: self.abstract_text,
            tldr: self.tldr.and_then(|t| t.text),
            year: self.year,
            citation_count: self.citation_count.unwrap_or(0),
            authors: self.authors.into_iter().filter_map(|a| a.name).collect(),
        }
    }
}

fn parse_search_body(body: &[u8]) -> Result<Vec<PaperSummary>, DiscoveryError> {
    let resp: SearchResponse =
        serde_json::from_slice(body).map_err(|e| DiscoveryError::Decode(e.to_string()))?;
    Ok(resp.data.into_iter().map(S2Paper::into_summary).collect())
}

pub struct SemanticScholarClient {
    http: reqwest::Client,
    api_base: String,
    pdf_base: String,
    api_key: Option<String>,
    limiter: RateLimitedClient,
}

impl SemanticScholarClient {
    pub fn new(config: &DiscoveryConfig) -> anyhow::Result<Self> {
        let limiter = RateLimitedClient::new(config.backoff(), config.request_delay());
        Self::with_limiter(config, limiter)
    }

    pub fn with_limiter(config: &DiscoveryConfig, limiter: RateLimitedClient) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("ragrag/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            pdf_base: config.pdf_base.trim_end_matches('/').to_string(),
            api_key: config.api_key(),
            limiter,
        })
    }

    async fn search_once(&self, query: &str, limit: usize) -> Result<Vec<PaperSummary>, DiscoveryError> {
        let url = format!("{}/paper/search", self.api_base);
        let limit = limit.to_string();
        let mut req = self
            .http
            .get(&url)
            .query(&[("query", query), ("limit", limit.as_str()), ("fields", SEARCH_FIELDS)]);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }

        let resp = req.send().await.map_err(DiscoveryError::from_reqwest)?;
        if let Some(err) = classify_status(resp.status(), query) {
            return Err(err);
        }
        let body = resp.bytes().await.map_err(DiscoveryError::from_reqwest)?;
        parse_search_body(&body)
    }

    async fn fetch_once(&self, url: &str, external_id: &str) -> Result<FullDocument, DiscoveryError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(DiscoveryError::from_reqwest)?;
        if let Some(err) = classify_status(resp.status(), external_id) {
            return Err(err);
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await.map_err(DiscoveryError::from_reqwest)?;
        Ok(FullDocument {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

#[async_trait]
impl DiscoveryApi for SemanticScholarClient {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperSummary>, DiscoveryError> {
        let papers = self
            .limiter
            .run("search", move || self.search_once(query, limit))
            .await?;
        debug!(count = papers.len(), "search returned papers");
        Ok(papers)
    }

    #[instrument(skip(self))]
    async fn fetch_full_document(&self, external_id: &str) -> Result<FullDocument, DiscoveryError> {
        if external_id.starts_with(S2_ID_PREFIX) {
            return Err(DiscoveryError::NotFound(format!(
                "{} has no arXiv id",
                external_id
            )));
        }
        let url = format!("{}/{}.pdf", self.pdf_base, external_id);
        let url = url.as_str();
        let doc = self
            .limiter
            .run("fetch", move || self.fetch_once(url, external_id))
            .await?;
        debug!(bytes = doc.bytes.len(), "fetched full document");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_body_maps_fields() {
        let body = br#"{
            "total": 2,
            "data": [
                {
                    "paperId": "abc",
                    "title": "Dense Passage Retrieval",
                    "abstract": "We show...",
                    "tldr": {"model": "tldr@v2", "text": "DPR works."},
                    "year": 2020,
                    "citationCount": 3100,
                    "externalIds": {"ArXiv": "2004.04906", "CorpusId": 215737187},
                    "authors": [{"authorId": "1", "name": "V. Karpukhin"}, {"authorId": null, "name": null}]
                },
                {
                    "paperId": "def",
                    "title": null,
                    "abstract": null,
                    "tldr": null,
                    "year": null,
                    "citationCount": null,
                    "externalIds": {"DOI": "10.1/x"},
                    "authors": []
                }
            ]
        }"#;
        let papers = parse_search_body(body).unwrap();
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].external_id, "2004.04906");
        assert_eq!(papers[0].tldr.as_deref(), Some("DPR works."));
        assert_eq!(papers[0].citation_count, 3100);
        assert_eq!(papers[0].authors, vec!["V. Karpukhin".to_string()]);
        assert_eq!(papers[1].external_id, "s2:def");
        assert_eq!(papers[1].title, "");
        assert_eq!(papers[1].citation_count, 0);
    }

    #[test]
    fn test_parse_search_body_without_data() {
        assert!(parse_search_body(br#"{"total": 0}"#).unwrap().is_empty());
        assert!(matches!(
            parse_search_body(b"<html>").unwrap_err(),
            DiscoveryError::Decode(_)
        ));
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK, "q").is_none());
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "q"),
            Some(DiscoveryError::RateLimited)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "q"),
            Some(DiscoveryError::NotFound(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "q"),
            Some(DiscoveryError::Server { status: 502 })
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "q"),
            Some(DiscoveryError::Http { status: 403 })
        ));
    }

    #[test]
    fn test_retryable_taxonomy() {
        assert!(DiscoveryError::RateLimited.is_retryable());
        assert!(DiscoveryError::Timeout.is_retryable());
        assert!(DiscoveryError::Server { status: 503 }.is_retryable());
        assert!(!DiscoveryError::NotFound("x".into()).is_retryable());
        assert!(!DiscoveryError::Http { status: 400 }.is_retryable());
        assert!(!DiscoveryError::Decode("x".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_s2_only_ids_are_not_fetchable() {
        let client = SemanticScholarClient::new(&DiscoveryConfig::default()).unwrap();
        let err = client.fetch_full_document("s2:abc").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NotFound(_)));
    }
}
