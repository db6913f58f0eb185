//! Instant answer search
//!
//! Queries the DuckDuckGo instant answer API and selects a single
//! spoken reply from the structured result.

pub mod numword;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Errors from the search service
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search returned {status}")]
    Api { status: reqwest::StatusCode },
}

/// Structured instant answer; absent fields decode as empty strings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstantAnswer {
    #[serde(rename = "Answer", default)]
    pub answer: String,

    #[serde(rename = "Definition", default)]
    pub definition: String,

    #[serde(rename = "AbstractText", default)]
    pub abstract_text: String,
}

impl InstantAnswer {
    /// Pick the reply to speak: direct answer, then definition, then
    /// abstract, then a not-found fallback naming the query. First
    /// match wins; fields are never combined.
    pub fn reply(&self, query: &str) -> String {
        for field in [&self.answer, &self.definition, &self.abstract_text] {
            if !field.is_empty() {
                return field.clone();
            }
        }
        format!("I'm sorry, I was unable to find any information on {query}")
    }
}

/// Answers a normalized query with a structured result
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn instant_answer(&self, query: &str) -> Result<InstantAnswer, SearchError>;
}

/// DuckDuckGo instant answer client
pub struct DuckDuckGo {
    client: reqwest::Client,
    url: String,
}

impl DuckDuckGo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGo {
    async fn instant_answer(&self, query: &str) -> Result<InstantAnswer, SearchError> {
        debug!(query, "querying instant answers");

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Api { status });
        }

        Ok(response.json().await?)
    }
}
