//! Brave Search API client.
//!
//! Requires an API key from https://brave.com/search/api/. When the engine
//! flags the query as breaking news, the news vertical's results are
//! appended after the web results.

use serde::Deserialize;

use crate::agent::error::AgentError;
use crate::providers::{SearchProvider, SearchResult};

/// Brave Search API base URL.
const BRAVE_API_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// Results requested per query.
const RESULT_COUNT: usize = 10;

/// HTTP client for the Brave Search API.
pub struct BraveSearchClient {
    client: reqwest::Client,
    api_key: String,
}

impl BraveSearchClient {
    /// Create a client with the given subscription token.
    #[must_use]
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }
}

#[async_trait::async_trait]
impl SearchProvider for BraveSearchClient {
    async fn search(
        &self,
        query: &str,
        country: &str,
    ) -> Result<Vec<SearchResult>, AgentError> {
        let url = build_url(query, country)?;

        let response = self
            .client
            .get(&url)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AgentError::Search("rate limited".to_string()));
        }
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AgentError::Search("invalid API key".to_string()));
        }
        if !response.status().is_success() {
            return Err(AgentError::Search(format!(
                "search returned status {}",
                response.status()
            )));
        }

        let body: BraveResponse = response.json().await?;
        Ok(parse_response(body))
    }
}

/// Build the API URL with query parameters.
fn build_url(query: &str, country: &str) -> Result<String, AgentError> {
    let mut url = url::Url::parse(BRAVE_API_URL)
        .map_err(|e| AgentError::Search(e.to_string()))?;
    {
        let mut params = url.query_pairs_mut();
        params.append_pair("q", query);
        params.append_pair("count", &RESULT_COUNT.to_string());
        params.append_pair("country", country);
    }
    Ok(url.to_string())
}

/// Flatten the Brave payload: web results first, then news results when the
/// engine itself classified the query as breaking.
fn parse_response(response: BraveResponse) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let Some(web) = response.web {
        for result in web.results.into_iter().take(RESULT_COUNT) {
            results.push(SearchResult {
                title: result.title,
                link: result.url,
                description: result.description.unwrap_or_default(),
                snippets: result.extra_snippets.unwrap_or_default(),
                news: false,
            });
        }
    }

    let breaking = response
        .query
        .is_some_and(|q| q.is_news_breaking);
    if breaking {
        if let Some(news) = response.news {
            for result in news.results.into_iter().take(RESULT_COUNT) {
                results.push(SearchResult {
                    title: result.title,
                    link: result.url,
                    description: result.description.unwrap_or_default(),
                    snippets: Vec::new(),
                    news: true,
                });
            }
        }
    }

    results
}

// Brave API response structures

#[derive(Debug, Deserialize)]
struct BraveResponse {
    web: Option<WebResults>,
    news: Option<NewsResults>,
    query: Option<QueryInfo>,
}

#[derive(Debug, Deserialize)]
struct QueryInfo {
    #[serde(default)]
    is_news_breaking: bool,
}

#[derive(Debug, Deserialize)]
struct WebResults {
    results: Vec<BraveWebResult>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResult {
    title: String,
    url: String,
    description: Option<String>,
    extra_snippets: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct NewsResults {
    results: Vec<BraveNewsResult>,
}

#[derive(Debug, Deserialize)]
struct BraveNewsResult {
    title: String,
    url: String,
    description: Option<String>,
}
