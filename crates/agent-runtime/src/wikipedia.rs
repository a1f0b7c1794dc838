//! Wikipedia Lookup Tool
//!
//! Searches Wikipedia through the MediaWiki action API and returns the intro
//! summaries of the best matching pages.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    tool::{ParameterSchema, Tool, ToolCall, ToolResult, ToolSchema},
};
use async_trait::async_trait;
use serde::Deserialize;

pub const WIKIPEDIA_TOOL: &str = "wikipedia";

pub const NO_RESULTS: &str = "No good Wikipedia Search Result was found";

/// Wikipedia client configuration
#[derive(Clone, Debug)]
pub struct WikipediaConfig {
    /// Language subdomain, e.g. "en"
    pub lang: String,

    /// Override for the API root (`https://<lang>.wikipedia.org` by default)
    pub base_url: Option<String>,

    /// Number of pages summarised per query
    pub top_k_results: usize,

    /// Output is cut to this many characters
    pub doc_content_chars_max: usize,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            lang: "en".into(),
            base_url: None,
            top_k_results: 3,
            doc_content_chars_max: 4000,
            timeout_secs: 30,
        }
    }
}

impl WikipediaConfig {
    /// Read `WIKIPEDIA_LANG`, `WIKIPEDIA_TOP_K` and `WIKIPEDIA_MAX_CHARS`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(lang) = std::env::var("WIKIPEDIA_LANG") {
            let lang = lang.trim();
            if !lang.is_empty() {
                if !lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                    return Err(AgentError::Config(format!("WIKIPEDIA_LANG is not a language code: '{lang}'")));
                }
                config.lang = lang.to_string();
            }
        }

        if let Some(top_k) = positive_env("WIKIPEDIA_TOP_K")? {
            config.top_k_results = top_k;
        }
        if let Some(max_chars) = positive_env("WIKIPEDIA_MAX_CHARS")? {
            config.doc_content_chars_max = max_chars;
        }

        Ok(config)
    }

    fn api_url(&self) -> String {
        let root = self
            .base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.wikipedia.org", self.lang));
        format!("{}/w/api.php", root.trim_end_matches('/'))
    }
}

fn positive_env(name: &str) -> Result<Option<usize>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(Some)
            .ok_or_else(|| AgentError::Config(format!("{name} must be a positive integer, got '{raw}'"))),
        Err(_) => Ok(None),
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    query: Option<ExtractQuery>,
}

#[derive(Debug, Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: Vec<ExtractPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractPage {
    title: String,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    missing: bool,
}

/// A page title with its intro summary
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageSummary {
    pub title: String,
    pub summary: String,
}

/// Thin client over the MediaWiki action API
pub struct WikipediaClient {
    client: reqwest::Client,
    config: WikipediaConfig,
}

impl WikipediaClient {
    pub fn new(config: WikipediaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("wiki-math-agent/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("could not build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub const fn config(&self) -> &WikipediaConfig {
        &self.config
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T> {
        let response = self
            .client
            .get(self.config.api_url())
            .query(&[("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .await
            .map_err(|e| backend_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::tool_execution(
                WIKIPEDIA_TOOL,
                format!("Wikipedia returned {status}"),
            ));
        }

        response.json().await.map_err(|e| backend_error(&e))
    }

    /// Titles of the best matching pages
    pub async fn search(&self, query: &str) -> Result<Vec<String>> {
        let limit = self.config.top_k_results.to_string();
        let response: SearchResponse = self
            .get_json(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
            ])
            .await?;

        Ok(response
            .query
            .map(|q| q.search.into_iter().map(|hit| hit.title).collect())
            .unwrap_or_default())
    }

    /// Intro summary of one page, `None` when the page has no text
    pub async fn summary(&self, title: &str) -> Result<Option<PageSummary>> {
        let response: ExtractResponse = self
            .get_json(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
            ])
            .await?;

        Ok(response
            .query
            .and_then(|q| q.pages.into_iter().find(|p| !p.missing))
            .and_then(|page| {
                let summary = page.extract?.trim().to_string();
                (!summary.is_empty()).then_some(PageSummary {
                    title: page.title,
                    summary,
                })
            }))
    }

    /// Search and summarise, formatted for the model
    pub async fn run(&self, query: &str) -> Result<String> {
        let titles = self.search(query).await?;
        tracing::debug!(query, hits = titles.len(), "Wikipedia search");

        let mut fetched = Vec::with_capacity(titles.len());
        for title in titles.iter().take(self.config.top_k_results) {
            fetched.push(self.summary(title).await);
        }

        let pages = collect_pages(fetched)?;
        Ok(format_pages(&pages, self.config.doc_content_chars_max))
    }
}

/// Keep the pages that have text. A failed fetch is skipped while other
/// pages still produce text; if none do, the first failure is returned so an
/// outage is not reported as an empty search.
fn collect_pages(fetched: Vec<Result<Option<PageSummary>>>) -> Result<Vec<PageSummary>> {
    let mut pages = Vec::with_capacity(fetched.len());
    let mut first_error = None;

    for outcome in fetched {
        match outcome {
            Ok(Some(page)) => pages.push(page),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Wikipedia page fetch failed");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if pages.is_empty() => Err(e),
        _ => Ok(pages),
    }
}

fn backend_error(e: &reqwest::Error) -> AgentError {
    AgentError::tool_execution(WIKIPEDIA_TOOL, format!("Wikipedia is unreachable: {e}"))
}

/// Render pages as `Page:`/`Summary:` blocks, cut to `max_chars`
fn format_pages(pages: &[PageSummary], max_chars: usize) -> String {
    if pages.is_empty() {
        return NO_RESULTS.to_string();
    }

    let text = pages
        .iter()
        .map(|p| format!("Page: {}\nSummary: {}", p.title, p.summary))
        .collect::<Vec<_>>()
        .join("\n\n");

    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text,
    }
}

pub struct WikipediaTool {
    client: WikipediaClient,
}

impl WikipediaTool {
    pub const fn new(client: WikipediaClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: WikipediaConfig) -> Result<Self> {
        Ok(Self::new(WikipediaClient::new(config)?))
    }
}

#[async_trait]
impl Tool for WikipediaTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: WIKIPEDIA_TOOL.into(),
            description: "A wrapper around Wikipedia. Useful for when you need to answer general questions about \
                          people, places, companies, facts, historical events, or other subjects. \
                          Input should be a search query."
                .into(),
            parameters: vec![ParameterSchema::input("Search query (e.g., 'Ada Lovelace')")],
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let query = call
            .input()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AgentError::ToolValidation("Missing search query".into()))?;

        // Wikipedia search rejects very long queries
        let query: String = query.chars().take(300).collect();

        let output = self.client.run(&query).await?;
        Ok(ToolResult::success(WIKIPEDIA_TOOL, output))
    }
}
