//! Wikipedia lookup tool.
//!
//! Fetches the plain-text introduction of the article matching a query through
//! the MediaWiki `action=query&prop=extracts` API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::shape::Shape;
use crate::tool::{Tool, ToolRegistry};

const NAME: &str = "wikipedia";
const DEFAULT_ENDPOINT: &str = "https://en.wikipedia.org/w/api.php";

pub fn wikipedia_toolkit() -> Result<ToolRegistry> {
    ToolRegistry::new().with(WikipediaTool::new()?)
}

pub struct WikipediaTool {
    client: reqwest::Client,
    endpoint: String,
}

impl WikipediaTool {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Points the tool at another MediaWiki `api.php`.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tools-agent/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::tool(NAME, e))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn query_url(&self, query: &str) -> String {
        format!(
            "{}?action=query&format=json&prop=extracts&exintro=true&explaintext=true&titles={}",
            self.endpoint,
            urlencoding::encode(query)
        )
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    query: Option<ApiQuery>,
}

#[derive(Debug, Deserialize)]
struct ApiQuery {
    #[serde(default)]
    pages: BTreeMap<String, ApiPage>,
}

#[derive(Debug, Deserialize)]
struct ApiPage {
    #[serde(default)]
    pageid: Option<u64>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    extract: String,
}

/// First existing page of an API response. Missing pages carry no `pageid`.
fn first_page(body: &str, query: &str) -> Result<Value> {
    let response: ApiResponse = serde_json::from_str(body)
        .map_err(|e| AgentError::tool(NAME, format!("failed to parse response: {e}")))?;

    let page = response
        .query
        .into_iter()
        .flat_map(|q| q.pages.into_values())
        .find_map(|page| {
            let id = page.pageid?;
            Some((id, page))
        })
        .filter(|(_, page)| !page.title.is_empty());

    match page {
        Some((page_id, page)) => Ok(json!({
            "title": page.title,
            "extract": page.extract.trim(),
            "url": format!("https://en.wikipedia.org/?curid={page_id}"),
            "page_id": page_id,
        })),
        None => Err(AgentError::tool(
            NAME,
            format!("no results found for query: {query}"),
        )),
    }
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Searches Wikipedia for information about a topic. Expects {\"query\": string}."
    }

    fn input_shape(&self) -> Shape {
        Shape::object([("query", Shape::string())])
    }

    async fn call(&self, ctx: &RunContext, input: Value) -> Result<Value> {
        let query = input
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::tool(NAME, "missing `query`"))?;

        let url = self.query_url(query);
        let body = ctx
            .run(async {
                let response = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| AgentError::tool(NAME, format!("request failed: {e}")))?;
                response
                    .text()
                    .await
                    .map_err(|e| AgentError::tool(NAME, format!("failed to read body: {e}")))
            })
            .await?;

        first_page(&body, query)
    }
}
