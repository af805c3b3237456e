//! HTTP request tool.
//!
//! Lets the model call external services. Requests are bounded by a client
//! timeout and by the run context, whichever ends first.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::shape::Shape;
use crate::tool::{Tool, ToolRegistry};

const NAME: &str = "http_request";

/// Configuration for the HTTP request tool
#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub default_headers: HashMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            default_headers: HashMap::new(),
        }
    }
}

impl HttpConfig {
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }
}

pub fn http_toolkit(config: HttpConfig) -> Result<ToolRegistry> {
    ToolRegistry::new().with(HttpRequestTool::new(config)?)
}

pub struct HttpRequestTool {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpRequestTool {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::tool(NAME, e))?;
        Ok(Self { client, config })
    }
}

#[derive(Debug, Deserialize)]
struct HttpRequestInput {
    url: String,
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<String>,
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Makes HTTP requests to external services. Expects {\"url\": string, \"method\": \"GET\"|\"POST\"|\"PUT\"|\"DELETE\"|\"PATCH\"|\"HEAD\"|\"OPTIONS\"} with optional \"headers\" (object of strings) and \"body\" (string)."
    }

    fn input_shape(&self) -> Shape {
        Shape::object([("url", Shape::string()), ("method", Shape::string())])
    }

    async fn call(&self, ctx: &RunContext, input: Value) -> Result<Value> {
        let req: HttpRequestInput = serde_json::from_value(input)
            .map_err(|e| AgentError::tool(NAME, format!("invalid input: {e}")))?;

        let method = Method::from_bytes(req.method.to_uppercase().as_bytes())
            .map_err(|_| AgentError::tool(NAME, format!("unsupported method: {}", req.method)))?;

        let mut headers = HeaderMap::new();
        for (k, v) in self.config.default_headers.iter().chain(req.headers.iter()) {
            let name = HeaderName::try_from(k.as_str())
                .map_err(|e| AgentError::tool(NAME, format!("invalid header `{k}`: {e}")))?;
            let value = HeaderValue::from_str(v)
                .map_err(|e| AgentError::tool(NAME, format!("invalid header `{k}`: {e}")))?;
            headers.append(name, value);
        }

        let mut request = self.client.request(method, &req.url).headers(headers);
        if let Some(body) = req.body {
            request = request.body(body);
        }

        let response = ctx
            .run(async {
                request
                    .send()
                    .await
                    .map_err(|e| AgentError::tool(NAME, format!("request failed: {e}")))
            })
            .await?;

        let status = response.status().as_u16();
        let mut response_headers: BTreeMap<String, String> = BTreeMap::new();
        for (k, v) in response.headers() {
            let value = String::from_utf8_lossy(v.as_bytes()).into_owned();
            response_headers
                .entry(k.to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let body = ctx
            .run(async {
                response
                    .text()
                    .await
                    .map_err(|e| AgentError::tool(NAME, format!("failed to read body: {e}")))
            })
            .await?;

        Ok(json!({
            "status_code": status,
            "headers": response_headers,
            "body": body,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_toolkit_creation() {
        let registry = http_toolkit(HttpConfig::default().with_header("X-Test", "1")).unwrap();
        let tool = registry.get(NAME).unwrap();
        assert_eq!(
            tool.input_shape().fields().map(|fields| fields.len()),
            Some(2)
        );
    }

    #[tokio::test]
    async fn test_rejects_bad_method_before_sending() {
        let tool = HttpRequestTool::new(HttpConfig::default()).unwrap();
        let err = tool
            .call(
                &RunContext::new(),
                json!({"url": "http://127.0.0.1:9", "method": "NOT A METHOD"}),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported method"));
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_request() {
        let tool = HttpRequestTool::new(HttpConfig::default()).unwrap();
        let ctx = RunContext::new();
        ctx.cancel();
        let err = tool
            .call(&ctx, json!({"url": "http://127.0.0.1:9", "method": "GET"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }
}
