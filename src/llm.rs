//! Language model implementations and abstractions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ModelConfig;
use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::message::{Message, Role, ToolCall};
use crate::tool::ToolDescription;

/// Result of a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelCompletion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// Minimal abstraction around a chat completion provider.
///
/// Implementations fail opaquely with [`AgentError::LanguageModel`]; retries, if any,
/// belong inside the implementation.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete_chat(
        &self,
        ctx: &RunContext,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion>;
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: &str) -> AgentError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return AgentError::LanguageModel(format!("{provider} rate limit exceeded: {body}"));
    }
    AgentError::LanguageModel(format!("{provider} request failed with {}: {body}", status))
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            AgentError::LanguageModel("missing OpenAI API key in model config".into())
        })?;
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(cfg.request_timeout_secs))
                .build()
                .map_err(|err| AgentError::LanguageModel(format!("http client error: {err}")))?,
            model: cfg.model.clone(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn to_openai_messages(&self, messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                }
                .to_string();

                let tool_calls = if message.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        message
                            .tool_calls
                            .iter()
                            .map(|call| OpenAiToolCall {
                                id: Some(call.id.clone()),
                                r#type: "function".to_string(),
                                function: OpenAiFunctionCall {
                                    name: call.name.clone(),
                                    arguments: call.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                };

                let content = match (&message.tool_result, tool_calls.is_some()) {
                    (Some(result), _) => Some(result.content.clone()),
                    (None, true) if message.content.is_empty() => None,
                    _ => Some(message.content.clone()),
                };

                OpenAiMessage {
                    role,
                    content,
                    tool_call_id: message.tool_result.as_ref().map(|r| r.call_id.clone()),
                    tool_calls,
                }
            })
            .collect()
    }

    fn to_openai_tools(&self, tools: &[ToolDescription]) -> Option<Vec<OpenAiTool>> {
        if tools.is_empty() {
            return None;
        }

        Some(
            tools
                .iter()
                .map(|tool| OpenAiTool {
                    r#type: "function".to_string(),
                    function: OpenAiFunction {
                        name: tool.name.clone(),
                        description: Some(tool.description.clone()),
                        parameters: Some(tool.parameters.clone()),
                    },
                })
                .collect(),
        )
    }

    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        let mut payload = json!({
            "model": self.model,
            "messages": self.to_openai_messages(messages),
        });
        if let Some(tools) = self.to_openai_tools(tools) {
            payload["tools"] = serde_json::to_value(tools)?;
            payload["tool_choice"] = Value::String("auto".to_string());
        }

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .json(&payload)
            .send()
            .await
            .map_err(|err| AgentError::LanguageModel(format!("OpenAI request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "openai"));
        }

        let body: OpenAiResponse = resp.json().await.map_err(|err| {
            AgentError::LanguageModel(format!("OpenAI response parse error: {err}"))
        })?;

        let first = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::LanguageModel("OpenAI returned no choices".into()))?;

        let tool_calls = first
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id.unwrap_or_default(),
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(ModelCompletion {
            content: first.message.content,
            tool_calls,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    async fn complete_chat(
        &self,
        ctx: &RunContext,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "calling OpenAI");
        ctx.run(self.send(messages, tools)).await
    }
}

/// What the [`StubModel`] saw on one call.
#[derive(Debug, Clone)]
pub struct StubRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
}

/// A deterministic model used for tests and demos.
///
/// Each scripted response is either a JSON directive
/// (`respond`, `call_tool`, `call_tools`, `fail`) or plain text, which is returned as
/// the answer.
pub struct StubModel {
    responses: Mutex<VecDeque<String>>,
    repeat: Option<String>,
    requests: Mutex<Vec<StubRequest>>,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answers every call with the same response.
    pub fn repeating(response: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            repeat: Some(response.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<StubRequest> {
        lock(&self.requests).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Deserialize)]
struct StubCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl From<StubCall> for ToolCall {
    fn from(call: StubCall) -> Self {
        // A string argument is passed through verbatim so scripts can send malformed JSON.
        let arguments = match call.arguments {
            Value::String(raw) => raw,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        ToolCall {
            id: call.id.unwrap_or_default(),
            name: call.name,
            arguments,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum StubDirective {
    Respond {
        content: String,
    },
    CallTool {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        arguments: Value,
    },
    CallTools {
        calls: Vec<StubCall>,
    },
    Fail {
        message: String,
    },
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete_chat(
        &self,
        ctx: &RunContext,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        ctx.check()?;
        lock(&self.requests).push(StubRequest {
            messages: messages.to_vec(),
            tools: tools.iter().map(|tool| tool.name.clone()).collect(),
        });

        let raw = lock(&self.responses)
            .pop_front()
            .or_else(|| self.repeat.clone())
            .ok_or_else(|| {
                AgentError::LanguageModel("StubModel ran out of scripted responses".into())
            })?;

        match serde_json::from_str::<StubDirective>(&raw) {
            Ok(StubDirective::Respond { content }) => Ok(ModelCompletion::text(content)),
            Ok(StubDirective::CallTool {
                id,
                name,
                arguments,
            }) => Ok(ModelCompletion {
                content: None,
                tool_calls: vec![StubCall {
                    id,
                    name,
                    arguments,
                }
                .into()],
            }),
            Ok(StubDirective::CallTools { calls }) => Ok(ModelCompletion {
                content: None,
                tool_calls: calls.into_iter().map(ToolCall::from).collect(),
            }),
            Ok(StubDirective::Fail { message }) => Err(AgentError::LanguageModel(message)),
            Err(_) => Ok(ModelCompletion::text(raw)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAIClient {
        OpenAIClient::from_config(&ModelConfig {
            api_key: Some("test-key".into()),
            ..ModelConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn requires_an_api_key() {
        let err = OpenAIClient::from_config(&ModelConfig::default()).err().unwrap();
        assert!(err.to_string().contains("missing OpenAI API key"));
    }

    #[test]
    fn maps_tool_exchanges_to_openai_messages() {
        let call = ToolCall::new("calculator", r#"{"a":1}"#).with_id("call_0");
        let messages = vec![
            Message::system("persona"),
            Message::user("hi"),
            Message::tool_calls(vec![call]),
            Message::tool("call_0", "calculator", r#"{"result":1}"#),
        ];

        let mapped = client().to_openai_messages(&messages);
        let roles: Vec<&str> = mapped.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);

        assert!(mapped[2].content.is_none());
        let calls = mapped[2].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id.as_deref(), Some("call_0"));
        assert_eq!(calls[0].function.arguments, r#"{"a":1}"#);

        assert_eq!(mapped[3].tool_call_id.as_deref(), Some("call_0"));
        assert_eq!(mapped[3].content.as_deref(), Some(r#"{"result":1}"#));
    }

    #[test]
    fn omits_tools_when_none_are_registered() {
        assert!(client().to_openai_tools(&[]).is_none());
    }

    #[tokio::test]
    async fn stub_follows_its_script_and_records_requests() {
        let model = StubModel::new(vec![
            r#"{"action":"call_tool","name":"echo","arguments":{"text":"ping"}}"#.into(),
            r#"{"action":"call_tools","calls":[{"id":"x","name":"a"},{"name":"b","arguments":"{oops"}]}"#.into(),
            "plain text answer".into(),
            r#"{"action":"fail","message":"boom"}"#.into(),
        ]);
        let ctx = RunContext::new();
        let history = vec![Message::user("hi")];

        let first = model.complete_chat(&ctx, &history, &[]).await.unwrap();
        assert_eq!(first.tool_calls[0].name, "echo");
        assert_eq!(first.tool_calls[0].arguments, r#"{"text":"ping"}"#);

        let second = model.complete_chat(&ctx, &history, &[]).await.unwrap();
        assert_eq!(second.tool_calls.len(), 2);
        assert_eq!(second.tool_calls[0].id, "x");
        assert_eq!(second.tool_calls[0].arguments, "");
        assert_eq!(second.tool_calls[1].arguments, "{oops");

        let third = model.complete_chat(&ctx, &history, &[]).await.unwrap();
        assert_eq!(third, ModelCompletion::text("plain text answer"));

        let fourth = model.complete_chat(&ctx, &history, &[]).await.unwrap_err();
        assert!(matches!(fourth, AgentError::LanguageModel(msg) if msg == "boom"));

        assert!(model.complete_chat(&ctx, &history, &[]).await.is_err());
        assert_eq!(model.requests().len(), 5);
    }

    #[tokio::test]
    async fn repeating_stub_never_runs_dry() {
        let model = StubModel::repeating("again");
        let ctx = RunContext::new();
        for _ in 0..3 {
            let completion = model.complete_chat(&ctx, &[], &[]).await.unwrap();
            assert_eq!(completion.content.as_deref(), Some("again"));
        }
    }
}
