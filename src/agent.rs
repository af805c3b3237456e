use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::context::RunContext;
use crate::conversation::Conversation;
use crate::error::{AgentError, Result};
use crate::llm::LanguageModel;
use crate::memory::Memory;
use crate::parser::OutputParser;
use crate::tool::ToolRegistry;

/// Text the model sees in place of a failed tool's output.
pub const TOOL_FAILURE_MARKER: &str = "Error: Tool execution failed";

/// Immutable knobs handed to an [`Agent`] at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub system_message: String,
    /// Upper bound on model calls per run. Always at least one.
    pub max_iterations: usize,
    pub return_intermediate_steps: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_message: "You are a helpful assistant.".into(),
            max_iterations: 5,
            return_intermediate_steps: true,
        }
    }
}

/// Record of one tool invocation within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    pub action: String,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix seconds.
    pub timestamp: i64,
}

impl AgentStep {
    fn new(action: impl Into<String>, input: Value) -> Self {
        Self {
            action: action.into(),
            input,
            output: None,
            error: None,
            timestamp: unix_now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Validated answer, or `None` when the iteration budget ran out first.
    pub final_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<AgentStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    /// Serializable view of a failed run; steps follow the same projection as a success.
    pub fn from_failure(failure: &RunFailure, include_steps: bool) -> Self {
        Self {
            final_output: None,
            steps: include_steps.then(|| failure.steps.clone()),
            error: Some(failure.error.to_string()),
        }
    }
}

/// A fatal run error together with the steps recorded before it happened.
#[derive(Debug)]
pub struct RunFailure {
    pub error: AgentError,
    pub steps: Vec<AgentStep>,
}

impl RunFailure {
    fn new(error: AgentError, steps: Vec<AgentStep>) -> Self {
        Self { error, steps }
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} steps)", self.error, self.steps.len())
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<RunFailure> for AgentError {
    fn from(failure: RunFailure) -> Self {
        failure.error
    }
}

/// An agent that alternates between the model and registered tools until it gets an answer.
///
/// Configuration is fixed once built, so one agent can serve concurrent runs through an `Arc`.
pub struct Agent<M: LanguageModel> {
    model: Arc<M>,
    tools: ToolRegistry,
    config: AgentConfig,
    memory: Option<Arc<dyn Memory>>,
    output_parser: Option<Arc<dyn OutputParser>>,
}

impl<M: LanguageModel> Agent<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            model,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
            memory: None,
            output_parser: None,
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self.config.max_iterations = self.config.max_iterations.max(1);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_message = prompt.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations.max(1);
        self
    }

    pub fn return_intermediate_steps(mut self, enabled: bool) -> Self {
        self.config.return_intermediate_steps = enabled;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_output_parser(mut self, parser: Arc<dyn OutputParser>) -> Self {
        self.output_parser = Some(parser);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Runs one request to completion.
    ///
    /// Tool failures are recorded as steps and never abort the run. Every other
    /// failure does, and comes back with the steps recorded so far.
    pub async fn execute(
        &self,
        ctx: &RunContext,
        input: &str,
    ) -> std::result::Result<AgentResponse, RunFailure> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("agent_run", run_id = %run_id);
        let mut steps = Vec::new();

        let outcome = self
            .run(ctx, input, &mut steps)
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        match outcome {
            Ok(final_output) => {
                info!(
                    steps = steps.len(),
                    answered = final_output.is_some(),
                    "agent run finished"
                );
                Ok(AgentResponse {
                    final_output,
                    steps: self.config.return_intermediate_steps.then_some(steps),
                    error: None,
                })
            }
            Err(error) => {
                warn!(steps = steps.len(), %error, "agent run failed");
                Err(RunFailure::new(error, steps))
            }
        }
    }

    async fn run(
        &self,
        ctx: &RunContext,
        input: &str,
        steps: &mut Vec<AgentStep>,
    ) -> Result<Option<Value>> {
        info!(
            tools = self.tools.len(),
            max_iterations = self.config.max_iterations,
            "agent run started"
        );

        let mut conversation = Conversation::new(&self.config.system_message, input);
        if let Some(memory) = &self.memory {
            let previous = memory.load(ctx).await.map_err(memory_error(AgentError::MemoryLoad))?;
            if !previous.is_empty() {
                conversation.push_context(format!(
                    "Previous context: {}",
                    String::from_utf8_lossy(&previous)
                ));
            }
        }

        let tools = self.tools.describe();
        let mut call_counter = 0usize;

        for iteration in 0..self.config.max_iterations {
            ctx.check()?;
            debug!(iteration, messages = conversation.len(), "calling model");

            let completion = self
                .model
                .complete_chat(ctx, conversation.messages(), &tools)
                .await
                .map_err(|err| match err {
                    AgentError::Cancelled
                    | AgentError::DeadlineExceeded
                    | AgentError::LanguageModel(_) => err,
                    other => AgentError::LanguageModel(other.to_string()),
                })?;

            if completion.tool_calls.is_empty() {
                let text = completion.content.unwrap_or_default();
                conversation.push_assistant(text.clone());
                info!(iteration, "model produced a final answer");
                let answer = json!({ "response": text, "confidence": 1.0 });
                return self.finalize(ctx, answer).await.map(Some);
            }

            for mut call in completion.tool_calls {
                if call.id.is_empty() {
                    call.id = format!("call_{call_counter}");
                }
                call_counter += 1;

                let input = serde_json::from_str::<Value>(&call.arguments)
                    .unwrap_or_else(|_| Value::String(call.arguments.clone()));
                let mut step = AgentStep::new(&call.name, input);

                debug!(tool = %call.name, call_id = %call.id, "dispatching tool call");
                let content = match self.tools.call(ctx, &call.name, &call.arguments).await {
                    Ok(output) => {
                        let content = serde_json::to_string(&output)?;
                        step.output = Some(output);
                        content
                    }
                    Err(err) if err.is_context_done() => {
                        step.error = Some(err.to_string());
                        steps.push(step);
                        return Err(err);
                    }
                    Err(err) => {
                        warn!(tool = %call.name, error = %err, "tool call failed");
                        step.error = Some(err.to_string());
                        TOOL_FAILURE_MARKER.to_string()
                    }
                };

                steps.push(step);
                conversation.push_tool_exchange(call, content);
            }
        }

        warn!(
            max_iterations = self.config.max_iterations,
            "iteration budget exhausted without a final answer"
        );
        Ok(None)
    }

    async fn finalize(&self, ctx: &RunContext, answer: Value) -> Result<Value> {
        let canonical = match &self.output_parser {
            Some(parser) => parser.parse(&serde_json::to_vec(&answer)?)?,
            None => serde_json::to_vec_pretty(&answer)?,
        };

        if let Some(memory) = &self.memory {
            memory
                .save(ctx, &canonical)
                .await
                .map_err(memory_error(AgentError::MemorySave))?;
        }

        Ok(serde_json::from_slice(&canonical)?)
    }
}

/// Context errors keep their identity; everything else is wrapped.
fn memory_error(wrap: fn(Box<AgentError>) -> AgentError) -> impl Fn(AgentError) -> AgentError {
    move |err| {
        if err.is_context_done() {
            err
        } else {
            wrap(Box::new(err))
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}
