//! A tool-augmented agent loop.
//!
//! The crate provides:
//! - A language model abstraction (`LanguageModel`) with an OpenAI-compatible client.
//! - A tool interface (`Tool` and `ToolRegistry`) plus a default toolkit.
//! - An `Agent` that loops between the model and tools until it gets an answer,
//!   then validates that answer against a declared `Shape`.
//! - A single-slot `Memory` carried between runs.

mod agent;
pub mod config;
mod context;
mod conversation;
mod error;
mod llm;
mod memory;
mod message;
mod parser;
#[cfg(feature = "server")]
mod server;
mod shape;
pub mod telemetry;
mod tool;
pub mod tools;

pub use agent::{Agent, AgentConfig, AgentResponse, AgentStep, RunFailure, TOOL_FAILURE_MARKER};
pub use config::AppConfig;
pub use context::RunContext;
pub use conversation::Conversation;
pub use error::{AgentError, Result};
pub use llm::{LanguageModel, ModelCompletion, OpenAIClient, StubModel, StubRequest};
pub use memory::{InMemoryStore, Memory};
pub use message::{Message, Role, ToolCall, ToolResult};
pub use parser::{default_answer_shape, validate, JsonOutputParser, OutputParser, ParseError};
#[cfg(feature = "server")]
pub use server::AgentServer;
pub use shape::{Shape, ShapeError};
pub use tool::{Tool, ToolDescription, ToolRegistry};
pub use tools::default_toolkit;
