use thiserror::Error;

use crate::parser::ParseError;
use crate::shape::ShapeError;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("run cancelled")]
    Cancelled,

    #[error("run deadline exceeded")]
    DeadlineExceeded,

    #[error("tool `{0}` not found")]
    ToolNotFound(String),

    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),

    #[error("tool `{name}` invocation failed: {source}")]
    ToolInvocation {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("failed to load memory: {0}")]
    MemoryLoad(#[source] Box<AgentError>),

    #[error("failed to save memory: {0}")]
    MemorySave(#[source] Box<AgentError>),

    #[error("failed to parse output: {0}")]
    OutputValidation(#[from] ParseError),

    #[error(transparent)]
    InvalidShape(#[from] ShapeError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl AgentError {
    /// Wraps any displayable failure as a tool invocation error.
    pub fn tool(
        name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        AgentError::ToolInvocation {
            name: name.into(),
            source: source.into(),
        }
    }

    /// True when the error came from the run context finishing.
    pub fn is_context_done(&self) -> bool {
        matches!(self, AgentError::Cancelled | AgentError::DeadlineExceeded)
    }
}
