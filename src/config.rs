use std::env;
use std::fs;
use std::path::Path;
use std::sync::Once;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::agent::AgentConfig;
use crate::error::{AgentError, Result};
use crate::parser::default_answer_shape;
use crate::shape::Shape;

static DOTENV: Once = Once::new();

/// Loads `.env` from the working directory once. A missing file is not an error.
pub fn load_dotenv() {
    DOTENV.call_once(|| {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded environment file");
        }
    });
}

/// Loads variables from `path`. Variables already set in the process win.
pub fn load_env_file(path: impl AsRef<Path>) -> Result<()> {
    dotenvy::from_path(path.as_ref())
        .map_err(|err| AgentError::Config(format!("failed to load env file: {err}")))
}

/// `primary`, or the unprefixed `fallback` name when it is unset.
fn env_var(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary).ok().or_else(|| env::var(fallback).ok())
}

const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant that can perform calculations, make HTTP requests, search Wikipedia, and execute code.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// `openai` or `stub`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4-turbo-preview".into()
}

fn default_request_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSettings {
    #[serde(default = "default_system_message")]
    pub system_message: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_return_steps")]
    pub return_intermediate_steps: bool,
    /// Deadline applied to each run.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            system_message: default_system_message(),
            max_iterations: default_max_iterations(),
            return_intermediate_steps: default_return_steps(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_system_message() -> String {
    DEFAULT_SYSTEM_MESSAGE.into()
}

fn default_max_iterations() -> usize {
    5
}

fn default_return_steps() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OutputConfig {
    /// Shape descriptor for final answers; the answer shape is used when absent.
    #[serde(default)]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(raw)
            .map_err(|err| AgentError::Config(format!("Failed to parse configuration: {err}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by the environment, after loading `.env`.
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        load_dotenv();
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(host) = env::var("TOOLS_AGENT_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("TOOLS_AGENT_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                self.server.port = parsed;
            }
        }
        if let Ok(provider) = env::var("TOOLS_AGENT_PROVIDER") {
            self.model.provider = provider;
        }
        if let Ok(model) = env::var("TOOLS_AGENT_MODEL") {
            self.model.model = model;
        }
        if let Ok(base_url) = env::var("TOOLS_AGENT_BASE_URL") {
            self.model.base_url = Some(base_url);
        }
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(message) = env_var("TOOLS_AGENT_SYSTEM_MESSAGE", "SYSTEM_MESSAGE") {
            if !message.trim().is_empty() {
                self.agent.system_message = message;
            }
        }
        if let Some(iterations) = env_var("TOOLS_AGENT_MAX_ITERATIONS", "MAX_ITERATIONS") {
            match iterations.parse::<usize>() {
                Ok(parsed) if parsed > 0 => self.agent.max_iterations = parsed,
                _ => {}
            }
        }
        if let Ok(timeout) = env::var("TOOLS_AGENT_TIMEOUT_SECS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                self.agent.timeout_secs = parsed;
            }
        }
        if let Ok(steps) = env::var("TOOLS_AGENT_RETURN_STEPS") {
            if let Ok(parsed) = steps.parse::<bool>() {
                self.agent.return_intermediate_steps = parsed;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent.max_iterations == 0 {
            return Err(AgentError::Config(
                "agent.max_iterations must be a positive integer".into(),
            ));
        }
        if self.agent.timeout_secs == 0 {
            return Err(AgentError::Config(
                "agent.timeout_secs must be a positive integer".into(),
            ));
        }
        self.output_shape()?;
        Ok(())
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            system_message: self.agent.system_message.clone(),
            max_iterations: self.agent.max_iterations,
            return_intermediate_steps: self.agent.return_intermediate_steps,
        }
    }

    pub fn output_shape(&self) -> Result<Shape> {
        match &self.output.schema {
            Some(descriptor) => Ok(Shape::from_descriptor(descriptor)?),
            None => Ok(default_answer_shape()),
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.timeout_secs)
    }
}
