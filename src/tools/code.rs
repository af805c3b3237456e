//! Code execution tool.
//!
//! Writes the snippet into a fresh temporary directory and runs it with the
//! matching interpreter. No sandboxing beyond the scratch directory.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::shape::Shape;
use crate::tool::{Tool, ToolRegistry};

const NAME: &str = "code_execution";

pub fn code_toolkit() -> Result<ToolRegistry> {
    ToolRegistry::new().with(CodeExecutionTool)
}

pub struct CodeExecutionTool;

#[derive(Debug, Deserialize)]
struct CodeInput {
    language: String,
    code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Language {
    Python,
    Node,
    Bash,
}

impl Language {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "python" => Ok(Language::Python),
            "node" => Ok(Language::Node),
            "bash" => Ok(Language::Bash),
            other => Err(AgentError::tool(
                NAME,
                format!("unsupported language: {other}"),
            )),
        }
    }

    fn program(self) -> &'static str {
        match self {
            Language::Python => "python3",
            Language::Node => "node",
            Language::Bash => "bash",
        }
    }

    fn script_name(self) -> &'static str {
        match self {
            Language::Python => "script.py",
            Language::Node => "script.js",
            Language::Bash => "script.sh",
        }
    }
}

async fn write_script(dir: &Path, language: Language, code: &str) -> Result<std::path::PathBuf> {
    let path = dir.join(language.script_name());
    tokio::fs::write(&path, code)
        .await
        .map_err(|e| AgentError::tool(NAME, format!("failed to write script: {e}")))?;
    Ok(path)
}

#[async_trait]
impl Tool for CodeExecutionTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Executes code in various programming languages. Expects {\"language\": \"python\"|\"node\"|\"bash\", \"code\": string}. Returns combined output and the exit code."
    }

    fn input_shape(&self) -> Shape {
        Shape::object([("language", Shape::string()), ("code", Shape::string())])
    }

    async fn call(&self, ctx: &RunContext, input: Value) -> Result<Value> {
        let params: CodeInput = serde_json::from_value(input)
            .map_err(|e| AgentError::tool(NAME, format!("invalid input: {e}")))?;
        let language = Language::parse(&params.language)?;
        ctx.check()?;

        let dir = tempfile::Builder::new()
            .prefix("code-execution-")
            .tempdir()
            .map_err(|e| AgentError::tool(NAME, format!("failed to create temp directory: {e}")))?;
        let script = write_script(dir.path(), language, &params.code).await?;

        debug!(language = language.program(), dir = %dir.path().display(), "running snippet");
        let child = Command::new(language.program())
            .arg(&script)
            .current_dir(dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::tool(NAME, format!("execution failed: {e}")))?;

        // Dropping the pending wait on cancellation kills the child.
        let output = ctx
            .run(async {
                child
                    .wait_with_output()
                    .await
                    .map_err(|e| AgentError::tool(NAME, format!("execution failed: {e}")))
            })
            .await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let combined = combined.trim();

        if output.status.success() {
            Ok(json!({ "output": combined, "exit_code": 0 }))
        } else {
            let exit_code = output.status.code().unwrap_or(-1);
            Ok(json!({
                "output": combined,
                "error": format!("process exited with {}", output.status),
                "exit_code": exit_code,
            }))
        }
    }
}
