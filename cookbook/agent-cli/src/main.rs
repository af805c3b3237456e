//! Command-line entry point.
//!
//! `tools-agent [--config FILE] [--json-logs] <request...>` runs one request and prints the
//! response. `tools-agent [--config FILE] [--json-logs] serve` starts the HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tools_agent::config::load_dotenv;
use tools_agent::telemetry::init_tracing;
use tools_agent::{
    default_toolkit, Agent, AgentError, AgentResponse, AgentServer, AppConfig, InMemoryStore,
    JsonOutputParser, LanguageModel, OpenAIClient, Result, RunContext, StubModel,
};
use tracing::{error, info};

const STUB_REPLY: &str =
    r#"{"action":"respond","content":"No language model is configured; this is the stub provider."}"#;

#[derive(Parser, Debug)]
#[command(
    name = "tools-agent",
    version,
    about = "Tool-augmented agent: answer one request or serve the HTTP API"
)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(long, global = true, env = "TOOLS_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Request text; words are joined with spaces
    #[arg(trailing_var_arg = true)]
    request: Vec<String>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Start the HTTP server on the configured host and port
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    match try_main().await {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "tools-agent failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn try_main() -> Result<ExitCode> {
    load_dotenv();
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    let cfg = match &cli.config {
        Some(path) => AppConfig::from_env_or_file(path)?,
        None => AppConfig::from_env()?,
    };
    info!(provider = %cfg.model.provider, model = %cfg.model.model, "configuration loaded");

    match cfg.model.provider.as_str() {
        "openai" => run(Arc::new(OpenAIClient::from_config(&cfg.model)?), &cfg, cli).await,
        "stub" => run(StubModel::repeating(STUB_REPLY), &cfg, cli).await,
        other => Err(AgentError::Config(format!("unknown model provider `{other}`"))),
    }
}

async fn run<M: LanguageModel + 'static>(
    model: Arc<M>,
    cfg: &AppConfig,
    cli: Cli,
) -> Result<ExitCode> {
    let agent = Agent::new(model)
        .with_config(cfg.agent_config())
        .with_tools(default_toolkit()?)
        .with_memory(Arc::new(InMemoryStore::new()))
        .with_output_parser(Arc::new(JsonOutputParser::new(cfg.output_shape()?)));

    if cli.command == Some(Command::Serve) {
        let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
            .parse()
            .map_err(|err| AgentError::Config(format!("invalid server address: {err}")))?;
        AgentServer::new(Arc::new(agent), cfg.run_timeout())
            .serve(addr)
            .await?;
        return Ok(ExitCode::SUCCESS);
    }

    let input = cli.request.join(" ");
    if input.trim().is_empty() {
        return Err(AgentError::Config(
            "no request given; pass request text or `serve` (see --help)".into(),
        ));
    }

    let ctx = RunContext::with_timeout(cfg.run_timeout());
    let (response, code) = match agent.execute(&ctx, &input).await {
        Ok(response) => (response, ExitCode::SUCCESS),
        Err(failure) => (
            AgentResponse::from_failure(&failure, cfg.agent.return_intermediate_steps),
            ExitCode::FAILURE,
        ),
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(code)
}
