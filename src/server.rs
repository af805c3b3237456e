use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::agent::{Agent, AgentResponse};
use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::llm::LanguageModel;
use crate::tool::ToolDescription;

/// HTTP front end for a shared [`Agent`]. Every request runs under its own deadline.
pub struct AgentServer<M: LanguageModel + 'static> {
    agent: Arc<Agent<M>>,
    run_timeout: Duration,
}

impl<M: LanguageModel + 'static> Clone for AgentServer<M> {
    fn clone(&self) -> Self {
        Self {
            agent: Arc::clone(&self.agent),
            run_timeout: self.run_timeout,
        }
    }
}

impl<M: LanguageModel + 'static> AgentServer<M> {
    pub fn new(agent: Arc<Agent<M>>, run_timeout: Duration) -> Self {
        Self { agent, run_timeout }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/tools", get(list_tools::<M>))
            .route("/execute", post(execute::<M>))
            .with_state(self.clone())
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "agent server listening");
        axum::serve(listener, app.into_make_service())
            .await
            .map_err(|err| AgentError::Protocol(format!("server error: {err}")))?;
        Ok(())
    }
}

async fn list_tools<M: LanguageModel + 'static>(
    State(state): State<AgentServer<M>>,
) -> Json<Vec<ToolDescription>> {
    Json(state.agent.tools().describe())
}

#[derive(Deserialize)]
struct ExecuteRequest {
    input: String,
}

async fn execute<M: LanguageModel + 'static>(
    State(state): State<AgentServer<M>>,
    Json(req): Json<ExecuteRequest>,
) -> Response {
    let ctx = RunContext::with_timeout(state.run_timeout);
    match state.agent.execute(&ctx, &req.input).await {
        Ok(response) => Json(json!({ "result": response })).into_response(),
        Err(failure) => {
            warn!(error = %failure.error, "execute request failed");
            let include_steps = state.agent.config().return_intermediate_steps;
            let result = AgentResponse::from_failure(&failure, include_steps);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": failure.error.to_string(), "result": result })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StubModel;
    use crate::tools::calculator_toolkit;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn server(responses: Vec<&str>) -> AgentServer<StubModel> {
        let model = StubModel::new(responses.into_iter().map(String::from).collect());
        let agent = Agent::new(model).with_tools(calculator_toolkit().unwrap());
        AgentServer::new(Arc::new(agent), Duration::from_secs(5))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn execute_request(input: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/execute")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "input": input }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = server(vec![]).router();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn tools_are_listed_in_order() {
        let app = server(vec![]).router();
        let response = app
            .oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body[0]["name"], "calculator");
        assert_eq!(body[0]["parameters"]["type"], "object");
    }

    #[tokio::test]
    async fn execute_returns_result() {
        let app = server(vec![
            r#"{"action":"call_tool","name":"calculator","arguments":{"operation":"divide","a":15,"b":3}}"#,
            "The result is 5",
        ])
        .router();

        let response = app.oneshot(execute_request("What is 15 / 3?")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["result"]["final_output"]["response"], "The result is 5");
        assert_eq!(body["result"]["steps"][0]["output"]["result"], 5);
    }

    #[tokio::test]
    async fn failed_run_maps_to_server_error() {
        let app = server(vec![r#"{"action":"fail","message":"model offline"}"#]).router();

        let response = app.oneshot(execute_request("hi")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("model offline"));
        assert!(body["result"]["final_output"].is_null());
        assert_eq!(body["result"]["error"], body["error"]);
    }
}
