//! Basic arithmetic: add, subtract, multiply and divide.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::shape::Shape;
use crate::tool::{Tool, ToolRegistry};

/// Registry holding only the calculator.
pub fn calculator_toolkit() -> Result<ToolRegistry> {
    ToolRegistry::new().with(CalculatorTool)
}

pub struct CalculatorTool;

#[derive(Debug, Deserialize)]
struct CalculatorInput {
    operation: String,
    a: f64,
    b: f64,
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Performs basic arithmetic operations (add, subtract, multiply, divide). Expects {\"operation\": string, \"a\": number, \"b\": number}."
    }

    fn input_shape(&self) -> Shape {
        Shape::object([
            ("operation", Shape::string()),
            ("a", Shape::number()),
            ("b", Shape::number()),
        ])
    }

    async fn call(&self, ctx: &RunContext, input: Value) -> Result<Value> {
        ctx.check()?;
        let params: CalculatorInput = serde_json::from_value(input)
            .map_err(|e| AgentError::tool(self.name(), format!("invalid input: {e}")))?;

        let result = match params.operation.as_str() {
            "add" => params.a + params.b,
            "subtract" => params.a - params.b,
            "multiply" => params.a * params.b,
            "divide" => {
                if params.b == 0.0 {
                    return Err(AgentError::tool(self.name(), "division by zero"));
                }
                params.a / params.b
            }
            other => {
                return Err(AgentError::tool(
                    self.name(),
                    format!("unsupported operation: {other}"),
                ))
            }
        };

        Ok(json!({ "result": number(round6(result)) }))
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

// Whole results are emitted as integers so `15 / 3` reads as `5`.
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn calc(input: Value) -> Result<Value> {
        CalculatorTool.call(&RunContext::new(), input).await
    }

    #[tokio::test]
    async fn test_divide() {
        let result = calc(json!({"operation": "divide", "a": 15, "b": 3}))
            .await
            .unwrap();
        assert_eq!(result, json!({"result": 5}));
    }

    #[tokio::test]
    async fn test_rounds_to_six_places() {
        let result = calc(json!({"operation": "divide", "a": 1, "b": 3}))
            .await
            .unwrap();
        assert_eq!(result["result"], 0.333333);

        let sum = calc(json!({"operation": "add", "a": 0.1, "b": 0.2}))
            .await
            .unwrap();
        assert_eq!(sum["result"], 0.3);
    }

    #[tokio::test]
    async fn test_other_operations() {
        let add = calc(json!({"operation": "add", "a": 2, "b": 3})).await.unwrap();
        assert_eq!(add["result"], 5);
        let sub = calc(json!({"operation": "subtract", "a": 2, "b": 3})).await.unwrap();
        assert_eq!(sub["result"], -1);
        let mul = calc(json!({"operation": "multiply", "a": 2.5, "b": 3})).await.unwrap();
        assert_eq!(mul["result"], 7.5);
    }

    #[tokio::test]
    async fn test_division_by_zero_fails() {
        let err = calc(json!({"operation": "divide", "a": 1, "b": 0}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[tokio::test]
    async fn test_unknown_operation_and_bad_input() {
        let err = calc(json!({"operation": "modulo", "a": 1, "b": 2}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported operation: modulo"));

        let err = calc(json!({"operation": "add", "a": "one"})).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolInvocation { .. }));
    }

    #[test]
    fn test_toolkit_registers_calculator() {
        let registry = calculator_toolkit().unwrap();
        assert_eq!(registry.names(), vec!["calculator"]);
    }
}
