//! Tools module - the concrete tools the agent ships with.
//!
//! - Calculator: basic arithmetic
//! - HTTP: requests to external services
//! - Wikipedia: article introductions
//! - Code: python, node and bash snippets

pub mod calculator;
pub mod code;
pub mod http;
pub mod wikipedia;

pub use calculator::{calculator_toolkit, CalculatorTool};
pub use code::{code_toolkit, CodeExecutionTool};
pub use http::{http_toolkit, HttpConfig, HttpRequestTool};
pub use wikipedia::{wikipedia_toolkit, WikipediaTool};

use crate::error::Result;
use crate::tool::ToolRegistry;

/// Every shipped tool: `calculator`, `http_request`, `wikipedia`, `code_execution`.
pub fn default_toolkit() -> Result<ToolRegistry> {
    let mut registry = calculator_toolkit()?;
    registry.merge(http_toolkit(HttpConfig::default())?)?;
    registry.merge(wikipedia_toolkit()?)?;
    registry.merge(code_toolkit()?)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_toolkit_order() {
        let registry = default_toolkit().unwrap();
        assert_eq!(
            registry.names(),
            vec!["calculator", "http_request", "wikipedia", "code_execution"]
        );
    }
}
