use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::shape::Shape;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Shape of the JSON arguments the tool expects.
    fn input_shape(&self) -> Shape;

    /// Runs the tool. Blocking work should honor `ctx` so a cancelled run stops promptly.
    async fn call(&self, ctx: &RunContext, input: Value) -> Result<Value>;
}

/// Static description of a tool that can be handed to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tools in registration order, addressable by unique name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with<T: Tool + 'static>(mut self, tool: T) -> Result<Self> {
        self.register(tool)?;
        Ok(self)
    }

    /// Appends every tool of `other`, keeping its order.
    pub fn merge(&mut self, other: ToolRegistry) -> Result<()> {
        for tool in other.tools {
            self.register_arc(tool)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&idx| &self.tools[idx])
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.get(name)
            .cloned()
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    pub fn list(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name().to_string()).collect()
    }

    pub fn describe(&self) -> Vec<ToolDescription> {
        self.tools
            .iter()
            .map(|tool| ToolDescription {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.input_shape().to_json_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks up `name` and invokes it with the raw JSON `arguments`.
    pub async fn call(&self, ctx: &RunContext, name: &str, arguments: &str) -> Result<Value> {
        let tool = self.lookup(name)?;
        let input = if arguments.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(arguments).map_err(|err| AgentError::tool(name, err))?
        };

        tool.call(ctx, input).await.map_err(|err| match err {
            AgentError::ToolInvocation { .. }
            | AgentError::Cancelled
            | AgentError::DeadlineExceeded => err,
            other => AgentError::tool(name, other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Second;
    struct First;

    #[async_trait]
    impl Tool for Second {
        fn name(&self) -> &str {
            "second"
        }

        fn description(&self) -> &str {
            "Second tool"
        }

        fn input_shape(&self) -> Shape {
            Shape::object([("text", Shape::String)])
        }

        async fn call(&self, _ctx: &RunContext, input: Value) -> Result<Value> {
            Ok(input)
        }
    }

    #[async_trait]
    impl Tool for First {
        fn name(&self) -> &str {
            "a_first"
        }

        fn description(&self) -> &str {
            "First tool"
        }

        fn input_shape(&self) -> Shape {
            Shape::object(Vec::<(String, Shape)>::new())
        }

        async fn call(&self, _ctx: &RunContext, _input: Value) -> Result<Value> {
            Err(AgentError::Protocol("always fails".into()))
        }
    }

    #[test]
    fn describes_in_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Second).unwrap();
        registry.register(First).unwrap();

        let names: Vec<String> = registry.describe().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["second", "a_first"]);
        assert_eq!(registry.names(), vec!["second", "a_first"]);
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = ToolRegistry::new().with(Second).unwrap();
        let err = registry.register(Second).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(name) if name == "second"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn merge_keeps_order_and_detects_conflicts() {
        let mut registry = ToolRegistry::new().with(Second).unwrap();
        registry
            .merge(ToolRegistry::new().with(First).unwrap())
            .unwrap();
        assert_eq!(registry.names(), vec!["second", "a_first"]);

        let conflict = ToolRegistry::new().with(First).unwrap();
        assert!(registry.merge(conflict).is_err());
    }

    #[test]
    fn lookup_reports_missing_tools() {
        let registry = ToolRegistry::new();
        assert!(matches!(
            registry.lookup("nope"),
            Err(AgentError::ToolNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn describe_renders_input_shape_as_schema() {
        let registry = ToolRegistry::new().with(Second).unwrap();
        let description = &registry.describe()[0];
        assert_eq!(description.parameters["properties"]["text"]["type"], "string");
        assert_eq!(description.parameters["required"], json!(["text"]));
    }

    #[tokio::test]
    async fn call_parses_arguments_and_wraps_failures() {
        let registry = ToolRegistry::new()
            .with(Second)
            .unwrap()
            .with(First)
            .unwrap();
        let ctx = RunContext::new();

        let echoed = registry.call(&ctx, "second", r#"{"text":"ping"}"#).await.unwrap();
        assert_eq!(echoed, json!({"text": "ping"}));

        let empty = registry.call(&ctx, "second", "").await.unwrap();
        assert_eq!(empty, json!({}));

        let bad_args = registry.call(&ctx, "second", "{not json").await.unwrap_err();
        assert!(matches!(bad_args, AgentError::ToolInvocation { ref name, .. } if name == "second"));

        let failed = registry.call(&ctx, "a_first", "{}").await.unwrap_err();
        assert!(failed.to_string().contains("always fails"));
    }
}
