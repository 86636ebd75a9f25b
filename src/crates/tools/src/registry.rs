//! Tool Registry: a generic home for read-only tools the LLM can invoke
//! mid-response. Only one registrant exists today (`graph_query`), but
//! the registry itself is built generically so the registration/dispatch
//! machinery has one definition regardless of how many tools join it.

use crate::error::{Result, ToolError};
use async_trait::async_trait;
use graph_core::GraphStore;
use serde_json::Value;
use std::collections::HashMap;

/// A read-only tool the LLM Engine's tool-use loop can execute. Execution
/// is synchronous relative to the engine's loop and must never mutate the
/// graph.
#[async_trait]
pub trait GraphTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, store: &GraphStore, params: Value) -> Result<Value>;
}

/// What the LLM provider transport needs to advertise a tool in its
/// tool-use request.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn GraphTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: Box<dyn GraphTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn GraphTool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters_schema: t.parameters_schema(),
            })
            .collect()
    }

    /// Execute a registered tool by name. Callers (the LLM Engine) convert
    /// an error into an `is_error` tool_result rather than aborting the
    /// turn.
    pub async fn execute(&self, name: &str, store: &GraphStore, params: Value) -> Result<Value> {
        let tool = self.get(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(store, params).await
    }
}
