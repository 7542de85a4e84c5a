//! Adapter between the tool registry and MCP protocol

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::protocol::{McpTool, ToolCallResult};
use crate::tools::ToolRegistry;

/// Exposes a [`ToolRegistry`] in MCP tool format
pub struct McpToolAdapter {
    registry: Arc<ToolRegistry>,
}

impl McpToolAdapter {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn list_tools(&self) -> Vec<McpTool> {
        self.registry
            .list_tools()
            .into_iter()
            .map(|t| McpTool {
                name: t.name,
                description: t.description,
                input_schema: t.input_schema,
            })
            .collect()
    }

    /// Execute a tool; failures become results flagged `isError`
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ToolCallResult {
        debug!("MCP calling tool: {}", name);
        match self.registry.execute(name, arguments).await {
            Ok(text) => ToolCallResult::text(text),
            Err(e) => ToolCallResult::error(format!("Error: {:#}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::register_all;
    use crate::tools::stub::stub_service;

    #[test]
    fn test_empty_registry() {
        let adapter = McpToolAdapter::new(Arc::new(ToolRegistry::new()));
        assert!(adapter.list_tools().is_empty());
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let adapter = McpToolAdapter::new(Arc::new(ToolRegistry::new()));
        let result = adapter.call_tool("nonexistent", serde_json::json!({})).await;
        assert_eq!(result.is_error, Some(true));
        assert!(result.content[0].text.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_tool_failure_is_error_result() {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry, stub_service());
        let adapter = McpToolAdapter::new(Arc::new(registry));
        let result = adapter
            .call_tool("add_to_playlist", serde_json::json!({"track_name": "Hey Jude"}))
            .await;
        assert_eq!(result.is_error, Some(true));
        assert!(result.content[0].text.contains("playlist_id or playlist_name"));
    }
}
