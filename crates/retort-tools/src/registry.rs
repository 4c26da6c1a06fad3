use std::collections::HashMap;
use std::sync::Arc;

use retort_core::config::ToolsConfig;
use retort_core::error::{Result, RetortError};
use retort_core::traits::Tool;

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool names.
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Name and description of every tool, for building prompts.
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.tools
            .values()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect()
    }

    /// Invoke a tool by name, enforcing its timeout.
    ///
    /// Tools themselves never fail across this boundary; the only errors here
    /// are an unknown tool name or the timeout firing.
    pub async fn invoke(&self, name: &str, input: &str) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| RetortError::ToolNotFound(name.to_string()))?;

        let timeout = std::time::Duration::from_secs(tool.timeout_secs());

        match tokio::time::timeout(timeout, tool.invoke(input)).await {
            Ok(output) => Ok(output),
            Err(_) => Err(RetortError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        }
    }

    /// Create a registry with the chemistry research tools registered.
    pub fn with_chemistry_tools(config: &ToolsConfig) -> Self {
        let mut registry = Self::new();
        registry.register(crate::pubchem::PubChemTool::new());
        registry.register(crate::arxiv::ArxivTool::new());
        if let Some(api_key) = &config.core_api_key {
            registry.register(crate::core_search::CoreSearchTool::new(api_key));
        }
        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;

    struct SlowTool;

    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps longer than its own timeout"
        }

        fn invoke(&self, _input: &str) -> BoxFuture<'_, String> {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                "done".to_string()
            })
        }

        fn timeout_secs(&self) -> u64 {
            1
        }
    }

    struct EchoTool;

    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "echoes its input"
        }

        fn invoke(&self, input: &str) -> BoxFuture<'_, String> {
            let input = input.to_string();
            Box::pin(async move { input })
        }
    }

    #[tokio::test]
    async fn invoke_runs_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let out = registry.invoke("echo", "benzene").await.unwrap();
        assert_eq!(out, "benzene");
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("nope", "x").await.unwrap_err();
        assert!(matches!(err, RetortError::ToolNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_for_slow_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let err = registry.invoke("slow", "x").await.unwrap_err();
        assert!(matches!(
            err,
            RetortError::ToolTimeout {
                timeout_secs: 1,
                ..
            }
        ));
    }
}
