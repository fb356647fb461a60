//! Tool implementations for StepVault.
//!
//! The catalog always carries the reserved human-assistance tool. Web search
//! and config-declared HTTP endpoints are added when configured; tools whose
//! schema the reasoning backend cannot accept are skipped with a warning.

pub mod http_api;
pub mod human_assistance;
pub mod schema;
pub mod web_search;

pub use http_api::HttpApiTool;
pub use human_assistance::HumanAssistanceTool;
pub use schema::is_flat_schema;
pub use web_search::WebSearchTool;

use stepvault_config::ToolsConfig;
use stepvault_core::tool::{Tool, ToolRegistry};
use tracing::{info, warn};

/// Register `tool` unless its schema is incompatible.
pub fn register_checked(registry: &mut ToolRegistry, tool: Box<dyn Tool>) -> bool {
    if !is_flat_schema(&tool.parameters_schema()) {
        warn!(tool = tool.name(), "Skipping tool with incompatible schema");
        return false;
    }
    registry.register(tool);
    true
}

/// Build the tool registry from configuration.
pub fn build_registry(config: &ToolsConfig, human_tool_name: &str) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(HumanAssistanceTool::new(human_tool_name)));

    if config.web_search {
        match &config.tavily_api_key {
            Some(key) => {
                register_checked(
                    &mut registry,
                    Box::new(WebSearchTool::new(key, config.web_search_max_results)),
                );
            }
            None => warn!("web_search enabled but no Tavily API key configured; skipping"),
        }
    }

    for http in &config.http {
        if http.name == human_tool_name {
            warn!(tool = %http.name, "HTTP tool shadows the human assistance tool; skipping");
            continue;
        }
        match HttpApiTool::from_config(http) {
            Ok(tool) => {
                register_checked(&mut registry, Box::new(tool));
            }
            Err(e) => warn!(tool = %http.name, error = %e, "Skipping HTTP tool"),
        }
    }

    info!(tools = ?registry.names(), "Tool registry ready");
    registry
}
