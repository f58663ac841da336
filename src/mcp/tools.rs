//! MCP tool implementations
//!
//! A single tool is exposed: `focal_rules`, which returns the current rules
//! bundle as plain text. Clients are told in `initialize` to call it before
//! every response.

use crate::error::{FocalError, Result};
use crate::rules::RulesAggregator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Name of the rules tool
pub const FOCAL_RULES_TOOL: &str = "focal_rules";

/// Tool schema definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Tool name
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: Value,
}

/// Tool handler that dispatches to appropriate implementation
#[derive(Debug, Clone)]
pub struct ToolHandler {
    rules: RulesAggregator,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(rules: RulesAggregator) -> Self {
        Self { rules }
    }

    /// Get list of all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![Tool {
            name: FOCAL_RULES_TOOL.to_string(),
            description: "Fetch the latest FOCAL rules. Must be called before responding to the user."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }]
    }

    /// Execute a tool by name, returning its text output
    ///
    /// Arguments are accepted and ignored; the rules tool takes none.
    pub fn execute(&self, name: &str, _arguments: Value) -> Result<String> {
        match name {
            FOCAL_RULES_TOOL => {
                debug!("Executing {}", FOCAL_RULES_TOOL);
                Ok(self.rules.build_bundle()?.render())
            }
            other => Err(FocalError::MethodNotFound(format!("tool {}", other))),
        }
    }
}
