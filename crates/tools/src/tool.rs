//! The `Tool` trait (spec §6): a uniform shape every callable — built-in or
//! skill-provided — implements so the agent loop can dispatch by name
//! without knowing the concrete implementation.

use async_trait::async_trait;
use sa_domain::tool::ToolDefinition;

use crate::context::ExecutionContext;

/// Coarse grouping surfaced to the LLM / dashboard, not enforced at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    FileSystem,
    Process,
    Skill,
    Other,
}

/// What a tool invocation produced. Runtime failures (bad args, a command
/// that exited non-zero, a file that doesn't exist) are reported as
/// `is_error: true` here — they never become a `Result::Err` from
/// `ToolRegistry::execute`, which is reserved for dispatch failures (unknown
/// tool name with no matching skill).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolOutcome {
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    /// Set when the tool itself knows the turn is finished (e.g. a
    /// `respond_to_user`-style terminal tool) so the agent loop can
    /// short-circuit the remaining iteration budget instead of asking the
    /// model again.
    #[serde(default)]
    pub auto_complete: bool,
}

impl ToolOutcome {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            metadata: serde_json::Value::Null,
            auto_complete: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            metadata: serde_json::Value::Null,
            auto_complete: false,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn category(&self) -> ToolCategory {
        ToolCategory::Other
    }
    /// JSON Schema describing the tool's input.
    fn parameters(&self) -> serde_json::Value;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }

    /// Run the tool. Any failure that is meaningful to report back to the
    /// model (bad input, a failing subprocess, a missing file) must be
    /// encoded as `ToolOutcome::error(..)`, not as an `Err` — this method
    /// should essentially never return `Err` except for truly unexpected
    /// internal failures.
    async fn execute(
        &self,
        input: serde_json::Value,
        context: &ExecutionContext,
    ) -> sa_domain::error::Result<ToolOutcome>;
}
