//! `ToolRegistry` (spec §6): name → `Tool` lookup, JSON-schema catalog for
//! the model, and dispatch with the `use_skill` reroute.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sa_domain::error::{Error, Result};
use sa_domain::tool::ToolDefinition;

use crate::context::ExecutionContext;
use crate::tool::{Tool, ToolOutcome};

pub const USE_SKILL_TOOL_NAME: &str = "use_skill";

pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.write().insert(tool.name().to_string(), tool);
    }

    pub fn unregister(&self, name: &str) {
        self.tools.write().remove(name);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.read().values().cloned().collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.read().values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Run `name` with `input`. If `name` isn't registered but matches a
    /// known skill id, reroute to the `use_skill` tool with the skill id
    /// folded into its input (spec §4.D: a model that "calls" a skill by
    /// name behaves the same as calling `use_skill`).
    ///
    /// Returns `Err` only when dispatch itself is impossible (no such tool
    /// and no matching skill, or no `use_skill` tool registered to reroute
    /// to) — every failure inside a tool's own execution surfaces as
    /// `ToolOutcome { is_error: true, .. }` instead.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        context: &ExecutionContext,
    ) -> Result<ToolOutcome> {
        if let Some(tool) = self.get(name) {
            return Ok(tool.execute(input, context).await.unwrap_or_else(|e| {
                ToolOutcome::error(format!("tool '{name}' failed: {e}"))
            }));
        }

        let known_skill = context
            .skill_registry
            .as_ref()
            .and_then(|reg| reg.get(name))
            .is_some();

        if known_skill {
            if let Some(use_skill) = self.get(USE_SKILL_TOOL_NAME) {
                let rerouted = serde_json::json!({ "skill_id": name, "input": input });
                return Ok(use_skill.execute(rerouted, context).await.unwrap_or_else(|e| {
                    ToolOutcome::error(format!("use_skill reroute for '{name}' failed: {e}"))
                }));
            }
        }

        Err(Error::Other(format!("unknown tool: {name}")))
    }
}
