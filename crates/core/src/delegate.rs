//! Single-level sub-agent delegation: the `delegate_task` tool callback that
//! spawns a short child turn under a distinct workspace/skill/tool scope and
//! returns its final reply.
//!
//! Delegation is intentionally one level deep — a delegated turn is built
//! without its own `delegate_task` wired in, so a sub-agent cannot delegate
//! further.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use sa_domain::config::AgentConfig;
use sa_domain::error::{Error, Result};
use sa_skills::SkillRegistry;
use sa_tools::context::{ExecutionContext, TaskDelegate};
use sa_tools::ToolRegistry;

use crate::agent_loop::{AgentEvent, AgentLoop, AgentLoopDeps, TurnInput};
use crate::cancel::CancelMap;
use crate::system_prompt::{build_system_prompt, BootstrapTracker};
use crate::workspace::WorkspaceReader;
use sa_domain::config::ContextConfig;
use sa_providers::ProviderRegistry;

/// A configured sub-agent's scoped resources, built once at startup.
pub struct SubAgentScope {
    pub config: AgentConfig,
    pub workspace: Arc<WorkspaceReader>,
    pub skills: Option<Arc<SkillRegistry>>,
    pub bootstrap: Arc<BootstrapTracker>,
}

/// Implements [`TaskDelegate`] for the top-level Agent Loop's
/// `execution_context`: each call spawns an independent child turn,
/// registers it in the parent's cancel group, and drains it to a single
/// reply string.
pub struct SubAgentDelegate {
    pub agents: HashMap<String, SubAgentScope>,
    pub context_config: ContextConfig,
    pub providers: Arc<ProviderRegistry>,
    pub tool_registry: Arc<ToolRegistry>,
    pub agent_loop_deps: Arc<AgentLoopDeps>,
    pub cancel_map: Arc<CancelMap>,
    pub parent_session_key: String,
    /// Executor-role provider to fall back to when a sub-agent has no
    /// model override of its own.
    pub default_model: Option<String>,
}

#[async_trait]
impl TaskDelegate for SubAgentDelegate {
    async fn delegate_task(&self, task: &str, agent_name: Option<&str>) -> Result<String> {
        let agent_id = agent_name.unwrap_or("default");
        let scope = self
            .agents
            .get(agent_id)
            .ok_or_else(|| Error::Other(format!("sub-agent '{agent_id}' not configured")))?;

        let provider_id = scope
            .config
            .models
            .get("executor")
            .or(self.default_model.as_ref())
            .and_then(|spec| spec.split('/').next())
            .and_then(|id| self.providers.get(id))
            .or_else(|| self.providers.for_role("executor"));

        let Some(provider) = provider_id else {
            return Err(Error::Other("no executor provider available for delegation".into()));
        };
        let model = scope.config.models.get("executor").and_then(|spec| spec.split_once('/')).map(|(_, m)| m.to_string());

        let child_id = Uuid::new_v4().to_string();
        let child_session_key = format!("agent:{agent_id}:task:{child_id}");
        self.cancel_map.add_to_group(&self.parent_session_key, &child_session_key);

        let system_prompt = build_system_prompt(
            &self.context_config,
            &scope.workspace,
            scope.skills.as_ref(),
            &scope.bootstrap,
        );

        let execution_context = ExecutionContext {
            work_dir: scope.workspace.root().to_path_buf(),
            original_user_text: Some(task.to_string()),
            skill_registry: scope.skills.clone(),
            ..ExecutionContext::new(scope.workspace.root().to_path_buf())
        };

        let input = TurnInput {
            conversation_id: child_id.clone(),
            session_key: child_session_key.clone(),
            user_message: task.to_string(),
            provider,
            model,
            json_mode: false,
            system_prompt,
            tool_policy: scope.config.tool_policy.clone(),
            skill_registry: scope.skills.clone(),
            pre_selected_skill_id: None,
            execution_context,
            max_iterations_override: Some(8),
            image_blocks: Vec::new(),
        };

        let agent_loop = AgentLoop::new(self.agent_loop_deps.clone());
        let (_trace_id, mut rx) = agent_loop.run_stream(input);

        let mut result = String::new();
        let mut errored = false;
        while let Some(event) = rx.recv().await {
            match event {
                AgentEvent::ResponseComplete { content } => result = content,
                AgentEvent::Error { message } => {
                    result = message;
                    errored = true;
                }
                _ => {}
            }
        }

        self.cancel_map.remove_from_group(&self.parent_session_key, &child_session_key);

        if errored {
            Err(Error::Other(result))
        } else {
            Ok(result)
        }
    }
}
