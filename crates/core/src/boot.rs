//! Boot sequence: wires every service the Orchestrator needs from a loaded
//! [`Config`], grounded on the teacher's `build_app_state` but trimmed of
//! everything HTTP/dashboard/multi-node specific — sa-core has no server.

use std::collections::HashMap;
use std::sync::Arc;

use sa_contextpack::context_manager::Summarizer;
use sa_contextpack::ContextManager;
use sa_domain::config::Config;
use sa_memory::{BagOfWordsEmbedder, MemoryStore};
use sa_providers::traits::{ChatRequest, LlmProvider};
use sa_providers::ProviderRegistry;
use sa_scheduler::Scheduler;
use sa_skills::SkillRegistry;
use sa_tools::{register_builtins, ProcessManager, ToolRegistry};

use sa_planner::Planner;

use crate::cancel::CancelMap;
use crate::delegate::SubAgentScope;
use crate::orchestrator::{Orchestrator, OrchestratorStepExecutor, ProviderCompleter, ScheduleDispatcher};
use crate::system_prompt::{resolve_agent_paths, BootstrapTracker};
use crate::workspace::WorkspaceReader;
use crate::agent_loop::AgentLoopDeps;

struct ProviderSummarizer {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
}

#[async_trait::async_trait]
impl Summarizer for ProviderSummarizer {
    async fn summarize(&self, transcript: &str) -> anyhow::Result<String> {
        let req = ChatRequest {
            messages: vec![
                sa_domain::tool::Message::system(
                    "Summarize the following conversation excerpt in a few sentences, \
                     preserving names, decisions, and open questions.",
                ),
                sa_domain::tool::Message::user(transcript),
            ],
            tools: vec![],
            temperature: Some(0.0),
            max_tokens: None,
            json_mode: false,
            model: self.model.clone(),
        };
        let resp = self.provider.chat(req).await?;
        Ok(resp.content)
    }
}

/// Boots every service and returns the ready-to-use [`Orchestrator`].
pub async fn build_orchestrator(config: Config) -> anyhow::Result<Arc<Orchestrator>> {
    tracing::info!("sa-core starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            sa_domain::config::ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            sa_domain::config::ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == sa_domain::config::ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == sa_domain::config::ConfigSeverity::Error).count()
        );
    }

    let workspace = Arc::new(WorkspaceReader::new(config.workspace.path.clone()));
    let bootstrap = Arc::new(BootstrapTracker::new(config.workspace.state_path.clone())?);

    let skill_registry = match SkillRegistry::load(
        &config.skills.path,
        &config.skills.settings_path,
        config.skills.match_embedding_threshold,
        config.skills.match_token_overlap_threshold,
    ) {
        Ok(registry) => Some(Arc::new(registry)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to load skill registry, continuing without skills");
            None
        }
    };

    let embedder = Arc::new(BagOfWordsEmbedder::new(4096));
    let memory = Arc::new(MemoryStore::open(config.memory.clone(), Some(embedder))?);

    let providers = Arc::new(ProviderRegistry::from_config(&config.llm)?);

    let process_manager = Arc::new(ProcessManager::new(config.tools.exec.clone()));
    let tool_registry = Arc::new(ToolRegistry::new());
    register_builtins(&tool_registry, process_manager);

    let summarizer: Option<Arc<dyn Summarizer>> = providers.for_role("summarizer").or_else(|| providers.for_role("executor")).map(|provider| {
        let model = providers.model_for_role("summarizer").or_else(|| providers.model_for_role("executor")).map(|s| s.to_string());
        Arc::new(ProviderSummarizer { provider, model }) as Arc<dyn Summarizer>
    });
    let context_manager = Arc::new(ContextManager::new(memory.clone(), skill_registry.clone(), summarizer));

    let cancel_map = Arc::new(CancelMap::new());

    let agent_loop_deps = Arc::new(AgentLoopDeps {
        memory: memory.clone(),
        context_manager: context_manager.clone(),
        tool_registry: tool_registry.clone(),
        cancel_map: cancel_map.clone(),
        config: config.agent_loop.clone(),
    });

    let mut sub_agents = HashMap::new();
    for (id, agent_cfg) in &config.agents {
        let ws_path = resolve_agent_paths(agent_cfg.workspace_path.as_deref(), &config.workspace.path);
        let skills_path = resolve_agent_paths(agent_cfg.skills_path.as_deref(), &config.skills.path);
        let agent_workspace = Arc::new(WorkspaceReader::new(ws_path));
        let agent_skills = match SkillRegistry::load(
            &skills_path,
            &config.skills.settings_path,
            config.skills.match_embedding_threshold,
            config.skills.match_token_overlap_threshold,
        ) {
            Ok(r) => Some(Arc::new(r)),
            Err(e) => {
                tracing::warn!(agent_id = %id, error = %e, "failed to load sub-agent skills");
                None
            }
        };
        let agent_bootstrap = Arc::new(BootstrapTracker::new(
            config.workspace.state_path.join("agents").join(id),
        )?);

        sub_agents.insert(
            id.clone(),
            SubAgentScope {
                config: agent_cfg.clone(),
                workspace: agent_workspace,
                skills: agent_skills,
                bootstrap: agent_bootstrap,
            },
        );
    }

    let scheduler = Some(Scheduler::new(config.scheduler.clone(), &config.workspace.state_path)?);

    let planner_config = config.planner.clone();
    let planner_state_dir = config.workspace.state_path.join("planner");
    let planner_provider = providers.for_role("planner").or_else(|| providers.for_role("executor"));
    let planner_model = providers.model_for_role("planner").or_else(|| providers.model_for_role("executor")).map(|s| s.to_string());

    let orchestrator = Arc::new(Orchestrator::new(
        config,
        memory,
        providers,
        tool_registry,
        agent_loop_deps,
        cancel_map,
        workspace,
        skill_registry,
        bootstrap,
        sub_agents,
        scheduler.clone(),
    ));

    if let Some(scheduler) = &scheduler {
        scheduler.set_on_task_fire(Arc::new(ScheduleDispatcher::new(Arc::downgrade(&orchestrator))));
        scheduler.spawn();
    }

    if let Some(provider) = planner_provider {
        let completer = Arc::new(ProviderCompleter::new(provider, planner_model));
        let executor = Arc::new(OrchestratorStepExecutor::new(Arc::downgrade(&orchestrator)));
        match Planner::open(planner_config, &planner_state_dir, completer, executor) {
            Ok(planner) => orchestrator.set_planner(Arc::new(planner)),
            Err(e) => tracing::warn!(error = %e, "failed to open planner store, continuing without planning"),
        }
    } else {
        tracing::warn!("no planner/executor model configured, continuing without planning");
    }

    Ok(orchestrator)
}
