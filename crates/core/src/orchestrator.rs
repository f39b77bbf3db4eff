//! The Orchestrator: resolves a session, picks a provider for the turn,
//! hands off to the Agent Loop, and runs the post-turn housekeeping
//! (session bookkeeping, background memory extraction) once the loop
//! finishes (spec §4.I).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use parking_lot::RwLock;

use sa_domain::capability::ModelRole;
use sa_domain::config::{AgentConfig, Config, ToolPolicy};
use sa_domain::error::{Error, Result};
use sa_domain::memory::{MemoryEntry, MemoryType};
use sa_memory::extractor::{run_extraction, should_extract, ExtractionModel};
use sa_memory::{MemoryStore, Session};
use sa_planner::{Planner, PlanningModel, StepExecutor};
use sa_providers::traits::{ChatRequest, LlmProvider};
use sa_providers::ProviderRegistry;
use sa_scheduler::Scheduler;
use sa_skills::SkillRegistry;
use sa_tools::context::{ExecutionContext, MemorySaver};
use sa_tools::ToolRegistry;

use crate::agent_loop::{AgentEvent, AgentLoop, AgentLoopDeps, TurnInput};
use crate::cancel::CancelMap;
use crate::delegate::{SubAgentDelegate, SubAgentScope};
use crate::system_prompt::{build_system_prompt, BootstrapTracker};
use crate::workspace::WorkspaceReader;

fn role_key(role: ModelRole) -> &'static str {
    match role {
        ModelRole::Planner => "planner",
        ModelRole::Executor => "executor",
        ModelRole::Summarizer => "summarizer",
        ModelRole::Embedder => "embedder",
        ModelRole::Vision => "vision",
        ModelRole::Fast => "fast",
    }
}

/// Spec §4.I step 3: short text with no URLs/paths/code markers is "simple
/// chat" and can be routed to the fast role instead of the executor.
fn is_simple_chat(text: &str) -> bool {
    const MAX_LEN: usize = 200;
    text.len() <= MAX_LEN
        && !text.contains("http://")
        && !text.contains("https://")
        && !text.contains('`')
        && !text.contains('/')
        && !text.contains('\\')
        && !text.contains('\n')
}

/// Adapts an [`LlmProvider`] to the small completion surfaces `sa-memory`
/// and `sa-planner` expect, so those crates stay decoupled from
/// `sa-providers`.
pub(crate) struct ProviderCompleter {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
}

impl ProviderCompleter {
    pub(crate) fn new(provider: Arc<dyn LlmProvider>, model: Option<String>) -> Self {
        Self { provider, model }
    }
}

#[async_trait::async_trait]
impl ExtractionModel for ProviderCompleter {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        let req = ChatRequest {
            messages: vec![
                sa_domain::tool::Message::system(system_prompt),
                sa_domain::tool::Message::user(user_prompt),
            ],
            tools: vec![],
            temperature: Some(0.0),
            max_tokens: None,
            json_mode: true,
            model: self.model.clone(),
        };
        let resp = self.provider.chat(req).await?;
        Ok(resp.content)
    }
}

#[async_trait::async_trait]
impl PlanningModel for ProviderCompleter {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        ExtractionModel::complete(self, system_prompt, user_prompt).await
    }
}

/// Saves a memory through the orchestrator's store, deduping via
/// `find_similar` (spec §4.I step 2's orchestrator-owned `saveMemory`).
struct MemorySaverImpl {
    memory: Arc<MemoryStore>,
}

#[async_trait::async_trait]
impl MemorySaver for MemorySaverImpl {
    async fn save_memory(&self, content: &str, importance: f32) -> Result<()> {
        let memory_type = MemoryType::Fact;

        if let Some(existing) = self.memory.find_similar(content, memory_type, 0.75) {
            if importance > existing.importance {
                self.memory.update(&existing.id, None, Some(importance))?;
            }
            return Ok(());
        }

        let embedding = self
            .memory
            .embedder()
            .map(|e| e.embed(std::slice::from_ref(&content.to_owned())).into_iter().next().unwrap_or_default());
        let now = chrono::Utc::now();
        self.memory.add(MemoryEntry {
            id: String::new(),
            memory_type,
            content: content.to_string(),
            importance,
            embedding,
            created_at: now,
            accessed_at: now,
            access_count: 0,
            source_turn_id: None,
        })?;
        Ok(())
    }
}

/// Runs one plan step as an ordinary turn through [`Orchestrator::process_input`],
/// under a synthetic `plan:<conversation_id>` session (spec §4.G `executeNext`).
/// Holds a [`Weak`] reference so the planner (owned by the Orchestrator) doesn't
/// create an ownership cycle with it.
pub(crate) struct OrchestratorStepExecutor {
    orchestrator: std::sync::Weak<Orchestrator>,
}

impl OrchestratorStepExecutor {
    pub(crate) fn new(orchestrator: std::sync::Weak<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait::async_trait]
impl StepExecutor for OrchestratorStepExecutor {
    async fn run_step(&self, conversation_id: &str, prompt: String) -> std::result::Result<String, String> {
        let orchestrator = self
            .orchestrator
            .upgrade()
            .ok_or_else(|| "orchestrator no longer running".to_string())?;

        let session_id = format!("plan:{conversation_id}");
        let mut rx = orchestrator.process_input(&session_id, prompt, None, Vec::new());

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

        if errored {
            Err(result)
        } else {
            Ok(result)
        }
    }
}

/// Everything the Orchestrator needs, grouped by concern the way the
/// teacher's own application state struct groups its fields.
pub struct Orchestrator {
    // Config / identity.
    config: Config,

    // Core services.
    memory: Arc<MemoryStore>,
    providers: Arc<ProviderRegistry>,
    tool_registry: Arc<ToolRegistry>,
    cancel_map: Arc<CancelMap>,

    // Top-level workspace / skills / bootstrap.
    workspace: Arc<WorkspaceReader>,
    skill_registry: Option<Arc<SkillRegistry>>,
    bootstrap: Arc<BootstrapTracker>,

    // Sub-agents, keyed by agent id, for delegation.
    sub_agents: HashMap<String, SubAgentScope>,

    // Runtime.
    agent_loop: Arc<AgentLoop>,
    agent_loop_deps: Arc<AgentLoopDeps>,

    // Background services.
    scheduler: Option<Arc<Scheduler>>,
    /// Set once, after construction, via [`Self::set_planner`] — the
    /// planner's `StepExecutor` closes over a `Weak<Orchestrator>`, so it
    /// can only be built once this `Orchestrator` already lives in an `Arc`.
    planner: RwLock<Option<Arc<Planner>>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        memory: Arc<MemoryStore>,
        providers: Arc<ProviderRegistry>,
        tool_registry: Arc<ToolRegistry>,
        agent_loop_deps: Arc<AgentLoopDeps>,
        cancel_map: Arc<CancelMap>,
        workspace: Arc<WorkspaceReader>,
        skill_registry: Option<Arc<SkillRegistry>>,
        bootstrap: Arc<BootstrapTracker>,
        sub_agents: HashMap<String, SubAgentScope>,
        scheduler: Option<Arc<Scheduler>>,
    ) -> Self {
        let agent_loop = Arc::new(AgentLoop::new(agent_loop_deps.clone()));
        Self {
            config,
            memory,
            providers,
            tool_registry,
            cancel_map,
            workspace,
            skill_registry,
            bootstrap,
            sub_agents,
            agent_loop,
            agent_loop_deps,
            scheduler,
            planner: RwLock::new(None),
        }
    }

    /// Wires the planner in once it's built (see the `planner` field's
    /// doc comment for why this can't happen inside `new`).
    pub fn set_planner(&self, planner: Arc<Planner>) {
        *self.planner.write() = Some(planner);
    }

    /// Resolve the provider + model for a role: explicit override, then the
    /// per-agent model map, then the global role default, then any
    /// available provider (spec §4.I step 3).
    fn resolve_provider(
        &self,
        role: ModelRole,
        model_override: Option<&str>,
        agent_models: Option<&HashMap<String, String>>,
    ) -> Result<(Arc<dyn LlmProvider>, Option<String>)> {
        if let Some(spec) = model_override {
            let provider_id = spec.split('/').next().unwrap_or(spec);
            if let Some(p) = self.providers.get(provider_id) {
                let model = spec.split_once('/').map(|(_, m)| m.to_string());
                return Ok((p, model));
            }
        }

        if let Some(spec) = agent_models.and_then(|m| m.get(role_key(role))) {
            let provider_id = spec.split('/').next().unwrap_or(spec);
            if let Some(p) = self.providers.get(provider_id) {
                let model = spec.split_once('/').map(|(_, m)| m.to_string());
                return Ok((p, model));
            }
        }

        if let Some(p) = self.providers.for_role(role_key(role)) {
            let model = self.providers.model_for_role(role_key(role)).map(|s| s.to_string());
            return Ok((p, model));
        }

        self.providers
            .iter()
            .next()
            .map(|(_, p)| (p.clone(), None))
            .ok_or_else(|| Error::Other("no LLM provider configured".into()))
    }

    /// Process one user turn end-to-end: resolve/create the session, pick a
    /// provider, build the system prompt, run the Agent Loop, then fire
    /// post-turn housekeeping once it completes.
    pub fn process_input(
        self: &Arc<Self>,
        session_id: &str,
        user_message: String,
        model_override: Option<String>,
        images: Vec<sa_domain::tool::ContentPart>,
    ) -> mpsc::Receiver<AgentEvent> {
        let (out_tx, out_rx) = mpsc::channel(128);
        let this = self.clone();
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            let session = this.resolve_session(&session_id, &user_message);
            let conversation_id = session.conversation_id.clone();
            let session_key = format!("session:{}", session.id);

            // Spec §4.I step 3: vision if the turn carries image blocks and a
            // vision provider is configured; else fast for simple chat; else
            // the default executor role.
            let role = if !images.is_empty() && this.providers.for_role(role_key(ModelRole::Vision)).is_some() {
                ModelRole::Vision
            } else if is_simple_chat(&user_message) && this.providers.for_role(role_key(ModelRole::Fast)).is_some() {
                ModelRole::Fast
            } else {
                ModelRole::Executor
            };

            let (provider, model) = match this.resolve_provider(role, model_override.as_deref(), None) {
                Ok(pair) => pair,
                Err(e) => {
                    let _ = out_tx.send(AgentEvent::Error { message: e.to_string() }).await;
                    return;
                }
            };

            let system_prompt = build_system_prompt(
                &this.config.context,
                &this.workspace,
                this.skill_registry.as_ref(),
                &this.bootstrap,
            );

            let execution_context = this.build_execution_context(&session_key, &user_message);

            let input = TurnInput {
                conversation_id: conversation_id.clone(),
                session_key: session_key.clone(),
                user_message,
                provider,
                model,
                json_mode: false,
                system_prompt,
                tool_policy: ToolPolicy::default(),
                skill_registry: this.skill_registry.clone(),
                pre_selected_skill_id: None,
                execution_context,
                max_iterations_override: None,
                image_blocks: images,
            };

            let (_trace_id, mut rx) = this.agent_loop.run_stream(input);
            while let Some(event) = rx.recv().await {
                if out_tx.send(event).await.is_err() {
                    this.cancel_map.cancel(&session_key);
                    return;
                }
            }

            this.after_turn(&conversation_id);
        });

        out_rx
    }

    fn resolve_session(&self, session_id: &str, user_message: &str) -> Session {
        if let Some(existing) = self.memory.get_session_by_id(session_id) {
            return existing;
        }

        let now = chrono::Utc::now();
        let session = Session {
            id: session_id.to_string(),
            conversation_id: Uuid::new_v4().to_string(),
            created_at: now,
            last_active_at: now,
            title: Some(Session::derive_title(user_message)),
        };
        if let Err(e) = self.memory.save_session(session.clone()) {
            tracing::warn!(error = %e, "failed to persist new session");
        }
        session
    }

    fn build_execution_context(self: &Arc<Self>, session_key: &str, user_message: &str) -> ExecutionContext {
        let delegate = SubAgentDelegate {
            agents: self
                .sub_agents
                .iter()
                .map(|(id, scope)| {
                    (
                        id.clone(),
                        SubAgentScope {
                            config: scope.config.clone(),
                            workspace: scope.workspace.clone(),
                            skills: scope.skills.clone(),
                            bootstrap: scope.bootstrap.clone(),
                        },
                    )
                })
                .collect(),
            context_config: self.config.context.clone(),
            providers: self.providers.clone(),
            tool_registry: self.tool_registry.clone(),
            agent_loop_deps: self.agent_loop_deps.clone(),
            cancel_map: self.cancel_map.clone(),
            parent_session_key: session_key.to_string(),
            default_model: self.providers.model_for_role("executor").map(|s| s.to_string()),
        };

        ExecutionContext {
            work_dir: self.workspace.root().to_path_buf(),
            original_user_text: Some(user_message.to_string()),
            skill_registry: self.skill_registry.clone(),
            scheduler: self.scheduler.clone(),
            delegate_task: if self.sub_agents.is_empty() {
                None
            } else {
                Some(Arc::new(delegate))
            },
            planner: self.planner.read().clone(),
            save_memory: Some(Arc::new(MemorySaverImpl { memory: self.memory.clone() })),
            ..ExecutionContext::new(self.workspace.root().to_path_buf())
        }
    }

    /// Post-turn housekeeping: conditionally runs the memory extractor in
    /// the background. Never blocks the response already streamed to the
    /// caller.
    fn after_turn(self: &Arc<Self>, conversation_id: &str) {
        let turn_count = self.memory.get_history(conversation_id, None).len() as u64;
        if !should_extract(turn_count, self.config.memory.extraction_interval_turns) {
            return;
        }

        let Some(provider) = self.providers.for_role("summarizer").or_else(|| self.providers.for_role("executor")) else {
            return;
        };
        let model = self
            .providers
            .model_for_role("summarizer")
            .or_else(|| self.providers.model_for_role("executor"))
            .map(|s| s.to_string());

        let memory = self.memory.clone();
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            let model_completer = ProviderCompleter { provider, model };
            run_extraction(&memory, &model_completer, &conversation_id).await;
        });
    }

    /// Cancel a running turn for a session (spec §4.I `stopSession`).
    pub fn stop_session(&self, session_id: &str) -> bool {
        self.cancel_map.cancel(&format!("session:{session_id}"))
    }

    /// Stop a session's turn and invalidate its cached dynamic context
    /// (spec §4.I `closeSession`).
    pub fn close_session(&self, session_id: &str) {
        let session_key = format!("session:{session_id}");
        self.cancel_map.cancel(&session_key);
        if let Some(session) = self.memory.get_session_by_id(session_id) {
            self.agent_loop_deps.context_manager.invalidate(&session.conversation_id);
        }
    }

    pub fn agent_configs(&self) -> HashMap<String, AgentConfig> {
        self.sub_agents.iter().map(|(id, scope)| (id.clone(), scope.config.clone())).collect()
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.workspace.root().to_path_buf()
    }
}

/// Drives a scheduled task's `action` text through [`Orchestrator::process_input`]
/// as an ordinary turn under a synthetic `schedule:<task_id>` session, logging
/// the final reply instead of streaming it anywhere (spec §4.I: fired tasks
/// run unattended).
pub struct ScheduleDispatcher {
    orchestrator: std::sync::Weak<Orchestrator>,
}

impl ScheduleDispatcher {
    pub fn new(orchestrator: std::sync::Weak<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait::async_trait]
impl sa_scheduler::TaskFireHandler for ScheduleDispatcher {
    async fn on_fire(&self, task: sa_domain::schedule::ScheduledTask) {
        let Some(orchestrator) = self.orchestrator.upgrade() else {
            return;
        };

        let session_id = format!("schedule:{}", task.id);
        let mut rx = orchestrator.process_input(&session_id, task.action.clone(), None, Vec::new());

        let mut reply = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                AgentEvent::ResponseComplete { content } => reply = content,
                AgentEvent::Error { message } => {
                    tracing::warn!(task_id = %task.id, error = %message, "scheduled task turn failed");
                    return;
                }
                _ => {}
            }
        }
        tracing::info!(task_id = %task.id, response_chars = reply.len(), "scheduled task completed");
    }
}
