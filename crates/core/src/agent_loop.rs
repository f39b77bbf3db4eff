//! The Agent Loop: runs one user turn to completion, streaming
//! [`AgentEvent`]s while it calls the model, dispatches tool calls
//! sequentially, and persists the resulting conversation turns.
//!
//! Tool calls within one iteration are dispatched **sequentially** — unlike
//! a naive concurrent fan-out, this keeps resource usage predictable and
//! keeps per-tool failure counters coherent, since a failing tool can
//! influence whether the next tool call in the same iteration even runs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use futures_util::StreamExt;
use parking_lot::RwLock as SyncRwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use sa_contextpack::{BuildContextParams, ContextManager};
use sa_domain::config::{AgentLoopConfig, ToolPolicy};
use sa_domain::stream::StreamEvent;
use sa_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
use sa_domain::trace::TraceEvent;
use sa_domain::turn::{ConversationTurn, Trace, TraceStep, TurnUsage};
use sa_memory::MemoryStore;
use sa_providers::traits::{ChatRequest, LlmProvider};
use sa_skills::SkillRegistry;
use sa_tools::context::ExecutionContext;
use sa_tools::tool::ToolOutcome;
use sa_tools::ToolRegistry;

use crate::cancel::{CancelMap, CancelToken};

/// Events streamed out of a running turn. Mirrors spec §4.F's event set:
/// state_change, thinking, response_chunk, tool_call, tool_result,
/// response_complete, error.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    StateChange { state: String },
    Thinking { content: String },
    ResponseChunk { text: String },
    ToolCall { call_id: String, tool_name: String, arguments: serde_json::Value },
    ToolResult { call_id: String, tool_name: String, content: String, is_error: bool },
    ResponseComplete { content: String },
    Error { message: String },
    Usage { input_tokens: u32, output_tokens: u32, total_tokens: u32 },
}

/// Everything one call to [`AgentLoop::run_stream`] needs, already resolved
/// by the caller (the Orchestrator picks the provider, model, system
/// prompt, and tool policy before handing off).
pub struct TurnInput {
    pub conversation_id: String,
    pub session_key: String,
    pub user_message: String,
    /// Image blocks attached to this turn's input (spec §4.F step 1: these
    /// are materialized to disk and listed in the runtime hints so tools
    /// and the model can reference them by path).
    pub image_blocks: Vec<ContentPart>,
    pub provider: Arc<dyn LlmProvider>,
    pub model: Option<String>,
    pub json_mode: bool,
    pub system_prompt: String,
    pub tool_policy: ToolPolicy,
    pub skill_registry: Option<Arc<SkillRegistry>>,
    pub pre_selected_skill_id: Option<String>,
    pub execution_context: ExecutionContext,
    /// Overrides `AgentLoopConfig::max_iterations` (spec §4.I: sub-agent
    /// delegation runs a shorter loop than the top-level conversation).
    pub max_iterations_override: Option<u32>,
}

pub struct AgentLoopDeps {
    pub memory: Arc<MemoryStore>,
    pub context_manager: Arc<ContextManager>,
    pub tool_registry: Arc<ToolRegistry>,
    pub cancel_map: Arc<CancelMap>,
    pub config: AgentLoopConfig,
}

pub struct AgentLoop {
    deps: Arc<AgentLoopDeps>,
}

struct ToolFailureCounters {
    counts: HashMap<String, u32>,
}

impl ToolFailureCounters {
    fn new() -> Self {
        Self { counts: HashMap::new() }
    }

    /// Shell-type tools are keyed by name + command prefix so unrelated
    /// commands via the same tool don't share a failure budget.
    fn key(tool_name: &str, arguments: &serde_json::Value) -> String {
        if tool_name == "exec" {
            if let Some(cmd) = arguments.get("command").and_then(|v| v.as_str()) {
                let prefix = cmd.split_whitespace().next().unwrap_or("");
                return format!("{tool_name}:{prefix}");
            }
        }
        tool_name.to_string()
    }

    fn bump(&mut self, key: &str) -> u32 {
        let count = self.counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn reset(&mut self, key: &str) {
        self.counts.remove(key);
    }
}

impl AgentLoop {
    pub fn new(deps: Arc<AgentLoopDeps>) -> Self {
        Self { deps }
    }

    /// Spawns the turn as a tracked async task and returns its trace id plus
    /// a channel of events. The task registers its own cancel token so
    /// callers (including a parent Orchestrator) can cancel it by session
    /// key via [`CancelMap::cancel`].
    pub fn run_stream(&self, input: TurnInput) -> (String, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(128);
        let trace_id = Uuid::new_v4().to_string();
        let token = self.deps.cancel_map.register(&input.session_key);
        let deps = self.deps.clone();
        let session_key = input.session_key.clone();

        let span = tracing::info_span!("agent_turn", trace_id = %trace_id, conversation_id = %input.conversation_id);
        tokio::spawn(async move {
            let _enter = span.enter();
            run_turn_inner(deps.clone(), input, trace_id.clone(), token, tx).await;
            deps.cancel_map.remove(&session_key);
        });

        (trace_id, rx)
    }
}

async fn run_turn_inner(
    deps: Arc<AgentLoopDeps>,
    input: TurnInput,
    trace_id: String,
    token: CancelToken,
    tx: mpsc::Sender<AgentEvent>,
) {
    let _ = tx.send(AgentEvent::StateChange { state: "running".into() }).await;

    // Persist the user turn up front so history/get_history sees it on the
    // very first iteration's context build.
    let now = chrono::Utc::now();
    let user_turn = ConversationTurn {
        id: Uuid::new_v4().to_string(),
        conversation_id: input.conversation_id.clone(),
        role: Role::User,
        content: input.user_message.clone(),
        tool_calls: None,
        tool_results: None,
        usage: TurnUsage::default(),
        trace_id: Some(trace_id.clone()),
        created_at: now,
    };
    if let Err(e) = deps.memory.add_turn(&input.conversation_id, user_turn) {
        tracing::warn!(error = %e, "failed to persist user turn");
    }

    let mut trace = Trace::new(trace_id.clone(), input.conversation_id.clone(), input.user_message.clone());
    trace.system_prompt = Some(input.system_prompt.clone());
    trace.model = input.model.clone();

    let tool_defs: Vec<ToolDefinition> = deps
        .tool_registry
        .definitions()
        .into_iter()
        .filter(|d| input.tool_policy.allows(&d.name))
        .collect();

    let max_iterations = input.max_iterations_override.unwrap_or(deps.config.max_iterations);
    let mut failures = ToolFailureCounters::new();
    let mut consecutive_error_iterations: u32 = 0;
    let mut total_usage = TurnUsage::default();
    let mut final_text = String::new();
    let mut terminal_error: Option<String> = None;
    let tmp_dir = std::env::temp_dir().join("serialagent-traces").join(&trace_id);
    let image_paths = materialize_images(&input.image_blocks, &tmp_dir.join("images"));

    let mut iteration: u32 = 0;
    while iteration < max_iterations {
        if token.is_cancelled() {
            terminal_error = Some("cancelled".into());
            break;
        }

        let messages = build_messages(&deps, &input, iteration, &image_paths).await;

        let req = ChatRequest {
            messages,
            tools: tool_defs.clone(),
            temperature: Some(0.2),
            max_tokens: None,
            json_mode: input.json_mode,
            model: input.model.clone(),
        };

        let started = std::time::Instant::now();
        let stream_result = input.provider.chat_stream(req).await;
        let mut stream = match stream_result {
            Ok(s) => s,
            Err(e) => {
                terminal_error = Some(format!("provider error: {e}"));
                break;
            }
        };

        let mut text_buf = String::new();
        let mut pending_calls: Vec<ToolCall> = Vec::new();
        let mut iteration_usage: Option<sa_domain::stream::Usage> = None;
        let mut stream_error: Option<String> = None;

        while let Some(event) = stream.next().await {
            if token.is_cancelled() {
                break;
            }
            match event {
                Ok(StreamEvent::Thinking { text }) => {
                    let _ = tx.send(AgentEvent::Thinking { content: text }).await;
                }
                Ok(StreamEvent::Token { text }) => {
                    text_buf.push_str(&text);
                    let _ = tx.send(AgentEvent::ResponseChunk { text }).await;
                }
                Ok(StreamEvent::ToolCallStarted { call_id, tool_name }) => {
                    let _ = tx
                        .send(AgentEvent::ToolCall {
                            call_id,
                            tool_name,
                            arguments: serde_json::Value::Null,
                        })
                        .await;
                }
                Ok(StreamEvent::ToolCallDelta { .. }) => {}
                Ok(StreamEvent::ToolCallFinished { call_id, tool_name, arguments }) => {
                    let arguments = if arguments.is_null() {
                        serde_json::json!({})
                    } else {
                        arguments
                    };
                    pending_calls.push(ToolCall { call_id, tool_name, arguments });
                }
                Ok(StreamEvent::Done { usage, .. }) => {
                    iteration_usage = usage;
                }
                Ok(StreamEvent::Error { message }) => {
                    stream_error = Some(message);
                }
                Err(e) => {
                    stream_error = Some(e.to_string());
                }
            }
        }

        if token.is_cancelled() {
            terminal_error = Some("cancelled".into());
            break;
        }

        if let Some(usage) = &iteration_usage {
            total_usage.tokens_in += usage.prompt_tokens;
            total_usage.tokens_out += usage.completion_tokens;
            let _ = tx
                .send(AgentEvent::Usage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                    total_tokens: usage.total_tokens,
                })
                .await;
        }

        TraceEvent::LlmRequest {
            provider: input.provider.provider_id().to_string(),
            model: input.model.clone().unwrap_or_default(),
            role: "executor".into(),
            streaming: true,
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: iteration_usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: iteration_usage.as_ref().map(|u| u.completion_tokens),
        }
        .emit();

        trace.steps.push(TraceStep::LlmCall {
            iteration,
            tokens_in: iteration_usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
            tokens_out: iteration_usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
            text: if text_buf.is_empty() { None } else { Some(text_buf.clone()) },
        });

        if let Some(err) = stream_error {
            persist_assistant_message(&deps, &input, &trace_id, &text_buf, &[]);
            terminal_error = Some(err);
            break;
        }

        if pending_calls.is_empty() {
            let sent_files_markdown =
                render_sent_files_markdown(&input.execution_context.sent_files, &text_buf);
            final_text = if sent_files_markdown.is_empty() {
                text_buf
            } else {
                format!("{text_buf}\n\n{sent_files_markdown}")
            };
            persist_assistant_message(&deps, &input, &trace_id, &final_text, &[]);
            break;
        }

        persist_assistant_message(&deps, &input, &trace_id, &text_buf, &pending_calls);

        let only_use_skill = pending_calls
            .iter()
            .all(|c| c.tool_name == sa_tools::USE_SKILL_TOOL_NAME);
        let mut iteration_all_errored = true;

        for call in &pending_calls {
            if token.is_cancelled() {
                break;
            }
            let _ = tx
                .send(AgentEvent::ToolCall {
                    call_id: call.call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    arguments: call.arguments.clone(),
                })
                .await;

            trace.steps.push(TraceStep::ToolCall {
                name: call.tool_name.clone(),
                input: call.arguments.clone(),
            });

            let outcome = execute_with_retry(&deps, &input, call, &mut failures).await;
            if !outcome.is_error {
                iteration_all_errored = false;
            }

            trace.steps.push(TraceStep::ToolResult {
                name: call.tool_name.clone(),
                content: outcome.content.clone(),
                is_error: outcome.is_error,
                duration_ms: 0,
            });

            let _ = tx
                .send(AgentEvent::ToolResult {
                    call_id: call.call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    content: outcome.content.clone(),
                    is_error: outcome.is_error,
                })
                .await;

            persist_tool_result(&deps, &input, &trace_id, &call.call_id, &outcome);

            if outcome.auto_complete {
                final_text = outcome.content.clone();
                break;
            }
        }

        if !final_text.is_empty() {
            break;
        }

        if iteration_all_errored {
            consecutive_error_iterations += 1;
            if consecutive_error_iterations >= deps.config.max_consecutive_error_iterations {
                terminal_error = Some("too_many_consecutive_tool_errors".into());
                break;
            }
        } else {
            consecutive_error_iterations = 0;
        }

        // A use_skill-only iteration doesn't consume the user-visible
        // iteration budget — activating a skill is setup, not progress.
        if !only_use_skill {
            iteration += 1;
        }
    }

    if final_text.is_empty() && terminal_error.is_none() {
        terminal_error = Some("max_iterations_reached".into());
    }

    let _ = std::fs::remove_dir_all(&tmp_dir);

    match &terminal_error {
        Some(err) => {
            trace.error = Some(err.clone());
            let _ = tx.send(AgentEvent::Error { message: err.clone() }).await;
        }
        None => {
            trace.response = Some(final_text.clone());
        }
    }
    trace.tokens_in = total_usage.tokens_in;
    trace.tokens_out = total_usage.tokens_out;
    trace.duration_ms = 0;

    if let Err(e) = deps.memory.add_trace(trace) {
        tracing::warn!(error = %e, "failed to persist trace");
    }

    let _ = tx
        .send(AgentEvent::ResponseComplete { content: final_text })
        .await;
    let _ = tx.send(AgentEvent::StateChange { state: "done".into() }).await;
}

/// Builds the per-iteration message list: static system prompt + the
/// dynamic context (compressed history, memory prefix, skill catalog) from
/// `ContextManager`, with unpersisted runtime hints appended to the last
/// user message.
async fn build_messages(
    deps: &Arc<AgentLoopDeps>,
    input: &TurnInput,
    iteration: u32,
    image_paths: &[PathBuf],
) -> Vec<Message> {
    let dynamic = deps
        .context_manager
        .build_context(BuildContextParams {
            conversation_id: &input.conversation_id,
            history_window: deps.config.history_window,
            compress_after: deps.config.compress_after,
            pre_selected_skill_id: input.pre_selected_skill_id.as_deref(),
            query_text: &input.user_message,
            reuse_context: reuse_context_for_iteration(iteration),
        })
        .await;

    let mut messages = Vec::with_capacity(dynamic.len() + 1);
    messages.push(Message::system(input.system_prompt.clone()));
    messages.extend(dynamic);

    if let Some(last_user) = messages.iter_mut().rev().find(|m| m.role == Role::User) {
        let hints = runtime_hints(input, image_paths);
        if !hints.is_empty() {
            if let MessageContent::Text(text) = &mut last_user.content {
                text.push_str("\n\n");
                text.push_str(&hints);
            }
        }
    }

    messages
}

/// The dynamic context prefix is reused starting on a turn's *second* model
/// call, not the third: `iteration` is still 0 for the first call.
fn reuse_context_for_iteration(iteration: u32) -> bool {
    iteration >= 1
}

/// Unpersisted per-iteration hints: working directory plus any image paths
/// materialized from this turn's input (spec §4.F step 1).
fn runtime_hints(input: &TurnInput, image_paths: &[PathBuf]) -> String {
    let mut hint = format!("[runtime: cwd={}", input.execution_context.work_dir.display());
    if !image_paths.is_empty() {
        let list = image_paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ");
        hint.push_str(&format!(", images={list}"));
    }
    hint.push(']');
    hint
}

/// Writes each image block's bytes to `dir` and returns the resulting
/// paths. `data:` URIs are decoded and written out; a non-`data:` URL
/// (already a local path, or a remote one no fetch is attempted for) is
/// passed through as-is so it still appears in the hint.
fn materialize_images(blocks: &[ContentPart], dir: &std::path::Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        let ContentPart::Image { url, media_type } = block else {
            continue;
        };

        if let Some(data) = url.strip_prefix("data:") {
            if let Some((meta, payload)) = data.split_once(";base64,") {
                let mime = media_type.as_deref().unwrap_or(meta);
                if std::fs::create_dir_all(dir).is_ok() {
                    if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(payload) {
                        let path = dir.join(format!("image_{i}.{}", extension_for_mime(mime)));
                        if std::fs::write(&path, &bytes).is_ok() {
                            paths.push(path);
                            continue;
                        }
                    }
                }
            }
            tracing::warn!(index = i, "failed to materialize inline image block");
            continue;
        }

        paths.push(PathBuf::from(url));
    }
    paths
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

fn persist_assistant_message(
    deps: &Arc<AgentLoopDeps>,
    input: &TurnInput,
    trace_id: &str,
    text: &str,
    tool_calls: &[ToolCall],
) {
    let tool_call_parts = if tool_calls.is_empty() {
        None
    } else {
        Some(
            tool_calls
                .iter()
                .map(|c| sa_domain::tool::ContentPart::ToolUse {
                    id: c.call_id.clone(),
                    name: c.tool_name.clone(),
                    input: c.arguments.clone(),
                })
                .collect(),
        )
    };

    let turn = ConversationTurn {
        id: Uuid::new_v4().to_string(),
        conversation_id: input.conversation_id.clone(),
        role: Role::Assistant,
        content: text.to_string(),
        tool_calls: tool_call_parts,
        tool_results: None,
        usage: TurnUsage {
            tool_call_count: tool_calls.len() as u32,
            ..Default::default()
        },
        trace_id: Some(trace_id.to_string()),
        created_at: chrono::Utc::now(),
    };
    if let Err(e) = deps.memory.add_turn(&input.conversation_id, turn) {
        tracing::warn!(error = %e, "failed to persist assistant turn");
    }
}

fn persist_tool_result(deps: &Arc<AgentLoopDeps>, input: &TurnInput, trace_id: &str, call_id: &str, outcome: &ToolOutcome) {
    let turn = ConversationTurn {
        id: Uuid::new_v4().to_string(),
        conversation_id: input.conversation_id.clone(),
        role: Role::Tool,
        content: outcome.content.clone(),
        tool_calls: None,
        tool_results: Some(vec![sa_domain::tool::ContentPart::ToolResult {
            tool_use_id: call_id.to_string(),
            content: outcome.content.clone(),
            is_error: outcome.is_error,
        }]),
        usage: TurnUsage::default(),
        trace_id: Some(trace_id.to_string()),
        created_at: chrono::Utc::now(),
    };
    if let Err(e) = deps.memory.add_turn(&input.conversation_id, turn) {
        tracing::warn!(error = %e, "failed to persist tool-result turn");
    }
}

/// Executes a tool call, retrying with doubling backoff when both the tool
/// is configured as retryable and its per-key failure count has not yet
/// exceeded `max_tool_failures`.
async fn execute_with_retry(
    deps: &Arc<AgentLoopDeps>,
    input: &TurnInput,
    call: &ToolCall,
    failures: &mut ToolFailureCounters,
) -> ToolOutcome {
    let key = ToolFailureCounters::key(&call.tool_name, &call.arguments);
    let retryable = deps.config.retryable_tools.iter().any(|t| t == &call.tool_name);
    let attempts = if retryable { 1 + deps.config.retry_extra_attempts } else { 1 };

    let mut last = ToolOutcome::error("tool never executed");
    for attempt in 0..attempts {
        if attempt > 0 {
            let delay_ms = deps.config.retry_base_delay_ms * (1u64 << (attempt - 1));
            TraceEvent::ToolRetried { tool_name: call.tool_name.clone(), attempt: attempt as u32 }.emit();
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let outcome = deps
            .tool_registry
            .execute(&call.tool_name, call.arguments.clone(), &input.execution_context)
            .await
            .unwrap_or_else(|e| ToolOutcome::error(format!("tool dispatch failed: {e}")));

        if !outcome.is_error {
            failures.reset(&key);
            return outcome;
        }

        last = outcome;
        let count = failures.bump(&key);
        if count >= deps.config.max_tool_failures {
            TraceEvent::ToolFailureCapped { tool_name: call.tool_name.clone(), failures: count }.emit();
            break;
        }
        if !retryable {
            break;
        }
    }

    last
}

/// Renders markdown links for files a tool sent during the turn that the
/// model's own text didn't already mention by name (spec §4.F: sent-file
/// markdown rule — `![name](url)` for images, `[name](url)` otherwise).
pub fn render_sent_files_markdown(
    sent_files: &SyncRwLock<Vec<std::path::PathBuf>>,
    already_mentioned: &str,
) -> String {
    const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];
    let mut out = String::new();
    for path in sent_files.read().iter() {
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        if name.is_empty() || already_mentioned.contains(&name) {
            continue;
        }
        let url = path.display().to_string();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            out.push_str(&format!("![{name}]({url})\n"));
        } else {
            out.push_str(&format!("[{name}]({url})\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::capability::LlmCapabilities;

    #[test]
    fn reuse_context_starts_on_second_call() {
        assert!(!reuse_context_for_iteration(0));
        assert!(reuse_context_for_iteration(1));
        assert!(reuse_context_for_iteration(2));
    }

    #[test]
    fn materialize_images_decodes_data_uri() {
        let dir = tempfile::tempdir().unwrap();
        let png_bytes = [0x89u8, b'P', b'N', b'G'];
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes);
        let blocks = vec![ContentPart::Image {
            url: format!("data:image/png;base64,{encoded}"),
            media_type: Some("image/png".to_string()),
        }];

        let paths = materialize_images(&blocks, dir.path());

        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].extension().unwrap(), "png");
        assert_eq!(std::fs::read(&paths[0]).unwrap(), png_bytes);
    }

    #[test]
    fn materialize_images_passes_through_non_data_urls() {
        let dir = tempfile::tempdir().unwrap();
        let blocks = vec![ContentPart::Image {
            url: "/workspace/scratch/existing.png".to_string(),
            media_type: None,
        }];

        let paths = materialize_images(&blocks, dir.path());

        assert_eq!(paths, vec![PathBuf::from("/workspace/scratch/existing.png")]);
    }

    #[test]
    fn runtime_hints_lists_image_paths() {
        let input = TurnInput {
            conversation_id: "c1".into(),
            session_key: "s1".into(),
            user_message: "hi".into(),
            image_blocks: Vec::new(),
            provider: dummy_provider(),
            model: None,
            json_mode: false,
            system_prompt: String::new(),
            tool_policy: ToolPolicy::default(),
            skill_registry: None,
            pre_selected_skill_id: None,
            execution_context: ExecutionContext::new(PathBuf::from("/work")),
            max_iterations_override: None,
        };

        let hints = runtime_hints(&input, &[PathBuf::from("/tmp/x/image_0.png")]);

        assert!(hints.contains("cwd=/work"));
        assert!(hints.contains("images=/tmp/x/image_0.png"));
    }

    fn dummy_provider() -> Arc<dyn LlmProvider> {
        struct Noop(LlmCapabilities);

        #[async_trait::async_trait]
        impl LlmProvider for Noop {
            async fn chat(&self, _req: ChatRequest) -> sa_domain::error::Result<sa_providers::traits::ChatResponse> {
                unimplemented!("not exercised by this test")
            }
            async fn chat_stream(
                &self,
                _req: ChatRequest,
            ) -> sa_domain::error::Result<sa_domain::stream::BoxStream<'static, sa_domain::error::Result<sa_domain::stream::StreamEvent>>>
            {
                unimplemented!("not exercised by this test")
            }
            async fn embeddings(
                &self,
                _req: sa_providers::traits::EmbeddingsRequest,
            ) -> sa_domain::error::Result<sa_providers::traits::EmbeddingsResponse> {
                unimplemented!("not exercised by this test")
            }
            fn capabilities(&self) -> &LlmCapabilities {
                &self.0
            }
            fn provider_id(&self) -> &str {
                "noop"
            }
        }

        Arc::new(Noop(LlmCapabilities::default()))
    }
}
