//! End-to-end coverage for `AgentLoop::run_stream`: the iteration loop,
//! per-tool failure counters, and cancellation, driven through the public
//! API with a canned provider and a canned tool rather than a live LLM.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use sa_contextpack::ContextManager;
use sa_core::agent_loop::{AgentEvent, AgentLoop, AgentLoopDeps, TurnInput};
use sa_core::cancel::CancelMap;
use sa_domain::capability::LlmCapabilities;
use sa_domain::config::{AgentLoopConfig, MemoryStoreConfig, ToolPolicy};
use sa_memory::MemoryStore;
use sa_providers::traits::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};
use sa_tools::context::ExecutionContext;
use sa_tools::tool::{Tool, ToolCategory, ToolOutcome};
use sa_tools::ToolRegistry;

/// Replays one canned stream of events per `chat_stream` call, in order.
/// Calling it more times than there are canned responses panics — every
/// test below sizes its script to the exact iteration count it expects.
struct ScriptedProvider {
    responses: parking_lot::Mutex<Vec<Vec<sa_domain::error::Result<sa_domain::stream::StreamEvent>>>>,
    calls: AtomicUsize,
    capabilities: LlmCapabilities,
}

impl ScriptedProvider {
    fn new(responses: Vec<Vec<sa_domain::error::Result<sa_domain::stream::StreamEvent>>>) -> Self {
        Self {
            responses: parking_lot::Mutex::new(responses),
            calls: AtomicUsize::new(0),
            capabilities: LlmCapabilities::default(),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, _req: ChatRequest) -> sa_domain::error::Result<ChatResponse> {
        unimplemented!("the agent loop only uses chat_stream")
    }

    async fn chat_stream(
        &self,
        _req: ChatRequest,
    ) -> sa_domain::error::Result<sa_domain::stream::BoxStream<'static, sa_domain::error::Result<sa_domain::stream::StreamEvent>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let events = self.responses.lock().remove(0);
        Ok(Box::pin(futures_util::stream::iter(events)))
    }

    async fn embeddings(&self, _req: EmbeddingsRequest) -> sa_domain::error::Result<EmbeddingsResponse> {
        unimplemented!("not exercised by this test")
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

/// A tool that always reports failure, so the per-tool failure counter and
/// the consecutive-error-iteration abort both get exercised.
struct AlwaysFailsTool;

#[async_trait]
impl Tool for AlwaysFailsTool {
    fn name(&self) -> &str {
        "always_fails"
    }
    fn description(&self) -> &str {
        "test tool that always errors"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Other
    }
    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _input: serde_json::Value, _ctx: &ExecutionContext) -> sa_domain::error::Result<ToolOutcome> {
        Ok(ToolOutcome::error("simulated failure"))
    }
}

fn test_deps(config: AgentLoopConfig) -> (Arc<AgentLoopDeps>, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let memory_config = MemoryStoreConfig {
        db_path: tmp.path().join("memory"),
        ..Default::default()
    };
    let memory = Arc::new(MemoryStore::open(memory_config, None).unwrap());
    let context_manager = Arc::new(ContextManager::new(memory.clone(), None, None));
    let tool_registry = Arc::new(ToolRegistry::new());
    tool_registry.register(Arc::new(AlwaysFailsTool));
    let cancel_map = Arc::new(CancelMap::new());

    let deps = Arc::new(AgentLoopDeps {
        memory,
        context_manager,
        tool_registry,
        cancel_map,
        config,
    });
    (deps, tmp)
}

fn text_only_turn(script: Vec<Vec<sa_domain::error::Result<sa_domain::stream::StreamEvent>>>) -> TurnInput {
    TurnInput {
        conversation_id: "conv-1".into(),
        session_key: "session:test".into(),
        user_message: "hello".into(),
        image_blocks: Vec::new(),
        provider: Arc::new(ScriptedProvider::new(script)),
        model: None,
        json_mode: false,
        system_prompt: "be helpful".into(),
        tool_policy: ToolPolicy::default(),
        skill_registry: None,
        pre_selected_skill_id: None,
        execution_context: ExecutionContext::new(PathBuf::from("/work")),
        max_iterations_override: None,
    }
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn completes_after_a_tool_call_then_a_final_answer() {
    use sa_domain::stream::StreamEvent;

    let (deps, _tmp) = test_deps(AgentLoopConfig::default());
    let agent_loop = AgentLoop::new(deps);

    let script = vec![
        vec![
            Ok(StreamEvent::ToolCallStarted { call_id: "1".into(), tool_name: "always_fails".into() }),
            Ok(StreamEvent::ToolCallFinished {
                call_id: "1".into(),
                tool_name: "always_fails".into(),
                arguments: serde_json::json!({}),
            }),
            Ok(StreamEvent::Done { usage: None, finish_reason: Some("tool_calls".into()) }),
        ],
        vec![
            Ok(StreamEvent::Token { text: "done".into() }),
            Ok(StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) }),
        ],
    ];

    let (_trace_id, rx) = agent_loop.run_stream(text_only_turn(script));
    let events = drain(rx).await;

    assert!(events.iter().any(|e| matches!(e, AgentEvent::ToolResult { is_error: true, .. })));
    assert!(events.iter().any(|e| matches!(e, AgentEvent::ResponseComplete { content } if content == "done")));
}

#[tokio::test]
async fn tool_failure_cap_aborts_after_consecutive_error_iterations() {
    use sa_domain::stream::StreamEvent;

    let config = AgentLoopConfig {
        max_iterations: 10,
        max_tool_failures: 1,
        max_consecutive_error_iterations: 2,
        retry_base_delay_ms: 1,
        retry_extra_attempts: 0,
        ..AgentLoopConfig::default()
    };
    let (deps, _tmp) = test_deps(config);
    let agent_loop = AgentLoop::new(deps);

    // Two iterations, each a failing tool call — the loop should abort
    // after `max_consecutive_error_iterations` rather than run all 10.
    let failing_iteration = || {
        vec![
            Ok(StreamEvent::ToolCallStarted { call_id: "1".into(), tool_name: "always_fails".into() }),
            Ok(StreamEvent::ToolCallFinished {
                call_id: "1".into(),
                tool_name: "always_fails".into(),
                arguments: serde_json::json!({}),
            }),
            Ok(StreamEvent::Done { usage: None, finish_reason: Some("tool_calls".into()) }),
        ]
    };
    let script = vec![failing_iteration(), failing_iteration()];

    let (_trace_id, rx) = agent_loop.run_stream(text_only_turn(script));
    let events = drain(rx).await;

    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::Error { message } if message == "too_many_consecutive_tool_errors")));
}

/// A provider whose stream yields one token, then blocks on a `Notify` so
/// the test can cancel the turn at a known point before letting the stream
/// finish with a `Done` event.
struct PausingProvider {
    ready: Arc<tokio::sync::Notify>,
    resume: Arc<tokio::sync::Notify>,
    capabilities: LlmCapabilities,
}

#[async_trait]
impl LlmProvider for PausingProvider {
    async fn chat(&self, _req: ChatRequest) -> sa_domain::error::Result<ChatResponse> {
        unimplemented!("the agent loop only uses chat_stream")
    }

    async fn chat_stream(
        &self,
        _req: ChatRequest,
    ) -> sa_domain::error::Result<sa_domain::stream::BoxStream<'static, sa_domain::error::Result<sa_domain::stream::StreamEvent>>> {
        use sa_domain::stream::StreamEvent;

        let ready = self.ready.clone();
        let resume = self.resume.clone();
        let stream = async_stream::stream! {
            yield Ok(StreamEvent::Token { text: "partial".into() });
            ready.notify_one();
            resume.notified().await;
            yield Ok(StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) });
        };
        Ok(Box::pin(stream))
    }

    async fn embeddings(&self, _req: EmbeddingsRequest) -> sa_domain::error::Result<EmbeddingsResponse> {
        unimplemented!("not exercised by this test")
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        "pausing"
    }
}

#[tokio::test]
async fn cancelling_mid_stream_short_circuits_the_loop() {
    let (deps, _tmp) = test_deps(AgentLoopConfig::default());
    let cancel_map = deps.cancel_map.clone();
    let agent_loop = AgentLoop::new(deps);

    let ready = Arc::new(tokio::sync::Notify::new());
    let resume = Arc::new(tokio::sync::Notify::new());
    let provider = Arc::new(PausingProvider { ready: ready.clone(), resume: resume.clone(), capabilities: LlmCapabilities::default() });

    let mut input = text_only_turn(vec![]);
    input.provider = provider;
    let session_key = input.session_key.clone();

    let (_trace_id, rx) = agent_loop.run_stream(input);

    // Wait until the provider has yielded its first token and is paused,
    // then cancel and let it finish — the loop must stop before accepting
    // the `Done` event rather than treating the turn as complete.
    ready.notified().await;
    assert!(cancel_map.cancel(&session_key));
    resume.notify_one();

    let events = drain(rx).await;
    assert!(events.iter().any(|e| matches!(e, AgentEvent::Error { message } if message == "cancelled")));
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::ResponseComplete { content } if content.is_empty())));
}
