//! Persisted conversation turn and trace types (spec data model §3).
//!
//! Distinct from [`crate::trace::TraceEvent`], which is a structured-logging
//! emitter — these types are the durable per-turn audit record written by
//! the memory store exactly once at end-of-turn.

use serde::{Deserialize, Serialize};

use crate::tool::{ContentPart, Role};

/// Usage metrics recorded on a persisted turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub tokens_in: u32,
    #[serde(default)]
    pub tokens_out: u32,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub tool_call_count: u32,
}

/// A persisted conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    /// Serialized tool calls, present only on assistant turns that called tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ContentPart>>,
    /// Serialized tool results, present only on tool-role turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ContentPart>>,
    #[serde(default)]
    pub usage: TurnUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One step of a trace, in event order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TraceStep {
    #[serde(rename = "llm_call")]
    LlmCall {
        iteration: u32,
        tokens_in: u32,
        tokens_out: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    #[serde(rename = "tool_call")]
    ToolCall {
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        name: String,
        content: String,
        is_error: bool,
        duration_ms: u64,
    },
}

/// A skill match recorded on a trace, if the turn was routed via a skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSkillMatch {
    pub skill_id: String,
    pub confidence: f32,
}

/// The structured record of one turn's LLM calls, tool calls, and results.
/// Appended in event order; persisted exactly once at end-of-turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    pub conversation_id: String,
    pub user_input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_match: Option<TraceSkillMatch>,
    pub steps: Vec<TraceStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub tokens_in: u32,
    #[serde(default)]
    pub tokens_out: u32,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Trace {
    pub fn new(id: impl Into<String>, conversation_id: impl Into<String>, user_input: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            user_input: user_input.into(),
            system_prompt: None,
            skill_match: None,
            steps: Vec::new(),
            response: None,
            model: None,
            tokens_in: 0,
            tokens_out: 0,
            duration_ms: 0,
            error: None,
            created_at: chrono::Utc::now(),
        }
    }
}
