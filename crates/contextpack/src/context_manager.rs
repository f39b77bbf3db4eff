//! Dynamic context assembly for the agent loop (spec §4.E).
//!
//! Distinct from [`crate::builder::ContextPackBuilder`], which assembles the
//! *static* system-prompt workspace-file section: this module builds the
//! per-turn message list handed to the model, made of three layers —
//! (1) a compressed history window, (2) a cached "dynamic prefix" of
//! relevant memories and the skill catalog, (3) the turns themselves.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use sa_domain::memory::SearchFilters;
use sa_domain::tool::{ContentPart, Message, MessageContent, Role};
use sa_domain::turn::ConversationTurn;
use sa_memory::MemoryStore;
use sa_skills::SkillRegistry;

use crate::truncation::truncate_per_file;

const RAW_FALLBACK_MAX_CHARS: usize = 2000;
const SUMMARY_MAX_CHARS: usize = 500;
const MEMORY_BUDGET_CHARS: usize = 2000;
const MAX_RELEVANT_MEMORIES: usize = 5;

/// Summarizes an old-history transcript into a short recap. Implemented by
/// whatever LLM adapter the host wires up; kept as a small local trait so
/// this crate doesn't depend on `sa-providers` directly (same shape as
/// `sa_memory::ExtractionModel` / `sa_planner::PlanningModel`).
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &str) -> anyhow::Result<String>;
}

#[derive(Clone)]
struct CachedPrefix {
    messages: Vec<Message>,
}

/// Per-conversation cache of the compressed-history recap, so repeat turns
/// within the same history window don't re-summarize.
#[derive(Clone)]
struct CachedSummary {
    old_turn_count: usize,
    summary: String,
}

pub struct ContextManager {
    memory_store: Arc<MemoryStore>,
    skill_registry: Option<Arc<SkillRegistry>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    prefix_cache: RwLock<HashMap<String, CachedPrefix>>,
    summary_cache: RwLock<HashMap<String, CachedSummary>>,
}

pub struct BuildContextParams<'a> {
    pub conversation_id: &'a str,
    pub history_window: usize,
    pub compress_after: usize,
    pub pre_selected_skill_id: Option<&'a str>,
    pub query_text: &'a str,
    /// When true and a cached dynamic prefix exists for this conversation,
    /// it is reused verbatim instead of being rebuilt (spec §4.E: keeps the
    /// leading messages stable across iterations within one turn so prompt
    /// caching on the provider side stays effective).
    pub reuse_context: bool,
}

impl ContextManager {
    pub fn new(
        memory_store: Arc<MemoryStore>,
        skill_registry: Option<Arc<SkillRegistry>>,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Self {
        Self {
            memory_store,
            skill_registry,
            summarizer,
            prefix_cache: RwLock::new(HashMap::new()),
            summary_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Drop cached state for a conversation (e.g. on session close).
    pub fn invalidate(&self, conversation_id: &str) {
        self.prefix_cache.write().remove(conversation_id);
        self.summary_cache.write().remove(conversation_id);
    }

    pub async fn build_context(&self, params: BuildContextParams<'_>) -> Vec<Message> {
        let history = self
            .memory_store
            .get_history(params.conversation_id, Some(params.history_window));

        let mut messages = Vec::new();

        if history.len() > params.compress_after {
            let split = history.len() - params.compress_after;
            let (old, recent) = history.split_at(split);
            if let Some(recap) = self.compress(params.conversation_id, old).await {
                messages.push(Message::user(format!(
                    "Here is a summary of earlier context:\n{recap}"
                )));
                messages.push(Message::assistant("Understood."));
            }
            messages.extend(turns_to_messages(recent));
        } else {
            messages.extend(turns_to_messages(&history));
        }

        let dynamic_prefix = self.dynamic_prefix(&params).await;

        let mut out = dynamic_prefix;
        out.extend(messages);
        out
    }

    async fn compress(&self, conversation_id: &str, old: &[ConversationTurn]) -> Option<String> {
        if old.is_empty() {
            return None;
        }

        if let Some(cached) = self.summary_cache.read().get(conversation_id) {
            if cached.old_turn_count == old.len() {
                return Some(cached.summary.clone());
            }
        }

        let transcript = raw_transcript(old);

        let summary = match &self.summarizer {
            Some(summarizer) => match summarizer.summarize(&transcript).await {
                Ok(mut s) => {
                    if s.len() > SUMMARY_MAX_CHARS {
                        let boundary = s.floor_char_boundary(SUMMARY_MAX_CHARS);
                        s.truncate(boundary);
                    }
                    s
                }
                Err(err) => {
                    tracing::warn!(error = %err, "history summarization failed, falling back to raw truncation");
                    truncate_per_file(&transcript, RAW_FALLBACK_MAX_CHARS).0
                }
            },
            None => truncate_per_file(&transcript, RAW_FALLBACK_MAX_CHARS).0,
        };

        self.summary_cache.write().insert(
            conversation_id.to_string(),
            CachedSummary {
                old_turn_count: old.len(),
                summary: summary.clone(),
            },
        );

        Some(summary)
    }

    async fn dynamic_prefix(&self, params: &BuildContextParams<'_>) -> Vec<Message> {
        if params.reuse_context {
            if let Some(cached) = self.prefix_cache.read().get(params.conversation_id) {
                return cached.messages.clone();
            }
        }

        let mut prefix = Vec::new();

        let memories = self.memory_store.search(
            params.query_text,
            SearchFilters::default(),
            Some(MAX_RELEVANT_MEMORIES),
            None,
        );
        if !memories.is_empty() {
            let mut joined = String::new();
            for scored in &memories {
                if joined.len() + scored.entry.content.len() > MEMORY_BUDGET_CHARS {
                    break;
                }
                joined.push_str("- ");
                joined.push_str(&scored.entry.content);
                joined.push('\n');
            }
            prefix.push(Message::user(format!("Relevant memories:\n{joined}")));
            prefix.push(Message::assistant("OK."));
        }

        if let Some(registry) = &self.skill_registry {
            if let Some(skill_id) = params.pre_selected_skill_id {
                if let Some(skill) = registry.get(skill_id) {
                    prefix.push(Message::user(format!(
                        "Active skill ({}):\n{}",
                        skill.name, skill.instructions
                    )));
                    prefix.push(Message::assistant("OK."));
                }
            }

            let catalog: Vec<String> = registry
                .list()
                .into_iter()
                .filter(|s| s.enabled && Some(s.id.as_str()) != params.pre_selected_skill_id)
                .map(|s| format!("{}({})", s.name, short_description(&s.description)))
                .collect();
            if !catalog.is_empty() {
                prefix.push(Message::user(format!(
                    "Available skills:\n{}",
                    catalog.join("\n")
                )));
                prefix.push(Message::assistant("OK."));
            }
        }

        self.prefix_cache.write().insert(
            params.conversation_id.to_string(),
            CachedPrefix {
                messages: prefix.clone(),
            },
        );

        prefix
    }
}

fn short_description(description: &str) -> String {
    const MAX: usize = 120;
    if description.len() <= MAX {
        description.to_string()
    } else {
        let boundary = description.floor_char_boundary(MAX);
        format!("{}…", &description[..boundary])
    }
}

fn raw_transcript(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{:?}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reconstructs model-facing messages from persisted turns (spec §4.E).
pub fn turns_to_messages(turns: &[ConversationTurn]) -> Vec<Message> {
    turns
        .iter()
        .map(|turn| {
            let content = match turn.role {
                Role::Assistant if turn.tool_calls.is_some() => {
                    let mut parts = vec![ContentPart::Text {
                        text: turn.content.clone(),
                    }];
                    parts.extend(turn.tool_calls.clone().unwrap_or_default());
                    MessageContent::Parts(parts)
                }
                Role::Tool => {
                    let parts = turn.tool_results.clone().unwrap_or_else(|| {
                        vec![ContentPart::ToolResult {
                            tool_use_id: String::new(),
                            content: turn.content.clone(),
                            is_error: false,
                        }]
                    });
                    MessageContent::Parts(parts)
                }
                Role::User => parse_user_blocks(&turn.content)
                    .unwrap_or_else(|| MessageContent::Text(turn.content.clone())),
                _ => MessageContent::Text(turn.content.clone()),
            };
            Message {
                role: turn.role,
                content,
            }
        })
        .collect()
}

/// A user turn's `content` is parsed as a JSON array of typed content
/// blocks only when it actually is one; everything else stays plain text.
fn parse_user_blocks(content: &str) -> Option<MessageContent> {
    let value: serde_json::Value = serde_json::from_str(content).ok()?;
    if !value.is_array() {
        return None;
    }
    let parts: Vec<ContentPart> = serde_json::from_value(value).ok()?;
    Some(MessageContent::Parts(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::MemoryStoreConfig;

    fn store() -> Arc<MemoryStore> {
        let dir = tempfile::tempdir().unwrap();
        let config = MemoryStoreConfig {
            db_path: dir.path().join("memory"),
            ..Default::default()
        };
        Arc::new(MemoryStore::open(config, None).unwrap())
    }

    #[test]
    fn user_turn_plain_text_stays_text() {
        let turns = vec![ConversationTurn {
            id: "t1".into(),
            conversation_id: "c1".into(),
            role: Role::User,
            content: "hello there".into(),
            tool_calls: None,
            tool_results: None,
            usage: Default::default(),
            trace_id: None,
            created_at: chrono::Utc::now(),
        }];
        let messages = turns_to_messages(&turns);
        assert_eq!(messages[0].content.text(), Some("hello there"));
    }

    #[test]
    fn user_turn_json_blocks_parsed() {
        let blocks = serde_json::json!([{"type": "text", "text": "hi"}]);
        let turns = vec![ConversationTurn {
            id: "t1".into(),
            conversation_id: "c1".into(),
            role: Role::User,
            content: blocks.to_string(),
            tool_calls: None,
            tool_results: None,
            usage: Default::default(),
            trace_id: None,
            created_at: chrono::Utc::now(),
        }];
        let messages = turns_to_messages(&turns);
        match &messages[0].content {
            MessageContent::Parts(parts) => assert_eq!(parts.len(), 1),
            _ => panic!("expected parsed blocks"),
        }
    }

    #[tokio::test]
    async fn build_context_without_history_is_empty() {
        let manager = ContextManager::new(store(), None, None);
        let messages = manager
            .build_context(BuildContextParams {
                conversation_id: "c1",
                history_window: 50,
                compress_after: 20,
                pre_selected_skill_id: None,
                query_text: "hello",
                reuse_context: false,
            })
            .await;
        assert!(messages.is_empty());
    }
}
