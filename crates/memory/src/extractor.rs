//! Memory Extractor: post-turn background job that mines durable facts,
//! preferences, entities, and episodic notes out of recent conversation
//! history via an LLM call, and folds them into the store.
//!
//! Runs on the first turn of a conversation and then every
//! `extraction_interval_turns` turns after that. Never blocks or fails the
//! user-facing turn: every error here is logged and swallowed.

use std::sync::Arc;

use sa_domain::memory::{MemoryEntry, MemoryType, SearchFilters};
use sa_domain::tool::Role;
use sa_domain::trace::TraceEvent;
use sa_domain::turn::ConversationTurn;

use crate::store::MemoryStore;

/// Minimal LLM surface the extractor needs — a single non-streaming
/// completion call. Providers live in `sa-providers`; this trait keeps
/// `sa-memory` decoupled from any concrete one.
#[async_trait::async_trait]
pub trait ExtractionModel: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String>;
}

#[derive(serde::Deserialize)]
struct ProposedMemory {
    #[serde(rename = "type")]
    memory_type: String,
    content: String,
    #[serde(default = "default_importance")]
    importance: f32,
}

fn default_importance() -> f32 {
    0.5
}

const SYSTEM_PROMPT: &str = "You extract durable facts, preferences, named entities, and notable \
episodes from a conversation transcript. Respond with a JSON array only, no prose, no markdown \
fences. Each element has exactly the keys \"type\" (one of fact, preference, entity, episodic), \
\"content\" (a single self-contained sentence), and \"importance\" (0.0-1.0). Do not include \
one-off actions, assistant behavior, or tool execution details — only information worth \
remembering about the user or the world across future conversations. If nothing is worth \
remembering, respond with an empty array.";

/// Whether turn number `n` (1-indexed, counting this conversation's turns so
/// far) should trigger extraction: the first turn, then every `interval`.
pub fn should_extract(turn_count: u64, interval: u32) -> bool {
    if interval == 0 {
        return false;
    }
    turn_count == 1 || turn_count % interval as u64 == 0
}

pub async fn run_extraction(
    store: &MemoryStore,
    model: &dyn ExtractionModel,
    conversation_id: &str,
) {
    let window = store.config().extraction_window_turns;
    let recent = store.get_history(conversation_id, Some(window));
    if recent.is_empty() {
        return;
    }

    let transcript = format_transcript(&recent);
    let raw = match model.complete(SYSTEM_PROMPT, &transcript).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(conversation_id, error = %err, "memory extraction LLM call failed");
            return;
        }
    };

    let proposed = match parse_proposed(&raw) {
        Ok(list) => list,
        Err(err) => {
            tracing::warn!(conversation_id, error = %err, raw = %raw, "memory extraction parse failed");
            return;
        }
    };

    let newest_turn_id = recent.last().map(|t| t.id.clone());
    let mut inserted = 0usize;
    let mut updated = 0usize;

    for candidate in &proposed {
        let Some(memory_type) = MemoryType::parse(&candidate.memory_type) else {
            continue;
        };
        let importance = MemoryEntry::clamp_importance(candidate.importance);

        if let Some(existing) = store.find_similar(&candidate.content, memory_type, store.config().dedup_threshold) {
            if importance > existing.importance {
                if let Err(err) = store.update(&existing.id, None, Some(importance)) {
                    tracing::warn!(memory_id = %existing.id, error = %err, "memory update failed during extraction");
                    continue;
                }
                updated += 1;
            }
            continue;
        }

        let embedding = store.embedder().map(|e| {
            e.embed(std::slice::from_ref(&candidate.content))
                .into_iter()
                .next()
                .unwrap_or_default()
        });

        let now = chrono::Utc::now();
        let entry = MemoryEntry {
            id: String::new(),
            memory_type,
            content: candidate.content.clone(),
            importance,
            embedding,
            created_at: now,
            accessed_at: now,
            access_count: 0,
            source_turn_id: newest_turn_id.clone(),
        };

        match store.add(entry) {
            Ok(_) => inserted += 1,
            Err(err) => tracing::warn!(error = %err, "memory insert failed during extraction"),
        }
    }

    TraceEvent::MemoryExtracted {
        conversation_id: conversation_id.to_owned(),
        proposed: proposed.len(),
        inserted,
        updated,
    }
    .emit();
}

fn format_transcript(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| {
            let role = match t.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
                Role::Tool => "tool",
            };
            format!("{role}: {}", t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_proposed(raw: &str) -> anyhow::Result<Vec<ProposedMemory>> {
    let cleaned = strip_markdown_fence(raw.trim());
    let list: Vec<ProposedMemory> = serde_json::from_str(cleaned)?;
    Ok(list)
}

fn strip_markdown_fence(text: &str) -> &str {
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

pub type SharedExtractionModel = Arc<dyn ExtractionModel>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_extract_fires_on_first_and_every_interval() {
        assert!(should_extract(1, 3));
        assert!(!should_extract(2, 3));
        assert!(!should_extract(3, 3));
        assert!(should_extract(6, 3));
        assert!(should_extract(9, 3));
    }

    #[test]
    fn should_extract_disabled_when_interval_zero() {
        assert!(!should_extract(1, 0));
        assert!(!should_extract(3, 0));
    }

    #[test]
    fn strip_markdown_fence_removes_json_fence() {
        let raw = "```json\n[{\"type\":\"fact\",\"content\":\"x\",\"importance\":0.5}]\n```";
        let cleaned = strip_markdown_fence(raw);
        assert!(cleaned.starts_with('['));
        assert!(cleaned.ends_with(']'));
    }

    #[test]
    fn parse_proposed_handles_bare_json() {
        let raw = r#"[{"type":"preference","content":"likes dark mode","importance":0.4}]"#;
        let parsed = parse_proposed(raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].memory_type, "preference");
    }

    #[test]
    fn parse_proposed_handles_empty_array() {
        let parsed = parse_proposed("[]").unwrap();
        assert!(parsed.is_empty());
    }
}
