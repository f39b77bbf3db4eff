//! Long-term memory entry types, shared between `sa-memory` and its callers.

use serde::{Deserialize, Serialize};

/// Kind of long-term memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Fact,
    Preference,
    Entity,
    Episodic,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Fact => "fact",
            MemoryType::Preference => "preference",
            MemoryType::Entity => "entity",
            MemoryType::Episodic => "episodic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fact" => Some(MemoryType::Fact),
            "preference" => Some(MemoryType::Preference),
            "entity" => Some(MemoryType::Entity),
            "episodic" => Some(MemoryType::Episodic),
            _ => None,
        }
    }
}

/// A persisted long-term memory entry.
///
/// `importance` is always clamped to `[0, 1]` on construction and update.
/// `accessed_at >= created_at` and `access_count` only ever increases —
/// enforced by the store, not by this type alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub content: String,
    pub importance: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub accessed_at: chrono::DateTime<chrono::Utc>,
    pub access_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_turn_id: Option<String>,
}

impl MemoryEntry {
    pub fn clamp_importance(v: f32) -> f32 {
        v.clamp(0.0, 1.0)
    }
}

/// Filters accepted by `MemoryStore::search`.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub memory_type: Option<MemoryType>,
    pub min_importance: Option<f32>,
}

/// Scoring weights for `search`. Must roughly sum to 1.0 (validated, not enforced).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchWeights {
    pub semantic: f32,
    pub recency: f32,
    pub importance: f32,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            semantic: 0.5,
            recency: 0.2,
            importance: 0.3,
        }
    }
}

/// A scored search result.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMemory {
    pub entry: MemoryEntry,
    pub score: f32,
}
