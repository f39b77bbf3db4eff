use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::memory::SearchWeights;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-process long-term memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    /// Directory for the JSON snapshot files (turns, sessions, traces, memories).
    #[serde(default = "d_db_path")]
    pub db_path: PathBuf,
    /// Dimension of embeddings this store instance accepts. Fixed per instance
    /// (spec §3 invariant); a plugged-in embed fn producing a different
    /// dimension is rejected rather than silently re-embedded.
    #[serde(default = "d_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default)]
    pub weights: SearchWeights,
    #[serde(default = "d_search_limit")]
    pub search_limit_default: usize,
    /// Cosine threshold above which `findSimilar` considers two memories the same.
    #[serde(default = "d_dedup_threshold")]
    pub dedup_threshold: f32,
    /// Run the memory extractor on turn 1 and then every N turns.
    #[serde(default = "d_extraction_interval")]
    pub extraction_interval_turns: u32,
    /// How many of the most recent turns the extractor reads per run.
    #[serde(default = "d_extraction_window")]
    pub extraction_window_turns: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            db_path: d_db_path(),
            embedding_dim: d_embedding_dim(),
            weights: SearchWeights::default(),
            search_limit_default: d_search_limit(),
            dedup_threshold: d_dedup_threshold(),
            extraction_interval_turns: d_extraction_interval(),
            extraction_window_turns: d_extraction_window(),
        }
    }
}

fn d_db_path() -> PathBuf {
    PathBuf::from("./data/memory")
}
fn d_embedding_dim() -> usize {
    512
}
fn d_search_limit() -> usize {
    10
}
fn d_dedup_threshold() -> f32 {
    0.75
}
fn d_extraction_interval() -> u32 {
    3
}
fn d_extraction_window() -> usize {
    10
}
