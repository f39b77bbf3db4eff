use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workspace
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "d_ws_path")]
    pub path: PathBuf,
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./workspace"),
            state_path: PathBuf::from("./data/state"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Skills
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    #[serde(default = "d_skills_path")]
    pub path: PathBuf,
    /// Sidecar file recording disabled skill ids.
    #[serde(default = "d_skills_settings_path")]
    pub settings_path: PathBuf,
    /// Cosine threshold for the embedding-fallback match strategy.
    #[serde(default = "d_embedding_threshold")]
    pub match_embedding_threshold: f32,
    /// Score threshold for the token-overlap fallback match strategy.
    #[serde(default = "d_token_overlap_threshold")]
    pub match_token_overlap_threshold: f32,
    /// Debounce window for the directory watcher, in milliseconds.
    #[serde(default = "d_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./skills"),
            settings_path: d_skills_settings_path(),
            match_embedding_threshold: d_embedding_threshold(),
            match_token_overlap_threshold: d_token_overlap_threshold(),
            watch_debounce_ms: d_watch_debounce_ms(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_ws_path() -> PathBuf {
    PathBuf::from("./workspace")
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data/state")
}
fn d_skills_path() -> PathBuf {
    PathBuf::from("./skills")
}
fn d_skills_settings_path() -> PathBuf {
    PathBuf::from("./data/state/skills.settings.json")
}
fn d_embedding_threshold() -> f32 {
    0.45
}
fn d_token_overlap_threshold() -> f32 {
    0.15
}
fn d_watch_debounce_ms() -> u64 {
    300
}
