//! Skill types shared between `sa-skills` and its callers (spec §4.D).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A loaded, matchable skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub path: PathBuf,
    #[serde(default)]
    pub triggers: Vec<SkillTrigger>,
    /// Body of SKILL.md (frontmatter stripped) — injected verbatim when active.
    pub instructions: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub use_count: u64,
}

fn default_true() -> bool {
    true
}

/// One activation rule for a skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillTrigger {
    pub kind: TriggerType,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Case-insensitive substring match against any pattern.
    Keyword,
    /// Looser substring match intended for natural-language intent phrases.
    Intent,
    /// Always matches; used for catalog-only or always-on skills.
    Always,
}

/// Result of matching user input against the skill registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMatch {
    pub skill: Skill,
    pub confidence: f32,
    /// Human-readable description of which trigger (or fallback strategy) fired.
    pub matched_trigger: String,
}
