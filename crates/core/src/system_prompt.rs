//! Assembles the static system-prompt section (workspace files + skill
//! catalog) once per turn, ahead of the dynamic per-iteration context that
//! [`crate::agent_loop`] builds via `sa_contextpack::ContextManager`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sa_contextpack::builder::{ContextPackBuilder, SessionMode};
use sa_domain::config::ContextConfig;
use sa_skills::SkillRegistry;

use crate::workspace::WorkspaceReader;

/// Tracks whether the workspace has completed its one-time bootstrap ritual
/// via a marker file under the state directory.
pub struct BootstrapTracker {
    marker_path: PathBuf,
}

impl BootstrapTracker {
    pub fn new(state_path: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&state_path)?;
        Ok(Self {
            marker_path: state_path.join("bootstrap_done"),
        })
    }

    pub fn is_first_run(&self) -> bool {
        !self.marker_path.exists()
    }

    pub fn mark_done(&self) {
        if let Err(e) = std::fs::write(&self.marker_path, b"1") {
            tracing::warn!(error = %e, "failed to persist bootstrap marker");
        }
    }
}

/// Render the skill catalog string injected into the system prompt: one
/// line per enabled skill, `name(short description)`.
fn render_skill_catalog(registry: &SkillRegistry) -> String {
    registry
        .list()
        .into_iter()
        .filter(|s| s.enabled)
        .map(|s| format!("{}({})", s.name, short_description(&s.description)))
        .collect::<Vec<_>>()
        .join("\n")
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

/// Build the static per-turn system prompt: workspace context files +
/// skill catalog, capped per the configured char budgets.
pub fn build_system_prompt(
    context_config: &ContextConfig,
    workspace: &WorkspaceReader,
    skills: Option<&Arc<SkillRegistry>>,
    bootstrap: &BootstrapTracker,
) -> String {
    let is_first_run = bootstrap.is_first_run();
    let session_mode = if is_first_run {
        SessionMode::Bootstrap
    } else {
        SessionMode::Normal
    };

    let builder = ContextPackBuilder::new(
        context_config.bootstrap_max_chars,
        context_config.bootstrap_total_max_chars,
    );

    let ws_files = workspace.read_all_context_files();
    let skills_index = skills.map(|r| render_skill_catalog(r)).unwrap_or_default();
    let skills_idx = if skills_index.is_empty() {
        None
    } else {
        Some(skills_index.as_str())
    };

    let (assembled, _report) = builder.build(&ws_files, session_mode, is_first_run, skills_idx, None);

    if is_first_run {
        bootstrap.mark_done();
    }

    assembled
}

/// Resolve the workspace/skills path pair for a sub-agent, falling back to
/// the global paths when the agent config leaves them unset.
pub fn resolve_agent_paths(
    agent_path: Option<&Path>,
    global_path: &Path,
) -> PathBuf {
    agent_path.map(Path::to_path_buf).unwrap_or_else(|| global_path.to_path_buf())
}
