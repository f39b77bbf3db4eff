//! Recursive, debounced directory watcher for the skills root (spec §4.D).

use std::path::PathBuf;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecursiveMode, Watcher};

use crate::spec_registry::SkillRegistry;

/// Starts a background thread watching `registry.root()` and keeps
/// `watcher` alive for the thread's lifetime (dropping it stops watching).
pub fn watch(registry: Arc<SkillRegistry>, debounce: Duration) -> notify::Result<notify::RecommendedWatcher> {
    let (tx, rx) = channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher.watch(registry.root(), RecursiveMode::Recursive)?;

    std::thread::spawn(move || {
        let mut pending: Vec<PathBuf> = Vec::new();
        loop {
            let timeout = if pending.is_empty() {
                Duration::from_secs(3600)
            } else {
                debounce
            };
            match rx.recv_timeout(timeout) {
                Ok(Ok(event)) => {
                    for path in skill_dirs_touched(&registry, &event) {
                        if !pending.contains(&path) {
                            pending.push(path);
                        }
                    }
                }
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "skills watcher event error");
                }
                Err(RecvTimeoutError::Timeout) => {
                    for path in pending.drain(..) {
                        apply(&registry, &path);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    });

    Ok(watcher)
}

fn skill_dirs_touched(registry: &SkillRegistry, event: &Event) -> Vec<PathBuf> {
    event
        .paths
        .iter()
        .filter_map(|p| skill_dir_for(registry, p))
        .collect()
}

/// A skill's unit of change is its top-level directory under the skills
/// root, not the individual file notify reports.
fn skill_dir_for(registry: &SkillRegistry, changed: &std::path::Path) -> Option<PathBuf> {
    let rel = changed.strip_prefix(registry.root()).ok()?;
    let first = rel.components().next()?;
    Some(registry.root().join(first.as_os_str()))
}

fn apply(registry: &SkillRegistry, skill_dir: &std::path::Path) {
    if skill_dir.join("SKILL.md").is_file() {
        if let Err(err) = registry.upsert_path(skill_dir) {
            tracing::warn!(error = %err, path = %skill_dir.display(), "failed to reload skill");
        }
    } else {
        registry.remove_path(skill_dir);
    }
}
