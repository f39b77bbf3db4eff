//! Spec-accurate skill registry (spec §4.D): loads `SKILL.md` files from a
//! directory tree into [`sa_domain::skill::Skill`], applies the enabled/
//! disabled sidecar, and exposes `match_input` for activation.
//!
//! Distinct from [`crate::registry::SkillsRegistry`], which renders the
//! older ClawHub-style `skill.toml` index.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use sa_domain::error::Result;
use sa_domain::skill::{Skill, SkillMatch, SkillTrigger, TriggerType};

use crate::manifest::{parse_frontmatter, RawTrigger};
use crate::matching::{self, SkillEmbedder};
use crate::settings::SkillSettings;

pub struct SkillRegistry {
    root: PathBuf,
    skills: RwLock<Vec<Skill>>,
    settings: SkillSettings,
    embedding_threshold: f32,
    token_overlap_threshold: f32,
}

impl SkillRegistry {
    pub fn load(
        root: &Path,
        settings_path: &Path,
        embedding_threshold: f32,
        token_overlap_threshold: f32,
    ) -> Result<Self> {
        let settings = SkillSettings::load(settings_path)?;
        let skills = scan(root, &settings)?;
        tracing::info!(count = skills.len(), "skill registry loaded");
        Ok(Self {
            root: root.to_path_buf(),
            skills: RwLock::new(skills),
            settings,
            embedding_threshold,
            token_overlap_threshold,
        })
    }

    pub fn reload(&self) -> Result<usize> {
        let skills = scan(&self.root, &self.settings)?;
        let count = skills.len();
        *self.skills.write() = skills;
        tracing::info!(count, "skill registry reloaded");
        Ok(count)
    }

    pub fn list(&self) -> Vec<Skill> {
        self.skills.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<Skill> {
        self.skills.read().iter().find(|s| s.id == id).cloned()
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        self.settings.set_enabled(id, enabled)?;
        let mut skills = self.skills.write();
        if let Some(skill) = skills.iter_mut().find(|s| s.id == id) {
            skill.enabled = enabled;
        }
        Ok(())
    }

    pub fn record_use(&self, id: &str) {
        let mut skills = self.skills.write();
        if let Some(skill) = skills.iter_mut().find(|s| s.id == id) {
            skill.use_count += 1;
        }
    }

    /// Upsert a single skill, called by the directory watcher on create/modify.
    pub fn upsert_path(&self, skill_dir: &Path) -> Result<()> {
        if let Some(mut skill) = load_skill(skill_dir)? {
            skill.enabled = !self.settings.is_disabled(&skill.id);
            let mut skills = self.skills.write();
            if let Some(existing) = skills.iter_mut().find(|s| s.id == skill.id) {
                skill.use_count = existing.use_count;
                *existing = skill;
            } else {
                skills.push(skill);
            }
        }
        Ok(())
    }

    /// Remove a skill whose directory disappeared, called by the watcher.
    pub fn remove_path(&self, skill_dir: &Path) {
        let mut skills = self.skills.write();
        skills.retain(|s| s.path != skill_dir);
    }

    pub fn match_input(&self, input: &str, embedder: Option<&dyn SkillEmbedder>) -> Vec<SkillMatch> {
        let skills = self.skills.read();
        matching::match_input(
            &skills,
            input,
            embedder,
            self.embedding_threshold,
            self.token_overlap_threshold,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn scan(root: &Path, settings: &SkillSettings) -> Result<Vec<Skill>> {
    let mut out = Vec::new();
    if !root.is_dir() {
        return Ok(out);
    }
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(mut skill) = load_skill(&entry.path())? {
            skill.enabled = !settings.is_disabled(&skill.id);
            out.push(skill);
        }
    }
    out.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(out)
}

fn load_skill(skill_dir: &Path) -> Result<Option<Skill>> {
    let doc_path = skill_dir.join("SKILL.md");
    if !doc_path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&doc_path)?;
    let (manifest, body) = parse_frontmatter(&content);
    let manifest = match manifest {
        Some(m) => m,
        None => return Ok(None),
    };
    let dir_name = skill_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let id = manifest.name.clone().unwrap_or(dir_name);
    let triggers = manifest.triggers.iter().filter_map(convert_trigger).collect();

    Ok(Some(Skill {
        name: id.clone(),
        id,
        description: manifest.description.unwrap_or_default(),
        path: skill_dir.to_path_buf(),
        triggers,
        instructions: body,
        enabled: true,
        use_count: 0,
    }))
}

fn convert_trigger(raw: &RawTrigger) -> Option<SkillTrigger> {
    let kind = match raw.kind.as_str() {
        "keyword" => TriggerType::Keyword,
        "intent" => TriggerType::Intent,
        "always" => TriggerType::Always,
        other => {
            tracing::warn!(kind = other, "unknown skill trigger type, ignoring");
            return None;
        }
    };
    Some(SkillTrigger {
        kind,
        patterns: raw.patterns.clone(),
        confidence: raw.confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_skill(root: &Path, name: &str, body: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("SKILL.md"), body).unwrap();
    }

    #[test]
    fn loads_triggers_and_matches() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "deploy",
            r#"---
name: deploy
description: Deploys the service
triggers:
  - type: keyword
    patterns: [deploy, ship it]
---
Deployment instructions go here.
"#,
        );
        let settings_path = dir.path().join("settings.json");
        let registry = SkillRegistry::load(dir.path(), &settings_path, 0.45, 0.15).unwrap();
        assert_eq!(registry.list().len(), 1);

        let matches = registry.match_input("please deploy the app", None);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].skill.id, "deploy");
    }

    #[test]
    fn disabling_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "deploy",
            "---\nname: deploy\ndescription: Deploys\n---\nBody\n",
        );
        let settings_path = dir.path().join("settings.json");
        let registry = SkillRegistry::load(dir.path(), &settings_path, 0.45, 0.15).unwrap();
        registry.set_enabled("deploy", false).unwrap();

        let reloaded = SkillRegistry::load(dir.path(), &settings_path, 0.45, 0.15).unwrap();
        assert!(!reloaded.get("deploy").unwrap().enabled);
    }
}
