//! Enabled/disabled sidecar (spec §4.D): persists only the set of skills the
//! user has explicitly turned off, so a fresh skill directory defaults to
//! enabled without needing an entry.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sa_domain::error::Result;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct SettingsFile {
    #[serde(default)]
    disabled: HashSet<String>,
}

pub struct SkillSettings {
    path: PathBuf,
    disabled: parking_lot::RwLock<HashSet<String>>,
}

impl SkillSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let disabled = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let parsed: SettingsFile = serde_json::from_str(&raw).unwrap_or_default();
            parsed.disabled
        } else {
            HashSet::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            disabled: parking_lot::RwLock::new(disabled),
        })
    }

    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled.read().contains(id)
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        {
            let mut disabled = self.disabled.write();
            if enabled {
                disabled.remove(id);
            } else {
                disabled.insert(id.to_string());
            }
        }
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = SettingsFile {
            disabled: self.disabled.read().clone(),
        };
        let raw = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_disabled_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skills.settings.json");
        let settings = SkillSettings::load(&path).unwrap();
        assert!(!settings.is_disabled("foo"));
        settings.set_enabled("foo", false).unwrap();
        assert!(settings.is_disabled("foo"));

        let reloaded = SkillSettings::load(&path).unwrap();
        assert!(reloaded.is_disabled("foo"));

        reloaded.set_enabled("foo", true).unwrap();
        assert!(!reloaded.is_disabled("foo"));
    }
}
