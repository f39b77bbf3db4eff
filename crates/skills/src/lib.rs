pub mod aliases;
pub mod installer;
pub mod loader;
pub mod manifest;
pub mod matching;
pub mod registry;
pub mod settings;
pub mod spec_registry;
pub mod types;
pub mod watcher;

pub use matching::{match_input, SkillEmbedder};
pub use registry::SkillsRegistry;
pub use settings::SkillSettings;
pub use spec_registry::SkillRegistry;
