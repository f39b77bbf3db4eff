//! Execution context passed to every tool call (spec §6): the pieces of the
//! host environment a tool might need, with transport-specific concerns
//! (how to actually prompt the user, send a file, etc.) kept behind small
//! callback traits so this crate stays decoupled from `sa-core`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::error::Result;

#[async_trait]
pub trait UserPrompter: Send + Sync {
    async fn prompt_user(&self, message: &str) -> Result<String>;
}

#[async_trait]
pub trait UserNotifier: Send + Sync {
    async fn notify_user(&self, message: &str) -> Result<()>;
}

#[async_trait]
pub trait FileSender: Send + Sync {
    async fn send_file(&self, path: &std::path::Path, caption: Option<&str>) -> Result<()>;
}

#[async_trait]
pub trait MemorySaver: Send + Sync {
    async fn save_memory(&self, content: &str, importance: f32) -> Result<()>;
}

/// Spawns a single-level sub-agent turn and returns its final reply.
#[async_trait]
pub trait TaskDelegate: Send + Sync {
    async fn delegate_task(&self, task: &str, agent_name: Option<&str>) -> Result<String>;
}

/// Everything a tool's `execute` may consult. Every callback field is
/// optional: a tool that calls `prompt_user` when none is wired simply
/// reports that as a `ToolOutcome::error`.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    pub work_dir: PathBuf,
    pub original_user_text: Option<String>,
    /// The skill active for this turn, if any was pre-selected before the
    /// model started iterating (spec §4.F step 0 / §4.D).
    pub pre_selected_skill_name: Option<String>,
    /// Files already sent during this turn, so a tool can avoid duplicates.
    pub sent_files: Arc<parking_lot::RwLock<Vec<PathBuf>>>,

    pub prompt_user: Option<Arc<dyn UserPrompter>>,
    pub notify_user: Option<Arc<dyn UserNotifier>>,
    pub send_file: Option<Arc<dyn FileSender>>,
    pub save_memory: Option<Arc<dyn MemorySaver>>,
    pub delegate_task: Option<Arc<dyn TaskDelegate>>,

    pub scheduler: Option<Arc<sa_scheduler::Scheduler>>,
    pub skill_registry: Option<Arc<sa_skills::SkillRegistry>>,
    pub planner: Option<Arc<sa_planner::Planner>>,
}

impl ExecutionContext {
    pub fn new(work_dir: PathBuf) -> Self {
        Self {
            work_dir,
            ..Default::default()
        }
    }
}
