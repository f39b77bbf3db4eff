//! Scheduled task types shared between `sa-scheduler` and its callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cron or one-shot job. `action` is an opaque string the fire callback
/// interprets (e.g. a prompt template or task identifier) — the scheduler
/// itself doesn't know what an action means.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    /// 5-field cron expression, evaluated in the scheduler's configured timezone.
    pub cron: String,
    pub action: String,
    pub enabled: bool,
    pub one_shot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Fields accepted by `Scheduler::create`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    pub cron: String,
    pub action: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub one_shot: bool,
}

fn default_true() -> bool {
    true
}
