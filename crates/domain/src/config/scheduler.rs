use serde::{Deserialize, Serialize};

/// Scheduler tick settings. The scheduler polls all enabled tasks on a fixed
/// interval rather than owning one OS timer per task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "d_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// IANA timezone used to evaluate cron expressions.
    #[serde(default = "d_timezone")]
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: d_poll_interval_ms(),
            timezone: d_timezone(),
        }
    }
}

fn d_poll_interval_ms() -> u64 {
    30_000
}

fn d_timezone() -> String {
    "UTC".into()
}
