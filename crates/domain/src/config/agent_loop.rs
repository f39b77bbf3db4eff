use serde::{Deserialize, Serialize};

/// Tuning knobs for the agent loop (spec §4.F / §5 / §9 open question #3:
/// the retryable-tool set is configuration, not a hard-coded constant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "d_max_tool_failures")]
    pub max_tool_failures: u32,
    #[serde(default = "d_max_consecutive_error_iterations")]
    pub max_consecutive_error_iterations: u32,
    #[serde(default = "d_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Extra attempts beyond the first, for tools in `retryable_tools`.
    #[serde(default = "d_retry_extra_attempts")]
    pub retry_extra_attempts: u32,
    #[serde(default = "d_retryable_tools")]
    pub retryable_tools: Vec<String>,
    /// History window fetched per context build (spec §4.E step 1: default 50).
    #[serde(default = "d_history_window")]
    pub history_window: usize,
    /// Turn count above which history gets compressed (spec §4.E `compressAfter`).
    #[serde(default = "d_compress_after")]
    pub compress_after: usize,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: d_max_iterations(),
            max_tool_failures: d_max_tool_failures(),
            max_consecutive_error_iterations: d_max_consecutive_error_iterations(),
            retry_base_delay_ms: d_retry_base_delay_ms(),
            retry_extra_attempts: d_retry_extra_attempts(),
            retryable_tools: d_retryable_tools(),
            history_window: d_history_window(),
            compress_after: d_compress_after(),
        }
    }
}

fn d_max_iterations() -> u32 {
    10
}
fn d_max_tool_failures() -> u32 {
    2
}
fn d_max_consecutive_error_iterations() -> u32 {
    3
}
fn d_retry_base_delay_ms() -> u64 {
    2000
}
fn d_retry_extra_attempts() -> u32 {
    2
}
fn d_retryable_tools() -> Vec<String> {
    vec!["http_request".into(), "web_fetch".into()]
}
fn d_history_window() -> usize {
    50
}
fn d_compress_after() -> usize {
    20
}
