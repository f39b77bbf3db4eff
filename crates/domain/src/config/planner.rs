use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Temperature used for `createPlan` and `replan` LLM calls.
    #[serde(default = "d_temperature")]
    pub create_temperature: f32,
    /// Hard cap on the number of steps accepted from a single `createPlan` response.
    #[serde(default = "d_max_steps")]
    pub max_plan_steps: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            create_temperature: d_temperature(),
            max_plan_steps: d_max_steps(),
        }
    }
}

fn d_temperature() -> f32 {
    0.3
}
fn d_max_steps() -> usize {
    50
}
