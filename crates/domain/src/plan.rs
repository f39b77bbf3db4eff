//! Planner DAG types, shared between `sa-planner` and its callers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    pub status: PlanStatus,
    /// Step ids this step depends on.
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub goal: String,
    pub status: PlanStatus,
    pub steps: Vec<PlanStep>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl Plan {
    /// Steps whose dependencies are all completed and which are themselves pending.
    pub fn runnable_steps(&self) -> Vec<&PlanStep> {
        self.steps
            .iter()
            .filter(|s| s.status == PlanStatus::Pending)
            .filter(|s| {
                s.depends_on.iter().all(|dep_id| {
                    self.steps
                        .iter()
                        .find(|d| &d.id == dep_id)
                        .map(|d| d.status == PlanStatus::Completed)
                        .unwrap_or(false)
                })
            })
            .collect()
    }

    /// Recompute `status` from step statuses. Mirrors spec testable property 5.
    pub fn recompute_status(&mut self) {
        if self.steps.iter().all(|s| s.status.is_terminal()) {
            if self.steps.iter().any(|s| s.status == PlanStatus::Failed) {
                self.status = PlanStatus::Failed;
            } else if self
                .steps
                .iter()
                .all(|s| s.status == PlanStatus::Cancelled)
            {
                self.status = PlanStatus::Cancelled;
            } else {
                self.status = PlanStatus::Completed;
            }
            if self.completed_at.is_none() {
                self.completed_at = Some(chrono::Utc::now());
            }
        } else {
            self.status = PlanStatus::Active;
        }
    }
}
