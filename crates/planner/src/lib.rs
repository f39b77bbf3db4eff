//! Planner: decomposes goals into dependency-ordered steps, executes them
//! one conversation at a time, and replans on demand (spec §4.G).

mod parsing;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use sa_domain::config::PlannerConfig;
use sa_domain::error::{Error, Result};
use sa_domain::plan::{Plan, PlanStatus, PlanStep};
use sa_domain::trace::TraceEvent;

/// Minimal LLM surface the planner needs.
#[async_trait::async_trait]
pub trait PlanningModel: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String>;
}

/// Runs one plan step as its own conversation, returning the final text or
/// an error message. Implemented by whatever owns the agent loop factory.
#[async_trait::async_trait]
pub trait StepExecutor: Send + Sync {
    async fn run_step(&self, conversation_id: &str, prompt: String) -> std::result::Result<String, String>;
}

const CREATE_PLAN_SYSTEM_PROMPT: &str = "Decompose the goal into an ordered JSON array of steps. \
Each element has \"description\" (string), optional \"dependsOn\" (array of 0-based indices into \
this same array), and optional \"toolHint\" (string). Respond with JSON only, no prose, no \
markdown fences.";

const REPLAN_SYSTEM_PROMPT: &str = "Given the plan's progress so far and a reason to replan, \
produce a JSON array of the remaining steps needed to complete the goal, in the same format as \
plan creation: \"description\", optional \"dependsOn\" (indices into this new array), optional \
\"toolHint\". Respond with JSON only.";

pub struct Planner {
    config: PlannerConfig,
    path: PathBuf,
    plans: RwLock<HashMap<String, Plan>>,
    model: Arc<dyn PlanningModel>,
    executor: Arc<dyn StepExecutor>,
}

impl Planner {
    pub fn open(
        config: PlannerConfig,
        state_dir: &std::path::Path,
        model: Arc<dyn PlanningModel>,
        executor: Arc<dyn StepExecutor>,
    ) -> Result<Self> {
        std::fs::create_dir_all(state_dir).map_err(Error::Io)?;
        let path = state_dir.join("plans.json");

        let plans = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            let list: Vec<Plan> = serde_json::from_str(&raw).unwrap_or_default();
            list.into_iter().map(|p| (p.id.clone(), p)).collect()
        } else {
            HashMap::new()
        };

        Ok(Self {
            config,
            path,
            plans: RwLock::new(plans),
            model,
            executor,
        })
    }

    fn persist(&self) -> Result<()> {
        let plans: Vec<Plan> = self.plans.read().values().cloned().collect();
        let json = serde_json::to_string_pretty(&plans)
            .map_err(|e| Error::Planner(format!("serializing plans: {e}")))?;
        std::fs::write(&self.path, json).map_err(Error::Io)
    }

    pub fn get(&self, plan_id: &str) -> Option<Plan> {
        self.plans.read().get(plan_id).cloned()
    }

    pub fn list(&self, status: Option<PlanStatus>) -> Vec<Plan> {
        self.plans
            .read()
            .values()
            .filter(|p| status.map(|s| p.status == s).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub async fn create_plan(&self, goal: &str, context: Option<&str>) -> Result<Plan> {
        let user_prompt = match context {
            Some(c) => format!("Goal: {goal}\n\nContext:\n{c}"),
            None => format!("Goal: {goal}"),
        };

        let raw = self
            .model
            .complete(CREATE_PLAN_SYSTEM_PROMPT, &user_prompt)
            .await
            .map_err(|e| Error::Planner(format!("createPlan LLM call failed: {e}")))?;

        let mut steps = parsing::parse_steps(&raw);
        if steps.len() > self.config.max_plan_steps {
            tracing::warn!(
                proposed = steps.len(),
                cap = self.config.max_plan_steps,
                "createPlan response exceeded max_plan_steps, truncating"
            );
            steps.truncate(self.config.max_plan_steps);
        }
        let plan = Plan {
            id: Uuid::new_v4().to_string(),
            goal: goal.to_owned(),
            status: PlanStatus::Pending,
            steps,
            created_at: Utc::now(),
            completed_at: None,
            result: None,
        };

        self.plans.write().insert(plan.id.clone(), plan.clone());
        self.persist()?;

        TraceEvent::PlanCreated {
            plan_id: plan.id.clone(),
            step_count: plan.steps.len(),
        }
        .emit();

        Ok(plan)
    }

    /// Runs every currently-runnable step sequentially and returns the steps
    /// that were executed this call (possibly empty once the plan is terminal).
    pub async fn execute_next(&self, plan_id: &str) -> Result<Vec<PlanStep>> {
        let runnable_ids: Vec<String> = {
            let mut plans = self.plans.write();
            let plan = plans
                .get_mut(plan_id)
                .ok_or_else(|| Error::Planner(format!("plan not found: {plan_id}")))?;
            let ids: Vec<String> = plan.runnable_steps().into_iter().map(|s| s.id.clone()).collect();
            for step in plan.steps.iter_mut() {
                if ids.contains(&step.id) {
                    step.status = PlanStatus::Active;
                }
            }
            ids
        };

        let mut executed = Vec::with_capacity(runnable_ids.len());

        for step_id in runnable_ids {
            let (goal, description, tool_hint, dependency_results) = {
                let plans = self.plans.read();
                let plan = plans.get(plan_id).expect("plan exists for in-flight step");
                let step = plan.steps.iter().find(|s| s.id == step_id).expect("step exists");
                let deps: Vec<String> = step
                    .depends_on
                    .iter()
                    .filter_map(|dep_id| {
                        plan.steps
                            .iter()
                            .find(|s| &s.id == dep_id)
                            .and_then(|s| s.result.clone())
                    })
                    .collect();
                (plan.goal.clone(), step.description.clone(), step.tool_hint.clone(), deps)
            };

            let mut prompt = format!("Overall goal: {goal}\n\nYour step: {description}");
            if let Some(hint) = &tool_hint {
                prompt.push_str(&format!("\n\nSuggested tool: {hint}"));
            }
            if !dependency_results.is_empty() {
                prompt.push_str("\n\nResults from dependency steps:\n");
                for r in &dependency_results {
                    prompt.push_str(&format!("- {r}\n"));
                }
            }

            let conversation_id = format!("{plan_id}-{step_id}");
            let outcome = self.executor.run_step(&conversation_id, prompt).await;

            let mut plans = self.plans.write();
            let plan = plans.get_mut(plan_id).expect("plan exists for in-flight step");
            let step = plan.steps.iter_mut().find(|s| s.id == step_id).expect("step exists");
            let ok = match outcome {
                Ok(text) => {
                    step.result = Some(text);
                    step.status = PlanStatus::Completed;
                    true
                }
                Err(err) => {
                    step.error = Some(err);
                    step.status = PlanStatus::Failed;
                    false
                }
            };
            executed.push(step.clone());

            TraceEvent::PlanStepExecuted {
                plan_id: plan_id.to_owned(),
                step_id: step_id.clone(),
                ok,
            }
            .emit();

            plan.recompute_status();
        }

        self.persist()?;
        Ok(executed)
    }

    pub async fn replan(&self, plan_id: &str, reason: &str) -> Result<Plan> {
        let summary = {
            let plans = self.plans.read();
            let plan = plans
                .get(plan_id)
                .ok_or_else(|| Error::Planner(format!("plan not found: {plan_id}")))?;
            summarize_plan(plan, reason)
        };

        let raw = self
            .model
            .complete(REPLAN_SYSTEM_PROMPT, &summary)
            .await
            .map_err(|e| Error::Planner(format!("replan LLM call failed: {e}")))?;
        let new_steps = parsing::parse_steps(&raw);

        let mut plans = self.plans.write();
        let plan = plans
            .get_mut(plan_id)
            .ok_or_else(|| Error::Planner(format!("plan not found: {plan_id}")))?;
        plan.steps.retain(|s| s.status.is_terminal());
        plan.steps.extend(new_steps);
        plan.recompute_status();
        let snapshot = plan.clone();
        drop(plans);
        self.persist()?;
        Ok(snapshot)
    }

    pub fn cancel(&self, plan_id: &str) -> Result<Option<Plan>> {
        let mut plans = self.plans.write();
        let Some(plan) = plans.get_mut(plan_id) else {
            return Ok(None);
        };
        for step in plan.steps.iter_mut() {
            if !step.status.is_terminal() {
                step.status = PlanStatus::Cancelled;
            }
        }
        plan.status = PlanStatus::Cancelled;
        plan.completed_at = Some(Utc::now());
        let snapshot = plan.clone();
        drop(plans);
        self.persist()?;
        Ok(Some(snapshot))
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }
}

fn summarize_plan(plan: &Plan, reason: &str) -> String {
    let mut out = format!("Goal: {}\nReplan reason: {reason}\n\nSteps so far:\n", plan.goal);
    for step in &plan.steps {
        let status = match step.status {
            PlanStatus::Pending => "pending",
            PlanStatus::Active => "active",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
            PlanStatus::Cancelled => "cancelled",
        };
        out.push_str(&format!("- [{status}] {}", step.description));
        if let Some(result) = &step.result {
            out.push_str(&format!(" (result: {result})"));
        }
        if let Some(error) = &step.error {
            out.push_str(&format!(" (error: {error})"));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedModel(String);

    #[async_trait::async_trait]
    impl PlanningModel for FixedModel {
        async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    struct EchoExecutor {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl StepExecutor for EchoExecutor {
        async fn run_step(&self, _conversation_id: &str, prompt: String) -> std::result::Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("done: {prompt}"))
        }
    }

    fn tmp_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("sa-planner-test-{}", Uuid::new_v4()));
        dir
    }

    #[tokio::test]
    async fn create_plan_builds_dependency_chain() {
        let raw = r#"[
            {"description": "foundation", "dependsOn": []},
            {"description": "walls", "dependsOn": [0]},
            {"description": "roof", "dependsOn": [1]}
        ]"#;
        let planner = Planner::open(
            PlannerConfig::default(),
            &tmp_dir(),
            Arc::new(FixedModel(raw.to_owned())),
            Arc::new(EchoExecutor { calls: AtomicUsize::new(0) }),
        )
        .unwrap();

        let plan = planner.create_plan("build a house", None).await.unwrap();
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.status, PlanStatus::Pending);
    }

    #[tokio::test]
    async fn execute_next_runs_only_ready_steps_in_order() {
        let raw = r#"[
            {"description": "foundation", "dependsOn": []},
            {"description": "walls", "dependsOn": [0]},
            {"description": "roof", "dependsOn": [1]}
        ]"#;
        let planner = Planner::open(
            PlannerConfig::default(),
            &tmp_dir(),
            Arc::new(FixedModel(raw.to_owned())),
            Arc::new(EchoExecutor { calls: AtomicUsize::new(0) }),
        )
        .unwrap();
        let plan = planner.create_plan("build a house", None).await.unwrap();

        let first = planner.execute_next(&plan.id).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].description, "foundation");

        let second = planner.execute_next(&plan.id).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].description, "walls");

        let third = planner.execute_next(&plan.id).await.unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].description, "roof");

        let fourth = planner.execute_next(&plan.id).await.unwrap();
        assert!(fourth.is_empty());

        let plan = planner.get(&plan.id).unwrap();
        assert_eq!(plan.status, PlanStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_marks_nonterminal_steps_cancelled() {
        let raw = r#"[{"description": "only step"}]"#;
        let planner = Planner::open(
            PlannerConfig::default(),
            &tmp_dir(),
            Arc::new(FixedModel(raw.to_owned())),
            Arc::new(EchoExecutor { calls: AtomicUsize::new(0) }),
        )
        .unwrap();
        let plan = planner.create_plan("goal", None).await.unwrap();
        let cancelled = planner.cancel(&plan.id).unwrap().unwrap();
        assert_eq!(cancelled.status, PlanStatus::Cancelled);
        assert!(cancelled.steps.iter().all(|s| s.status == PlanStatus::Cancelled));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let raw = r#"[{"description": "only step"}]"#;
        let planner = Planner::open(
            PlannerConfig::default(),
            &tmp_dir(),
            Arc::new(FixedModel(raw.to_owned())),
            Arc::new(EchoExecutor { calls: AtomicUsize::new(0) }),
        )
        .unwrap();
        planner.create_plan("goal a", None).await.unwrap();
        let plan_b = planner.create_plan("goal b", None).await.unwrap();
        planner.cancel(&plan_b.id).unwrap();

        assert_eq!(planner.list(Some(PlanStatus::Pending)).len(), 1);
        assert_eq!(planner.list(Some(PlanStatus::Cancelled)).len(), 1);
        assert_eq!(planner.list(None).len(), 2);
    }
}
