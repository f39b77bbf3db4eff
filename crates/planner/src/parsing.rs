//! Parsing of LLM-proposed step arrays, shared by `createPlan` and `replan`.

use serde::Deserialize;
use uuid::Uuid;

use sa_domain::plan::{PlanStatus, PlanStep};

#[derive(Debug, Deserialize)]
struct RawStep {
    description: String,
    #[serde(default, rename = "dependsOn")]
    depends_on: Vec<usize>,
    #[serde(default, rename = "toolHint")]
    tool_hint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStepsObject {
    steps: Vec<RawStep>,
}

fn strip_markdown_fence(text: &str) -> &str {
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

fn raw_steps_to_plan_steps(raw: Vec<RawStep>) -> Vec<PlanStep> {
    let ids: Vec<String> = raw.iter().map(|_| Uuid::new_v4().to_string()).collect();
    raw.into_iter()
        .enumerate()
        .map(|(i, r)| PlanStep {
            id: ids[i].clone(),
            description: r.description,
            status: PlanStatus::Pending,
            depends_on: r
                .depends_on
                .iter()
                .filter_map(|idx| ids.get(*idx).cloned())
                .collect(),
            tool_hint: r.tool_hint,
            result: None,
            error: None,
        })
        .collect()
}

/// Parse an LLM response into plan steps. Tries a bare JSON array, then an
/// object with a `steps` key, then falls back to a single step built from
/// the raw text when nothing parses.
pub fn parse_steps(raw: &str) -> Vec<PlanStep> {
    let cleaned = strip_markdown_fence(raw.trim());

    if let Ok(steps) = serde_json::from_str::<Vec<RawStep>>(cleaned) {
        return raw_steps_to_plan_steps(steps);
    }
    if let Ok(obj) = serde_json::from_str::<RawStepsObject>(cleaned) {
        return raw_steps_to_plan_steps(obj.steps);
    }

    vec![PlanStep {
        id: Uuid::new_v4().to_string(),
        description: cleaned.to_owned(),
        status: PlanStatus::Pending,
        depends_on: Vec::new(),
        tool_hint: None,
        result: None,
        error: None,
    }]
}
