//! Types for autopilot run results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::planner::StepPlan;

/// Plan recorded for a step: `{action, thoughts}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanReport {
    pub action: String,
    pub thoughts: String,
}

impl From<&StepPlan> for PlanReport {
    fn from(plan: &StepPlan) -> Self {
        Self {
            action: plan.action.clone(),
            thoughts: plan.thoughts.clone(),
        }
    }
}

/// One attempt of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotStepReport {
    /// What the model said the screen showed
    pub screen_description: String,

    pub plan: PlanReport,

    /// Code that ran for this step (absent for the final `success` step)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code: Option<String>,

    /// Value the code returned, or the error text when it failed
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,

    /// True when the code came from the snapshot cache
    #[serde(default)]
    pub from_cache: bool,

    /// Bucket the cached code was read from; `cache clear` takes the same step and position
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cache_bucket: Option<String>,

    pub goal_achieved: bool,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub review: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary: Option<String>,
}

impl AutopilotStepReport {
    pub fn planned(plan: &StepPlan) -> Self {
        Self {
            screen_description: plan
                .screen_description
                .clone()
                .unwrap_or_else(|| crate::planner::NOT_AVAILABLE.to_string()),
            plan: PlanReport::from(plan),
            code: None,
            result: None,
            from_cache: false,
            cache_bucket: None,
            goal_achieved: false,
            review: plan.review.clone(),
            summary: None,
        }
    }
}

/// Ordered record of a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotReport {
    pub goal: String,
    pub steps: Vec<AutopilotStepReport>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary: Option<String>,
    pub goal_achieved: bool,
}

impl AutopilotReport {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            steps: Vec::new(),
            summary: None,
            goal_achieved: false,
        }
    }

    /// Number of steps whose code actually ran
    pub fn executed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.code.is_some()).count()
    }

    pub fn cache_hits(&self) -> usize {
        self.steps.iter().filter(|s| s.from_cache).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_step_serializes_without_code() {
        let mut report = AutopilotReport::new("tap login button");
        let mut step = AutopilotStepReport::planned(&StepPlan::new("I should tap login", "success"));
        step.goal_achieved = true;
        step.summary = Some("I should tap login".into());
        report.steps.push(step);
        report.goal_achieved = true;

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["goal"], "tap login button");
        assert_eq!(value["goalAchieved"], true);
        let step = &value["steps"][0];
        assert_eq!(step["plan"], json!({ "action": "success", "thoughts": "I should tap login" }));
        assert_eq!(step["screenDescription"], "N/A");
        assert_eq!(step["goalAchieved"], true);
        assert!(step.get("code").is_none());
        assert_eq!(report.executed_steps(), 0);
    }
}
