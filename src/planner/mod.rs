//! StepPlanner: turns goal, screen and history into the next action.
//!
//! Two calls reach the model. [`Planner::plan_next`] picks the next action
//! (or declares success). [`Planner::generate_code`] turns an action into an
//! action script using the driver's API catalog. Responses are parsed by
//! tagged section; a missing required section fails the call, there is no
//! partial parse.

pub mod outputs;
pub mod prompt;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::driver::ApiCatalog;
use crate::error::PlanningError;
use crate::vlm::ModelClient;

pub use outputs::{NOT_AVAILABLE, OutputSpec, extract_code_block, extract_outputs, extract_tag};

/// Reserved action meaning the goal has been reached
pub const SUCCESS_ACTION: &str = "success";

const PLAN_OUTPUTS: &[OutputSpec] = &[
    OutputSpec::optional("screen_description", "SCREEN_DESCRIPTION"),
    OutputSpec::required("thoughts", "THOUGHTS"),
    OutputSpec::required("action", "ACTION"),
    OutputSpec::optional("review", "REVIEW"),
];

const CODE_OUTPUTS: &[OutputSpec] = &[
    OutputSpec::optional("plan", "PLAN"),
    OutputSpec::required("code", "CODE"),
    OutputSpec::optional("review", "REVIEW"),
];

/// The model's decision for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPlan {
    pub thoughts: String,
    pub action: String,
    #[serde(skip)]
    pub screen_description: Option<String>,
    #[serde(skip)]
    pub review: Option<String>,
}

impl StepPlan {
    pub fn new(thoughts: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            thoughts: thoughts.into(),
            action: action.into(),
            screen_description: None,
            review: None,
        }
    }

    /// True for the reserved `success` action, which is never executed
    pub fn is_success(&self) -> bool {
        self.action.trim().eq_ignore_ascii_case(SUCCESS_ACTION)
    }
}

/// Code the model wrote for one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    pub plan: Option<String>,
    pub code: String,
    pub review: Option<String>,
}

/// One executed step, fed back into later prompts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviousStep {
    pub step: String,
    pub code: String,
    pub result: Value,
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Decide the next action toward `goal`
    async fn plan_next(
        &self,
        goal: &str,
        view_hierarchy: &str,
        image: Option<&Path>,
        previous: &[PreviousStep],
    ) -> Result<StepPlan, PlanningError>;

    /// Write code that performs `step`
    async fn generate_code(
        &self,
        step: &str,
        view_hierarchy: &str,
        image: Option<&Path>,
        previous: &[PreviousStep],
        catalog: &ApiCatalog,
    ) -> Result<GeneratedCode, PlanningError>;
}

/// [`Planner`] backed by a [`ModelClient`]
#[derive(Debug, Clone)]
pub struct StepPlanner<M> {
    model: M,
}

impl<M: ModelClient> StepPlanner<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Only forward the image when the model can see it
    fn attachable<'a>(&self, image: Option<&'a Path>) -> Option<&'a Path> {
        image.filter(|_| self.model.supports_image_input())
    }
}

#[async_trait]
impl<M: ModelClient> Planner for StepPlanner<M> {
    async fn plan_next(
        &self,
        goal: &str,
        view_hierarchy: &str,
        image: Option<&Path>,
        previous: &[PreviousStep],
    ) -> Result<StepPlan, PlanningError> {
        let image = self.attachable(image);
        let text = prompt::plan_next(goal, view_hierarchy, image.is_some(), previous);
        let response = self.model.run_prompt(&text, image).await?;
        let mut out = extract_outputs(&response, PLAN_OUTPUTS)?;
        let mut take = |key: &str| out.remove(key).unwrap_or_default();

        let plan = StepPlan {
            thoughts: take("thoughts"),
            action: take("action"),
            screen_description: outputs::optional(take("screen_description")),
            review: outputs::optional(take("review")),
        };
        debug!(action = %plan.action, history = previous.len(), "planned next step");
        Ok(plan)
    }

    async fn generate_code(
        &self,
        step: &str,
        view_hierarchy: &str,
        image: Option<&Path>,
        previous: &[PreviousStep],
        catalog: &ApiCatalog,
    ) -> Result<GeneratedCode, PlanningError> {
        let image = self.attachable(image);
        let text = prompt::generate_code(step, view_hierarchy, image.is_some(), previous, catalog);
        let response = self.model.run_prompt(&text, image).await?;
        let mut out = extract_outputs(&response, CODE_OUTPUTS)?;
        let mut take = |key: &str| out.remove(key).unwrap_or_default();

        let code = take("code");
        let generated = GeneratedCode {
            plan: outputs::optional(take("plan")),
            code: extract_code_block(&code).to_string(),
            review: outputs::optional(take("review")),
        };
        debug!(step, bytes = generated.code.len(), "generated code");
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Returns canned replies and records what it was sent
    struct CannedModel {
        replies: Mutex<Vec<String>>,
        images: bool,
        seen: Mutex<Vec<(String, Option<PathBuf>)>>,
    }

    impl CannedModel {
        fn new(replies: &[&str], images: bool) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                images,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelClient for CannedModel {
        async fn run_prompt(&self, prompt: &str, image: Option<&Path>) -> Result<String, ModelError> {
            self.seen.lock().unwrap().push((prompt.to_string(), image.map(Path::to_path_buf)));
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ModelError::InvalidResponse("no more replies".into()))
        }

        fn supports_image_input(&self) -> bool {
            self.images
        }
    }

    #[tokio::test]
    async fn test_plan_next_parses_sections() {
        let model = CannedModel::new(
            &["<SCREEN_DESCRIPTION>home</SCREEN_DESCRIPTION><THOUGHTS>I should tap login</THOUGHTS><ACTION>tap Login</ACTION>"],
            false,
        );
        let planner = StepPlanner::new(model);
        let plan = planner.plan_next("sign in", "<root/>", None, &[]).await.unwrap();
        assert_eq!(plan.thoughts, "I should tap login");
        assert_eq!(plan.action, "tap Login");
        assert_eq!(plan.screen_description.as_deref(), Some("home"));
        assert_eq!(plan.review, None);
        assert!(!plan.is_success());
    }

    #[tokio::test]
    async fn test_plan_next_missing_action_fails() {
        let planner = StepPlanner::new(CannedModel::new(&["<THOUGHTS>thinking</THOUGHTS>"], false));
        let err = planner.plan_next("g", "<root/>", None, &[]).await.unwrap_err();
        match err {
            PlanningError::MissingOutput(e) => assert_eq!(e.tag, "ACTION"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_image_dropped_when_model_is_text_only() {
        let image = PathBuf::from("/tmp/screen.png");
        let planner = StepPlanner::new(CannedModel::new(&["<THOUGHTS>t</THOUGHTS><ACTION>success</ACTION>"], false));
        planner.plan_next("g", "<root/>", Some(&image), &[]).await.unwrap();
        let seen = planner.model().seen.lock().unwrap();
        assert_eq!(seen[0].1, None);
        assert!(seen[0].0.contains("No screenshot is available"));
    }

    #[tokio::test]
    async fn test_image_forwarded_when_supported() {
        let image = PathBuf::from("/tmp/screen.png");
        let planner = StepPlanner::new(CannedModel::new(&["<THOUGHTS>t</THOUGHTS><ACTION>success</ACTION>"], true));
        planner.plan_next("g", "<root/>", Some(&image), &[]).await.unwrap();
        assert_eq!(planner.model().seen.lock().unwrap()[0].1, Some(image));
    }

    #[tokio::test]
    async fn test_generate_code_unwraps_fence() {
        let reply = "<PLAN>tap it</PLAN><CODE>\n```json\n[{\"op\":\"call\",\"fn\":\"tap\",\"args\":[\"Login\"]}]\n```\n</CODE>";
        let planner = StepPlanner::new(CannedModel::new(&[reply], false));
        let generated = planner
            .generate_code("tap Login", "<root/>", None, &[], &ApiCatalog::default())
            .await
            .unwrap();
        assert_eq!(generated.code, r#"[{"op":"call","fn":"tap","args":["Login"]}]"#);
        assert_eq!(generated.plan.as_deref(), Some("tap it"));
        assert_eq!(generated.review, None);
    }

    #[test]
    fn test_success_sentinel_is_case_and_space_insensitive() {
        assert!(StepPlan::new("done", " Success\n").is_success());
        assert!(!StepPlan::new("done", "tap success banner").is_success());
    }
}
