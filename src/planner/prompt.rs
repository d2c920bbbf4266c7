//! Prompt assembly.

use std::fmt::Write as _;

use super::PreviousStep;
use crate::driver::ApiCatalog;

fn snapshot_note(image_attached: bool) -> &'static str {
    if image_attached {
        "A screenshot of the current screen is attached. Use it together with the view hierarchy."
    } else {
        "No screenshot is available. Rely on the view hierarchy alone."
    }
}

fn render_history(previous: &[PreviousStep]) -> String {
    if previous.is_empty() {
        return "No steps have been taken yet.".to_string();
    }
    let mut out = String::new();
    for (i, step) in previous.iter().enumerate() {
        let _ = write!(
            out,
            "{}. Step: {}\n   Code: {}\n   Result: {}\n",
            i + 1,
            step.step,
            step.code,
            step.result
        );
    }
    out
}

/// Prompt asking for the single next action toward `goal`
pub fn plan_next(goal: &str, view_hierarchy: &str, image_attached: bool, previous: &[PreviousStep]) -> String {
    format!(
        "You are driving a UI test toward a goal, one action at a time.\n\n\
         ## Goal\n{goal}\n\n\
         ## Current screen\n{note}\n\n\
         View hierarchy:\n```\n{view_hierarchy}\n```\n\n\
         ## Steps so far\n{history}\n\
         ## Instructions\n\
         Decide the next single action. If the goal is already achieved, the action must be exactly `success`.\n\
         Respond with these sections:\n\
         <SCREEN_DESCRIPTION>what the screen shows</SCREEN_DESCRIPTION>\n\
         <THOUGHTS>your reasoning</THOUGHTS>\n\
         <ACTION>the next action in plain language, or success</ACTION>\n\
         <REVIEW>how the previous step went</REVIEW>\n",
        note = snapshot_note(image_attached),
        history = render_history(previous),
    )
}

/// Prompt asking for executable code that performs `step`
pub fn generate_code(
    step: &str,
    view_hierarchy: &str,
    image_attached: bool,
    previous: &[PreviousStep],
    catalog: &ApiCatalog,
) -> String {
    format!(
        "You write test code for the framework described below.\n\n\
         {api}\n\
         ## Step to perform\n{step}\n\n\
         ## Current screen\n{note}\n\n\
         View hierarchy:\n```\n{view_hierarchy}\n```\n\n\
         ## Steps so far\n{history}\n\
         ## Instructions\n\
         Only call functions listed above. Values saved under `save_as` or `set` persist across steps \
         and can be read back as \"$shared.<key>\".\n\
         Respond with these sections:\n\
         <PLAN>how you will perform the step</PLAN>\n\
         <CODE>the code</CODE>\n\
         <REVIEW>anything that could go wrong</REVIEW>\n",
        api = catalog.render(),
        note = snapshot_note(image_attached),
        history = render_history(previous),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_prompt_embeds_goal_hierarchy_and_history() {
        let previous = vec![PreviousStep {
            step: "tap Login".into(),
            code: r#"[{"op":"call","fn":"tap","args":["Login"]}]"#.into(),
            result: json!({ "screen": "login" }),
        }];
        let prompt = plan_next("sign in", "<button label=\"Submit\"/>", true, &previous);
        assert!(prompt.contains("## Goal\nsign in"));
        assert!(prompt.contains("<button label=\"Submit\"/>"));
        assert!(prompt.contains("screenshot of the current screen is attached"));
        assert!(prompt.contains("1. Step: tap Login"));
        assert!(prompt.contains(r#"Result: {"screen":"login"}"#));
    }

    #[test]
    fn test_plan_prompt_without_image_or_history() {
        let prompt = plan_next("g", "<root/>", false, &[]);
        assert!(prompt.contains("No screenshot is available"));
        assert!(prompt.contains("No steps have been taken yet."));
    }

    #[test]
    fn test_code_prompt_includes_catalog() {
        let catalog = ApiCatalog::new("Mock driver", "fake");
        let prompt = generate_code("tap Login", "<root/>", false, &[], &catalog);
        assert!(prompt.contains("## Mock driver"));
        assert!(prompt.contains("## Step to perform\ntap Login"));
        assert!(prompt.contains("<CODE>"));
    }
}
