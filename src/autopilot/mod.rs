//! AutopilotLoop: plan, execute, evaluate until the goal is reached.
//!
//! Each run walks `Planning -> Executing -> Evaluating` and back to
//! `Planning`, stopping on the `success` action, on an exhausted attempt
//! budget, or on the first unrecoverable error. Steps are strictly
//! sequential; only captures and hashing inside a step fan out.
//!
//! Code for a planned action comes from the [`SnapshotCache`] when the
//! current screen matches an earlier one, otherwise from the planner. Fresh
//! code is appended to the cache only after it ran successfully.

pub mod report;

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::cache::{BucketKey, CacheEntry, SnapshotCache};
use crate::config::{self, CacheMode, ExecutionFailurePolicy};
use crate::driver::{FrameworkDriver, capture_snapshot};
use crate::error::{AutopilotError, AutopilotFailure};
use crate::executor::{ActionContext, ActionExecutor, SharedContext};
use crate::hash::{SnapshotFingerprint, SnapshotHasher};
use crate::planner::{PreviousStep, Planner, StepPlan};
use crate::snapshot::Snapshot;

pub use report::{AutopilotReport, AutopilotStepReport, PlanReport};

/// Loop settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutopilotConfig {
    pub max_attempts: usize,
    pub similarity_threshold: f64,
    pub cache_mode: CacheMode,
    pub on_execution_failure: ExecutionFailurePolicy,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        let cfg = &config::get().autopilot;
        Self {
            max_attempts: cfg.max_attempts,
            similarity_threshold: cfg.similarity_threshold,
            cache_mode: cfg.cache_mode,
            on_execution_failure: cfg.on_execution_failure,
        }
    }
}

impl AutopilotConfig {
    /// At least one attempt is always allowed
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn on_execution_failure(mut self, policy: ExecutionFailurePolicy) -> Self {
        self.on_execution_failure = policy;
        self
    }
}

/// Where a run currently is
enum Phase {
    Planning,
    Executing { plan: StepPlan, snapshot: Snapshot },
    Evaluating,
    Done,
}

/// State owned by one run and dropped with it
struct Run {
    goal: String,
    report: AutopilotReport,
    history: Vec<PreviousStep>,
    shared: SharedContext,
    context: ActionContext,
    attempts_left: usize,
}

/// Drives a [`FrameworkDriver`] toward a goal using a [`Planner`].
pub struct Autopilot<P, D> {
    planner: P,
    driver: D,
    hasher: SnapshotHasher,
    executor: ActionExecutor,
    cache: SnapshotCache,
    config: AutopilotConfig,
}

impl<P: Planner, D: FrameworkDriver> Autopilot<P, D> {
    pub fn new(planner: P, driver: D) -> Self {
        Self {
            planner,
            driver,
            hasher: SnapshotHasher::default(),
            executor: ActionExecutor::new(),
            cache: SnapshotCache::new(),
            config: AutopilotConfig::default(),
        }
    }

    pub fn config(mut self, config: AutopilotConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache(mut self, cache: SnapshotCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn hasher(mut self, hasher: SnapshotHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn snapshot_cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn snapshot_cache_mut(&mut self) -> &mut SnapshotCache {
        &mut self.cache
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    /// Run until `goal` is reached.
    ///
    /// History and shared context start empty on every call. On failure the
    /// returned [`AutopilotFailure`] holds the report up to the failing step.
    pub async fn run(&mut self, goal: &str) -> Result<AutopilotReport, AutopilotFailure> {
        let mut run = Run {
            goal: goal.to_string(),
            report: AutopilotReport::new(goal),
            history: Vec::new(),
            shared: SharedContext::new(),
            context: self.driver.action_context(),
            attempts_left: self.config.max_attempts.max(1),
        };
        info!(goal, max_attempts = run.attempts_left, cache = ?self.config.cache_mode, "autopilot run started");

        let outcome = self.drive(&mut run).await;
        let flushed = self.cache.flush();

        match (outcome, flushed) {
            (Ok(()), Ok(())) => {
                info!(goal, steps = run.report.steps.len(), "goal achieved");
                Ok(run.report)
            }
            (Ok(()), Err(e)) => {
                error!(goal, error = %e, "failed to persist snapshot cache");
                Err(AutopilotFailure::new(run.report, e.into()))
            }
            (Err(e), flushed) => {
                if let Err(flush_err) = flushed {
                    warn!(error = %flush_err, "failed to persist snapshot cache");
                }
                error!(goal, steps = run.report.steps.len(), error = %e, "autopilot run failed");
                Err(AutopilotFailure::new(run.report, e))
            }
        }
    }

    async fn drive(&mut self, run: &mut Run) -> Result<(), AutopilotError> {
        let mut phase = Phase::Planning;
        loop {
            phase = match phase {
                Phase::Planning => self.plan(run).await?,
                Phase::Executing { plan, snapshot } => {
                    self.execute(run, plan, snapshot).await?;
                    Phase::Evaluating
                }
                Phase::Evaluating => {
                    run.attempts_left -= 1;
                    if run.attempts_left == 0 {
                        return Err(AutopilotError::AttemptBudgetExhausted {
                            attempts: self.config.max_attempts.max(1),
                        });
                    }
                    Phase::Planning
                }
                Phase::Done => return Ok(()),
            };
        }
    }

    async fn plan(&self, run: &mut Run) -> Result<Phase, AutopilotError> {
        let snapshot = capture_snapshot(&self.driver).await?;
        debug!(snapshot = %snapshot.describe(), attempts_left = run.attempts_left, "captured snapshot");

        let plan = self
            .planner
            .plan_next(&run.goal, &snapshot.view_hierarchy, snapshot.image(), &run.history)
            .await
            .inspect_err(|e| error!(error = %e, snapshot = %snapshot.describe(), "planning failed"))?;

        if plan.is_success() {
            let mut step = AutopilotStepReport::planned(&plan);
            step.goal_achieved = true;
            step.summary = Some(plan.thoughts.clone());
            run.report.steps.push(step);
            run.report.summary = Some(plan.thoughts);
            run.report.goal_achieved = true;
            return Ok(Phase::Done);
        }

        info!(action = %plan.action, attempt = self.attempt(run), "planned step");
        Ok(Phase::Executing { plan, snapshot })
    }

    async fn execute(&mut self, run: &mut Run, plan: StepPlan, snapshot: Snapshot) -> Result<(), AutopilotError> {
        // in the report before any fallible call
        let index = run.report.steps.len();
        run.report.steps.push(AutopilotStepReport::planned(&plan));

        let key = BucketKey::for_step(&plan.action, run.history.len());
        let fingerprint = self.fingerprint(&snapshot).await?;

        let cached = if self.config.cache_mode.reads() {
            self.cache
                .lookup(&key, fingerprint.as_ref(), Some(self.config.similarity_threshold))
                .map(|entry| entry.generated_code.clone())
        } else {
            None
        };

        let from_cache = cached.is_some();
        let code = match cached {
            Some(code) => {
                info!(bucket = %key, action = %plan.action, "using cached code");
                code
            }
            None => {
                self.planner
                    .generate_code(
                        &plan.action,
                        &snapshot.view_hierarchy,
                        snapshot.image(),
                        &run.history,
                        &self.driver.api_catalog(),
                    )
                    .await
                    .inspect_err(|e| error!(error = %e, action = %plan.action, "code generation failed"))?
                    .code
            }
        };

        let step = &mut run.report.steps[index];
        step.code = Some(code.clone());
        step.from_cache = from_cache;
        if from_cache {
            step.cache_bucket = Some(key.to_string());
        }

        match self.executor.execute(&code, &run.context, &mut run.shared).await {
            Ok(outcome) => {
                run.report.steps[index].result = Some(outcome.result.clone());
                run.history.push(PreviousStep {
                    step: plan.action,
                    code: outcome.code,
                    result: outcome.result,
                });

                if !from_cache && self.config.cache_mode.writes() {
                    if let Some(fingerprint) = fingerprint {
                        self.cache.append(
                            key,
                            CacheEntry {
                                fingerprint,
                                view_hierarchy: snapshot.view_hierarchy,
                                generated_code: code,
                            },
                        );
                    }
                }
                Ok(())
            }
            Err(e) => {
                error!(
                    attempt = self.attempt(run),
                    action = %plan.action,
                    snapshot = %snapshot.describe(),
                    error = %e.message,
                    "step execution failed"
                );
                if from_cache {
                    warn!(
                        bucket = %key,
                        step = %plan.action,
                        position = run.history.len(),
                        "cached code failed; `cache clear --step <step> --position <position>` drops the stale entry"
                    );
                }
                let failure = json!({ "error": e.message });
                run.report.steps[index].result = Some(failure.clone());

                match self.config.on_execution_failure {
                    ExecutionFailurePolicy::Fatal => Err(e.into()),
                    ExecutionFailurePolicy::ConsumeAttempt => {
                        run.history.push(PreviousStep {
                            step: plan.action,
                            code,
                            result: failure,
                        });
                        Ok(())
                    }
                }
            }
        }
    }

    /// Fingerprint of the screenshot, when the cache is in use and there is one
    async fn fingerprint(&self, snapshot: &Snapshot) -> Result<Option<SnapshotFingerprint>, AutopilotError> {
        if self.config.cache_mode == CacheMode::Disabled {
            return Ok(None);
        }
        let Some(path) = snapshot.image() else {
            return Ok(None);
        };
        let fingerprint = self
            .hasher
            .hash(path)
            .await
            .inspect_err(|e| error!(error = %e, path = %path.display(), "failed to fingerprint snapshot"))?;
        Ok(Some(fingerprint))
    }

    fn attempt(&self, run: &Run) -> usize {
        self.config.max_attempts.max(1) - run.attempts_left + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockScreen};
    use crate::error::PlanningError;
    use crate::planner::GeneratedCode;
    use async_trait::async_trait;
    use std::path::Path;

    /// Always declares success
    struct DonePlanner;

    #[async_trait]
    impl Planner for DonePlanner {
        async fn plan_next(
            &self,
            _goal: &str,
            _view_hierarchy: &str,
            _image: Option<&Path>,
            _previous: &[PreviousStep],
        ) -> Result<StepPlan, PlanningError> {
            Ok(StepPlan::new("nothing left to do", "success"))
        }

        async fn generate_code(
            &self,
            _step: &str,
            _view_hierarchy: &str,
            _image: Option<&Path>,
            _previous: &[PreviousStep],
            _catalog: &crate::driver::ApiCatalog,
        ) -> Result<GeneratedCode, PlanningError> {
            unreachable!("success is never executed")
        }
    }

    fn config() -> AutopilotConfig {
        AutopilotConfig {
            max_attempts: 3,
            similarity_threshold: 0.1,
            cache_mode: CacheMode::Disabled,
            on_execution_failure: ExecutionFailurePolicy::Fatal,
        }
    }

    #[tokio::test]
    async fn test_success_first_call_makes_single_step_report() {
        let driver = MockDriver::new("home", MockScreen::labelled([0, 0, 0], &["Login"]), None);
        let mut autopilot = Autopilot::new(DonePlanner, driver).config(config());
        let report = autopilot.run("tap login").await.unwrap();
        assert!(report.goal_achieved);
        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.summary.as_deref(), Some("nothing left to do"));
        assert_eq!(report.executed_steps(), 0);
        assert!(autopilot.driver().taps().is_empty());
    }

    #[test]
    fn test_config_builder_clamps() {
        let cfg = config().max_attempts(0).similarity_threshold(3.0);
        assert_eq!(cfg.max_attempts, 1);
        assert_eq!(cfg.similarity_threshold, 1.0);
    }
}
