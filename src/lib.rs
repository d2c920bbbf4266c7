//! UI Autopilot - natural-language UI test automation.
//!
//! This crate provides:
//! - An autopilot loop that plans, executes and evaluates one action at a time
//! - A snapshot cache keyed by perceptual hashes so repeated runs skip the model
//! - A sandboxed interpreter for model-generated action scripts
//! - A chat-completions model client and a mock framework driver for testing
//!
//! # Example
//!
//! ```rust,no_run
//! use ui_autopilot::autopilot::Autopilot;
//! use ui_autopilot::driver::{MockDriver, MockScreen};
//! use ui_autopilot::planner::StepPlanner;
//! use ui_autopilot::vlm::{VlmClient, VlmConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let driver = MockDriver::new("home", MockScreen::labelled([20, 20, 80], &["Login"]), None);
//! let planner = StepPlanner::new(VlmClient::new(VlmConfig::default()));
//! let report = Autopilot::new(planner, driver).run("log in").await?;
//! println!("achieved: {}", report.goal_achieved);
//! # Ok(())
//! # }
//! ```

pub mod autopilot;
pub mod cache;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod hash;
pub mod planner;
pub mod session;
pub mod snapshot;
pub mod vlm;

// Re-export the loop and its report
pub use autopilot::{Autopilot, AutopilotConfig, AutopilotReport, AutopilotStepReport};

// Re-export cache and hashing types
pub use cache::{BucketKey, CacheEntry, CacheStore, JsonFileStore, SnapshotCache};
pub use hash::{HashAlgorithm, SnapshotFingerprint, SnapshotHasher, are_similar, distance, normalized_distance};

// Re-export execution and planning types
pub use executor::{ActionContext, ActionExecutor, ExecutionResult, SharedContext};
pub use planner::{Planner, PreviousStep, StepPlan, StepPlanner};

// Re-export driver and snapshot types
pub use driver::{ApiCatalog, FrameworkDriver, MockDriver, SnapshotSource};
pub use snapshot::{MockFramebuffer, Snapshot};

// Re-export errors
pub use error::{
    AutopilotError, AutopilotFailure, CodeEvaluationError, HashingError, MissingOutputError, ModelError,
};

// Re-export session management
pub use session::{Session, cleanup_old_sessions, list_sessions};

// Re-export VLM client
pub use vlm::{ModelClient, VlmClient, VlmConfig, VlmProgress, VlmResult, check_health};
