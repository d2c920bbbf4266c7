//! Framework driver contract.
//!
//! A driver is the execution engine under test automation (Detox,
//! Playwright, Appium, ...). The autopilot needs three things from it: a way
//! to capture the current screen, a catalog describing its callable actions
//! for the prompt, and the binding table those actions run through.

pub mod mock;

use std::fmt::Write as _;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::executor::ActionContext;
use crate::snapshot::Snapshot;

pub use mock::{MockDriver, MockScreen};

/// Source of UI state captures.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Save a screenshot and return its path, or `None` if the driver has no display
    async fn capture_visual_snapshot(&self) -> Result<Option<PathBuf>, DriverError>;

    /// Serialize the current view hierarchy
    async fn capture_view_hierarchy(&self) -> Result<String, DriverError>;
}

/// A testing framework the autopilot can drive.
pub trait FrameworkDriver: SnapshotSource {
    fn api_catalog(&self) -> ApiCatalog;

    fn action_context(&self) -> ActionContext;
}

/// Capture screenshot and hierarchy concurrently and join them into a [`Snapshot`]
pub async fn capture_snapshot<S: SnapshotSource + ?Sized>(source: &S) -> Result<Snapshot, DriverError> {
    let (image, hierarchy) = tokio::try_join!(source.capture_visual_snapshot(), source.capture_view_hierarchy())?;
    Ok(Snapshot::new(image, hierarchy))
}

/// Description of one callable framework action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMethod {
    pub signature: String,
    pub description: String,
    pub example: String,
    #[serde(default)]
    pub guidelines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCategory {
    pub title: String,
    pub items: Vec<ApiMethod>,
}

/// Everything the model needs to know to write code for a framework
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApiCatalog {
    pub name: String,
    pub description: String,
    pub categories: Vec<ApiCategory>,
}

impl ApiCatalog {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            categories: Vec::new(),
        }
    }

    pub fn category(mut self, title: impl Into<String>, items: Vec<ApiMethod>) -> Self {
        self.categories.push(ApiCategory {
            title: title.into(),
            items,
        });
        self
    }

    /// Markdown rendering used inside code-generation prompts
    pub fn render(&self) -> String {
        let mut out = format!("## {}\n\n{}\n", self.name, self.description);
        for category in &self.categories {
            let _ = write!(out, "\n### {}\n", category.title);
            for item in &category.items {
                let _ = write!(out, "\n#### `{}`\n{}\nExample:\n```json\n{}\n```\n", item.signature, item.description, item.example);
                for guideline in &item.guidelines {
                    let _ = writeln!(out, "- {}", guideline);
                }
            }
        }
        out
    }
}

impl ApiMethod {
    pub fn new(signature: impl Into<String>, description: impl Into<String>, example: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            description: description.into(),
            example: example.into(),
            guidelines: Vec::new(),
        }
    }

    pub fn guideline(mut self, text: impl Into<String>) -> Self {
        self.guidelines.push(text.into());
        self
    }
}
