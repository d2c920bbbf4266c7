//! In-process driver over a scripted set of screens.
//!
//! Screens are framebuffers plus a view hierarchy. Tapping a label moves
//! to whichever screen the transition table names, so a test can walk a
//! small app without a device.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{ApiCatalog, ApiMethod, FrameworkDriver, SnapshotSource};
use crate::error::DriverError;
use crate::executor::ActionContext;
use crate::snapshot::{MockFramebuffer, generate_filename, generate_timestamp};

/// One screen of the fake app
#[derive(Debug, Clone)]
pub struct MockScreen {
    pub framebuffer: MockFramebuffer,
    pub view_hierarchy: String,
}

impl MockScreen {
    pub fn new(framebuffer: MockFramebuffer, view_hierarchy: impl Into<String>) -> Self {
        Self {
            framebuffer,
            view_hierarchy: view_hierarchy.into(),
        }
    }

    /// A screen showing its labels as text rows over a flat background
    pub fn labelled(background: [u8; 3], labels: &[&str]) -> Self {
        let mut framebuffer = MockFramebuffer::with_color(160, 120, background);
        let mut hierarchy = String::from("<screen>");
        for (row, label) in labels.iter().enumerate() {
            let y = 8 + row as u32 * 16;
            framebuffer.draw_rect(4, y - 2, 152, 12, [255, 255, 255]);
            framebuffer.draw_text(8, y, label, [0, 0, 0], [255, 255, 255]);
            hierarchy.push_str(&format!("<button label=\"{}\"/>", label));
        }
        hierarchy.push_str("</screen>");
        Self::new(framebuffer, hierarchy)
    }
}

#[derive(Debug)]
struct MockState {
    current: String,
    screens: HashMap<String, MockScreen>,
    transitions: HashMap<(String, String), String>,
    typed: Vec<String>,
    taps: Vec<String>,
    captures: usize,
}

/// Driver backed by [`MockFramebuffer`] screens
#[derive(Debug, Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
    capture_dir: Option<PathBuf>,
}

impl MockDriver {
    /// Start on `name`; screenshots are written under `capture_dir` when given
    pub fn new(name: impl Into<String>, screen: MockScreen, capture_dir: Option<&Path>) -> Self {
        let name = name.into();
        let mut screens = HashMap::new();
        screens.insert(name.clone(), screen);
        Self {
            state: Arc::new(Mutex::new(MockState {
                current: name,
                screens,
                transitions: HashMap::new(),
                typed: Vec::new(),
                taps: Vec::new(),
                captures: 0,
            })),
            capture_dir: capture_dir.map(Path::to_path_buf),
        }
    }

    pub fn screen(self, name: impl Into<String>, screen: MockScreen) -> Self {
        self.lock().screens.insert(name.into(), screen);
        self
    }

    /// Tapping `label` on screen `from` moves to screen `to`
    pub fn on_tap(self, from: impl Into<String>, label: impl Into<String>, to: impl Into<String>) -> Self {
        self.lock().transitions.insert((from.into(), label.into()), to.into());
        self
    }

    pub fn current_screen(&self) -> String {
        self.lock().current.clone()
    }

    pub fn taps(&self) -> Vec<String> {
        self.lock().taps.clone()
    }

    pub fn typed(&self) -> Vec<String> {
        self.lock().typed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // recover from poisoning
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn tap(state: &Mutex<MockState>, label: &str) -> anyhow::Result<Value> {
    let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
    let screen = state
        .screens
        .get(&state.current)
        .ok_or_else(|| anyhow!("current screen '{}' is not defined", state.current))?;
    if !screen.view_hierarchy.contains(&format!("label=\"{}\"", label)) {
        bail!("no element labelled '{}' on screen '{}'", label, state.current);
    }
    state.taps.push(label.to_string());
    if let Some(next) = state.transitions.get(&(state.current.clone(), label.to_string())).cloned() {
        debug!(from = %state.current, to = %next, label, "mock transition");
        state.current = next;
    }
    Ok(json!({ "tapped": label, "screen": state.current }))
}

fn string_arg(args: &[Value], name: &str) -> anyhow::Result<String> {
    args.first()
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{} expects a string argument", name))
}

#[async_trait]
impl SnapshotSource for MockDriver {
    async fn capture_visual_snapshot(&self) -> Result<Option<PathBuf>, DriverError> {
        let Some(dir) = &self.capture_dir else {
            return Ok(None);
        };
        let (framebuffer, step, screen) = {
            let mut state = self.lock();
            state.captures += 1;
            let screen = state
                .screens
                .get(&state.current)
                .ok_or_else(|| DriverError::Capture(format!("screen '{}' is not defined", state.current)))?;
            (screen.framebuffer.clone(), state.captures, state.current.clone())
        };
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(generate_filename(&screen, step, &generate_timestamp()));
        framebuffer.save_png(&path)?;
        Ok(Some(path))
    }

    async fn capture_view_hierarchy(&self) -> Result<String, DriverError> {
        let state = self.lock();
        state
            .screens
            .get(&state.current)
            .map(|s| s.view_hierarchy.clone())
            .ok_or_else(|| DriverError::Capture(format!("screen '{}' is not defined", state.current)))
    }
}

impl FrameworkDriver for MockDriver {
    fn api_catalog(&self) -> ApiCatalog {
        ApiCatalog::new(
            "Mock driver",
            "An in-memory app. Write code as a JSON array of statements; call functions with {\"op\":\"call\",\"fn\":NAME,\"args\":[...]}.",
        )
        .category(
            "Actions",
            vec![
                ApiMethod::new(
                    "tap(label)",
                    "Tap the element with the given label.",
                    r#"[{"op":"call","fn":"tap","args":["Login"]}]"#,
                )
                .guideline("Use labels exactly as they appear in the view hierarchy"),
                ApiMethod::new(
                    "typeText(text)",
                    "Type text into the focused field.",
                    r#"[{"op":"call","fn":"typeText","args":["hello"]}]"#,
                ),
            ],
        )
        .category(
            "Queries",
            vec![ApiMethod::new(
                "currentScreen()",
                "Name of the screen being shown.",
                r#"[{"op":"call","fn":"currentScreen","save_as":"screen"}]"#,
            )],
        )
    }

    fn action_context(&self) -> ActionContext {
        let tap_state = Arc::clone(&self.state);
        let type_state = Arc::clone(&self.state);
        let screen_state = Arc::clone(&self.state);
        ActionContext::new()
            .function("tap", move |args: Vec<Value>| {
                let state = Arc::clone(&tap_state);
                async move {
                    let label = string_arg(&args, "tap")?;
                    tap(&state, &label)
                }
            })
            .function("typeText", move |args: Vec<Value>| {
                let state = Arc::clone(&type_state);
                async move {
                    let text = string_arg(&args, "typeText")?;
                    state.lock().unwrap_or_else(|e| e.into_inner()).typed.push(text.clone());
                    Ok::<Value, anyhow::Error>(json!({ "typed": text }))
                }
            })
            .function("currentScreen", move |_args: Vec<Value>| {
                let state = Arc::clone(&screen_state);
                async move {
                    let current = state.lock().unwrap_or_else(|e| e.into_inner()).current.clone();
                    Ok::<Value, anyhow::Error>(Value::String(current))
                }
            })
    }
}
