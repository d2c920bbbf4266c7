//! Configuration management with environment variable support.
//!
//! Settings are read once from the environment and cached for the process.
//! Per-run overrides go through [`crate::autopilot::AutopilotConfig`].
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `UI_AUTOPILOT_VLM_ENDPOINT` | Chat-completions endpoint URL | `http://127.0.0.1:8080/v1/chat/completions` |
//! | `UI_AUTOPILOT_VLM_MODEL` | Model name | `qwen3` |
//! | `UI_AUTOPILOT_VLM_MAX_TOKENS` | Maximum tokens in a model response | `1024` |
//! | `UI_AUTOPILOT_VLM_TIMEOUT` | Streaming activity timeout in seconds | `60` |
//! | `UI_AUTOPILOT_VLM_CONNECT_TIMEOUT` | Connection timeout in seconds | `10` |
//! | `UI_AUTOPILOT_VLM_IMAGES` | Whether the model accepts images (`true`/`false`) | `true` |
//! | `UI_AUTOPILOT_MAX_ATTEMPTS` | Attempt budget per autopilot run | `10` |
//! | `UI_AUTOPILOT_SIMILARITY_THRESHOLD` | Normalized fingerprint distance still counted as similar | `0.1` |
//! | `UI_AUTOPILOT_CACHE` | `on`, `off` or `override` | `on` |
//! | `UI_AUTOPILOT_CACHE_FILE` | Persistent cache file | `.ui_autopilot/cache.json` |
//! | `UI_AUTOPILOT_ON_EXECUTION_FAILURE` | `fatal` or `retry` | `fatal` |
//! | `UI_AUTOPILOT_SESSION_DIR` | Base directory for run sessions | `/tmp/ui-autopilot` |
//!
//! # Example
//!
//! ```bash
//! export UI_AUTOPILOT_VLM_ENDPOINT="http://localhost:11434/v1/chat/completions"
//! export UI_AUTOPILOT_VLM_MODEL="llava"
//! export UI_AUTOPILOT_MAX_ATTEMPTS=20
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default VLM API endpoint
pub const DEFAULT_VLM_ENDPOINT: &str = "http://127.0.0.1:8080/v1/chat/completions";

/// Default VLM model name
pub const DEFAULT_VLM_MODEL: &str = "qwen3";

/// Default max tokens for model responses
pub const DEFAULT_VLM_MAX_TOKENS: u32 = 1024;

/// Default VLM connection timeout (seconds)
pub const DEFAULT_VLM_CONNECT_TIMEOUT: u64 = 10;

/// Default VLM activity timeout (seconds)
pub const DEFAULT_VLM_ACTIVITY_TIMEOUT: u64 = 60;

/// Default attempt budget for one autopilot run
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

/// Default normalized distance under which two fingerprints are near-duplicates
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.1;

/// Default persistent cache file
pub const DEFAULT_CACHE_FILE: &str = ".ui_autopilot/cache.json";

/// Default session base directory
pub const DEFAULT_SESSION_DIR: &str = "/tmp/ui-autopilot";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_VLM_ENDPOINT: &str = "UI_AUTOPILOT_VLM_ENDPOINT";
pub const ENV_VLM_MODEL: &str = "UI_AUTOPILOT_VLM_MODEL";
pub const ENV_VLM_MAX_TOKENS: &str = "UI_AUTOPILOT_VLM_MAX_TOKENS";
pub const ENV_VLM_CONNECT_TIMEOUT: &str = "UI_AUTOPILOT_VLM_CONNECT_TIMEOUT";
pub const ENV_VLM_ACTIVITY_TIMEOUT: &str = "UI_AUTOPILOT_VLM_TIMEOUT";
pub const ENV_VLM_IMAGES: &str = "UI_AUTOPILOT_VLM_IMAGES";
pub const ENV_MAX_ATTEMPTS: &str = "UI_AUTOPILOT_MAX_ATTEMPTS";
pub const ENV_SIMILARITY_THRESHOLD: &str = "UI_AUTOPILOT_SIMILARITY_THRESHOLD";
pub const ENV_CACHE_MODE: &str = "UI_AUTOPILOT_CACHE";
pub const ENV_CACHE_FILE: &str = "UI_AUTOPILOT_CACHE_FILE";
pub const ENV_ON_EXECUTION_FAILURE: &str = "UI_AUTOPILOT_ON_EXECUTION_FAILURE";
pub const ENV_SESSION_DIR: &str = "UI_AUTOPILOT_SESSION_DIR";

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// How the snapshot cache participates in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Never read or write the cache
    Disabled,
    /// Look up cached code first, append fresh entries on a miss
    Enabled,
    /// Skip lookups but still append fresh entries
    Override,
}

impl CacheMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "on" | "true" | "enabled" => Some(Self::Enabled),
            "off" | "false" | "disabled" => Some(Self::Disabled),
            "override" => Some(Self::Override),
            _ => None,
        }
    }

    pub fn reads(self) -> bool {
        self == Self::Enabled
    }

    pub fn writes(self) -> bool {
        self != Self::Disabled
    }
}

/// What the loop does when generated code fails to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionFailurePolicy {
    /// Stop the run and surface the evaluation error
    Fatal,
    /// Record the error as the step result, spend the attempt and plan again
    ConsumeAttempt,
}

impl ExecutionFailurePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "fatal" => Some(Self::Fatal),
            "retry" | "consume" => Some(Self::ConsumeAttempt),
            _ => None,
        }
    }
}

/// Centralized configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// VLM configuration
    pub vlm: VlmSettings,
    /// Autopilot loop and cache configuration
    pub autopilot: AutopilotSettings,
    /// Session configuration
    pub session: SessionSettings,
}

/// VLM-related settings
#[derive(Debug, Clone)]
pub struct VlmSettings {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub connect_timeout: u64,
    pub activity_timeout: u64,
    pub supports_images: bool,
}

/// Loop and cache settings
#[derive(Debug, Clone)]
pub struct AutopilotSettings {
    pub max_attempts: usize,
    pub similarity_threshold: f64,
    pub cache_mode: CacheMode,
    pub cache_file: PathBuf,
    pub on_execution_failure: ExecutionFailurePolicy,
}

/// Session-related settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub base_dir: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            vlm: VlmSettings::from_env(),
            autopilot: AutopilotSettings::from_env(),
            session: SessionSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            vlm: VlmSettings::defaults(),
            autopilot: AutopilotSettings::defaults(),
            session: SessionSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl VlmSettings {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var(ENV_VLM_ENDPOINT).unwrap_or_else(|_| DEFAULT_VLM_ENDPOINT.to_string()),
            model: env::var(ENV_VLM_MODEL).unwrap_or_else(|_| DEFAULT_VLM_MODEL.to_string()),
            max_tokens: parse_env(ENV_VLM_MAX_TOKENS).unwrap_or(DEFAULT_VLM_MAX_TOKENS),
            connect_timeout: parse_env(ENV_VLM_CONNECT_TIMEOUT).unwrap_or(DEFAULT_VLM_CONNECT_TIMEOUT),
            activity_timeout: parse_env(ENV_VLM_ACTIVITY_TIMEOUT).unwrap_or(DEFAULT_VLM_ACTIVITY_TIMEOUT),
            supports_images: env::var(ENV_VLM_IMAGES)
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(true),
        }
    }

    pub fn defaults() -> Self {
        Self {
            endpoint: DEFAULT_VLM_ENDPOINT.to_string(),
            model: DEFAULT_VLM_MODEL.to_string(),
            max_tokens: DEFAULT_VLM_MAX_TOKENS,
            connect_timeout: DEFAULT_VLM_CONNECT_TIMEOUT,
            activity_timeout: DEFAULT_VLM_ACTIVITY_TIMEOUT,
            supports_images: true,
        }
    }
}

impl AutopilotSettings {
    pub fn from_env() -> Self {
        Self {
            max_attempts: parse_env(ENV_MAX_ATTEMPTS)
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            similarity_threshold: parse_env(ENV_SIMILARITY_THRESHOLD)
                .and_then(valid_threshold)
                .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD),
            cache_mode: env::var(ENV_CACHE_MODE)
                .ok()
                .and_then(|s| CacheMode::parse(&s))
                .unwrap_or(CacheMode::Enabled),
            cache_file: env::var(ENV_CACHE_FILE)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_FILE)),
            on_execution_failure: env::var(ENV_ON_EXECUTION_FAILURE)
                .ok()
                .and_then(|s| ExecutionFailurePolicy::parse(&s))
                .unwrap_or(ExecutionFailurePolicy::Fatal),
        }
    }

    pub fn defaults() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            cache_mode: CacheMode::Enabled,
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
            on_execution_failure: ExecutionFailurePolicy::Fatal,
        }
    }
}

impl SessionSettings {
    pub fn from_env() -> Self {
        Self {
            base_dir: env::var(ENV_SESSION_DIR).unwrap_or_else(|_| DEFAULT_SESSION_DIR.to_string()),
        }
    }

    pub fn defaults() -> Self {
        Self {
            base_dir: DEFAULT_SESSION_DIR.to_string(),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn valid_threshold(value: f64) -> Option<f64> {
    (0.0..=1.0).contains(&value).then_some(value)
}

/// Get session base directory (convenience function)
pub fn session_base_dir() -> String {
    get().session.base_dir.clone()
}
