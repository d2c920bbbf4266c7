//! Model boundary: the [`ModelClient`] trait and a chat-completions client.
//!
//! [`VlmClient`] talks to any OpenAI-compatible `/v1/chat/completions`
//! endpoint through `curl`, with:
//! - Streaming responses (no total timeout, activity-based timeout)
//! - Optional image attachment as a base64 data URL
//! - Fallback to a non-streaming request for servers that do not stream
//!
//! A blocked model call is bounded only by the activity timeout configured
//! here; the autopilot itself never times out a prompt.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use tracing::{debug, warn};

use crate::config;
use crate::error::ModelError;

/// Result type for model operations
pub type VlmResult<T> = Result<T, ModelError>;

/// The language model as seen by the planner.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send one prompt, optionally with a screenshot, and return the raw reply
    async fn run_prompt(&self, prompt: &str, image: Option<&Path>) -> VlmResult<String>;

    /// Whether images passed to [`ModelClient::run_prompt`] reach the model
    fn supports_image_input(&self) -> bool;
}

/// Configuration for the VLM client
#[derive(Debug, Clone)]
pub struct VlmConfig {
    /// API endpoint URL
    pub endpoint: String,
    /// Model name to use
    pub model: String,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Timeout for initial connection (seconds)
    pub connection_timeout: u64,
    /// Timeout for inactivity during streaming (seconds)
    pub activity_timeout: u64,
    /// Whether the model accepts image input
    pub supports_images: bool,
}

impl Default for VlmConfig {
    fn default() -> Self {
        let cfg = config::get();
        Self {
            endpoint: cfg.vlm.endpoint.clone(),
            model: cfg.vlm.model.clone(),
            max_tokens: cfg.vlm.max_tokens,
            connection_timeout: cfg.vlm.connect_timeout,
            activity_timeout: cfg.vlm.activity_timeout,
            supports_images: cfg.vlm.supports_images,
        }
    }
}

impl VlmConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn activity_timeout(mut self, seconds: u64) -> Self {
        self.activity_timeout = seconds;
        self
    }

    pub fn images(mut self, supported: bool) -> Self {
        self.supports_images = supported;
        self
    }
}

/// Progress update during a streaming prompt
#[derive(Debug, Clone)]
pub enum VlmProgress {
    /// Connection established
    Connected,
    /// Receiving data (partial content so far)
    Receiving(String),
    /// Response complete
    Complete(String),
}

/// Chat-completions client backed by `curl`
#[derive(Debug, Clone)]
pub struct VlmClient {
    config: VlmConfig,
}

impl VlmClient {
    pub fn new(config: VlmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VlmConfig {
        &self.config
    }
}

#[async_trait]
impl ModelClient for VlmClient {
    async fn run_prompt(&self, prompt: &str, image: Option<&Path>) -> VlmResult<String> {
        let image_data = match image {
            Some(path) if self.config.supports_images => Some(tokio::fs::read(path).await?),
            Some(path) => {
                warn!(path = %path.display(), "model does not accept images, sending text only");
                None
            }
            None => None,
        };

        let config = self.config.clone();
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            run_prompt_with_progress(&config, &prompt, image_data.as_deref(), |_| {})
        })
        .await
        .map_err(|e| ModelError::ConnectionFailed(format!("prompt task aborted: {}", e)))?
    }

    fn supports_image_input(&self) -> bool {
        self.config.supports_images
    }
}

/// Check if a VLM endpoint is reachable (connection-only check).
pub fn check_health(endpoint: &str, timeout_secs: u64) -> VlmResult<bool> {
    let url = endpoint.trim_start_matches("http://").trim_start_matches("https://");
    let host_port = url.split('/').next().unwrap_or("127.0.0.1:8080");

    let output = Command::new("curl")
        .args([
            "-s",
            "-o", "/dev/null",
            "-w", "%{http_code}",
            "--connect-timeout", &timeout_secs.to_string(),
            "--max-time", &timeout_secs.to_string(),
            "-I",
            &format!("http://{}", host_port),
        ])
        .output()?;

    // 000 means the connection failed entirely; any HTTP status means reachable
    let status = String::from_utf8_lossy(&output.stdout);
    let code: u16 = status.trim().parse().unwrap_or(0);
    Ok(code > 0)
}

/// Build the chat-completions request body
pub fn build_request(config: &VlmConfig, prompt: &str, image_data: Option<&[u8]>, stream: bool) -> serde_json::Value {
    let mut content = Vec::new();
    if let Some(data) = image_data {
        let img_base64 = base64::engine::general_purpose::STANDARD.encode(data);
        content.push(serde_json::json!({
            "type": "image_url",
            "image_url": { "url": format!("data:image/png;base64,{}", img_base64) }
        }));
    }
    content.push(serde_json::json!({ "type": "text", "text": prompt }));

    serde_json::json!({
        "model": config.model,
        "messages": [{ "role": "user", "content": content }],
        "max_tokens": config.max_tokens,
        "stream": stream
    })
}

/// Send a prompt with progress callbacks, streaming the reply
pub fn run_prompt_with_progress<F>(
    config: &VlmConfig,
    prompt: &str,
    image_data: Option<&[u8]>,
    mut on_progress: F,
) -> VlmResult<String>
where
    F: FnMut(VlmProgress),
{
    let request_json = serde_json::to_string(&build_request(config, prompt, image_data, true))
        .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

    // The body goes through stdin so large screenshots stay out of argv
    let mut child = Command::new("curl")
        .args([
            "-s",
            "-N",
            "-X", "POST",
            &config.endpoint,
            "-H", "Content-Type: application/json",
            "--data-binary", "@-",
            "--connect-timeout", &config.connection_timeout.to_string(),
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(request_json.as_bytes())?;
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ModelError::Io(std::io::Error::other("Failed to capture stdout")))?;

    let (tx, rx) = mpsc::channel();
    let activity_timeout = Duration::from_secs(config.activity_timeout);

    thread::spawn(move || {
        let reader = BufReader::new(stdout);
        for line in reader.lines() {
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });

    on_progress(VlmProgress::Connected);

    let mut full_content = String::new();
    let mut last_activity = Instant::now();

    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Ok(line)) => {
                last_activity = Instant::now();
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    break;
                }
                if let Some(delta) = parse_stream_delta(data) {
                    full_content.push_str(&delta);
                    on_progress(VlmProgress::Receiving(full_content.clone()));
                }
            }
            Ok(Err(e)) => return Err(ModelError::Io(e)),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if last_activity.elapsed() > activity_timeout {
                    let _ = child.kill();
                    return Err(ModelError::ActivityTimeout(activity_timeout));
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    let status = child.wait()?;
    if !status.success() && full_content.is_empty() {
        return Err(ModelError::ConnectionFailed("curl process failed".to_string()));
    }

    if full_content.is_empty() {
        debug!(endpoint = %config.endpoint, "empty stream, retrying without streaming");
        return run_prompt_non_streaming(config, prompt, image_data);
    }

    on_progress(VlmProgress::Complete(full_content.clone()));
    Ok(full_content)
}

/// Fallback non-streaming request (for APIs that don't support streaming)
fn run_prompt_non_streaming(config: &VlmConfig, prompt: &str, image_data: Option<&[u8]>) -> VlmResult<String> {
    let request_json = serde_json::to_string(&build_request(config, prompt, image_data, false))
        .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

    let mut child = Command::new("curl")
        .args([
            "-s",
            "-X", "POST",
            &config.endpoint,
            "-H", "Content-Type: application/json",
            "--data-binary", "@-",
            "--connect-timeout", &config.connection_timeout.to_string(),
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(request_json.as_bytes())?;
    }
    let output = child.wait_with_output()?;

    if !output.status.success() {
        return Err(ModelError::ConnectionFailed(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }

    let response: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
    parse_completion(&response)
}

/// Pull the text delta out of one SSE `data:` payload
fn parse_stream_delta(data: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(data).ok()?;
    let delta = &json["choices"][0]["delta"];
    let mut text = String::new();
    // thinking models stream reasoning_content alongside content
    for field in ["reasoning_content", "content"] {
        if let Some(part) = delta[field].as_str() {
            text.push_str(part);
        }
    }
    (!text.is_empty()).then_some(text)
}

/// Extract the message text from a non-streaming completion
fn parse_completion(response: &serde_json::Value) -> VlmResult<String> {
    let message = &response["choices"][0]["message"];
    message["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .or_else(|| message["reasoning_content"].as_str())
        .map(str::to_string)
        .ok_or_else(|| ModelError::InvalidResponse(format!("no message content in {}", response)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlm_config_builder() {
        let config = VlmConfig::new("http://localhost:8080")
            .model("llava")
            .max_tokens(200)
            .activity_timeout(30)
            .images(false);

        assert_eq!(config.endpoint, "http://localhost:8080");
        assert_eq!(config.model, "llava");
        assert_eq!(config.max_tokens, 200);
        assert_eq!(config.activity_timeout, 30);
        assert!(!VlmClient::new(config).supports_image_input());
    }

    #[test]
    fn test_build_request_text_only() {
        let config = VlmConfig::new("http://localhost:8080").model("m");
        let request = build_request(&config, "hello", None, true);
        let content = request["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["text"], "hello");
        assert_eq!(request["stream"], true);
    }

    #[test]
    fn test_build_request_with_image_puts_image_first() {
        let config = VlmConfig::new("http://localhost:8080");
        let request = build_request(&config, "describe", Some(&[1, 2, 3]), false);
        let content = request["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0]["type"], "image_url");
        assert!(content[0]["image_url"]["url"].as_str().unwrap().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_parse_stream_delta() {
        let data = r#"{"choices":[{"delta":{"content":"<THOUGHTS>"}}]}"#;
        assert_eq!(parse_stream_delta(data).as_deref(), Some("<THOUGHTS>"));
        assert_eq!(parse_stream_delta(r#"{"choices":[{"delta":{}}]}"#), None);
        assert_eq!(parse_stream_delta("not json"), None);
    }

    #[test]
    fn test_parse_completion_falls_back_to_reasoning() {
        let response = serde_json::json!({
            "choices": [{ "message": { "content": "", "reasoning_content": "thinking" } }]
        });
        assert_eq!(parse_completion(&response).unwrap(), "thinking");

        let empty = serde_json::json!({ "choices": [] });
        assert!(parse_completion(&empty).is_err());
    }
}
