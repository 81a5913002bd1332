//! Model backends: one request/response exchange per call.
//!
//! Two backends share the [`ModelClient`] seam:
//!
//! - [`HttpModelClient`] posts a Messages-style request to the configured
//!   endpoint with `ureq` and concatenates the text blocks of the reply.
//! - [`CommandModelClient`] runs a user-configured command (parsed with
//!   shell-words), writes the same JSON request body to its stdin and treats
//!   stdout as the model text. `CPIPE_STAGE` tells the command which stage is
//!   asking, so scripted backends can answer per stage.
//!
//! Neither backend retries and neither sets a local timeout. Every failure is
//! returned as an error with a human-readable message for the orchestrator to
//! record against the current stage.
use crate::stage::StageId;
use crate::util::truncate_string;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, ErrorKind, Write};
use std::process::{ChildStdin, Command, Stdio};
use std::thread;
use std::time::Instant;

/// Bytes of an error body quoted back in transport errors.
const ERROR_BODY_PREVIEW_BYTES: usize = 500;

/// Environment variable naming the stage for command backends.
pub const STAGE_ENV_VAR: &str = "CPIPE_STAGE";

/// One model call: which stage is asking and what it asks.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub stage: StageId,
    pub system: &'a str,
    pub user: &'a str,
}

impl CompletionRequest<'_> {
    /// Both instructions must carry text; no upper bound is enforced locally.
    pub fn validate(&self) -> Result<()> {
        if self.system.trim().is_empty() {
            return Err(anyhow!("system instruction is empty"));
        }
        if self.user.trim().is_empty() {
            return Err(anyhow!("user instruction is empty"));
        }
        Ok(())
    }
}

/// A backend that turns one request into the model's text output.
pub trait ModelClient {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String>;
}

/// Request settings shared by both backends.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub max_tokens: u32,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [UserMessage<'a>; 1],
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    message: String,
}

fn request_body(settings: &ModelSettings, request: &CompletionRequest<'_>) -> Result<Vec<u8>> {
    let body = MessagesRequest {
        model: &settings.model,
        max_tokens: settings.max_tokens,
        system: request.system,
        messages: [UserMessage {
            role: "user",
            content: request.user,
        }],
    };
    serde_json::to_vec(&body).context("serialize model request")
}

/// Concatenate every text block of a Messages-style response body.
pub fn concat_text_blocks(body: &str) -> Result<String> {
    let response: MessagesResponse =
        serde_json::from_str(body).context("parse model response body")?;
    let text: String = response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text.as_deref())
        .collect();
    if text.trim().is_empty() {
        return Err(anyhow!("model response contained no text content"));
    }
    Ok(text)
}

/// Describe a non-success HTTP reply, preferring the API's own error message.
fn describe_http_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.kind {
            Some(kind) => format!("API error (status {status}, {kind}): {}", envelope.error.message),
            None => format!("API error (status {status}): {}", envelope.error.message),
        },
        Err(_) => format!(
            "API error (status {status}): {}",
            truncate_string(body.trim(), ERROR_BODY_PREVIEW_BYTES)
        ),
    }
}

/// HTTP backend for a hosted chat-completion endpoint.
pub struct HttpModelClient {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    api_version: String,
    settings: ModelSettings,
}

impl HttpModelClient {
    pub fn new(
        endpoint: String,
        api_key: String,
        api_version: String,
        settings: ModelSettings,
    ) -> Result<Self> {
        if endpoint.trim().is_empty() {
            return Err(anyhow!("model endpoint is empty"));
        }
        if api_key.trim().is_empty() {
            return Err(anyhow!("API key is empty"));
        }
        // Status codes are inspected here so error bodies can be reported.
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Ok(Self {
            agent,
            endpoint,
            api_key,
            api_version,
            settings,
        })
    }
}

impl ModelClient for HttpModelClient {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        request.validate()?;
        let body = request_body(&self.settings, request)?;
        let start = Instant::now();

        let mut response = self
            .agent
            .post(self.endpoint.as_str())
            .header("x-api-key", self.api_key.as_str())
            .header("anthropic-version", self.api_version.as_str())
            .header("content-type", "application/json")
            .send(&body[..])
            .with_context(|| format!("POST {}", self.endpoint))?;
        let status = response.status();
        let text = response
            .body_mut()
            .read_to_string()
            .context("read model response body")?;

        tracing::info!(
            stage = %request.stage,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = request.system.len() + request.user.len(),
            response_bytes = text.len(),
            "model call complete"
        );

        if !status.is_success() {
            return Err(anyhow!(describe_http_error(status.as_u16(), &text)));
        }
        concat_text_blocks(&text)
    }
}

/// Local command backend; stdout is the model text.
pub struct CommandModelClient {
    command: String,
    settings: ModelSettings,
}

impl CommandModelClient {
    pub fn new(command: String, settings: ModelSettings) -> Result<Self> {
        let args =
            shell_words::split(&command).with_context(|| format!("parse LM command: {command}"))?;
        if args.is_empty() {
            return Err(anyhow!("LM command is empty"));
        }
        Ok(Self { command, settings })
    }
}

impl ModelClient for CommandModelClient {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        request.validate()?;
        let body = request_body(&self.settings, request)?;
        let args = shell_words::split(&self.command)
            .with_context(|| format!("parse LM command: {}", self.command))?;
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| anyhow!("LM command is empty"))?;

        let start = Instant::now();
        let mut child = Command::new(program)
            .args(rest)
            .env(STAGE_ENV_VAR, request.stage.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn LM command: {program}"))?;

        // stdin is fed from its own thread while stdout and stderr drain, so a
        // command that writes before it reads cannot fill a pipe and stall.
        let stdin = child.stdin.take();
        let (written, output) = thread::scope(|scope| {
            let writer = scope.spawn(|| write_request(stdin, &body));
            let output = child.wait_with_output();
            (writer.join(), output)
        });
        written
            .map_err(|_| anyhow!("LM stdin writer panicked"))?
            .context("write request to LM stdin")?;
        let output = output.context("wait for LM command")?;
        tracing::info!(
            stage = %request.stage,
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = request.system.len() + request.user.len(),
            response_bytes = output.stdout.len(),
            "lm invoke complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "LM command failed with status {}: {}",
                output.status,
                truncate_string(stderr.trim(), ERROR_BODY_PREVIEW_BYTES)
            ));
        }
        let text = String::from_utf8(output.stdout).context("decode LM stdout as UTF-8")?;
        if text.trim().is_empty() {
            return Err(anyhow!("LM command produced no output"));
        }
        Ok(text)
    }
}

fn write_request(stdin: Option<ChildStdin>, body: &[u8]) -> io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match stdin.write_all(body) {
        // A command that answers without reading its input closes the pipe early.
        Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}
