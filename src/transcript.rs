//! Per-stage model call transcript.
//!
//! When a transcript directory is configured, every stage invocation appends
//! one line to `lm_log.jsonl`:
//!
//! ```jsonl
//! {"schema_version":1,"ts":1707900000000,"stage":"concepts","duration_ms":4200,"outcome":"success",...}
//! ```
//!
//! and the full prompt and raw response are stored next to it as
//! `stage_<n>_<key>_prompt.txt` and `stage_<n>_<key>_response.txt`.
use crate::prompts::PromptPair;
use crate::stage::StageId;
use crate::util::{now_epoch_ms, truncate_string};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Current schema version for lm_log.jsonl entries.
pub const TRANSCRIPT_SCHEMA_VERSION: u32 = 1;

const PROMPT_PREVIEW_BYTES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    Failed,
}

/// A single model invocation log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub schema_version: u32,

    /// Unix timestamp in milliseconds when the entry was finished.
    pub ts: u64,

    pub stage: StageId,

    pub duration_ms: u64,

    pub outcome: CallOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// First ~500 bytes of the user prompt for quick inspection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_preview: Option<String>,
}

/// Builder for constructing transcript entries with timing.
pub struct TranscriptEntryBuilder {
    start: Instant,
    stage: StageId,
    prompt_preview: Option<String>,
}

impl TranscriptEntryBuilder {
    pub fn new(stage: StageId) -> Self {
        Self {
            start: Instant::now(),
            stage,
            prompt_preview: None,
        }
    }

    pub fn with_prompt_preview(mut self, prompt: &str) -> Self {
        self.prompt_preview = Some(truncate_string(prompt, PROMPT_PREVIEW_BYTES));
        self
    }

    pub fn success(self, summary: impl Into<String>) -> TranscriptEntry {
        self.build(CallOutcome::Success, Some(summary.into()), None)
    }

    pub fn failed(self, error: impl Into<String>) -> TranscriptEntry {
        self.build(CallOutcome::Failed, None, Some(error.into()))
    }

    fn build(
        self,
        outcome: CallOutcome,
        summary: Option<String>,
        error: Option<String>,
    ) -> TranscriptEntry {
        TranscriptEntry {
            schema_version: TRANSCRIPT_SCHEMA_VERSION,
            ts: now_epoch_ms(),
            stage: self.stage,
            duration_ms: self.start.elapsed().as_millis() as u64,
            outcome,
            summary,
            error,
            prompt_preview: self.prompt_preview,
        }
    }
}

/// Transcript directory layout.
#[derive(Debug, Clone)]
pub struct Transcript {
    root: PathBuf,
}

impl Transcript {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join("lm_log.jsonl")
    }

    fn content_path(&self, stage: StageId, suffix: &str) -> PathBuf {
        self.root
            .join(format!("stage_{}_{}_{suffix}.txt", stage.number(), stage))
    }

    /// Append an entry to `lm_log.jsonl`.
    pub fn append(&self, entry: &TranscriptEntry) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create transcript dir {}", self.root.display()))?;
        let log_path = self.log_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("open transcript log for append: {}", log_path.display()))?;
        let line = serde_json::to_string(entry).context("serialize transcript entry")?;
        writeln!(file, "{line}").context("write transcript entry")?;
        Ok(())
    }

    /// Store the full prompt pair and, when one arrived, the raw response.
    pub fn store_content(
        &self,
        stage: StageId,
        prompt: &PromptPair,
        response: Option<&str>,
    ) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create transcript dir {}", self.root.display()))?;
        let prompt_path = self.content_path(stage, "prompt");
        fs::write(&prompt_path, prompt.to_document())
            .with_context(|| format!("write prompt: {}", prompt_path.display()))?;
        if let Some(response) = response {
            let response_path = self.content_path(stage, "response");
            fs::write(&response_path, response)
                .with_context(|| format!("write response: {}", response_path.display()))?;
        }
        Ok(())
    }
}

/// Load every entry from a transcript log, skipping corrupt lines.
pub fn load_entries(log_path: &Path) -> Result<Vec<TranscriptEntry>> {
    if !log_path.exists() {
        return Ok(Vec::new());
    }
    let file =
        File::open(log_path).with_context(|| format!("open transcript log: {}", log_path.display()))?;
    let mut entries = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read line {} of transcript log", line_num + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TranscriptEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(line = line_num + 1, %err, "skip corrupt transcript entry");
            }
        }
    }
    Ok(entries)
}
