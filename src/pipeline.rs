//! Stage orchestration for one pipeline run.
//!
//! The orchestrator owns the run state outright: statuses, results, failures
//! and the activity log only change through its methods, and callers get a
//! read-only [`PipelineRun`] back. Stages execute strictly in order, one model
//! call at a time.
//!
//! # Gating
//!
//! - Deselected stages are `skipped` before anything runs.
//! - Stages 2-4 run only when stage 1 completed; otherwise they are `skipped`
//!   with the unmet dependency in the log. Stage 4 uses the taxonomy when
//!   stage 3 produced one and runs without it otherwise.
//! - Stage 5 runs whenever it is selected, over whatever completed.
//!
//! # Failures
//!
//! A transport, parse or shape failure is caught at the stage boundary: that
//! stage ends in `error` and the run moves on. A failure outside that boundary
//! (observer or transcript sink) aborts the loop, records a run-level error,
//! turns any `running` stage into `error`, and leaves unexecuted stages as
//! they were. Either way the run ends `finished`.
use crate::client::{CompletionRequest, ModelClient};
use crate::extract::extract_json;
use crate::prompts::{build_prompt, PromptInputs, PromptPair};
use crate::shapes::StageOutput;
use crate::stage::{Depth, StageId, StageResults, StageStatus};
use crate::transcript::{Transcript, TranscriptEntryBuilder};
use crate::util::now_epoch_ms;
use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Global run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running,
    Finished,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// Why a stage ended in `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network failure, non-success status, or no content.
    Transport,
    /// Response text was not JSON after fence stripping.
    Parse,
    /// JSON did not have the shape the stage expects.
    Shape,
    /// The run was aborted while this stage was running.
    Aborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Parse => write!(f, "parse"),
            Self::Shape => write!(f, "shape"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl StageFailure {
    fn new(kind: FailureKind, err: anyhow::Error) -> Self {
        Self {
            kind,
            message: format!("{err:#}"),
        }
    }
}

/// One line of the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub ts: u64,
    pub message: String,
}

/// What to run: the source, the depth knob, and which stages are selected.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: String,
    pub depth: Depth,
    pub selected: BTreeSet<StageId>,
}

impl RunRequest {
    pub fn all_stages(source: impl Into<String>, depth: Depth) -> Self {
        Self {
            source: source.into(),
            depth,
            selected: StageId::ALL.into_iter().collect(),
        }
    }
}

/// Reject source text that is empty after trimming.
pub fn check_source(source: &str) -> Result<()> {
    if source.trim().is_empty() {
        return Err(anyhow!("source text is empty; nothing to run"));
    }
    Ok(())
}

/// State of one run, readable by the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    source: String,
    depth: Depth,
    selected: BTreeSet<StageId>,
    state: RunState,
    started_at: u64,
    statuses: BTreeMap<StageId, StageStatus>,
    results: StageResults,
    failures: BTreeMap<StageId, StageFailure>,
    log: Vec<LogEntry>,
    run_error: Option<String>,
}

impl PipelineRun {
    fn new(request: RunRequest) -> Self {
        Self {
            source: request.source,
            depth: request.depth,
            selected: request.selected,
            state: RunState::NotStarted,
            started_at: now_epoch_ms(),
            statuses: BTreeMap::new(),
            results: StageResults::new(),
            failures: BTreeMap::new(),
            log: Vec::new(),
            run_error: None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn depth(&self) -> Depth {
        self.depth
    }

    pub fn is_selected(&self, stage: StageId) -> bool {
        self.selected.contains(&stage)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    pub fn status(&self, stage: StageId) -> Option<StageStatus> {
        self.statuses.get(&stage).copied()
    }

    pub fn result(&self, stage: StageId) -> Option<&Value> {
        self.results.get(&stage)
    }

    pub fn results(&self) -> &StageResults {
        &self.results
    }

    pub fn failure(&self, stage: StageId) -> Option<&StageFailure> {
        self.failures.get(&stage)
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn run_error(&self) -> Option<&str> {
        self.run_error.as_deref()
    }

    /// True when any stage errored or the run itself was aborted.
    pub fn has_errors(&self) -> bool {
        self.run_error.is_some() || !self.failures.is_empty()
    }

    pub fn count(&self, status: StageStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }
}

/// Progress notifications delivered while a run is in flight.
#[derive(Debug)]
pub enum RunEvent<'a> {
    Status {
        stage: StageId,
        status: StageStatus,
    },
    Log(&'a LogEntry),
}

/// Receives run progress, typically to render it live.
pub trait RunObserver {
    fn on_event(&mut self, event: &RunEvent<'_>) -> Result<()>;
}

/// Drives the five stages against one model client.
pub struct Orchestrator<'a> {
    client: &'a dyn ModelClient,
    transcript: Option<&'a Transcript>,
    observer: Option<&'a mut dyn RunObserver>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(client: &'a dyn ModelClient) -> Self {
        Self {
            client,
            transcript: None,
            observer: None,
        }
    }

    pub fn with_transcript(mut self, transcript: &'a Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn with_observer(mut self, observer: &'a mut dyn RunObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Execute one run.
    ///
    /// Only an empty source is an error; in that case nothing transitions and
    /// the client is never called. Every other failure is recorded in the
    /// returned run, which is always `finished`.
    pub fn run(&mut self, request: RunRequest) -> Result<PipelineRun> {
        check_source(&request.source)?;

        let mut run = PipelineRun::new(request);
        run.state = RunState::Running;
        if let Err(err) = self.drive(&mut run) {
            self.abort(&mut run, err);
        }
        run.state = RunState::Finished;

        let message = format!(
            "pipeline finished: {} complete, {} error, {} skipped",
            run.count(StageStatus::Complete),
            run.count(StageStatus::Error),
            run.count(StageStatus::Skipped)
        );
        if let Err(err) = self.log(&mut run, message) {
            tracing::warn!(error = %format!("{err:#}"), "observer failed on final log entry");
        }
        Ok(run)
    }

    fn drive(&mut self, run: &mut PipelineRun) -> Result<()> {
        let selected: Vec<&str> = run.selected.iter().map(StageId::as_str).collect();
        let message = format!(
            "pipeline started: depth {} (target {} concepts), stages [{}]",
            run.depth,
            run.depth.target_count(),
            selected.join(", ")
        );
        self.log(run, message)?;

        for stage in StageId::ALL {
            if run.is_selected(stage) {
                self.set_status(run, stage, StageStatus::Idle)?;
            } else {
                self.set_status(run, stage, StageStatus::Skipped)?;
                self.log(run, format!("{}: skipped (deselected)", label(stage)))?;
            }
        }

        for stage in StageId::ALL {
            if !run.is_selected(stage) {
                continue;
            }
            if stage.requires_concepts()
                && run.status(StageId::Concepts) != Some(StageStatus::Complete)
            {
                self.set_status(run, stage, StageStatus::Skipped)?;
                let message = format!(
                    "{}: skipped (requires {} which did not complete)",
                    label(stage),
                    label(StageId::Concepts)
                );
                self.log(run, message)?;
                continue;
            }
            self.run_stage(run, stage)?;
        }
        Ok(())
    }

    /// Run one stage. Stage failures are recorded, not returned; only sink
    /// failures escape.
    fn run_stage(&mut self, run: &mut PipelineRun, stage: StageId) -> Result<()> {
        let prompt = build_prompt(
            stage,
            &PromptInputs {
                source: &run.source,
                depth: run.depth,
                results: &run.results,
            },
        );

        self.set_status(run, stage, StageStatus::Running)?;
        self.log(run, format!("{}: running", label(stage)))?;

        let entry = TranscriptEntryBuilder::new(stage).with_prompt_preview(&prompt.user);
        let (raw_response, outcome) = self.call_stage(stage, &prompt);
        if let Some(transcript) = self.transcript {
            transcript.store_content(stage, &prompt, raw_response.as_deref())?;
        }

        match outcome {
            Ok((value, output)) => {
                let summary = output.summary();
                run.results.insert(stage, value);
                self.set_status(run, stage, StageStatus::Complete)?;
                self.log(run, format!("{}: complete, {summary}", label(stage)))?;
                if let Some(transcript) = self.transcript {
                    transcript.append(&entry.success(summary))?;
                }
            }
            Err(failure) => {
                let message = format!(
                    "{}: error ({}): {}",
                    label(stage),
                    failure.kind,
                    failure.message
                );
                let transcript_error = failure.message.clone();
                run.failures.insert(stage, failure);
                self.set_status(run, stage, StageStatus::Error)?;
                self.log(run, message)?;
                if let Some(transcript) = self.transcript {
                    transcript.append(&entry.failed(transcript_error))?;
                }
            }
        }
        Ok(())
    }

    /// The per-stage boundary: call, extract, check shape.
    fn call_stage(
        &self,
        stage: StageId,
        prompt: &PromptPair,
    ) -> (Option<String>, Result<(Value, StageOutput), StageFailure>) {
        let request = CompletionRequest {
            stage,
            system: &prompt.system,
            user: &prompt.user,
        };
        let text = match self.client.complete(&request) {
            Ok(text) => text,
            Err(err) => return (None, Err(StageFailure::new(FailureKind::Transport, err))),
        };
        let outcome = extract_json(&text)
            .map_err(|err| StageFailure::new(FailureKind::Parse, err))
            .and_then(|value| {
                StageOutput::parse(stage, &value)
                    .map(|output| (value, output))
                    .map_err(|err| StageFailure::new(FailureKind::Shape, err))
            });
        (Some(text), outcome)
    }

    /// Record a run-level failure. Sink errors here are only traced.
    fn abort(&mut self, run: &mut PipelineRun, err: anyhow::Error) {
        let message = format!("{err:#}");
        tracing::error!(error = %message, "pipeline aborted");
        run.run_error = Some(message.clone());

        let running: Vec<StageId> = run
            .statuses
            .iter()
            .filter(|(_, status)| **status == StageStatus::Running)
            .map(|(stage, _)| *stage)
            .collect();
        for stage in running {
            run.failures.insert(
                stage,
                StageFailure {
                    kind: FailureKind::Aborted,
                    message: message.clone(),
                },
            );
            if let Err(err) = self.set_status(run, stage, StageStatus::Error) {
                tracing::warn!(error = %format!("{err:#}"), "observer failed during abort");
            }
        }
        if let Err(err) = self.log(run, format!("pipeline aborted: {message}")) {
            tracing::warn!(error = %format!("{err:#}"), "observer failed during abort");
        }
    }

    fn set_status(
        &mut self,
        run: &mut PipelineRun,
        stage: StageId,
        status: StageStatus,
    ) -> Result<()> {
        run.statuses.insert(stage, status);
        tracing::info!(stage = %stage, status = %status, "stage status");
        self.notify(&RunEvent::Status { stage, status })
    }

    fn log(&mut self, run: &mut PipelineRun, message: String) -> Result<()> {
        tracing::debug!(%message, "activity");
        run.log.push(LogEntry {
            ts: now_epoch_ms(),
            message,
        });
        match run.log.last() {
            Some(entry) => self.notify(&RunEvent::Log(entry)),
            None => Ok(()),
        }
    }

    fn notify(&mut self, event: &RunEvent<'_>) -> Result<()> {
        match self.observer.as_deref_mut() {
            Some(observer) => observer.on_event(event),
            None => Ok(()),
        }
    }
}

/// `stage 3 taxonomy` style label for log lines.
fn label(stage: StageId) -> String {
    format!("stage {} {}", stage.number(), stage)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
