//! Terminal and JSON presentation of a pipeline run.
//!
//! Everything here reads a finished [`PipelineRun`]; rendering never changes
//! run state. Text output is built into a `String` so callers decide where it
//! goes.
use crate::pipeline::{PipelineRun, RunEvent, RunObserver};
use crate::shapes::StageOutput;
use crate::stage::{StageId, StageStatus, STAGES};
use crate::transcript::{CallOutcome, TranscriptEntry};
use crate::util::truncate_string;
use anyhow::{Context, Result};
use serde_json::Value;
use std::io::Write;
use std::time::Instant;

const PILL_WIDTH: usize = 34;
const HIGHLIGHT_TERMS: usize = 5;
const THESIS_PREVIEW_BYTES: usize = 160;

/// Render a finished run for the terminal.
pub fn render_run(run: &PipelineRun, expand: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "concept pipeline ({}): depth {} (target {} concepts), {} chars of source\n",
        run.state(),
        run.depth(),
        run.depth().target_count(),
        run.source().chars().count()
    ));
    if let Some(err) = run.run_error() {
        out.push_str(&format!("\nRUN ERROR: {err}\n"));
    }

    out.push_str("\nstages:\n");
    for def in STAGES.iter() {
        let status = run.status(def.id).unwrap_or(StageStatus::Idle);
        out.push_str(&format!("  {}\n", status_pill(def.id, status)));
    }

    for stage in StageId::ALL {
        if let Some(value) = run.result(stage) {
            out.push('\n');
            out.push_str(&render_panel(stage, value, expand));
        }
        if let Some(failure) = run.failure(stage) {
            out.push_str(&format!(
                "\n{} failed ({}):\n  {}\n",
                stage.definition().display_name,
                failure.kind,
                failure.message
            ));
        }
    }

    out.push_str("\nactivity:\n");
    for entry in run.log() {
        let offset = entry.ts.saturating_sub(run.started_at());
        out.push_str(&format!(
            "  [+{:>7}] {}\n",
            format_elapsed(offset),
            entry.message
        ));
    }
    out
}

/// Render the whole run as one JSON document.
pub fn render_run_json(run: &PipelineRun) -> Result<String> {
    serde_json::to_string_pretty(run).context("serialize pipeline run")
}

/// `[icon] Name ........ status`
pub fn status_pill(stage: StageId, status: StageStatus) -> String {
    let def = stage.definition();
    let label = format!("[{}] {} ", def.icon, def.display_name);
    let width = label.chars().count();
    let dots = if width < PILL_WIDTH {
        ".".repeat(PILL_WIDTH - width)
    } else {
        String::from("..")
    };
    format!("{label}{dots} {status}")
}

fn render_panel(stage: StageId, value: &Value, expand: bool) -> String {
    let def = stage.definition();
    let mut out = format!("{} {}\n", def.icon, def.display_name);
    let output = match StageOutput::parse(stage, value) {
        Ok(output) => output,
        Err(_) => {
            // Stored results were shape-checked; fall back to raw JSON anyway.
            out.push_str(&indent(&pretty(value), "  "));
            return out;
        }
    };
    out.push_str(&format!("  {}\n", output.summary()));
    if expand {
        out.push_str(&outline(&output));
    } else if let Some(line) = highlight(&output) {
        out.push_str(&format!("  {line}\n"));
    }
    out
}

fn highlight(output: &StageOutput) -> Option<String> {
    let terms: Vec<&str> = match output {
        StageOutput::Concepts(concepts) => concepts.iter().map(|c| c.term.as_str()).collect(),
        StageOutput::Elaborations(items) => items.iter().map(|i| i.term.as_str()).collect(),
        StageOutput::Taxonomy(taxonomy) => taxonomy
            .categories
            .iter()
            .map(|category| category.name.as_str())
            .collect(),
        StageOutput::Compression(compression) => {
            return Some(truncate_string(&compression.thesis, THESIS_PREVIEW_BYTES));
        }
        StageOutput::Meta(map) => map.keys().map(String::as_str).collect(),
    };
    if terms.is_empty() {
        return None;
    }
    let mut line = terms
        .iter()
        .take(HIGHLIGHT_TERMS)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if terms.len() > HIGHLIGHT_TERMS {
        line.push_str(&format!(", +{} more", terms.len() - HIGHLIGHT_TERMS));
    }
    Some(line)
}

fn outline(output: &StageOutput) -> String {
    let mut out = String::new();
    match output {
        StageOutput::Concepts(concepts) => {
            for concept in concepts {
                let kind = concept.kind.as_deref().unwrap_or("unclassified");
                match concept.definition.as_deref() {
                    Some(definition) => out.push_str(&format!(
                        "  - {} [{kind}]: {definition}\n",
                        concept.term
                    )),
                    None => out.push_str(&format!("  - {} [{kind}]\n", concept.term)),
                }
            }
        }
        StageOutput::Elaborations(items) => {
            for item in items {
                out.push_str(&format!("  - {}\n", item.term));
                if let Some(text) = item.elaboration.as_deref() {
                    out.push_str(&format!("      {text}\n"));
                }
                for example in &item.examples {
                    out.push_str(&format!("      e.g. {}\n", value_label(example)));
                }
            }
        }
        StageOutput::Taxonomy(taxonomy) => {
            out.push_str(&format!(
                "  {}\n",
                taxonomy.root.as_deref().unwrap_or("(unnamed root)")
            ));
            for category in &taxonomy.categories {
                out.push_str(&format!("    {}\n", category.name));
                for concept in &category.concepts {
                    out.push_str(&format!("      - {}\n", value_label(concept)));
                }
            }
        }
        StageOutput::Compression(compression) => {
            out.push_str(&format!("  thesis: {}\n", compression.thesis));
            if !compression.glossary.is_empty() {
                out.push_str("  glossary:\n");
                for term in &compression.glossary {
                    out.push_str(&format!("    - {}\n", value_label(term)));
                }
            }
        }
        StageOutput::Meta(map) => {
            for (section, value) in map {
                out.push_str(&format!("  {section}:\n"));
                out.push_str(&indent(&pretty(value), "    "));
            }
        }
    }
    out
}

/// Short label for an item that may be a string or an object with a `term`.
fn value_label(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => match map.get("term").and_then(Value::as_str) {
            Some(term) => match map
                .get("definition")
                .or_else(|| map.get("description"))
                .and_then(Value::as_str)
            {
                Some(detail) => format!("{term}: {detail}"),
                None => term.to_string(),
            },
            None => value.to_string(),
        },
        other => other.to_string(),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines().map(|line| format!("{prefix}{line}\n")).collect()
}

fn format_elapsed(ms: u64) -> String {
    format!("{}.{:02}s", ms / 1000, (ms % 1000) / 10)
}

/// Stage catalog for `cpipe stages`.
pub fn render_stage_catalog() -> String {
    let mut out = String::new();
    for def in STAGES.iter() {
        let depends = if def.depends_on.is_empty() {
            String::from("none")
        } else {
            def.depends_on
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        out.push_str(&format!(
            "{}. {} {} ({})\n   {}\n   depends on: {depends}\n",
            def.id.number(),
            def.icon,
            def.display_name,
            def.id,
            def.description
        ));
    }
    out
}

pub fn render_stage_catalog_json() -> Result<String> {
    let stages: Vec<Value> = STAGES
        .iter()
        .map(|def| {
            serde_json::json!({
                "number": def.id.number(),
                "key": def.id,
                "display_name": def.display_name,
                "icon": def.icon,
                "description": def.description,
                "depends_on": def.depends_on,
            })
        })
        .collect();
    serde_json::to_string_pretty(&stages).context("serialize stage catalog")
}

/// Transcript entries for `cpipe log`, one line per model call.
pub fn render_transcript(entries: &[TranscriptEntry]) -> String {
    if entries.is_empty() {
        return String::from("no model calls recorded\n");
    }
    let mut out = String::new();
    for entry in entries {
        let detail = match entry.outcome {
            CallOutcome::Success => entry.summary.as_deref().unwrap_or("ok"),
            CallOutcome::Failed => entry.error.as_deref().unwrap_or("failed"),
        };
        let outcome = match entry.outcome {
            CallOutcome::Success => "ok",
            CallOutcome::Failed => "FAILED",
        };
        out.push_str(&format!(
            "stage {} {} {outcome} in {}: {detail}\n",
            entry.stage.number(),
            entry.stage,
            format_elapsed(entry.duration_ms)
        ));
    }
    out
}

/// Live progress writer: one line per stage transition.
pub struct ProgressPrinter<W: Write> {
    out: W,
    stage_started: Option<Instant>,
}

impl<W: Write> ProgressPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            stage_started: None,
        }
    }
}

impl<W: Write> RunObserver for ProgressPrinter<W> {
    fn on_event(&mut self, event: &RunEvent<'_>) -> Result<()> {
        let RunEvent::Status { stage, status } = event else {
            return Ok(());
        };
        let pill = status_pill(*stage, *status);
        if *status == StageStatus::Running {
            self.stage_started = Some(Instant::now());
            writeln!(self.out, "{pill}").context("write progress")?;
        } else if status.is_terminal() {
            let written = match self.stage_started.take() {
                Some(started) => {
                    let ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    writeln!(self.out, "{pill} ({})", format_elapsed(ms))
                }
                None => writeln!(self.out, "{pill}"),
            };
            written.context("write progress")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
